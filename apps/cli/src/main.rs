#![deny(warnings)]

//! Headless CLI: plays a plan of per-round allocations and prints the results.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use sim_core::{Allocation, RoundOutcome, TOTAL_ROUNDS};
use sim_runtime::{balanced_allocation, random_plan, Session, Standing};
use std::fmt::Write as _;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

const CHART_WIDTH: usize = 40;

#[derive(Debug, Default)]
struct Args {
    plan: Option<PathBuf>,
    seed: Option<u64>,
    json: bool,
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<Args> {
    let mut out = Args::default();
    let mut it = args.into_iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--plan" => out.plan = Some(it.next().context("--plan needs a path")?.into()),
            "--seed" => {
                let raw = it.next().context("--seed needs a value")?;
                out.seed = Some(raw.parse().with_context(|| format!("invalid seed {raw:?}"))?);
            }
            "--json" => out.json = true,
            other => bail!("unknown argument {other:?}"),
        }
    }
    Ok(out)
}

/// Plan file layout: `rounds:` followed by one allocation map per round.
#[derive(Debug, Deserialize)]
struct PlanFile {
    rounds: Vec<Allocation>,
}

fn parse_plan(text: &str) -> Result<Vec<Allocation>> {
    let file: PlanFile = serde_yaml::from_str(text).context("plan file is not valid YAML")?;
    if file.rounds.len() > TOTAL_ROUNDS as usize {
        bail!(
            "plan has {} rounds but the simulation only runs {}",
            file.rounds.len(),
            TOTAL_ROUNDS
        );
    }
    Ok(file.rounds)
}

fn load_plan(args: &Args) -> Result<Vec<Allocation>> {
    if let Some(path) = &args.plan {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading plan {}", path.display()))?;
        return parse_plan(&text);
    }
    if let Some(seed) = args.seed {
        return Ok(random_plan(seed, TOTAL_ROUNDS));
    }
    Ok(vec![balanced_allocation(); TOTAL_ROUNDS as usize])
}

/// Whole-currency amount with thousands separators, e.g. `-1,234,568`.
fn money(v: f64) -> String {
    let rounded = v.round();
    let digits = format!("{:.0}", rounded.abs());
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if rounded < 0.0 {
        out.insert(0, '-');
    }
    out
}

fn render_table(history: &[RoundOutcome]) -> String {
    let mut s = String::new();
    let _ = writeln!(
        s,
        "{:>5} {:>12} {:>12} {:>7} {:>12} {:>12} {:>11} {:>12} {:>7} {:>13}",
        "Round", "Revenue", "GM$", "GM%", "OPEX", "EBIT", "Tax", "Net Profit", "EPS", "Market Value"
    );
    for o in history {
        let _ = writeln!(
            s,
            "{:>5} {:>12} {:>12} {:>6.2}% {:>12} {:>12} {:>11} {:>12} {:>7.2} {:>13}",
            o.round,
            money(o.revenue),
            money(o.gross_margin),
            o.gross_margin_pct * 100.0,
            money(o.opex),
            money(o.ebit),
            money(o.tax),
            money(o.net_profit),
            o.eps,
            money(o.market_value)
        );
    }
    s
}

fn render_eps_chart(trend: &[(u32, f64)]) -> String {
    let max = trend.iter().map(|(_, e)| e.abs()).fold(0.0, f64::max);
    let mut s = String::from("EPS trend\n");
    for (round, eps) in trend {
        let len = if max > 0.0 {
            ((eps.abs() / max) * CHART_WIDTH as f64).round() as usize
        } else {
            0
        };
        let bar = (if *eps < 0.0 { "-" } else { "#" }).repeat(len);
        let _ = writeln!(s, "  R{round} {bar:<width$} {eps:.2}", width = CHART_WIDTH);
    }
    s
}

fn render_standing(standing: &Standing) -> String {
    let mut s = String::new();
    if standing.complete {
        let _ = writeln!(s, "Simulation complete after {} rounds.", standing.rounds_played);
    } else {
        let _ = writeln!(
            s,
            "{} of {} rounds played.",
            standing.rounds_played, TOTAL_ROUNDS
        );
    }
    let _ = writeln!(
        s,
        "Final EPS {:.2} | best EPS {:.2} in round {} | total net profit ${} | market value ${}",
        standing.final_eps,
        standing.best_eps,
        standing.best_round,
        money(standing.total_net_profit),
        money(standing.final_market_value)
    );
    if let Some(g) = standing.eps_growth {
        let _ = writeln!(s, "EPS change since round 1: {:+.1}%", g * 100.0);
    }
    s
}

fn main() -> Result<()> {
    // Logging to stderr keeps stdout clean for reports.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args(std::env::args().skip(1))?;
    info!(plan = ?args.plan, seed = ?args.seed, json = args.json, "starting CLI");

    let plan = load_plan(&args)?;
    let mut session = Session::new();
    for allocation in &plan {
        let round = session.current_round();
        session.run_round(allocation).with_context(|| {
            let remaining = allocation
                .remaining()
                .map_or_else(|| "out of range".to_string(), |r| r.to_string());
            format!("round {round} allocation rejected (remaining budget {remaining})")
        })?;
    }

    if args.json {
        println!("{}", session.report_json()?);
        return Ok(());
    }
    print!("{}", render_table(session.history()));
    if let Some(standing) = session.standing() {
        println!();
        print!("{}", render_eps_chart(&standing.eps_trend));
        println!();
        print!("{}", render_standing(&standing));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_flags() {
        let a = parse_args(strings(&["--plan", "p.yaml", "--json"])).unwrap();
        assert_eq!(a.plan, Some(PathBuf::from("p.yaml")));
        assert!(a.json);
        let a = parse_args(strings(&["--seed", "9"])).unwrap();
        assert_eq!(a.seed, Some(9));
        assert!(parse_args(strings(&["--seed", "x"])).is_err());
        assert!(parse_args(strings(&["--bogus"])).is_err());
    }

    #[test]
    fn default_plan_is_balanced() {
        let plan = load_plan(&Args::default()).unwrap();
        assert_eq!(plan.len(), 4);
        assert_eq!(plan[0], balanced_allocation());
    }

    #[test]
    fn yaml_plan_loads() {
        let text = "rounds:\n  - tv_ads: 500000\n    product_rnd: 500000\n  - training: 1000000\n";
        let plan = parse_plan(text).unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].tv_ads, Decimal::new(500_000, 0));
        assert_eq!(plan[1].remaining(), Some(Decimal::ZERO));
    }

    #[test]
    fn demo_plan_plays_to_completion() {
        let plan = parse_plan(include_str!("../../../demos/plan.yaml")).unwrap();
        let mut s = Session::new();
        s.run_plan(&plan).unwrap();
        assert!(s.is_complete());
        assert!(render_standing(&s.standing().unwrap()).starts_with("Simulation complete"));
    }

    #[test]
    fn too_many_rounds_rejected() {
        let text = "rounds:\n  - {}\n  - {}\n  - {}\n  - {}\n  - {}\n";
        assert!(parse_plan(text).is_err());
    }

    #[test]
    fn money_formatting() {
        assert_eq!(money(0.0), "0");
        assert_eq!(money(999.4), "999");
        assert_eq!(money(1_234_567.6), "1,234,568");
        assert_eq!(money(-5_428_571.43), "-5,428,571");
    }

    #[test]
    fn chart_scales_to_largest_eps() {
        let chart = render_eps_chart(&[(1, 0.5), (2, 1.0), (3, -0.25)]);
        let lines: Vec<&str> = chart.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[2].contains(&"#".repeat(CHART_WIDTH)));
        assert!(lines[3].contains(&"-".repeat(CHART_WIDTH / 4)));
    }

    #[test]
    fn table_has_row_per_round() {
        let mut s = Session::new();
        s.run_plan(&random_plan(3, 2)).unwrap();
        let t = render_table(s.history());
        assert_eq!(t.lines().count(), 3);
    }
}
