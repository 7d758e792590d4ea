#![deny(warnings)]

//! Round engine: the per-round financial projection.
//!
//! Given the carried [`SimulationState`] and one round's allocation, this
//! crate computes the round's [`RoundOutcome`] and the state entering the
//! next round. Everything here is pure; the caller owns the state and
//! replaces it with the returned value.
//!
//! The projection runs in a fixed order:
//! - revenue grows from this round's marketing and last round's R&D
//! - efficiency lowers the COGS ratio and the opex base (both floored at 0)
//! - EBIT, tax (never negative), net profit, EPS and implied market value follow

use rust_decimal::Decimal;
use sim_core::{
    to_f64, validate_allocation, Allocation, InvalidAllocation, Lever, LeverTotals, RoundOutcome,
    SimulationState, BUDGET_PER_ROUND, COEFFICIENTS, PE_MULTIPLE, SATURATION_SPEND, SHARE_COUNT,
    TAX_RATE, TOTAL_ROUNDS,
};
use thiserror::Error;
use tracing::debug;

/// Errors produced when a round cannot be executed.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RoundError {
    /// Allocation does not consume the budget exactly or has negative spend.
    #[error(transparent)]
    InvalidAllocation(#[from] InvalidAllocation),
    /// The round index passed in is not the one the state is waiting for.
    #[error("expected round {expected}, got round {got}")]
    RoundMismatch { expected: u32, got: u32 },
    /// All rounds have already been played.
    #[error("simulation already completed all {total_rounds} rounds")]
    SimulationComplete { total_rounds: u32 },
    /// A currency amount could not be represented as a finite float.
    #[error("non-finite numeric conversion")]
    NonFinite,
}

/// Timing modifier applied to a lever's base coefficient in a given round.
///
/// Innovation pays off only in round 1, R&D fades after round 2, efficiency
/// is half-strength in round 1, and marketing strengthens from round 3.
pub fn modifier(lever: Lever, round: u32) -> f64 {
    match lever {
        Lever::Innovation if round == 1 => 1.2,
        Lever::Innovation => 0.8,
        Lever::RnD if round <= 2 => 1.0,
        Lever::RnD => 0.7,
        Lever::Efficiency if round >= 2 => 1.0,
        Lever::Efficiency => 0.5,
        Lever::Marketing if round <= 2 => 0.6,
        Lever::Marketing => 1.2,
    }
}

/// Diminishing-returns coefficient `k` for `spend` on `lever` in `round`.
///
/// k = base * modifier / (1 + spend / 400_000): the marginal return halves
/// once spend reaches the saturation constant.
pub fn diminishing_return(spend: f64, base: f64, lever: Lever, round: u32) -> f64 {
    (base * modifier(lever, round)) / (1.0 + spend / SATURATION_SPEND)
}

fn lever_amount(totals: &LeverTotals, lever: Lever) -> Result<f64, RoundError> {
    to_f64(totals.get(lever)).ok_or(RoundError::NonFinite)
}

/// Execute `round` for `state` with a ten-category allocation.
///
/// Validates the allocation before touching any numbers. On error the input
/// state is untouched and no new state is produced.
pub fn compute_round(
    state: &SimulationState,
    allocation: &Allocation,
    round: u32,
) -> Result<(RoundOutcome, SimulationState), RoundError> {
    check_round(state, round)?;
    validate_allocation(allocation)?;
    let totals = allocation.totals().ok_or(InvalidAllocation::Overflow {
        budget: BUDGET_PER_ROUND,
    })?;
    compute_round_from_totals(state, &totals, round)
}

/// Execute `round` for `state` given the four lever totals directly.
pub fn compute_round_from_totals(
    state: &SimulationState,
    totals: &LeverTotals,
    round: u32,
) -> Result<(RoundOutcome, SimulationState), RoundError> {
    check_round(state, round)?;
    totals.validate()?;

    let m = lever_amount(totals, Lever::Marketing)?;
    let r = lever_amount(totals, Lever::RnD)?;
    let e = lever_amount(totals, Lever::Efficiency)?;

    let k_m = diminishing_return(m, COEFFICIENTS.marketing, Lever::Marketing, round);
    let k_r = diminishing_return(r, COEFFICIENTS.rnd, Lever::RnD, round);
    let k_e = diminishing_return(e, COEFFICIENTS.efficiency, Lever::Efficiency, round);

    // R&D return is applied to last round's spend, but saturates on this round's.
    let revenue = state.revenue + k_m * m + k_r * state.prev_rd;
    let cogs_pct = (state.cogs_pct - k_e).max(0.0);
    let cogs = revenue * cogs_pct;
    let gross_margin = revenue - cogs;
    let opex = (state.opex - COEFFICIENTS.opex_efficiency * e).max(0.0);
    let ebit = gross_margin - opex;
    let tax = (ebit * TAX_RATE).max(0.0);
    let net_profit = ebit - tax;
    let eps = net_profit / SHARE_COUNT;
    let market_value = eps * SHARE_COUNT * PE_MULTIPLE;
    let gross_margin_pct = if revenue == 0.0 {
        0.0
    } else {
        gross_margin / revenue
    };

    debug!(round, k_m, k_r, k_e, revenue, cogs, opex, ebit, tax, "round projected");

    let outcome = RoundOutcome {
        round,
        revenue,
        gross_margin,
        gross_margin_pct,
        opex,
        ebit,
        tax,
        net_profit,
        eps,
        market_value,
    };
    let mut history = Vec::with_capacity(state.history.len() + 1);
    history.extend_from_slice(&state.history);
    history.push(outcome.clone());
    let next = SimulationState {
        round: round + 1,
        revenue,
        cogs_pct,
        opex,
        prev_rd: r,
        history,
    };
    Ok((outcome, next))
}

fn check_round(state: &SimulationState, round: u32) -> Result<(), RoundError> {
    if state.is_complete() {
        return Err(RoundError::SimulationComplete {
            total_rounds: TOTAL_ROUNDS,
        });
    }
    if round != state.round {
        return Err(RoundError::RoundMismatch {
            expected: state.round,
            got: round,
        });
    }
    Ok(())
}

/// Lever totals from whole-currency amounts; handy for callers and tests.
pub fn lever_totals(marketing: i64, innovation: i64, rnd: i64, efficiency: i64) -> LeverTotals {
    LeverTotals {
        marketing: Decimal::new(marketing, 0),
        innovation: Decimal::new(innovation, 0),
        rnd: Decimal::new(rnd, 0),
        efficiency: Decimal::new(efficiency, 0),
    }
}
