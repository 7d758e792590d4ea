#![deny(warnings)]

//! Session runtime: owns the carried state between rounds.
//!
//! A [`Session`] plays the collaborator role around the pure round engine:
//! it holds the current [`SimulationState`], feeds each allocation to the
//! engine with the right round index, swaps in the returned state, and
//! reports the final standing once rounds have been played.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sim_core::{
    initial_state, validate_state, Allocation, Category, RoundOutcome, SimulationState,
    StateError, BUDGET_PER_ROUND, TOTAL_ROUNDS,
};
use sim_econ::{compute_round, RoundError};
use tracing::{info, warn};

/// Allocation granularity used for generated plans.
pub const PLAN_STEP: i64 = 10_000;

/// Summary of how the company stands after the rounds played so far.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Standing {
    pub rounds_played: u32,
    /// True once every round has been played.
    pub complete: bool,
    pub final_eps: f64,
    pub best_round: u32,
    pub best_eps: f64,
    /// Relative EPS change from round 1 to the latest round; `None` when round 1 EPS is 0.
    pub eps_growth: Option<f64>,
    pub total_net_profit: f64,
    pub final_market_value: f64,
    /// (round, eps) per played round, for charting.
    pub eps_trend: Vec<(u32, f64)>,
}

impl Standing {
    /// Build a standing from a round history. Returns `None` when nothing has been played.
    pub fn from_history(history: &[RoundOutcome]) -> Option<Self> {
        let first = history.first()?;
        let last = history.last()?;
        let mut best = first;
        for o in history {
            if o.eps > best.eps {
                best = o;
            }
        }
        let eps_growth = if first.eps == 0.0 {
            None
        } else {
            Some((last.eps - first.eps) / first.eps.abs())
        };
        Some(Self {
            rounds_played: history.len() as u32,
            complete: last.round >= TOTAL_ROUNDS,
            final_eps: last.eps,
            best_round: best.round,
            best_eps: best.eps,
            eps_growth,
            total_net_profit: history.iter().map(|o| o.net_profit).sum(),
            final_market_value: last.market_value,
            eps_trend: history.iter().map(|o| (o.round, o.eps)).collect(),
        })
    }
}

/// Serializable view of a session for front ends.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub history: Vec<RoundOutcome>,
    pub standing: Option<Standing>,
}

/// A single player's run through the simulation.
#[derive(Clone, Debug, Default)]
pub struct Session {
    state: SimulationState,
}

impl Session {
    /// Start a new session from the fixed initial state.
    pub fn new() -> Self {
        Self {
            state: initial_state(),
        }
    }

    /// Resume from a state held by a front end between interactions.
    pub fn resume(state: SimulationState) -> Result<Self, StateError> {
        validate_state(&state)?;
        Ok(Self { state })
    }

    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    pub fn into_state(self) -> SimulationState {
        self.state
    }

    pub fn history(&self) -> &[RoundOutcome] {
        &self.state.history
    }

    /// Round the next allocation will be applied to.
    pub fn current_round(&self) -> u32 {
        self.state.round
    }

    pub fn is_complete(&self) -> bool {
        self.state.is_complete()
    }

    pub fn rounds_remaining(&self) -> u32 {
        (TOTAL_ROUNDS + 1).saturating_sub(self.state.round)
    }

    /// Play the current round. On error the session is left exactly as it was.
    pub fn run_round(&mut self, allocation: &Allocation) -> Result<RoundOutcome, RoundError> {
        let round = self.state.round;
        let (outcome, next) = match compute_round(&self.state, allocation, round) {
            Ok(v) => v,
            Err(e) => {
                warn!(round, error = %e, "round rejected");
                return Err(e);
            }
        };
        self.state = next;
        info!(
            round,
            revenue = outcome.revenue,
            net_profit = outcome.net_profit,
            eps = outcome.eps,
            "round complete"
        );
        if self.is_complete() {
            info!(rounds = TOTAL_ROUNDS, "simulation complete");
        }
        Ok(outcome)
    }

    /// Play allocations in order, stopping at the first rejected one.
    /// Returns the number of rounds played by this call. The rejected round
    /// is logged by [`Session::run_round`].
    pub fn run_plan(&mut self, plan: &[Allocation]) -> Result<usize, RoundError> {
        for allocation in plan {
            self.run_round(allocation)?;
        }
        Ok(plan.len())
    }

    pub fn standing(&self) -> Option<Standing> {
        Standing::from_history(&self.state.history)
    }

    pub fn report(&self) -> Report {
        Report {
            history: self.state.history.clone(),
            standing: self.standing(),
        }
    }

    pub fn report_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.report())
    }
}

/// An even split: a tenth of the budget on every category.
pub fn balanced_allocation() -> Allocation {
    let share = BUDGET_PER_ROUND / Decimal::from(Category::ALL.len());
    let mut a = Allocation::zero();
    for c in Category::ALL {
        a.set(c, share);
    }
    a
}

/// One random allocation in [`PLAN_STEP`] increments that uses the budget exactly.
pub fn random_allocation<R: Rng>(rng: &mut R) -> Allocation {
    let units = (BUDGET_PER_ROUND / Decimal::from(PLAN_STEP))
        .to_i64()
        .unwrap_or(0);
    let mut cuts: Vec<i64> = (0..Category::ALL.len() - 1)
        .map(|_| rng.gen_range(0..=units))
        .collect();
    cuts.sort_unstable();
    let mut a = Allocation::zero();
    let mut prev = 0;
    for (i, c) in Category::ALL.iter().enumerate() {
        let cut = cuts.get(i).copied().unwrap_or(units);
        a.set(*c, Decimal::from((cut - prev) * PLAN_STEP));
        prev = cut;
    }
    a
}

/// Seeded plan with one valid allocation per round.
pub fn random_plan(seed: u64, rounds: u32) -> Vec<Allocation> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..rounds).map(|_| random_allocation(&mut rng)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sim_core::{validate_allocation, InvalidAllocation};

    #[test]
    fn balanced_allocation_is_valid() {
        let a = balanced_allocation();
        assert_eq!(a.posters, Decimal::new(100_000, 0));
        validate_allocation(&a).unwrap();
    }

    #[test]
    fn random_plan_is_seeded_and_valid() {
        let p1 = random_plan(42, TOTAL_ROUNDS);
        let p2 = random_plan(42, TOTAL_ROUNDS);
        assert_eq!(p1, p2);
        assert_eq!(p1.len(), 4);
        for a in &p1 {
            validate_allocation(a).unwrap();
            for c in Category::ALL {
                let amt = a.amount(c);
                assert!(amt >= Decimal::ZERO);
                assert_eq!(amt % Decimal::from(PLAN_STEP), Decimal::ZERO);
            }
        }
        assert_ne!(random_plan(43, TOTAL_ROUNDS), p1);
    }

    #[test]
    fn full_session_records_four_rounds() {
        let mut s = Session::new();
        assert_eq!(s.rounds_remaining(), 4);
        let played = s.run_plan(&random_plan(7, TOTAL_ROUNDS)).unwrap();
        assert_eq!(played, 4);
        assert!(s.is_complete());
        assert_eq!(s.current_round(), 5);
        assert_eq!(s.rounds_remaining(), 0);
        let rounds: Vec<u32> = s.history().iter().map(|o| o.round).collect();
        assert_eq!(rounds, vec![1, 2, 3, 4]);

        let err = s.run_round(&balanced_allocation()).unwrap_err();
        assert_eq!(err, RoundError::SimulationComplete { total_rounds: 4 });
        assert_eq!(s.history().len(), 4);
    }

    #[test]
    fn rejected_round_leaves_session_untouched() {
        let mut s = Session::new();
        s.run_round(&balanced_allocation()).unwrap();
        let before = s.state().clone();
        let short = balanced_allocation().with(Category::Samples, Decimal::new(99_999, 0));
        let err = s.run_round(&short).unwrap_err();
        assert_eq!(
            err,
            RoundError::InvalidAllocation(InvalidAllocation::Shortfall {
                shortfall: Decimal::ONE,
                budget: BUDGET_PER_ROUND,
            })
        );
        assert_eq!(s.state(), &before);
    }

    #[test]
    fn plan_stops_at_first_bad_allocation() {
        let mut s = Session::new();
        let mut plan = random_plan(1, 3);
        plan[1] = Allocation::zero();
        let err = s.run_plan(&plan).unwrap_err();
        assert_eq!(
            err,
            RoundError::InvalidAllocation(InvalidAllocation::Shortfall {
                shortfall: BUDGET_PER_ROUND,
                budget: BUDGET_PER_ROUND,
            })
        );
        assert_eq!(s.history().len(), 1);
        assert_eq!(s.current_round(), 2);
    }

    #[test]
    fn overflowing_allocation_leaves_session_untouched() {
        let mut s = Session::new();
        let huge = Allocation::zero()
            .with(Category::TvAds, Decimal::MAX)
            .with(Category::Samples, Decimal::MAX);
        let err = s.run_round(&huge).unwrap_err();
        assert!(matches!(
            err,
            RoundError::InvalidAllocation(InvalidAllocation::Overflow { .. })
        ));
        assert_eq!(s.state(), &initial_state());
    }

    #[test]
    fn standing_tracks_best_round() {
        let mut s = Session::new();
        assert!(s.standing().is_none());
        s.run_plan(&random_plan(11, TOTAL_ROUNDS)).unwrap();
        let st = s.standing().unwrap();
        assert_eq!(st.rounds_played, 4);
        assert!(st.complete);
        assert_eq!(st.eps_trend.len(), 4);
        let max = s
            .history()
            .iter()
            .map(|o| o.eps)
            .fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(st.best_eps, max);
        assert_eq!(st.final_eps, s.history()[3].eps);
        let total: f64 = s.history().iter().map(|o| o.net_profit).sum();
        assert!((st.total_net_profit - total).abs() < 1e-6);
    }

    #[test]
    fn resume_rejects_corrupt_state() {
        let mut s = Session::new();
        s.run_round(&balanced_allocation()).unwrap();
        let resumed = Session::resume(s.state().clone()).unwrap();
        assert_eq!(resumed.current_round(), 2);

        let mut bad = s.into_state();
        bad.history.clear();
        assert!(Session::resume(bad).is_err());
    }

    #[test]
    fn report_serializes() {
        let mut s = Session::new();
        s.run_round(&balanced_allocation()).unwrap();
        let json = s.report_json().unwrap();
        let back: Report = serde_json::from_str(&json).unwrap();
        assert_eq!(back.history.len(), 1);
        assert_eq!(back.standing.unwrap().rounds_played, 1);
    }
}
