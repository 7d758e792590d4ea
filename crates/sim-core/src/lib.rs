#![deny(warnings)]

//! Core domain models and invariants for the finance strategy simulator.
//!
//! This crate defines the serializable types shared by the round engine and
//! its front ends, the fixed simulation constants, and validation helpers
//! guarding the allocation and state invariants.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Number of rounds in a full simulation.
pub const TOTAL_ROUNDS: u32 = 4;
/// Amount that must be allocated, exactly, every round.
pub const BUDGET_PER_ROUND: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);
/// Shares outstanding, used for earnings-per-share.
pub const SHARE_COUNT: f64 = 1_000_000.0;
/// Flat corporate tax rate applied to positive EBIT.
pub const TAX_RATE: f64 = 0.30;
/// Price/earnings multiple used to imply market value.
pub const PE_MULTIPLE: f64 = 12.0;
/// Spend at which a lever's return coefficient is halved.
pub const SATURATION_SPEND: f64 = 400_000.0;

/// Revenue entering round 1.
pub const INITIAL_REVENUE: f64 = 5_000_000.0;
/// Cost-of-goods-sold ratio entering round 1.
pub const INITIAL_COGS_PCT: f64 = 0.60;
/// Operating expense base entering round 1.
pub const INITIAL_OPEX: f64 = 1_000_000.0;

/// Base return coefficients per lever, plus the direct opex reduction rate.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coefficients {
    /// Revenue per unit of marketing spend.
    pub marketing: f64,
    /// Innovation coefficient (no formula consumes it).
    pub innovation: f64,
    /// Revenue per unit of prior-round R&D spend.
    pub rnd: f64,
    /// COGS ratio reduction per round of efficiency spend.
    pub efficiency: f64,
    /// Opex reduction per unit of efficiency spend.
    pub opex_efficiency: f64,
}

/// The fixed coefficient table.
pub const COEFFICIENTS: Coefficients = Coefficients {
    marketing: 2.5,
    innovation: 0.000_04,
    rnd: 0.8,
    efficiency: 0.000_02,
    opex_efficiency: 0.20,
};

/// Strategic levers that spending categories roll up into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Lever {
    Marketing,
    Innovation,
    RnD,
    Efficiency,
}

impl Lever {
    pub const ALL: [Lever; 4] = [
        Lever::Marketing,
        Lever::Innovation,
        Lever::RnD,
        Lever::Efficiency,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Lever::Marketing => "Marketing",
            Lever::Innovation => "Innovation",
            Lever::RnD => "R&D",
            Lever::Efficiency => "Efficiency",
        }
    }
}

impl fmt::Display for Lever {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The ten spending categories a round's budget is split across.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    Posters,
    Billboard,
    Samples,
    TvAds,
    BrandBuilding,
    ProductDesign,
    ProductRnD,
    ProcessRnD,
    Training,
    CustomerService,
}

impl Category {
    pub const ALL: [Category; 10] = [
        Category::Posters,
        Category::Billboard,
        Category::Samples,
        Category::TvAds,
        Category::BrandBuilding,
        Category::ProductDesign,
        Category::ProductRnD,
        Category::ProcessRnD,
        Category::Training,
        Category::CustomerService,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Category::Posters => "Posters",
            Category::Billboard => "Billboard",
            Category::Samples => "Samples",
            Category::TvAds => "TV Ads",
            Category::BrandBuilding => "Brand Building",
            Category::ProductDesign => "Product Design",
            Category::ProductRnD => "Product R&D",
            Category::ProcessRnD => "Process R&D",
            Category::Training => "Training",
            Category::CustomerService => "Customer Service",
        }
    }

    /// Lever this category's spend counts towards.
    pub fn lever(self) -> Lever {
        match self {
            Category::Posters | Category::Billboard | Category::Samples | Category::TvAds => {
                Lever::Marketing
            }
            Category::BrandBuilding | Category::ProductDesign => Lever::Innovation,
            Category::ProductRnD | Category::ProcessRnD => Lever::RnD,
            Category::Training | Category::CustomerService => Lever::Efficiency,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One round's spend per category. Missing fields deserialize as zero.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Allocation {
    pub posters: Decimal,
    pub billboard: Decimal,
    pub samples: Decimal,
    pub tv_ads: Decimal,
    pub brand_building: Decimal,
    pub product_design: Decimal,
    pub product_rnd: Decimal,
    pub process_rnd: Decimal,
    pub training: Decimal,
    pub customer_service: Decimal,
}

impl Allocation {
    /// An allocation with nothing spent anywhere.
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn amount(&self, category: Category) -> Decimal {
        *self.slot(category)
    }

    /// Builder-style setter replacing one category's amount.
    pub fn with(mut self, category: Category, amount: Decimal) -> Self {
        *self.slot_mut(category) = amount;
        self
    }

    pub fn set(&mut self, category: Category, amount: Decimal) {
        *self.slot_mut(category) = amount;
    }

    fn slot(&self, category: Category) -> &Decimal {
        match category {
            Category::Posters => &self.posters,
            Category::Billboard => &self.billboard,
            Category::Samples => &self.samples,
            Category::TvAds => &self.tv_ads,
            Category::BrandBuilding => &self.brand_building,
            Category::ProductDesign => &self.product_design,
            Category::ProductRnD => &self.product_rnd,
            Category::ProcessRnD => &self.process_rnd,
            Category::Training => &self.training,
            Category::CustomerService => &self.customer_service,
        }
    }

    fn slot_mut(&mut self, category: Category) -> &mut Decimal {
        match category {
            Category::Posters => &mut self.posters,
            Category::Billboard => &mut self.billboard,
            Category::Samples => &mut self.samples,
            Category::TvAds => &mut self.tv_ads,
            Category::BrandBuilding => &mut self.brand_building,
            Category::ProductDesign => &mut self.product_design,
            Category::ProductRnD => &mut self.product_rnd,
            Category::ProcessRnD => &mut self.process_rnd,
            Category::Training => &mut self.training,
            Category::CustomerService => &mut self.customer_service,
        }
    }

    /// Sum across all ten categories. `None` if the sum overflows.
    pub fn total(&self) -> Option<Decimal> {
        checked_sum(Category::ALL.iter().map(|c| self.amount(*c)))
    }

    /// Sum of the categories belonging to `lever`. `None` if the sum overflows.
    pub fn lever_total(&self, lever: Lever) -> Option<Decimal> {
        checked_sum(
            Category::ALL
                .iter()
                .filter(|c| c.lever() == lever)
                .map(|c| self.amount(*c)),
        )
    }

    pub fn totals(&self) -> Option<LeverTotals> {
        Some(LeverTotals {
            marketing: self.lever_total(Lever::Marketing)?,
            innovation: self.lever_total(Lever::Innovation)?,
            rnd: self.lever_total(Lever::RnD)?,
            efficiency: self.lever_total(Lever::Efficiency)?,
        })
    }

    /// Budget left to allocate. Negative when over-allocated, `None` when out of range.
    pub fn remaining(&self) -> Option<Decimal> {
        BUDGET_PER_ROUND.checked_sub(self.total()?)
    }
}

fn checked_sum<I: IntoIterator<Item = Decimal>>(amounts: I) -> Option<Decimal> {
    amounts
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(v))
}

/// Spend rolled up per lever (M, I, R, E).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeverTotals {
    pub marketing: Decimal,
    pub innovation: Decimal,
    pub rnd: Decimal,
    pub efficiency: Decimal,
}

impl LeverTotals {
    pub fn get(&self, lever: Lever) -> Decimal {
        match lever {
            Lever::Marketing => self.marketing,
            Lever::Innovation => self.innovation,
            Lever::RnD => self.rnd,
            Lever::Efficiency => self.efficiency,
        }
    }

    /// Sum of the four levers. `None` if the sum overflows.
    pub fn sum(&self) -> Option<Decimal> {
        checked_sum(Lever::ALL.iter().map(|l| self.get(*l)))
    }

    /// Check every lever is non-negative and the four sum to the budget exactly.
    pub fn validate(&self) -> Result<(), InvalidAllocation> {
        for lever in Lever::ALL {
            let amount = self.get(lever);
            if amount < Decimal::ZERO {
                return Err(InvalidAllocation::NegativeLever { lever, amount });
            }
        }
        let total = self.sum().ok_or(InvalidAllocation::Overflow {
            budget: BUDGET_PER_ROUND,
        })?;
        check_budget(total)
    }
}

/// Reasons an allocation cannot be executed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvalidAllocation {
    /// A single category was given a negative amount.
    #[error("negative spend on {category}: {amount}")]
    NegativeSpend { category: Category, amount: Decimal },
    /// A lever total is negative.
    #[error("negative {lever} total: {amount}")]
    NegativeLever { lever: Lever, amount: Decimal },
    /// Total is below the per-round budget.
    #[error("allocation is {shortfall} short of the {budget} budget")]
    Shortfall { shortfall: Decimal, budget: Decimal },
    /// Total is above the per-round budget.
    #[error("allocation exceeds the {budget} budget by {excess}")]
    Excess { excess: Decimal, budget: Decimal },
    /// Total is too large to represent, so far above the budget.
    #[error("allocation exceeds the {budget} budget by more than can be represented")]
    Overflow { budget: Decimal },
}

// Callers reject negative amounts first, so `total` is non-negative here.
fn check_budget(total: Decimal) -> Result<(), InvalidAllocation> {
    match total.cmp(&BUDGET_PER_ROUND) {
        std::cmp::Ordering::Less => Err(InvalidAllocation::Shortfall {
            shortfall: BUDGET_PER_ROUND - total,
            budget: BUDGET_PER_ROUND,
        }),
        std::cmp::Ordering::Greater => Err(InvalidAllocation::Excess {
            excess: total - BUDGET_PER_ROUND,
            budget: BUDGET_PER_ROUND,
        }),
        std::cmp::Ordering::Equal => Ok(()),
    }
}

/// Validate an allocation: no negative category, lever totals summing to the budget.
pub fn validate_allocation(allocation: &Allocation) -> Result<(), InvalidAllocation> {
    for category in Category::ALL {
        let amount = allocation.amount(category);
        if amount < Decimal::ZERO {
            return Err(InvalidAllocation::NegativeSpend { category, amount });
        }
    }
    allocation
        .totals()
        .ok_or(InvalidAllocation::Overflow {
            budget: BUDGET_PER_ROUND,
        })?
        .validate()
}

/// Metrics recorded for one executed round. Never mutated once created.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoundOutcome {
    pub round: u32,
    pub revenue: f64,
    pub gross_margin: f64,
    /// Gross margin over revenue, 0 when revenue is 0.
    pub gross_margin_pct: f64,
    pub opex: f64,
    pub ebit: f64,
    pub tax: f64,
    pub net_profit: f64,
    pub eps: f64,
    pub market_value: f64,
}

/// Financial state carried from one round into the next.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationState {
    /// Round about to be played (1-based).
    pub round: u32,
    /// Revenue entering this round.
    pub revenue: f64,
    /// Cost of goods sold as a fraction of revenue, in [0, 1].
    pub cogs_pct: f64,
    /// Operating expense base.
    pub opex: f64,
    /// R&D lever spend from the previous round.
    pub prev_rd: f64,
    /// Outcomes of completed rounds, in round order.
    pub history: Vec<RoundOutcome>,
}

impl SimulationState {
    /// True once every round has been played.
    pub fn is_complete(&self) -> bool {
        self.round > TOTAL_ROUNDS
    }
}

impl Default for SimulationState {
    fn default() -> Self {
        initial_state()
    }
}

/// Fixed starting state for a new session.
pub fn initial_state() -> SimulationState {
    SimulationState {
        round: 1,
        revenue: INITIAL_REVENUE,
        cogs_pct: INITIAL_COGS_PCT,
        opex: INITIAL_OPEX,
        prev_rd: 0.0,
        history: Vec::new(),
    }
}

/// Violations of the carried-state invariants.
#[derive(Debug, Error, PartialEq)]
pub enum StateError {
    /// Rounds are numbered from 1.
    #[error("round must be >= 1")]
    ZeroRound,
    /// Numeric field must be finite.
    #[error("non-finite value in field {0}")]
    NonFinite(&'static str),
    /// COGS ratio must lie within [0, 1].
    #[error("cogs ratio {0} is outside [0,1]")]
    CogsOutOfRange(f64),
    /// Opex and carried R&D must be non-negative.
    #[error("negative value in field {0}")]
    Negative(&'static str),
    /// History must hold exactly the rounds before `round`, in order.
    #[error("history entry {index} is for round {found}, expected round {expected}")]
    HistoryOutOfOrder {
        index: usize,
        found: u32,
        expected: u32,
    },
    /// Round is past the state reached after the last round.
    #[error("round {round} is beyond the final state at round {max}")]
    RoundOutOfRange { round: u32, max: u32 },
    /// History length must equal `round - 1`.
    #[error("history holds {found} rounds but state is at round {round}")]
    HistoryLength { found: usize, round: u32 },
}

/// Validate a state handed back by a front end before resuming from it.
pub fn validate_state(state: &SimulationState) -> Result<(), StateError> {
    if state.round == 0 {
        return Err(StateError::ZeroRound);
    }
    if state.round > TOTAL_ROUNDS + 1 {
        return Err(StateError::RoundOutOfRange {
            round: state.round,
            max: TOTAL_ROUNDS + 1,
        });
    }
    let fields = [
        ("revenue", state.revenue),
        ("cogs_pct", state.cogs_pct),
        ("opex", state.opex),
        ("prev_rd", state.prev_rd),
    ];
    for (name, value) in fields {
        if !value.is_finite() {
            return Err(StateError::NonFinite(name));
        }
    }
    if !(0.0..=1.0).contains(&state.cogs_pct) {
        return Err(StateError::CogsOutOfRange(state.cogs_pct));
    }
    if state.opex < 0.0 {
        return Err(StateError::Negative("opex"));
    }
    if state.prev_rd < 0.0 {
        return Err(StateError::Negative("prev_rd"));
    }
    if state.history.len() != (state.round - 1) as usize {
        return Err(StateError::HistoryLength {
            found: state.history.len(),
            round: state.round,
        });
    }
    for (index, outcome) in state.history.iter().enumerate() {
        let expected = index as u32 + 1;
        if outcome.round != expected {
            return Err(StateError::HistoryOutOfOrder {
                index,
                found: outcome.round,
                expected,
            });
        }
    }
    Ok(())
}

/// Convert a currency amount into the engine's floating-point domain.
pub fn to_f64(amount: Decimal) -> Option<f64> {
    amount.to_f64().filter(|v| v.is_finite())
}
