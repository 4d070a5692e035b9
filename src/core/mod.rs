mod engine;
mod ledger;
mod rules;
mod schedule;
mod types;

pub use engine::{liquidate_final, project_yearly, run_simulation, summarize};
pub use ledger::{Commitment, DepositReceipt, LedgerError};
pub use rules::{
    ACCUMULATION_ALLOCATION, LIVE_DEPOSIT_ALLOCATION, OPERATING_COSTS, OperatingCost,
    PERIODS_PER_YEAR, StrandAllocation, WeeklyOverhead,
};
pub use schedule::{ScheduleWarning, resolve_periodic_amount, schedule_warnings};
pub use types::{
    ContributionPlan, IntensityTier, Phase, PoolState, ProjectionSummary, SchedulePeriod,
    SimulationParameters, Snapshot,
};
