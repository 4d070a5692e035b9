use tracing::debug;

use super::rules::{
    ACCUMULATION_ALLOCATION, PERIODS_PER_YEAR, PHASE_TWO_HORIZON_PROGRESS,
    PHASE_TWO_VALUE_THRESHOLD, StrandAllocation, WEEKLY_DCA_PERCENT, WEEKLY_MIGRATION_PERCENT,
    WeeklyOverhead, dca_cap,
};
use super::types::{
    ContributionPlan, Phase, PoolState, ProjectionSummary, SimulationParameters, Snapshot,
};

#[derive(Debug, Clone, Copy)]
struct StrandRates {
    strand1: f64,
    strand2: f64,
    strand3: f64,
}

impl StrandRates {
    fn from_params(params: &SimulationParameters) -> Self {
        Self {
            strand1: periodic_rate(params.strand1_apy),
            strand2: periodic_rate(params.strand2_apy),
            strand3: periodic_rate(params.strand3_apy),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Counters {
    deposits: f64,
    operational_fees: f64,
    member_fees: f64,
}

#[derive(Debug)]
struct Run {
    pools: PoolState,
    counters: Counters,
    phase: Phase,
}

/// Per-run constants derived once from the parameters.
#[derive(Debug)]
struct Projection<'a> {
    plan: &'a ContributionPlan,
    rates: StrandRates,
    overhead: WeeklyOverhead,
    cap: f64,
    total_periods: u32,
}

impl<'a> Projection<'a> {
    fn new(params: &'a SimulationParameters) -> Self {
        Self {
            plan: &params.plan,
            rates: StrandRates::from_params(params),
            overhead: WeeklyOverhead::for_participants(params.participants),
            cap: dca_cap(params.plan.tier),
            total_periods: (params.horizon_years * PERIODS_PER_YEAR as f64).floor() as u32,
        }
    }

    /// Period 0: the first deposit is split across the strands, uncompounded.
    fn seed(&self) -> Run {
        let deposit = self.plan.amount_at(0.0);
        let mut run = Run {
            pools: PoolState::default(),
            counters: Counters {
                deposits: deposit,
                ..Counters::default()
            },
            phase: Phase::Accumulation,
        };
        credit_split(&mut run.pools, deposit, ACCUMULATION_ALLOCATION);
        run
    }

    fn step(&self, run: &mut Run, period: u32) {
        let elapsed_years = period as f64 / PERIODS_PER_YEAR as f64;
        let deposit = self.plan.amount_at(elapsed_years);
        run.counters.deposits += deposit;

        if run.phase == Phase::Accumulation {
            let progress = period as f64 / self.total_periods as f64;
            let value = run.pools.total();
            if progress >= PHASE_TWO_HORIZON_PROGRESS || value >= PHASE_TWO_VALUE_THRESHOLD {
                debug!(period, progress, value, "entering consolidation phase");
                run.phase = Phase::Consolidation;
            }
        }

        match run.phase {
            Phase::Accumulation => accumulate(&mut run.pools, &self.rates, deposit),
            Phase::Consolidation => consolidate(&mut run.pools, &self.rates, deposit, self.cap),
        }

        charge_overhead(&mut run.pools, &mut run.counters, self.overhead);
    }
}

/// Yearly projection of a commitment, years `0..=floor(horizon)`.
///
/// The last snapshot always shows every strand liquidated into the terminal
/// store. A negative or non-finite horizon yields no snapshots.
pub fn run_simulation(params: &SimulationParameters) -> Vec<Snapshot> {
    let mut snapshots = project_yearly(params);
    liquidate_final(&mut snapshots);
    snapshots
}

/// Yearly snapshots before the end-of-horizon liquidation pass.
///
/// Public so callers can chart the strand split of the final year, which
/// `run_simulation` folds into the terminal store.
pub fn project_yearly(params: &SimulationParameters) -> Vec<Snapshot> {
    if !params.horizon_years.is_finite() || params.horizon_years < 0.0 {
        return Vec::new();
    }

    let projection = Projection::new(params);
    let mut snapshots =
        Vec::with_capacity((projection.total_periods / PERIODS_PER_YEAR) as usize + 1);

    let mut run = projection.seed();
    snapshots.push(snapshot(0, &run));

    for period in 1..=projection.total_periods {
        projection.step(&mut run, period);
        if period % PERIODS_PER_YEAR == 0 {
            snapshots.push(snapshot(period / PERIODS_PER_YEAR, &run));
        }
    }

    snapshots
}

/// Per-period compounding rate for an annual yield given in percent.
pub(crate) fn periodic_rate(apy_percent: f64) -> f64 {
    (1.0 + apy_percent / 100.0).powf(1.0 / PERIODS_PER_YEAR as f64) - 1.0
}

pub(crate) fn credit_split(pools: &mut PoolState, amount: f64, allocation: StrandAllocation) {
    pools.strand1 += amount * allocation.strand1 / 100.0;
    pools.strand2 += amount * allocation.strand2 / 100.0;
    pools.strand3 += amount * allocation.strand3 / 100.0;
}

fn accumulate(pools: &mut PoolState, rates: &StrandRates, deposit: f64) {
    let allocation = ACCUMULATION_ALLOCATION;
    pools.strand1 = pools.strand1 * (1.0 + rates.strand1) + deposit * allocation.strand1 / 100.0;
    pools.strand2 = pools.strand2 * (1.0 + rates.strand2) + deposit * allocation.strand2 / 100.0;
    pools.strand3 = pools.strand3 * (1.0 + rates.strand3) + deposit * allocation.strand3 / 100.0;
}

fn consolidate(pools: &mut PoolState, rates: &StrandRates, deposit: f64, cap: f64) {
    pools.strand1 = pools.strand1 * (1.0 + rates.strand1) + deposit;
    pools.strand2 *= 1.0 + rates.strand2;
    pools.strand3 *= 1.0 + rates.strand3;

    let from_strand2 = pools.strand2 * WEEKLY_MIGRATION_PERCENT / 100.0;
    let from_strand3 = pools.strand3 * WEEKLY_MIGRATION_PERCENT / 100.0;
    pools.strand2 -= from_strand2;
    pools.strand3 -= from_strand3;
    pools.strand1 += from_strand2 + from_strand3;

    let purchase = (pools.strand1 * WEEKLY_DCA_PERCENT / 100.0)
        .min(cap)
        .max(0.0);
    pools.strand1 -= purchase;
    pools.terminal += purchase;
}

/// Applies the weekly overhead as one uniform shrink of every balance.
fn charge_overhead(pools: &mut PoolState, counters: &mut Counters, overhead: WeeklyOverhead) {
    let value = pools.total();
    let due = overhead.total();
    if value <= 0.0 || due <= 0.0 {
        return;
    }

    let charged = due.min(value);
    pools.scale(1.0 - charged / value);
    counters.operational_fees += charged * overhead.operational / due;
    counters.member_fees += charged * overhead.members / due;
}

fn snapshot(year: u32, run: &Run) -> Snapshot {
    let strand1 = round_units(run.pools.strand1);
    let strand2 = round_units(run.pools.strand2);
    let strand3 = round_units(run.pools.strand3);
    let terminal = round_units(run.pools.terminal);
    Snapshot {
        year,
        total: strand1 + strand2 + strand3 + terminal,
        strand1,
        strand2,
        strand3,
        terminal,
        phase: run.phase.number(),
        initial_deposits: round_units(run.counters.deposits),
        operational_fees: round_units(run.counters.operational_fees),
        member_fees: round_units(run.counters.member_fees),
    }
}

fn round_units(value: f64) -> u64 {
    value.max(0.0).round() as u64
}

/// Converts every strand of the last snapshot into the terminal store.
pub fn liquidate_final(snapshots: &mut [Snapshot]) {
    let Some(last) = snapshots.last_mut() else {
        return;
    };
    last.terminal += last.strand1 + last.strand2 + last.strand3;
    last.strand1 = 0;
    last.strand2 = 0;
    last.strand3 = 0;
    last.total = last.terminal;
}

pub fn summarize(snapshots: &[Snapshot], reference_price: f64) -> ProjectionSummary {
    let Some(last) = snapshots.last() else {
        return ProjectionSummary {
            final_value: 0,
            terminal_asset_units: 0.0,
            phase_two_year: None,
            total_deposits: 0,
            total_fees: 0,
        };
    };

    let terminal_asset_units = if reference_price > 0.0 && reference_price.is_finite() {
        last.terminal as f64 / reference_price
    } else {
        0.0
    };

    ProjectionSummary {
        final_value: last.total,
        terminal_asset_units,
        phase_two_year: snapshots
            .iter()
            .find(|snapshot| snapshot.phase == Phase::Consolidation.number())
            .map(|snapshot| snapshot.year),
        total_deposits: last.initial_deposits,
        total_fees: last.operational_fees + last.member_fees,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ContributionPlan, IntensityTier, SchedulePeriod};
    use proptest::prelude::{prop_assert, prop_assert_eq, proptest};

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn sample_params() -> SimulationParameters {
        SimulationParameters {
            horizon_years: 10.0,
            strand1_apy: 4.0,
            strand2_apy: 8.0,
            strand3_apy: 12.0,
            reference_price: 60_000.0,
            plan: ContributionPlan::tier(IntensityTier::Medium),
            participants: 4,
        }
    }

    fn zero_yield_params(plan: ContributionPlan, horizon_years: f64) -> SimulationParameters {
        SimulationParameters {
            horizon_years,
            strand1_apy: 0.0,
            strand2_apy: 0.0,
            strand3_apy: 0.0,
            reference_price: 60_000.0,
            plan,
            participants: 1,
        }
    }

    fn plan_from_index(index: u8) -> ContributionPlan {
        match index % 5 {
            0 => ContributionPlan::tier(IntensityTier::Low),
            1 => ContributionPlan::tier(IntensityTier::Medium),
            2 => ContributionPlan::tier(IntensityTier::High),
            3 => ContributionPlan::custom(
                vec![
                    SchedulePeriod {
                        start_year: 1,
                        end_year: 3,
                        amount: 75.0,
                    },
                    SchedulePeriod {
                        start_year: 4,
                        end_year: 10,
                        amount: 120.0,
                    },
                ],
                Some(20.0),
            ),
            _ => ContributionPlan::custom(Vec::new(), None),
        }
    }

    #[test]
    fn periodic_rate_compounds_back_to_annual_yield() {
        let rate = periodic_rate(12.0);
        assert_approx((1.0 + rate).powi(PERIODS_PER_YEAR as i32), 1.12);
        assert_approx(periodic_rate(0.0), 0.0);
    }

    #[test]
    fn medium_tier_one_year_seeds_split_and_liquidates() {
        let params = zero_yield_params(ContributionPlan::tier(IntensityTier::Medium), 1.0);
        let snapshots = run_simulation(&params);
        assert_eq!(snapshots.len(), 2);

        // $50 seed: 7.5 / 25 / 12.5 across the strands. The other 10 % is never credited.
        let first = snapshots[0];
        assert_eq!(first.year, 0);
        assert_eq!(first.strand1, 8);
        assert_eq!(first.strand2, 25);
        assert_eq!(first.strand3, 13);
        assert_eq!(first.terminal, 0);
        assert_eq!(first.total, 46);
        assert_eq!(first.phase, 1);
        assert_eq!(first.initial_deposits, 50);
        assert_eq!(first.operational_fees, 0);

        let last = snapshots[1];
        assert_eq!(last.year, 1);
        assert_eq!(last.strand1, 0);
        assert_eq!(last.strand2, 0);
        assert_eq!(last.strand3, 0);
        assert_eq!(last.total, last.terminal);
        assert!(last.total > 0);
        assert_eq!(last.phase, 2);
        assert_eq!(last.initial_deposits, 50 * 53);
    }

    #[test]
    fn custom_schedule_zero_horizon_emits_single_seed_snapshot() {
        let plan = ContributionPlan::custom(
            vec![SchedulePeriod {
                start_year: 1,
                end_year: 3,
                amount: 75.0,
            }],
            Some(0.0),
        );
        let params = zero_yield_params(plan, 0.0);

        let projected = project_yearly(&params);
        assert_eq!(projected.len(), 1);
        let seed = projected[0];
        assert_eq!(seed.year, 0);
        assert_eq!(seed.phase, 1);
        assert_eq!(seed.initial_deposits, 75);
        assert_eq!(seed.strand1, 11);
        assert_eq!(seed.strand2, 38);
        assert_eq!(seed.strand3, 19);
        assert_eq!(seed.terminal, 0);

        let snapshots = run_simulation(&params);
        assert_eq!(snapshots.len(), 1);
        let only = snapshots[0];
        assert_eq!(only.phase, 1);
        assert_eq!(only.initial_deposits, 75);
        assert_eq!(only.strand1 + only.strand2 + only.strand3, 0);
        assert_eq!(only.terminal, 11 + 38 + 19);
        assert_eq!(only.total, only.terminal);
    }

    #[test]
    fn seed_split_matches_allocation_before_liquidation() {
        let plan = ContributionPlan::custom(
            vec![SchedulePeriod {
                start_year: 1,
                end_year: 3,
                amount: 75.0,
            }],
            None,
        );
        let mut pools = PoolState::default();
        credit_split(&mut pools, plan.amount_at(0.0), ACCUMULATION_ALLOCATION);
        assert_approx(pools.strand1, 11.25);
        assert_approx(pools.strand2, 37.5);
        assert_approx(pools.strand3, 18.75);
        assert_approx(pools.terminal, 0.0);
        assert_approx(pools.total(), 67.5);
    }

    fn high_yield_params() -> SimulationParameters {
        let mut params = sample_params();
        params.plan = ContributionPlan::tier(IntensityTier::High);
        params.strand1_apy = 50.0;
        params.strand2_apy = 50.0;
        params.strand3_apy = 50.0;
        params.horizon_years = 30.0;
        params
    }

    #[test]
    fn value_threshold_triggers_consolidation_before_midpoint() {
        let params = high_yield_params();
        let projection = Projection::new(&params);
        let mut run = projection.seed();

        let mut flipped_at = None;
        for period in 1..=projection.total_periods {
            let value_before = run.pools.total();
            let phase_before = run.phase;
            projection.step(&mut run, period);

            if phase_before == Phase::Accumulation {
                if run.phase == Phase::Accumulation {
                    assert_approx(run.pools.terminal, 0.0);
                    continue;
                }
                let progress = period as f64 / projection.total_periods as f64;
                assert!(progress < PHASE_TWO_HORIZON_PROGRESS, "progress {progress}");
                assert!(value_before >= PHASE_TWO_VALUE_THRESHOLD, "value {value_before}");
                assert!(run.pools.terminal > 0.0);
                flipped_at = Some(period);
                break;
            }
        }
        let flipped_at = flipped_at.expect("value threshold must trigger phase two");

        // The check one period earlier still saw balances under the threshold.
        let mut replay = projection.seed();
        for period in 1..flipped_at - 1 {
            projection.step(&mut replay, period);
        }
        assert!(replay.pools.total() < PHASE_TWO_VALUE_THRESHOLD);
    }

    #[test]
    fn terminal_store_stays_empty_until_consolidation() {
        let snapshots = run_simulation(&high_yield_params());
        let switch = snapshots
            .iter()
            .position(|s| s.phase == 2)
            .expect("phase two must trigger");
        assert!(switch > 0 && switch + 1 < snapshots.len());

        assert!(snapshots[..switch].iter().all(|s| s.terminal == 0));
        assert!(snapshots[switch].terminal > 0);
        assert!(snapshots[switch + 1].terminal > snapshots[switch].terminal);
    }

    #[test]
    fn horizon_midpoint_triggers_consolidation_when_threshold_is_out_of_reach() {
        let params = zero_yield_params(ContributionPlan::tier(IntensityTier::Low), 40.0);
        let snapshots = run_simulation(&params);
        assert_eq!(snapshots.len(), 41);
        assert_eq!(snapshots[19].phase, 1);
        assert_eq!(snapshots[20].phase, 2);
    }

    #[test]
    fn consolidation_moves_value_toward_strand_one_and_terminal() {
        let rates = StrandRates {
            strand1: 0.0,
            strand2: 0.0,
            strand3: 0.0,
        };
        let mut pools = PoolState {
            strand1: 1_000.0,
            strand2: 5_000.0,
            strand3: 2_500.0,
            terminal: 0.0,
        };
        consolidate(&mut pools, &rates, 100.0, 250.0);

        // Migration: 100 from strand 2, 50 from strand 3.
        // Strand 1 = 1000 + 100 + 150 = 1250; purchase = min(62.5, 250).
        assert_approx(pools.strand2, 4_900.0);
        assert_approx(pools.strand3, 2_450.0);
        assert_approx(pools.strand1, 1_187.5);
        assert_approx(pools.terminal, 62.5);
    }

    #[test]
    fn consolidation_purchase_respects_tier_cap() {
        let rates = StrandRates {
            strand1: 0.0,
            strand2: 0.0,
            strand3: 0.0,
        };
        let mut pools = PoolState {
            strand1: 100_000.0,
            ..PoolState::default()
        };
        consolidate(&mut pools, &rates, 0.0, 250.0);
        assert_approx(pools.terminal, 250.0);
        assert_approx(pools.strand1, 99_750.0);
    }

    #[test]
    fn overhead_shrinks_every_store_by_the_same_ratio() {
        let mut pools = PoolState {
            strand1: 100.0,
            strand2: 200.0,
            strand3: 300.0,
            terminal: 400.0,
        };
        let mut counters = Counters::default();
        let overhead = WeeklyOverhead {
            operational: 8.0,
            members: 2.0,
        };
        charge_overhead(&mut pools, &mut counters, overhead);

        assert_approx(pools.total(), 990.0);
        assert_approx(pools.strand1, 99.0);
        assert_approx(pools.terminal, 396.0);
        assert_approx(counters.operational_fees, 8.0);
        assert_approx(counters.member_fees, 2.0);
    }

    #[test]
    fn overhead_never_drives_balances_negative() {
        let mut pools = PoolState {
            strand1: 1.0,
            strand2: 0.5,
            strand3: 0.0,
            terminal: 0.5,
        };
        let mut counters = Counters::default();
        charge_overhead(&mut pools, &mut counters, WeeklyOverhead::for_participants(3));

        assert_approx(pools.total(), 0.0);
        assert!(pools.strand1 >= 0.0 && pools.strand2 >= 0.0 && pools.terminal >= 0.0);
        assert_approx(counters.operational_fees + counters.member_fees, 2.0);
    }

    #[test]
    fn overhead_is_skipped_on_empty_pools() {
        let mut pools = PoolState::default();
        let mut counters = Counters::default();
        charge_overhead(&mut pools, &mut counters, WeeklyOverhead::for_participants(1));
        assert_eq!(pools, PoolState::default());
        assert_approx(counters.operational_fees, 0.0);
    }

    #[test]
    fn unknown_tier_projects_nothing() {
        let plan = ContributionPlan::default();
        let snapshots = run_simulation(&zero_yield_params(plan, 3.0));
        assert_eq!(snapshots.len(), 4);
        assert!(snapshots.iter().all(|s| s.total == 0 && s.initial_deposits == 0));
        assert!(snapshots.iter().all(|s| s.operational_fees == 0));
    }

    #[test]
    fn negative_or_non_finite_horizon_yields_empty_sequence() {
        let mut params = sample_params();
        params.horizon_years = -1.0;
        assert!(run_simulation(&params).is_empty());
        params.horizon_years = f64::NAN;
        assert!(run_simulation(&params).is_empty());
    }

    #[test]
    fn fractional_horizon_samples_whole_years_only() {
        let mut params = sample_params();
        params.horizon_years = 2.5;
        let snapshots = run_simulation(&params);
        assert_eq!(snapshots.len(), 3);
        assert_eq!(snapshots[2].year, 2);
        assert_eq!(snapshots[2].total, snapshots[2].terminal);
    }

    #[test]
    fn fees_accumulate_in_both_categories() {
        let snapshots = run_simulation(&sample_params());
        let last = snapshots.last().expect("snapshots");
        // 3.00 operational and 0.40 per-member each week for 520 weeks.
        assert_eq!(last.operational_fees, 1_560);
        assert_eq!(last.member_fees, 208);
    }

    #[test]
    fn summary_reports_units_and_transition_year() {
        let params = zero_yield_params(ContributionPlan::tier(IntensityTier::Low), 40.0);
        let snapshots = run_simulation(&params);
        let summary = summarize(&snapshots, 50_000.0);
        let last = snapshots.last().expect("snapshots");

        assert_eq!(summary.final_value, last.terminal);
        assert_approx(summary.terminal_asset_units, last.terminal as f64 / 50_000.0);
        assert_eq!(summary.phase_two_year, Some(20));
        assert_eq!(summary.total_deposits, last.initial_deposits);
        assert_eq!(summary.total_fees, last.operational_fees + last.member_fees);

        assert_approx(summarize(&snapshots, 0.0).terminal_asset_units, 0.0);
        assert_eq!(summarize(&[], 1.0).final_value, 0);
    }

    #[test]
    fn liquidate_final_is_a_no_op_on_empty_sequence() {
        let mut snapshots: Vec<Snapshot> = Vec::new();
        liquidate_final(&mut snapshots);
        assert!(snapshots.is_empty());
    }

    #[test]
    fn reruns_with_identical_parameters_are_identical() {
        let params = sample_params();
        assert_eq!(run_simulation(&params), run_simulation(&params));
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(48))]

        #[test]
        fn prop_snapshot_sequence_invariants(
            horizon in 0u32..25,
            plan_index in 0u8..5,
            apy1_bp in 0u32..3_000,
            apy2_bp in 0u32..3_000,
            apy3_bp in 0u32..3_000,
            participants in 0u32..40,
        ) {
            let params = SimulationParameters {
                horizon_years: horizon as f64,
                strand1_apy: apy1_bp as f64 / 100.0,
                strand2_apy: apy2_bp as f64 / 100.0,
                strand3_apy: apy3_bp as f64 / 100.0,
                reference_price: 60_000.0,
                plan: plan_from_index(plan_index),
                participants,
            };
            let snapshots = run_simulation(&params);
            prop_assert_eq!(snapshots.len(), horizon as usize + 1);

            let (last, body) = snapshots.split_last().expect("at least one snapshot");
            for (index, s) in body.iter().enumerate() {
                prop_assert_eq!(s.year as usize, index);
                prop_assert_eq!(s.total, s.strand1 + s.strand2 + s.strand3 + s.terminal);
            }
            prop_assert_eq!(last.strand1 + last.strand2 + last.strand3, 0);
            prop_assert_eq!(last.total, last.terminal);

            for pair in snapshots.windows(2) {
                prop_assert!(pair[1].phase >= pair[0].phase);
                prop_assert!(pair[1].initial_deposits >= pair[0].initial_deposits);
                prop_assert!(pair[1].operational_fees >= pair[0].operational_fees);
            }
            if plan_index % 5 == 4 {
                prop_assert!(snapshots.iter().all(|s| s.initial_deposits == 0 && s.total == 0));
            } else if horizon > 0 {
                prop_assert!(last.initial_deposits > snapshots[0].initial_deposits);
            }
        }
    }
}
