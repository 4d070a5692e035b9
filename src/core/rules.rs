//! Fixed rule table shared by the resolver, the simulator and the live ledger.

use super::types::IntensityTier;

pub const PERIODS_PER_YEAR: u32 = 52;
pub const PERIODS_PER_MONTH: f64 = PERIODS_PER_YEAR as f64 / 12.0;

/// One age band of a built-in tier. `until_years` is the exclusive upper
/// bound; `None` marks the open-ended last band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    pub until_years: Option<f64>,
    pub amount: f64,
}

const fn band(until_years: f64, amount: f64) -> Band {
    Band {
        until_years: Some(until_years),
        amount,
    }
}

const fn open_band(amount: f64) -> Band {
    Band {
        until_years: None,
        amount,
    }
}

/// Monthly amounts; converted to weekly by the resolver.
pub const LOW_MONTHLY_BANDS: [Band; 4] = [
    band(1.0, 100.0),
    band(2.0, 150.0),
    band(3.0, 200.0),
    open_band(250.0),
];

pub const MEDIUM_WEEKLY_BANDS: [Band; 4] = [
    band(3.0, 50.0),
    band(6.0, 75.0),
    band(10.0, 100.0),
    open_band(150.0),
];

pub const HIGH_WEEKLY_BANDS: [Band; 4] = [
    band(3.0, 100.0),
    band(6.0, 150.0),
    band(10.0, 200.0),
    open_band(300.0),
];

/// Percentages (0-100) of a deposit credited to each strand. The terminal
/// store never receives deposits directly; anything left up to 100 is not
/// credited anywhere.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrandAllocation {
    pub strand1: f64,
    pub strand2: f64,
    pub strand3: f64,
}

impl StrandAllocation {
    pub fn credited_percent(self) -> f64 {
        self.strand1 + self.strand2 + self.strand3
    }
}

/// Split used for every phase-1 deposit inside a projection.
pub const ACCUMULATION_ALLOCATION: StrandAllocation = StrandAllocation {
    strand1: 15.0,
    strand2: 50.0,
    strand3: 25.0,
};

/// Split used when a live deposit is credited to an existing commitment.
pub const LIVE_DEPOSIT_ALLOCATION: StrandAllocation = StrandAllocation {
    strand1: 25.0,
    strand2: 45.0,
    strand3: 30.0,
};

pub const PHASE_TWO_VALUE_THRESHOLD: f64 = 100_000.0;
pub const PHASE_TWO_HORIZON_PROGRESS: f64 = 0.5;

/// Share of strands 2 and 3 moved into strand 1 each phase-2 week.
pub const WEEKLY_MIGRATION_PERCENT: f64 = 2.0;
/// Share of strand 1 converted into the terminal store each phase-2 week.
pub const WEEKLY_DCA_PERCENT: f64 = 5.0;

/// Weekly ceiling on the dollar-cost-average purchase. Unrecognized tiers
/// make no purchases.
pub fn dca_cap(tier: Option<IntensityTier>) -> f64 {
    match tier {
        Some(IntensityTier::Low) => 100.0,
        Some(IntensityTier::Medium) => 250.0,
        Some(IntensityTier::High) => 500.0,
        Some(IntensityTier::Custom) => 1_000.0,
        None => 0.0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OperatingCost {
    pub name: &'static str,
    pub weekly: f64,
}

pub const OPERATING_COSTS: [OperatingCost; 4] = [
    OperatingCost {
        name: "hosting",
        weekly: 1.25,
    },
    OperatingCost {
        name: "price-oracle",
        weekly: 0.5,
    },
    OperatingCost {
        name: "network-fees",
        weekly: 1.0,
    },
    OperatingCost {
        name: "monitoring",
        weekly: 0.25,
    },
];

pub const MEMBER_WEEKLY_COST: f64 = 0.10;

/// Weekly overhead split into its operational and per-member parts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeeklyOverhead {
    pub operational: f64,
    pub members: f64,
}

impl WeeklyOverhead {
    pub fn for_participants(participants: u32) -> Self {
        Self {
            operational: OPERATING_COSTS.iter().map(|cost| cost.weekly).sum(),
            members: participants.max(1) as f64 * MEMBER_WEEKLY_COST,
        }
    }

    pub fn total(self) -> f64 {
        self.operational + self.members
    }
}
