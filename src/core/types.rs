use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntensityTier {
    Low,
    Medium,
    High,
    Custom,
}

impl IntensityTier {
    /// Parses a tier name. Unknown names yield `None`, which the resolver
    /// treats as "no contribution due".
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Custom => "custom",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulePeriod {
    pub start_year: u32,
    pub end_year: u32,
    pub amount: f64,
}

/// Tier selection plus the custom schedule inputs it may need.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContributionPlan {
    pub tier: Option<IntensityTier>,
    pub schedule: Vec<SchedulePeriod>,
    pub custom_default: Option<f64>,
}

impl ContributionPlan {
    pub fn tier(tier: IntensityTier) -> Self {
        Self {
            tier: Some(tier),
            ..Self::default()
        }
    }

    pub fn custom(schedule: Vec<SchedulePeriod>, custom_default: Option<f64>) -> Self {
        Self {
            tier: Some(IntensityTier::Custom),
            schedule,
            custom_default,
        }
    }

    pub fn amount_at(&self, elapsed_years: f64) -> f64 {
        super::schedule::resolve_periodic_amount(
            self.tier,
            elapsed_years,
            &self.schedule,
            self.custom_default,
        )
    }
}

#[derive(Debug, Clone)]
pub struct SimulationParameters {
    pub horizon_years: f64,
    pub strand1_apy: f64,
    pub strand2_apy: f64,
    pub strand3_apy: f64,
    pub reference_price: f64,
    pub plan: ContributionPlan,
    pub participants: u32,
}

/// Running balances of the three strands and the terminal store.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PoolState {
    pub strand1: f64,
    pub strand2: f64,
    pub strand3: f64,
    pub terminal: f64,
}

impl PoolState {
    pub fn total(&self) -> f64 {
        self.strand1 + self.strand2 + self.strand3 + self.terminal
    }

    pub(crate) fn scale(&mut self, factor: f64) {
        self.strand1 *= factor;
        self.strand2 *= factor;
        self.strand3 *= factor;
        self.terminal *= factor;
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum Phase {
    Accumulation,
    Consolidation,
}

impl Phase {
    pub fn number(self) -> u8 {
        match self {
            Phase::Accumulation => 1,
            Phase::Consolidation => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub year: u32,
    pub total: u64,
    pub strand1: u64,
    pub strand2: u64,
    pub strand3: u64,
    pub terminal: u64,
    pub phase: u8,
    pub initial_deposits: u64,
    pub operational_fees: u64,
    pub member_fees: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionSummary {
    pub final_value: u64,
    pub terminal_asset_units: f64,
    pub phase_two_year: Option<u32>,
    pub total_deposits: u64,
    pub total_fees: u64,
}
