//! Live commitment bookkeeping: what is due now and how a real deposit is
//! credited across the strands.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use super::engine::credit_split;
use super::rules::{LIVE_DEPOSIT_ALLOCATION, WeeklyOverhead};
use super::types::{ContributionPlan, PoolState};

const SECONDS_PER_YEAR: f64 = 365.25 * 24.0 * 60.0 * 60.0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    /// The evaluation time precedes the commitment's creation.
    #[error("commitment starts at {created_at}, after evaluation time {now}")]
    StartsInFuture {
        created_at: DateTime<Utc>,
        now: DateTime<Utc>,
    },

    /// Deposits must be finite and positive.
    #[error("invalid deposit amount: {0}")]
    InvalidAmount(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositReceipt {
    pub strand1: f64,
    pub strand2: f64,
    pub strand3: f64,
}

#[derive(Debug, Clone)]
pub struct Commitment {
    pub created_at: DateTime<Utc>,
    pub plan: ContributionPlan,
    pub participants: u32,
    pub balances: PoolState,
}

impl Commitment {
    pub fn new(created_at: DateTime<Utc>, plan: ContributionPlan, participants: u32) -> Self {
        Self {
            created_at,
            plan,
            participants,
            balances: PoolState::default(),
        }
    }

    pub fn elapsed_years(&self, now: DateTime<Utc>) -> Result<f64, LedgerError> {
        if now < self.created_at {
            return Err(LedgerError::StartsInFuture {
                created_at: self.created_at,
                now,
            });
        }
        let elapsed = now - self.created_at;
        Ok(elapsed.num_milliseconds() as f64 / 1_000.0 / SECONDS_PER_YEAR)
    }

    /// Weekly amount currently due under the commitment's plan.
    pub fn amount_due(&self, now: DateTime<Utc>) -> Result<f64, LedgerError> {
        let elapsed_years = self.elapsed_years(now)?;
        Ok(self.plan.amount_at(elapsed_years))
    }

    pub fn credit_deposit(&mut self, amount: f64) -> Result<DepositReceipt, LedgerError> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(LedgerError::InvalidAmount(amount));
        }

        let before = self.balances;
        credit_split(&mut self.balances, amount, LIVE_DEPOSIT_ALLOCATION);
        Ok(DepositReceipt {
            strand1: self.balances.strand1 - before.strand1,
            strand2: self.balances.strand2 - before.strand2,
            strand3: self.balances.strand3 - before.strand3,
        })
    }

    pub fn weekly_overhead(&self) -> WeeklyOverhead {
        WeeklyOverhead::for_participants(self.participants)
    }
}
