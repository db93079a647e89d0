//! Voting round arithmetic
//!
//! Rounds are fixed-length windows counted from a network-wide start time. A
//! proof for round `r` can be fetched once the round is finalized; after the
//! finalization window the request is treated as lost.

use crate::error::{OrchestratorError, OrchestratorResult};

use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundSchedule {
    first_round_start_ts: u64,
    round_duration_secs: u64,
    finalization_window_secs: u64,
}

/// The round a proof is expected in, and the instant after which polling stops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundTarget {
    pub round_id: u64,
    pub deadline: Instant,
}

/// Serializable view of a target for logs and dry-run plans
#[derive(Debug, Clone, Serialize)]
pub struct RoundPlan {
    pub round_id: u64,
    pub deadline_unix: u64,
}

impl RoundSchedule {
    pub fn new(first_round_start_ts: u64, round_duration_secs: u64, finalization_window_secs: u64) -> Self {
        Self {
            first_round_start_ts,
            round_duration_secs: round_duration_secs.max(1),
            finalization_window_secs,
        }
    }

    /// Round containing `unix_ts`
    pub fn round_for(&self, unix_ts: u64) -> OrchestratorResult<u64> {
        if unix_ts < self.first_round_start_ts {
            return Err(OrchestratorError::Validation(format!(
                "timestamp {} precedes the first voting round",
                unix_ts
            )));
        }
        Ok((unix_ts - self.first_round_start_ts) / self.round_duration_secs)
    }

    pub fn round_end(&self, round_id: u64) -> OrchestratorResult<u64> {
        round_id
            .checked_add(1)
            .and_then(|rounds| rounds.checked_mul(self.round_duration_secs))
            .and_then(|elapsed| elapsed.checked_add(self.first_round_start_ts))
            .ok_or_else(|| out_of_range(round_id))
    }

    /// Unix time after which no proof for `round_id` is expected
    pub fn finalization_deadline(&self, round_id: u64) -> OrchestratorResult<u64> {
        self.round_end(round_id)?
            .checked_add(self.finalization_window_secs)
            .ok_or_else(|| out_of_range(round_id))
    }

    /// Target an explicit round, measuring the deadline against `now_unix`
    pub fn target(&self, round_id: u64, now_unix: u64) -> OrchestratorResult<RoundTarget> {
        let remaining = self.finalization_deadline(round_id)?.saturating_sub(now_unix);
        let deadline = Instant::now()
            .checked_add(Duration::from_secs(remaining))
            .ok_or_else(|| out_of_range(round_id))?;
        Ok(RoundTarget { round_id, deadline })
    }

    /// Target the round in which a ledger close time falls
    pub fn target_for_close_time(&self, close_ts: u64, now_unix: u64) -> OrchestratorResult<RoundTarget> {
        self.target(self.round_for(close_ts)?, now_unix)
    }

    pub fn plan(&self, round_id: u64) -> OrchestratorResult<RoundPlan> {
        Ok(RoundPlan {
            round_id,
            deadline_unix: self.finalization_deadline(round_id)?,
        })
    }
}

fn out_of_range(round_id: u64) -> OrchestratorError {
    OrchestratorError::Validation(format!("voting round {} is out of range", round_id))
}

/// Current unix time in seconds
pub fn unix_now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}
