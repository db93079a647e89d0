//! Mint stages and the failure report handed back to the operator

use crate::error::OrchestratorError;

use ethers::types::U256;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MintStage {
    SelectingAgent,
    Reserving,
    Paying,
    Attesting,
    Executing,
    Completed,
}

impl MintStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            MintStage::SelectingAgent => "selecting_agent",
            MintStage::Reserving => "reserving",
            MintStage::Paying => "paying",
            MintStage::Attesting => "attesting",
            MintStage::Executing => "executing",
            MintStage::Completed => "completed",
        }
    }
}

impl fmt::Display for MintStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifiers committed so far by a flow
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Checkpoint {
    pub reservation_id: Option<U256>,
    pub underlying_tx: Option<String>,
    pub round_id: Option<u64>,
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(id) = self.reservation_id {
            parts.push(format!("reservation id {}", id));
        }
        if let Some(tx) = &self.underlying_tx {
            parts.push(format!("underlying tx {}", tx));
        }
        if let Some(round) = self.round_id {
            parts.push(format!("round {}", round));
        }
        if parts.is_empty() {
            f.write_str("nothing committed")
        } else {
            f.write_str(&parts.join(", "))
        }
    }
}

/// A mint that stopped at `stage`
#[derive(Debug)]
pub struct FlowFailure {
    pub stage: MintStage,
    pub checkpoint: Checkpoint,
    pub error: OrchestratorError,
}

impl FlowFailure {
    /// Whether the flow can be picked up again with `execute-minting`
    pub fn resumable(&self) -> bool {
        let paid = self.checkpoint.reservation_id.is_some() && self.checkpoint.underlying_tx.is_some();
        paid && match self.stage {
            MintStage::Attesting | MintStage::Executing => true,
            // The payment may still validate
            MintStage::Paying => matches!(self.error, OrchestratorError::PaymentUnconfirmed { .. }),
            _ => false,
        }
    }
}

impl fmt::Display for FlowFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "mint failed at stage {} ({}): {}",
            self.stage, self.checkpoint, self.error
        )?;
        if self.resumable() {
            write!(f, "; resume with execute-minting")?;
        }
        Ok(())
    }
}

impl std::error::Error for FlowFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
