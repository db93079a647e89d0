//! Error types for the FAssets orchestrator

use ethers::types::{H256, U256};
use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// Main error type for the orchestrator
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Insufficient {resource}: have {have}, need {need}")]
    InsufficientResource {
        resource: String,
        have: String,
        need: String,
    },

    #[error("No agent with more than {min_free_lots} free lots is healthy")]
    NoCandidate { min_free_lots: u64 },

    #[error("Service {service} not ready: {message}")]
    TransientService { service: String, message: String },

    #[error("Voting round {round_id} finalization deadline passed after {attempts} proof requests")]
    RoundExpired { round_id: u64, attempts: u32 },

    #[error("Transaction reverted in {operation}: {reason}")]
    ChainRevert { operation: String, reason: String },

    #[error("Chain connection error for chain {chain_id}: {message}")]
    ChainConnection { chain_id: u64, message: String },

    #[error("Underlying payment {tx_hash} failed: {result}")]
    UnderlyingPayment { tx_hash: String, result: String },

    #[error("Underlying payment {tx_hash} was submitted but not confirmed: {message}")]
    PaymentUnconfirmed { tx_hash: String, message: String },

    #[error("Reservation {reservation_id} (tx {tx_hash:?}) failed checks: {reason}")]
    ReservationRejected {
        reservation_id: U256,
        tx_hash: H256,
        reason: String,
    },

    #[error("Timeout waiting for {operation}")]
    Timeout { operation: String },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Cancelled before {stage}")]
    Cancelled { stage: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl OrchestratorError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OrchestratorError::TransientService { .. }
                | OrchestratorError::Timeout { .. }
                | OrchestratorError::ChainConnection { .. }
        )
    }

    /// Errors the caller can recover from by funding or retrying with a fresh reservation
    pub fn is_caller_recoverable(&self) -> bool {
        matches!(
            self,
            OrchestratorError::InsufficientResource { .. } | OrchestratorError::RoundExpired { .. }
        )
    }

    /// Reservation already committed on chain when the error was raised
    pub fn committed_reservation(&self) -> Option<U256> {
        match self {
            OrchestratorError::ReservationRejected { reservation_id, .. } => Some(*reservation_id),
            _ => None,
        }
    }

    /// Underlying transaction that may have reached the ledger
    pub fn submitted_payment(&self) -> Option<&str> {
        match self {
            OrchestratorError::PaymentUnconfirmed { tx_hash, .. }
            | OrchestratorError::UnderlyingPayment { tx_hash, .. } => Some(tx_hash),
            _ => None,
        }
    }

    pub fn transient(service: impl Into<String>, message: impl ToString) -> Self {
        OrchestratorError::TransientService {
            service: service.into(),
            message: message.to_string(),
        }
    }

    pub fn revert(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        OrchestratorError::ChainRevert {
            operation: operation.into(),
            reason: reason.into(),
        }
    }
}

impl From<reqwest::Error> for OrchestratorError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return OrchestratorError::Timeout {
                operation: e
                    .url()
                    .map(|u| u.to_string())
                    .unwrap_or_else(|| "http request".to_string()),
            };
        }
        if e.is_decode() {
            return OrchestratorError::Validation(format!("malformed response body: {}", e));
        }
        OrchestratorError::transient("http", e)
    }
}

/// Result type for orchestrator operations
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Run a network call under a hard timeout, failing closed
pub async fn bounded<T, F>(operation: &str, limit: Duration, fut: F) -> OrchestratorResult<T>
where
    F: Future<Output = OrchestratorResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(OrchestratorError::Timeout {
            operation: operation.to_string(),
        }),
    }
}
