//! Flow checkpoint persistence
//!
//! Every flow writes its stage and the identifiers committed so far, so an
//! interrupted mint can be resumed or cleaned up by hand. PostgreSQL is used
//! when a database is configured, an in-process map otherwise.

mod manager;

pub use manager::StateManager;

use crate::error::{OrchestratorError, OrchestratorResult};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use ethers::types::U256;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowKind {
    Mint,
    Redeem,
}

impl FlowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowKind::Mint => "mint",
            FlowKind::Redeem => "redeem",
        }
    }
}

impl fmt::Display for FlowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlowKind {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mint" => Ok(FlowKind::Mint),
            "redeem" => Ok(FlowKind::Redeem),
            other => Err(OrchestratorError::Internal(format!("unknown flow kind {}", other))),
        }
    }
}

/// Persisted state of one flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowRecord {
    pub flow_id: Uuid,
    pub kind: FlowKind,
    pub stage: String,
    pub reservation_id: Option<U256>,
    pub underlying_tx: Option<String>,
    pub round_id: Option<u64>,
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl FlowRecord {
    pub fn new(kind: FlowKind, stage: impl Into<String>) -> Self {
        Self {
            flow_id: Uuid::new_v4(),
            kind,
            stage: stage.into(),
            reservation_id: None,
            underlying_tx: None,
            round_id: None,
            error: None,
            updated_at: Utc::now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.stage == "completed" || self.error.is_some()
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FlowStore: Send + Sync {
    /// Insert or replace the record with this flow id
    async fn save(&self, record: &FlowRecord) -> OrchestratorResult<()>;

    async fn load(&self, flow_id: Uuid) -> OrchestratorResult<Option<FlowRecord>>;

    /// Flows that neither completed nor failed, oldest first
    async fn unfinished(&self) -> OrchestratorResult<Vec<FlowRecord>>;
}

/// Process-local store, used when no database is configured
#[derive(Default)]
pub struct MemoryFlowStore {
    flows: DashMap<Uuid, FlowRecord>,
}

impl MemoryFlowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FlowStore for MemoryFlowStore {
    async fn save(&self, record: &FlowRecord) -> OrchestratorResult<()> {
        self.flows.insert(record.flow_id, record.clone());
        Ok(())
    }

    async fn load(&self, flow_id: Uuid) -> OrchestratorResult<Option<FlowRecord>> {
        Ok(self.flows.get(&flow_id).map(|r| r.clone()))
    }

    async fn unfinished(&self) -> OrchestratorResult<Vec<FlowRecord>> {
        let mut flows: Vec<FlowRecord> = self
            .flows
            .iter()
            .filter(|r| !r.is_terminal())
            .map(|r| r.clone())
            .collect();
        flows.sort_by_key(|r| r.updated_at);
        Ok(flows)
    }
}
