//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Mint and redeem flows by outcome and stage
//! - DA layer proof polling
//! - Transaction submission and reverts
//! - Agent candidates checked during selection

use crate::chain::AgentStatus;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::state::FlowKind;

use axum::{http::StatusCode, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};
use std::net::SocketAddr;
use tracing::info;

lazy_static! {
    pub static ref FLOWS: CounterVec = register_counter_vec!(
        "fassets_flows_total",
        "Flows finished, by kind, outcome and last stage",
        &["kind", "outcome", "stage"]
    ).unwrap();

    pub static ref DA_POLLS: CounterVec = register_counter_vec!(
        "fassets_da_polls_total",
        "DA layer proof polls by result",
        &["result"]
    ).unwrap();

    pub static ref TX_SUBMITTED: CounterVec = register_counter_vec!(
        "fassets_transactions_submitted_total",
        "Transactions submitted by operation",
        &["operation"]
    ).unwrap();

    pub static ref TX_REVERTED: CounterVec = register_counter_vec!(
        "fassets_transactions_reverted_total",
        "Transactions reverted by operation",
        &["operation"]
    ).unwrap();

    pub static ref CANDIDATES_CHECKED: CounterVec = register_counter_vec!(
        "fassets_agent_candidates_checked_total",
        "Agent status checks during selection, by status",
        &["status"]
    ).unwrap();

    pub static ref STAGE_LATENCY: HistogramVec = register_histogram_vec!(
        "fassets_stage_latency_seconds",
        "Time spent per flow stage",
        &["stage"],
        vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0]
    ).unwrap();
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub async fn run(&self) -> OrchestratorResult<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| OrchestratorError::Internal(format!("bind {}: {}", addr, e)))?;
        axum::serve(listener, app)
            .await
            .map_err(|e| OrchestratorError::Internal(format!("metrics server: {}", e)))?;

        Ok(())
    }
}

async fn metrics_handler() -> Result<String, (StatusCode, String)> {
    let internal = |e: String| (StatusCode::INTERNAL_SERVER_ERROR, e);
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&prometheus::gather(), &mut buffer)
        .map_err(|e| internal(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| internal(e.to_string()))
}

// Helper functions to record metrics

pub fn record_flow(kind: FlowKind, outcome: &str, stage: &str) {
    FLOWS.with_label_values(&[kind.as_str(), outcome, stage]).inc();
}

pub fn record_da_poll(result: &str) {
    DA_POLLS.with_label_values(&[result]).inc();
}

pub fn record_tx_submitted(operation: &str) {
    TX_SUBMITTED.with_label_values(&[operation]).inc();
}

pub fn record_tx_reverted(operation: &str) {
    TX_REVERTED.with_label_values(&[operation]).inc();
}

pub fn record_candidate_checked(status: AgentStatus) {
    CANDIDATES_CHECKED
        .with_label_values(&[&status.to_string()])
        .inc();
}

pub fn record_stage_latency(stage: &str, latency_secs: f64) {
    STAGE_LATENCY.with_label_values(&[stage]).observe(latency_secs);
}
