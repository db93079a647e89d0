//! PostgreSQL flow store

use super::{FlowKind, FlowRecord, FlowStore};
use crate::config::DatabaseConfig;
use crate::error::{OrchestratorError, OrchestratorResult};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ethers::types::U256;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{debug, info};
use uuid::Uuid;

/// State manager for PostgreSQL persistence
pub struct StateManager {
    pool: PgPool,
}

impl StateManager {
    pub async fn new(config: &DatabaseConfig) -> OrchestratorResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect(&config.url)
            .await?;

        Ok(Self { pool })
    }

    /// Create tables inline
    pub async fn run_migrations(&self) -> OrchestratorResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS flows (
                flow_id UUID PRIMARY KEY,
                kind VARCHAR(16) NOT NULL,
                stage VARCHAR(32) NOT NULL,
                reservation_id VARCHAR(78),
                underlying_tx VARCHAR(64),
                round_id BIGINT,
                error TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_flows_open
            ON flows (updated_at)
            WHERE error IS NULL AND stage <> 'completed'
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("Database migrations complete");
        Ok(())
    }

    pub async fn health_check(&self) -> OrchestratorResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

fn record_from_row(row: &PgRow) -> OrchestratorResult<FlowRecord> {
    let kind: String = row.get("kind");
    let reservation_id: Option<String> = row.get("reservation_id");
    let reservation_id = reservation_id
        .map(|id| {
            U256::from_dec_str(&id)
                .map_err(|e| OrchestratorError::Internal(format!("stored reservation id {}: {}", id, e)))
        })
        .transpose()?;

    Ok(FlowRecord {
        flow_id: row.get("flow_id"),
        kind: kind.parse::<FlowKind>()?,
        stage: row.get("stage"),
        reservation_id,
        underlying_tx: row.get("underlying_tx"),
        round_id: row.get::<Option<i64>, _>("round_id").map(|r| r as u64),
        error: row.get("error"),
        updated_at: row.get::<DateTime<Utc>, _>("updated_at"),
    })
}

#[async_trait]
impl FlowStore for StateManager {
    async fn save(&self, record: &FlowRecord) -> OrchestratorResult<()> {
        sqlx::query(
            r#"
            INSERT INTO flows
                (flow_id, kind, stage, reservation_id, underlying_tx, round_id, error, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (flow_id)
            DO UPDATE SET stage = $3, reservation_id = $4, underlying_tx = $5,
                          round_id = $6, error = $7, updated_at = $8
            "#,
        )
        .bind(record.flow_id)
        .bind(record.kind.as_str())
        .bind(&record.stage)
        .bind(record.reservation_id.map(|id| id.to_string()))
        .bind(&record.underlying_tx)
        .bind(record.round_id.map(|r| r as i64))
        .bind(&record.error)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        debug!("Saved flow {} at stage {}", record.flow_id, record.stage);
        Ok(())
    }

    async fn load(&self, flow_id: Uuid) -> OrchestratorResult<Option<FlowRecord>> {
        let row = sqlx::query(
            r#"
            SELECT flow_id, kind, stage, reservation_id, underlying_tx, round_id, error, updated_at
            FROM flows WHERE flow_id = $1
            "#,
        )
        .bind(flow_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn unfinished(&self) -> OrchestratorResult<Vec<FlowRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT flow_id, kind, stage, reservation_id, underlying_tx, round_id, error, updated_at
            FROM flows
            WHERE error IS NULL AND stage <> 'completed'
            ORDER BY updated_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }
}
