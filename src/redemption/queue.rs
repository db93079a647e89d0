//! Redemption queue totals
//!
//! Ticket values are summed in 512 bits so no page of 256-bit values can
//! overflow the accumulator.

use crate::chain::{AssetManagerApi, AssetSettings};
use crate::error::{OrchestratorError, OrchestratorResult};

use ethers::types::{U256, U512};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueSummary {
    pub ticket_count: usize,
    /// Queue length as reported by the contract, may exceed what was read
    pub reported_length: u64,
    pub total_uba: U512,
    pub total_lots: U512,
    /// `total_uba` scaled by the asset decimals, trailing zeros trimmed
    pub total_display: String,
}

pub struct RedemptionQueueAggregator {
    asset_manager: Arc<dyn AssetManagerApi>,
}

impl RedemptionQueueAggregator {
    pub fn new(asset_manager: Arc<dyn AssetManagerApi>) -> Self {
        Self { asset_manager }
    }

    /// Read up to `maxRedeemedTickets` tickets in one page and total them
    pub async fn aggregate(&self) -> OrchestratorResult<QueueSummary> {
        let settings = self.asset_manager.settings().await?;
        self.aggregate_with_page_size(&settings, settings.max_redeemed_tickets.max(1))
            .await
    }

    pub async fn aggregate_with_page_size(
        &self,
        settings: &AssetSettings,
        page_size: u64,
    ) -> OrchestratorResult<QueueSummary> {
        if settings.lot_size_uba.is_zero() {
            return Err(OrchestratorError::Validation("lot size is zero".to_string()));
        }
        if page_size == 0 {
            return Err(OrchestratorError::Validation("page size must be positive".to_string()));
        }

        let limit = settings.max_redeemed_tickets;
        let mut total = U512::zero();
        let mut ticket_count = 0usize;
        let mut reported_length = None;
        let mut start = 0u64;

        while start < limit {
            let end = (start + page_size).min(limit);
            let page = self.asset_manager.redemption_queue(start, end).await?;
            if *reported_length.get_or_insert(page.total_length) != page.total_length {
                return Err(OrchestratorError::Validation(
                    "redemption queue length changed while paging".to_string(),
                ));
            }
            let requested = (end - start) as usize;
            if page.tickets.len() > requested {
                return Err(OrchestratorError::Validation(format!(
                    "queue page [{}, {}) returned {} tickets",
                    start,
                    end,
                    page.tickets.len()
                )));
            }

            total = total + sum_tickets(&page.tickets);
            ticket_count += page.tickets.len();

            if page.tickets.len() < requested {
                break;
            }
            start = end;
        }

        let summary = summarize(total, ticket_count, reported_length.unwrap_or(0), settings);
        debug!(
            "Redemption queue: {} tickets, {} UBA, {} lots",
            summary.ticket_count, summary.total_uba, summary.total_lots
        );
        Ok(summary)
    }
}

fn summarize(
    total: U512,
    ticket_count: usize,
    reported_length: u64,
    settings: &AssetSettings,
) -> QueueSummary {
    QueueSummary {
        ticket_count,
        reported_length,
        total_uba: total,
        total_lots: total / U512::from(settings.lot_size_uba),
        total_display: format_units_exact(total, settings.asset_decimals),
    }
}

/// Exact decimal rendering of `value / 10^decimals`
pub fn format_units_exact<T: ToString>(value: T, decimals: u8) -> String {
    let digits = value.to_string();
    let decimals = decimals as usize;
    if decimals == 0 {
        return digits;
    }

    let padded = format!("{:0>width$}", digits, width = decimals + 1);
    let (int_part, frac_part) = padded.split_at(padded.len() - decimals);
    let frac_part = frac_part.trim_end_matches('0');
    if frac_part.is_empty() {
        int_part.to_string()
    } else {
        format!("{}.{}", int_part, frac_part)
    }
}

/// Sum a slice of ticket values without overflow
pub fn sum_tickets(values: &[U256]) -> U512 {
    values.iter().fold(U512::zero(), |acc, v| acc + U512::from(*v))
}
