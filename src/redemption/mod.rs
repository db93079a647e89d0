//! Redemption: burning wrapped assets for underlying payouts, and the queue read path

pub mod client;
pub mod queue;

pub use client::{RedemptionClient, RedemptionOutcome, RedemptionPlan};
pub use queue::{format_units_exact, QueueSummary, RedemptionQueueAggregator};
