//! FAssets orchestrator
//!
//! Turns "mint N lots" and "redeem M lots" into the sequence of Flare
//! contract calls, XRP Ledger payments and FDC attestation requests the
//! protocol needs, failing closed at every network boundary.

pub mod agents;
pub mod attestation;
pub mod chain;
pub mod cli;
pub mod config;
pub mod coordination;
pub mod error;
pub mod events;
pub mod metrics;
pub mod minting;
pub mod redemption;
pub mod state;
pub mod tx;
pub mod underlying;

pub use error::{OrchestratorError, OrchestratorResult};
