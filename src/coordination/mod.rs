//! Mint orchestration
//!
//! Sequences agent selection, collateral reservation, the underlying payment,
//! attestation and proof submission, and reports where a failed mint stopped.

pub mod pipeline;
pub mod stage;

pub use pipeline::{MintPipeline, MintReport, MintRequest, MintServices, PipelineOptions};
pub use stage::{Checkpoint, FlowFailure, MintStage};
