//! Proof submission through `executeMinting`

use crate::attestation::AttestationProof;
use crate::chain::{AssetManagerApi, MintingReceipt};
use crate::error::OrchestratorResult;

use ethers::types::U256;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// What `executeMinting` would be called with
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MintPlan {
    pub reservation_id: U256,
    pub round_id: u64,
    pub merkle_nodes: usize,
    pub response_bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MintOutcome {
    Executed(MintingReceipt),
    DryRun(MintPlan),
}

pub struct MintExecutor {
    asset_manager: Arc<dyn AssetManagerApi>,
    dry_run: bool,
}

impl MintExecutor {
    pub fn new(asset_manager: Arc<dyn AssetManagerApi>, dry_run: bool) -> Self {
        Self {
            asset_manager,
            dry_run,
        }
    }

    /// Submit the proof for a reservation. Reverts surface verbatim and are not retried.
    pub async fn execute(
        &self,
        reservation_id: U256,
        proof: AttestationProof,
    ) -> OrchestratorResult<MintOutcome> {
        let plan = MintPlan {
            reservation_id,
            round_id: proof.round_id,
            merkle_nodes: proof.merkle_proof.len(),
            response_bytes: proof.response.len(),
        };

        if self.dry_run {
            info!("[dry run] executeMinting skipped: {:?}", plan);
            return Ok(MintOutcome::DryRun(plan));
        }

        let receipt = self.asset_manager.execute_minting(proof, reservation_id).await?;
        match &receipt.minted {
            Some(minted) => info!(
                "Minted {} UBA for reservation {} in tx {:?}",
                minted.minted_uba, reservation_id, receipt.tx_hash
            ),
            None => info!(
                "executeMinting for reservation {} confirmed in tx {:?}",
                reservation_id, receipt.tx_hash
            ),
        }
        Ok(MintOutcome::Executed(receipt))
    }
}
