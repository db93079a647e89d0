//! Redemption requests: approve the asset manager, then redeem whole lots

use super::format_units_exact;
use crate::chain::{AssetManagerApi, RedemptionReceipt, WrappedAssetApi};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::minting::value_uba;
use crate::underlying::require_classic_address;

use ethers::types::{Address, H256, U256};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedemptionPlan {
    pub lots: u64,
    pub amount_uba: U256,
    pub amount_display: String,
    pub destination: String,
    pub executor: Address,
    pub balance_uba: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedemptionOutcome {
    Redeemed {
        approval_tx: H256,
        receipt: RedemptionReceipt,
    },
    DryRun(RedemptionPlan),
}

pub struct RedemptionClient {
    asset_manager: Arc<dyn AssetManagerApi>,
    fasset: Arc<dyn WrappedAssetApi>,
    dry_run: bool,
}

impl RedemptionClient {
    pub fn new(
        asset_manager: Arc<dyn AssetManagerApi>,
        fasset: Arc<dyn WrappedAssetApi>,
        dry_run: bool,
    ) -> Self {
        Self {
            asset_manager,
            fasset,
            dry_run,
        }
    }

    /// Redeem `lots` to `destination`; a zero `executor` means none
    pub async fn redeem(
        &self,
        lots: u64,
        destination: &str,
        executor: Address,
    ) -> OrchestratorResult<RedemptionOutcome> {
        require_classic_address("redemption destination", destination)?;
        let settings = self.asset_manager.settings().await?;
        let amount = value_uba(lots, settings.lot_size_uba)?;

        let owner = self.asset_manager.account().ok_or_else(|| {
            OrchestratorError::Config("redemption needs a signing wallet".to_string())
        })?;
        let balance = self.fasset.balance_of(owner).await?;
        if balance < amount {
            return Err(OrchestratorError::InsufficientResource {
                resource: "FAsset balance".to_string(),
                have: balance.to_string(),
                need: amount.to_string(),
            });
        }

        let plan = RedemptionPlan {
            lots,
            amount_uba: amount,
            amount_display: format_units_exact(amount, settings.asset_decimals),
            destination: destination.to_string(),
            executor,
            balance_uba: balance,
        };
        if self.dry_run {
            info!("[dry run] approve and redeem skipped: {:?}", plan);
            return Ok(RedemptionOutcome::DryRun(plan));
        }

        let approval_tx = self.fasset.approve(self.asset_manager.address(), amount).await?;
        info!("Approved {} UBA for redemption in tx {:?}", amount, approval_tx);

        let receipt = self
            .asset_manager
            .redeem(lots, destination.to_string(), executor)
            .await?;
        info!(
            "Redeemed {} lots ({}) to {} in tx {:?}, {} agent tickets",
            lots,
            plan.amount_display,
            destination,
            receipt.tx_hash,
            receipt.requests.len()
        );
        Ok(RedemptionOutcome::Redeemed {
            approval_tx,
            receipt,
        })
    }
}
