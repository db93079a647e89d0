//! Collateral reservation: the first on-chain step of a mint

use super::PaymentReference;
use crate::agents::AgentCandidate;
use crate::chain::{AgentStatus, AssetManagerApi, ReservationRequest};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::events::ReservedCollateral;
use crate::underlying::require_classic_address;

use ethers::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// A confirmed reservation, with everything the payment step needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralReservation {
    pub reservation_id: U256,
    pub agent_vault: Address,
    pub lots: u64,
    /// NAT paid to reserve, forfeited if the mint is abandoned
    pub reservation_fee: U256,
    pub value_uba: U256,
    pub minting_fee_uba: U256,
    pub payment_address: String,
    pub payment_reference: PaymentReference,
    pub last_underlying_block: U256,
    pub last_underlying_timestamp: U256,
    pub tx_hash: H256,
}

impl CollateralReservation {
    /// Build from a `CollateralReserved` event, checking the reference and lot count
    pub fn from_event(
        reserved: ReservedCollateral,
        lot_size: U256,
        reservation_fee: U256,
        tx_hash: H256,
    ) -> OrchestratorResult<Self> {
        if lot_size.is_zero() {
            return Err(OrchestratorError::Validation("lot size is zero".to_string()));
        }
        if !(reserved.value_uba % lot_size).is_zero() {
            return Err(OrchestratorError::Validation(format!(
                "reserved value {} is not a whole number of {}-unit lots",
                reserved.value_uba, lot_size
            )));
        }
        let lots = crate::chain::asset_manager::to_u64("reserved lots", reserved.value_uba / lot_size)?;

        let reference = PaymentReference::minting(reserved.reservation_id)?;
        if reference.as_bytes() != &reserved.payment_reference {
            return Err(OrchestratorError::Validation(format!(
                "event payment reference 0x{} does not match {} derived from reservation {}",
                hex::encode(reserved.payment_reference),
                reference,
                reserved.reservation_id
            )));
        }
        require_classic_address("payment address", &reserved.payment_address)?;

        Ok(Self {
            reservation_id: reserved.reservation_id,
            agent_vault: reserved.agent_vault,
            lots,
            reservation_fee,
            value_uba: reserved.value_uba,
            minting_fee_uba: reserved.fee_uba,
            payment_address: reserved.payment_address,
            payment_reference: reference,
            last_underlying_block: reserved.last_underlying_block,
            last_underlying_timestamp: reserved.last_underlying_timestamp,
            tx_hash,
        })
    }

    /// Total the minter must pay on the underlying ledger, in base units
    pub fn underlying_amount_uba(&self) -> U256 {
        self.value_uba.saturating_add(self.minting_fee_uba)
    }
}

/// Value of `lots` lots in base units
pub fn value_uba(lots: u64, lot_size: U256) -> OrchestratorResult<U256> {
    if lots == 0 || lot_size.is_zero() {
        return Err(OrchestratorError::Validation(format!(
            "cannot value {} lots of size {}",
            lots, lot_size
        )));
    }
    lot_size
        .checked_mul(U256::from(lots))
        .ok_or_else(|| OrchestratorError::Validation(format!("{} lots overflow", lots)))
}

pub struct CollateralReservationClient {
    asset_manager: Arc<dyn AssetManagerApi>,
}

impl CollateralReservationClient {
    pub fn new(asset_manager: Arc<dyn AssetManagerApi>) -> Self {
        Self { asset_manager }
    }

    pub async fn quote_fee(&self, lots: u64) -> OrchestratorResult<U256> {
        if lots == 0 {
            return Err(OrchestratorError::Validation("lots must be positive".to_string()));
        }
        self.asset_manager.collateral_reservation_fee(lots).await
    }

    /// Reserve `lots` with `agent`, paying the quoted fee
    pub async fn reserve(
        &self,
        agent: &AgentCandidate,
        lots: u64,
        executor: Address,
        lot_size: U256,
    ) -> OrchestratorResult<CollateralReservation> {
        let expected_value = value_uba(lots, lot_size)?;

        // Status may have changed since selection
        let info = self.asset_manager.agent_info(agent.vault).await?;
        if info.status != AgentStatus::Healthy {
            warn!("Agent {:?} became {} before reservation", agent.vault, info.status);
            return Err(OrchestratorError::NoCandidate { min_free_lots: lots });
        }

        let fee = self.quote_fee(lots).await?;
        let balance = self.asset_manager.native_balance().await?;
        if balance < fee {
            return Err(OrchestratorError::InsufficientResource {
                resource: "native balance for reservation fee".to_string(),
                have: balance.to_string(),
                need: fee.to_string(),
            });
        }

        info!(
            "Reserving {} lots with agent {:?} (fee {} wei, max minting fee {} bips)",
            lots, agent.vault, fee, info.fee_bips
        );
        let receipt = self
            .asset_manager
            .reserve_collateral(ReservationRequest {
                agent_vault: agent.vault,
                lots,
                max_minting_fee_bips: info.fee_bips,
                executor,
                reservation_fee: fee,
            })
            .await?;

        // The reservation is on chain from here on; failures must carry its id
        let reservation_id = receipt.reserved.reservation_id;
        let tx_hash = receipt.tx_hash;
        let rejected = |reason: String| OrchestratorError::ReservationRejected {
            reservation_id,
            tx_hash,
            reason,
        };
        let reservation =
            CollateralReservation::from_event(receipt.reserved, lot_size, fee, tx_hash)
                .map_err(|e| rejected(e.to_string()))?;
        if reservation.agent_vault != agent.vault || reservation.value_uba != expected_value {
            return Err(rejected(format!(
                "reserved {} UBA with {:?}, expected {} UBA with {:?}",
                reservation.value_uba, reservation.agent_vault, expected_value, agent.vault
            )));
        }

        info!(
            "Reserved collateral {} in tx {:?}: pay {} UBA to {} with reference {}",
            reservation.reservation_id,
            reservation.tx_hash,
            reservation.underlying_amount_uba(),
            reservation.payment_address,
            reservation.payment_reference
        );
        Ok(reservation)
    }
}
