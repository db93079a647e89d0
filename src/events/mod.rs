//! Asset manager event types and receipt parsing
//!
//! The reservation id, the minted amounts and the redemption request ids are
//! only reported through events, so every write path decodes its receipt here.

use crate::chain::contracts::{
    CollateralReservedFilter, MintingExecutedFilter, RedemptionRequestedFilter,
};
use crate::error::{OrchestratorError, OrchestratorResult};

use ethers::abi::RawLog;
use ethers::contract::EthEvent;
use ethers::prelude::*;
use serde::{Deserialize, Serialize};

/// A collateral reservation as reported by `CollateralReserved`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservedCollateral {
    pub reservation_id: U256,
    pub agent_vault: Address,
    pub minter: Address,
    pub value_uba: U256,
    pub fee_uba: U256,
    pub last_underlying_block: U256,
    pub last_underlying_timestamp: U256,
    pub payment_address: String,
    pub payment_reference: [u8; 32],
    pub executor: Address,
}

/// Amounts reported by `MintingExecuted`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintedAmounts {
    pub reservation_id: U256,
    pub minted_uba: U256,
    pub agent_fee_uba: U256,
    pub pool_fee_uba: U256,
}

/// One agent-side payout obligation created by `redeem`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionTicketRequest {
    pub request_id: U256,
    pub agent_vault: Address,
    pub payment_address: String,
    pub value_uba: U256,
    pub fee_uba: U256,
    pub payment_reference: [u8; 32],
}

/// Events emitted by the asset manager that the orchestrator acts on
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AssetManagerEvent {
    CollateralReserved(ReservedCollateral),
    MintingExecuted(MintedAmounts),
    RedemptionRequested(RedemptionTicketRequest),
    Unknown { topic: H256 },
}

impl AssetManagerEvent {
    /// Get event name for metrics and logs
    pub fn name(&self) -> &'static str {
        match self {
            AssetManagerEvent::CollateralReserved(_) => "collateral_reserved",
            AssetManagerEvent::MintingExecuted(_) => "minting_executed",
            AssetManagerEvent::RedemptionRequested(_) => "redemption_requested",
            AssetManagerEvent::Unknown { .. } => "unknown",
        }
    }
}

/// Event parser bound to one asset manager address
pub struct EventParser {
    contract_address: Address,
}

impl EventParser {
    pub fn new(contract_address: Address) -> Self {
        Self { contract_address }
    }

    /// Parse a log entry into an AssetManagerEvent
    pub fn parse_log(&self, log: &Log) -> AssetManagerEvent {
        let raw = RawLog {
            topics: log.topics.clone(),
            data: log.data.to_vec(),
        };

        if let Ok(e) = <CollateralReservedFilter as EthEvent>::decode_log(&raw) {
            return AssetManagerEvent::CollateralReserved(ReservedCollateral {
                reservation_id: e.collateral_reservation_id,
                agent_vault: e.agent_vault,
                minter: e.minter,
                value_uba: e.value_uba,
                fee_uba: e.fee_uba,
                last_underlying_block: e.last_underlying_block,
                last_underlying_timestamp: e.last_underlying_timestamp,
                payment_address: e.payment_address,
                payment_reference: e.payment_reference,
                executor: e.executor,
            });
        }
        if let Ok(e) = <MintingExecutedFilter as EthEvent>::decode_log(&raw) {
            return AssetManagerEvent::MintingExecuted(MintedAmounts {
                reservation_id: e.collateral_reservation_id,
                minted_uba: e.minted_amount_uba,
                agent_fee_uba: e.agent_fee_uba,
                pool_fee_uba: e.pool_fee_uba,
            });
        }
        if let Ok(e) = <RedemptionRequestedFilter as EthEvent>::decode_log(&raw) {
            return AssetManagerEvent::RedemptionRequested(RedemptionTicketRequest {
                request_id: e.request_id,
                agent_vault: e.agent_vault,
                payment_address: e.payment_address,
                value_uba: e.value_uba,
                fee_uba: e.fee_uba,
                payment_reference: e.payment_reference,
            });
        }

        AssetManagerEvent::Unknown {
            topic: log.topics.first().copied().unwrap_or_default(),
        }
    }

    /// Parse every asset manager log of a receipt, in log order
    pub fn parse_receipt(&self, receipt: &TransactionReceipt) -> Vec<AssetManagerEvent> {
        receipt
            .logs
            .iter()
            .filter(|log| log.address == self.contract_address)
            .map(|log| self.parse_log(log))
            .collect()
    }

    /// Extract the single reservation a `reserveCollateral` receipt must carry
    pub fn collateral_reserved(
        &self,
        receipt: &TransactionReceipt,
    ) -> OrchestratorResult<ReservedCollateral> {
        let mut reserved = self
            .parse_receipt(receipt)
            .into_iter()
            .filter_map(|event| match event {
                AssetManagerEvent::CollateralReserved(r) => Some(r),
                _ => None,
            });

        let first = reserved.next().ok_or_else(|| {
            OrchestratorError::Validation(format!(
                "no CollateralReserved event in tx {:?}",
                receipt.transaction_hash
            ))
        })?;
        if reserved.next().is_some() {
            return Err(OrchestratorError::Validation(format!(
                "multiple CollateralReserved events in tx {:?}",
                receipt.transaction_hash
            )));
        }
        Ok(first)
    }

    pub fn minting_executed(&self, receipt: &TransactionReceipt) -> Option<MintedAmounts> {
        self.parse_receipt(receipt)
            .into_iter()
            .find_map(|event| match event {
                AssetManagerEvent::MintingExecuted(m) => Some(m),
                _ => None,
            })
    }

    pub fn redemption_requests(&self, receipt: &TransactionReceipt) -> Vec<RedemptionTicketRequest> {
        self.parse_receipt(receipt)
            .into_iter()
            .filter_map(|event| match event {
                AssetManagerEvent::RedemptionRequested(r) => Some(r),
                _ => None,
            })
            .collect()
    }
}
