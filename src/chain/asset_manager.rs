//! Typed asset manager and wrapped-asset surfaces
//!
//! The traits are the seams the flows are written against; the `Ethers*`
//! types implement them over the abigen bindings.

use super::contracts::{self, AssetManager, WrappedAsset};
use super::provider::ChainProvider;
use super::registry::ensure_nonzero;
use crate::attestation::AttestationProof;
use crate::config::RetryConfig;
use crate::error::{bounded, OrchestratorError, OrchestratorResult};
use crate::events::{EventParser, MintedAmounts, RedemptionTicketRequest, ReservedCollateral};
use crate::tx::{contract_error, TransactionSender};

use async_trait::async_trait;
use ethers::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Live agent status as reported by `getAgentInfo`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentStatus {
    Healthy,
    Degraded,
    FullLiquidation,
    Closing,
    Destroyed,
}

impl TryFrom<u8> for AgentStatus {
    type Error = OrchestratorError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(AgentStatus::Healthy),
            1 => Ok(AgentStatus::Degraded),
            2 => Ok(AgentStatus::FullLiquidation),
            3 => Ok(AgentStatus::Closing),
            4 => Ok(AgentStatus::Destroyed),
            other => Err(OrchestratorError::Validation(format!(
                "unknown agent status code {}",
                other
            ))),
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AgentStatus::Healthy => "healthy",
            AgentStatus::Degraded => "degraded",
            AgentStatus::FullLiquidation => "full_liquidation",
            AgentStatus::Closing => "closing",
            AgentStatus::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}

/// Settings subset the flows depend on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSettings {
    /// One lot in the asset's base units
    pub lot_size_uba: U256,
    pub asset_decimals: u8,
    pub max_redeemed_tickets: u64,
}

/// One entry of the available-agents list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub vault: Address,
    pub fee_bips: U256,
    pub free_collateral_lots: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentPage {
    pub agents: Vec<AgentRecord>,
    pub total_length: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentInfo {
    pub status: AgentStatus,
    pub fee_bips: U256,
}

/// Arguments of a `reserveCollateral` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationRequest {
    pub agent_vault: Address,
    pub lots: u64,
    pub max_minting_fee_bips: U256,
    pub executor: Address,
    /// Payable value, the quoted reservation fee
    pub reservation_fee: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationReceipt {
    pub tx_hash: H256,
    pub reserved: ReservedCollateral,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintingReceipt {
    pub tx_hash: H256,
    pub minted: Option<MintedAmounts>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedemptionReceipt {
    pub tx_hash: H256,
    pub requests: Vec<RedemptionTicketRequest>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketPage {
    pub tickets: Vec<U256>,
    pub total_length: u64,
}

/// Asset manager surface
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AssetManagerApi: Send + Sync {
    fn address(&self) -> Address;

    /// Signing account, if a wallet is attached
    fn account(&self) -> Option<Address>;

    async fn settings(&self) -> OrchestratorResult<AssetSettings>;

    async fn fasset(&self) -> OrchestratorResult<Address>;

    async fn asset_minting_decimals(&self) -> OrchestratorResult<u32>;

    /// Agents in `[start, end)` plus the total list length
    async fn available_agents(&self, start: u64, end: u64) -> OrchestratorResult<AgentPage>;

    async fn agent_info(&self, vault: Address) -> OrchestratorResult<AgentInfo>;

    async fn collateral_reservation_fee(&self, lots: u64) -> OrchestratorResult<U256>;

    /// Native balance of the signing account
    async fn native_balance(&self) -> OrchestratorResult<U256>;

    async fn reserve_collateral(
        &self,
        request: ReservationRequest,
    ) -> OrchestratorResult<ReservationReceipt>;

    async fn execute_minting(
        &self,
        proof: AttestationProof,
        reservation_id: U256,
    ) -> OrchestratorResult<MintingReceipt>;

    async fn redeem(
        &self,
        lots: u64,
        destination: String,
        executor: Address,
    ) -> OrchestratorResult<RedemptionReceipt>;

    /// Redemption tickets in `[start, end)` plus the total queue length
    async fn redemption_queue(&self, start: u64, end: u64) -> OrchestratorResult<TicketPage>;

    /// Recover the reservation emitted by an already-mined transaction
    async fn reservation_from_tx(&self, tx_hash: H256) -> OrchestratorResult<ReservedCollateral>;
}

/// Wrapped-asset (FXRP) ERC-20 surface
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WrappedAssetApi: Send + Sync {
    fn address(&self) -> Address;

    async fn balance_of(&self, owner: Address) -> OrchestratorResult<U256>;

    /// Approve `spender` and wait for the approval to confirm
    async fn approve(&self, spender: Address, amount: U256) -> OrchestratorResult<H256>;
}

/// FAsset token address read from the asset manager, never zero
pub async fn fasset_checked(asset_manager: &dyn AssetManagerApi) -> OrchestratorResult<Address> {
    ensure_nonzero("fAsset", asset_manager.fasset().await?)
}

/// Narrow a U256 read from chain into u64
pub fn to_u64(field: &str, value: U256) -> OrchestratorResult<u64> {
    if value > U256::from(u64::MAX) {
        return Err(OrchestratorError::Validation(format!(
            "{} = {} does not fit in 64 bits",
            field, value
        )));
    }
    Ok(value.as_u64())
}

/// `getSettings` fields as abigen decodes them: lot size, asset decimals, max redeemed tickets
pub type RawSettings = (u64, u8, U256);

/// `getAvailableAgentsDetailedList` entry: vault, fee, free collateral lots
pub type RawAgent = (Address, U256, U256);

impl TryFrom<RawSettings> for AssetSettings {
    type Error = OrchestratorError;

    fn try_from(raw: RawSettings) -> Result<Self, Self::Error> {
        let (lot_size_amg, asset_decimals, max_redeemed_tickets) = raw;
        Ok(Self {
            lot_size_uba: U256::from(lot_size_amg),
            asset_decimals,
            max_redeemed_tickets: to_u64("maxRedeemedTickets", max_redeemed_tickets)?,
        })
    }
}

impl From<RawAgent> for AgentRecord {
    fn from((vault, fee_bips, free_collateral_lots): RawAgent) -> Self {
        Self {
            vault,
            fee_bips,
            free_collateral_lots,
        }
    }
}

/// Asset manager client over an ethers middleware
pub struct EthersAssetManager<M> {
    contract: AssetManager<M>,
    client: Arc<M>,
    sender: TransactionSender,
    events: EventParser,
    chain_id: u64,
    call_timeout: Duration,
}

impl<M: Middleware + 'static> EthersAssetManager<M> {
    pub fn new(address: Address, client: Arc<M>, provider: &ChainProvider, retry: RetryConfig) -> Self {
        Self {
            contract: AssetManager::new(address, client.clone()),
            client,
            sender: TransactionSender::new(
                provider.chain_id(),
                provider.confirmation_blocks(),
                provider.call_timeout(),
                retry,
            ),
            events: EventParser::new(address),
            chain_id: provider.chain_id(),
            call_timeout: provider.call_timeout(),
        }
    }

    fn map_err(&self, operation: &str, e: ContractError<M>) -> OrchestratorError {
        contract_error(self.chain_id, operation, e)
    }

    fn require_account(&self) -> OrchestratorResult<Address> {
        self.client.default_sender().ok_or_else(|| {
            OrchestratorError::Config("no signing wallet attached to the chain client".to_string())
        })
    }
}

#[async_trait]
impl<M: Middleware + 'static> AssetManagerApi for EthersAssetManager<M> {
    fn address(&self) -> Address {
        self.contract.address()
    }

    fn account(&self) -> Option<Address> {
        self.client.default_sender()
    }

    async fn settings(&self) -> OrchestratorResult<AssetSettings> {
        let raw = bounded("getSettings", self.call_timeout, async {
            self.contract
                .get_settings()
                .call()
                .await
                .map_err(|e| self.map_err("getSettings", e))
        })
        .await?;
        AssetSettings::try_from(raw)
    }

    async fn fasset(&self) -> OrchestratorResult<Address> {
        bounded("fAsset", self.call_timeout, async {
            self.contract
                .f_asset()
                .call()
                .await
                .map_err(|e| self.map_err("fAsset", e))
        })
        .await
    }

    async fn asset_minting_decimals(&self) -> OrchestratorResult<u32> {
        let decimals = bounded("assetMintingDecimals", self.call_timeout, async {
            self.contract
                .asset_minting_decimals()
                .call()
                .await
                .map_err(|e| self.map_err("assetMintingDecimals", e))
        })
        .await?;
        let decimals = to_u64("assetMintingDecimals", decimals)?;
        u32::try_from(decimals).map_err(|_| {
            OrchestratorError::Validation(format!("assetMintingDecimals = {} out of range", decimals))
        })
    }

    async fn available_agents(&self, start: u64, end: u64) -> OrchestratorResult<AgentPage> {
        let (agents, total) = bounded("getAvailableAgentsDetailedList", self.call_timeout, async {
            self.contract
                .get_available_agents_detailed_list(start.into(), end.into())
                .call()
                .await
                .map_err(|e| self.map_err("getAvailableAgentsDetailedList", e))
        })
        .await?;

        debug!("Agents page [{}, {}): {} entries of {}", start, end, agents.len(), total);
        Ok(AgentPage {
            agents: agents.into_iter().map(AgentRecord::from).collect(),
            total_length: to_u64("agents total length", total)?,
        })
    }

    async fn agent_info(&self, vault: Address) -> OrchestratorResult<AgentInfo> {
        let info = bounded("getAgentInfo", self.call_timeout, async {
            self.contract
                .get_agent_info(vault)
                .call()
                .await
                .map_err(|e| self.map_err("getAgentInfo", e))
        })
        .await?;

        let (status, fee_bips) = info;
        Ok(AgentInfo {
            status: AgentStatus::try_from(status)?,
            fee_bips,
        })
    }

    async fn collateral_reservation_fee(&self, lots: u64) -> OrchestratorResult<U256> {
        bounded("collateralReservationFee", self.call_timeout, async {
            self.contract
                .collateral_reservation_fee(lots.into())
                .call()
                .await
                .map_err(|e| self.map_err("collateralReservationFee", e))
        })
        .await
    }

    async fn native_balance(&self) -> OrchestratorResult<U256> {
        let account = self.require_account()?;
        bounded("getBalance", self.call_timeout, async {
            self.client
                .get_balance(account, None)
                .await
                .map_err(|e| OrchestratorError::ChainConnection {
                    chain_id: self.chain_id,
                    message: e.to_string(),
                })
        })
        .await
    }

    async fn reserve_collateral(
        &self,
        request: ReservationRequest,
    ) -> OrchestratorResult<ReservationReceipt> {
        let call = self
            .contract
            .reserve_collateral(
                request.agent_vault,
                request.lots.into(),
                request.max_minting_fee_bips,
                request.executor,
            )
            .value(request.reservation_fee);

        let receipt = self.sender.send("reserveCollateral", self.client.as_ref(), call).await?;
        let reserved = self.events.collateral_reserved(&receipt)?;
        Ok(ReservationReceipt {
            tx_hash: receipt.transaction_hash,
            reserved,
        })
    }

    async fn execute_minting(
        &self,
        proof: AttestationProof,
        reservation_id: U256,
    ) -> OrchestratorResult<MintingReceipt> {
        let call = self.contract.execute_minting(
            contracts::Proof {
                merkle_proof: proof.merkle_proof,
                data: proof.response,
            },
            reservation_id,
        );

        let receipt = self.sender.send("executeMinting", self.client.as_ref(), call).await?;
        Ok(MintingReceipt {
            tx_hash: receipt.transaction_hash,
            minted: self.events.minting_executed(&receipt),
        })
    }

    async fn redeem(
        &self,
        lots: u64,
        destination: String,
        executor: Address,
    ) -> OrchestratorResult<RedemptionReceipt> {
        let call = self.contract.redeem(lots.into(), destination, executor);

        let receipt = self.sender.send("redeem", self.client.as_ref(), call).await?;
        Ok(RedemptionReceipt {
            tx_hash: receipt.transaction_hash,
            requests: self.events.redemption_requests(&receipt),
        })
    }

    async fn redemption_queue(&self, start: u64, end: u64) -> OrchestratorResult<TicketPage> {
        let (tickets, total) = bounded("redemptionQueue", self.call_timeout, async {
            self.contract
                .redemption_queue(start.into(), end.into())
                .call()
                .await
                .map_err(|e| self.map_err("redemptionQueue", e))
        })
        .await?;

        Ok(TicketPage {
            tickets: tickets.into_iter().map(|value_uba| value_uba).collect(),
            total_length: to_u64("redemption queue length", total)?,
        })
    }

    async fn reservation_from_tx(&self, tx_hash: H256) -> OrchestratorResult<ReservedCollateral> {
        let receipt = bounded("getTransactionReceipt", self.call_timeout, async {
            self.client
                .get_transaction_receipt(tx_hash)
                .await
                .map_err(|e| OrchestratorError::ChainConnection {
                    chain_id: self.chain_id,
                    message: e.to_string(),
                })
        })
        .await?
        .ok_or_else(|| OrchestratorError::Validation(format!("no receipt for tx {:?}", tx_hash)))?;

        self.events.collateral_reserved(&receipt)
    }
}

/// ERC-20 client for the wrapped asset
pub struct EthersWrappedAsset<M> {
    contract: WrappedAsset<M>,
    client: Arc<M>,
    sender: TransactionSender,
    chain_id: u64,
    call_timeout: Duration,
}

impl<M: Middleware + 'static> EthersWrappedAsset<M> {
    pub fn new(address: Address, client: Arc<M>, provider: &ChainProvider, retry: RetryConfig) -> Self {
        Self {
            contract: WrappedAsset::new(address, client.clone()),
            client,
            sender: TransactionSender::new(
                provider.chain_id(),
                provider.confirmation_blocks(),
                provider.call_timeout(),
                retry,
            ),
            chain_id: provider.chain_id(),
            call_timeout: provider.call_timeout(),
        }
    }
}

#[async_trait]
impl<M: Middleware + 'static> WrappedAssetApi for EthersWrappedAsset<M> {
    fn address(&self) -> Address {
        self.contract.address()
    }

    async fn balance_of(&self, owner: Address) -> OrchestratorResult<U256> {
        bounded("balanceOf", self.call_timeout, async {
            self.contract
                .balance_of(owner)
                .call()
                .await
                .map_err(|e| contract_error(self.chain_id, "balanceOf", e))
        })
        .await
    }

    async fn approve(&self, spender: Address, amount: U256) -> OrchestratorResult<H256> {
        let call = self.contract.approve(spender, amount);
        let receipt = self.sender.send("approve", self.client.as_ref(), call).await?;
        Ok(receipt.transaction_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_status_codes() {
        assert_eq!(AgentStatus::try_from(0).unwrap(), AgentStatus::Healthy);
        assert_eq!(AgentStatus::try_from(1).unwrap(), AgentStatus::Degraded);
        assert_eq!(AgentStatus::try_from(2).unwrap(), AgentStatus::FullLiquidation);
        assert_eq!(AgentStatus::try_from(3).unwrap(), AgentStatus::Closing);
        assert_eq!(AgentStatus::try_from(4).unwrap(), AgentStatus::Destroyed);
        assert!(matches!(
            AgentStatus::try_from(5),
            Err(OrchestratorError::Validation(_))
        ));
    }

    #[test]
    fn test_settings_conversion() {
        let settings = AssetSettings::try_from((10_000_000u64, 6u8, U256::from(20u64))).unwrap();
        assert_eq!(settings.lot_size_uba, U256::from(10_000_000u64));
        assert_eq!(settings.asset_decimals, 6);
        assert_eq!(settings.max_redeemed_tickets, 20);
    }

    #[test]
    fn test_settings_reject_oversized_ticket_limit() {
        let raw = (10_000_000u64, 6u8, U256::from(u64::MAX) + 1);
        assert!(matches!(
            AssetSettings::try_from(raw),
            Err(OrchestratorError::Validation(_))
        ));
    }

    #[test]
    fn test_agent_record_from_list_entry() {
        let vault = Address::from_low_u64_be(7);
        let record = AgentRecord::from((vault, U256::from(25u64), U256::from(40u64)));
        assert_eq!(record.vault, vault);
        assert_eq!(record.fee_bips, U256::from(25u64));
        assert_eq!(record.free_collateral_lots, U256::from(40u64));
    }

    #[tokio::test]
    async fn test_zero_fasset_address_is_rejected() {
        let mut mock = MockAssetManagerApi::new();
        mock.expect_fasset().times(1).returning(|| Ok(Address::zero()));
        assert!(matches!(
            fasset_checked(&mock).await,
            Err(OrchestratorError::Validation(_))
        ));

        let mut mock = MockAssetManagerApi::new();
        let token = Address::from_low_u64_be(0xf4);
        mock.expect_fasset().returning(move || Ok(token));
        assert_eq!(fasset_checked(&mock).await.unwrap(), token);
    }

    #[test]
    fn test_to_u64_rejects_overflow() {
        assert_eq!(to_u64("x", U256::from(42u64)).unwrap(), 42);
        assert!(to_u64("x", U256::from(u64::MAX) + 1).is_err());
    }
}
