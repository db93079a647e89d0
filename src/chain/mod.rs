//! Chain module - Flare-side contract access
//!
//! This module provides:
//! - Multi-RPC provider management with automatic failover
//! - Registry name resolution
//! - Typed asset manager and wrapped-asset surfaces behind mockable traits

pub mod asset_manager;
pub mod contracts;
pub mod provider;
pub mod registry;

pub use asset_manager::{
    fasset_checked, AgentInfo, AgentPage, AgentRecord, AgentStatus, AssetManagerApi, AssetSettings,
    EthersAssetManager, EthersWrappedAsset, MintingReceipt, RedemptionReceipt, ReservationReceipt,
    ReservationRequest, TicketPage, WrappedAssetApi,
};
pub use provider::ChainProvider;
pub use registry::{resolve_checked, ContractRegistry, RegistryResolver};

use ethers::prelude::{Http, LocalWallet, Provider, SignerMiddleware};

/// Provider with the configured signing wallet attached
pub type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;
