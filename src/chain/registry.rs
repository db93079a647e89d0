//! Name → address resolution through the Flare contract registry

use super::contracts::FlareContractRegistry;
use crate::error::{bounded, OrchestratorError, OrchestratorResult};

use async_trait::async_trait;
use ethers::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Registry lookup surface.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContractRegistry: Send + Sync {
    /// Returns the raw address registered under `name`.
    async fn address_by_name(&self, name: &str) -> OrchestratorResult<Address>;
}

/// Resolves `name` and rejects a zero address.
///
/// This is a checked version of [`ContractRegistry::address_by_name`]; the
/// registry is untrusted input and unknown names come back as zero.
pub async fn resolve_checked(
    registry: &impl ContractRegistry,
    name: &str,
) -> OrchestratorResult<Address> {
    let address = registry.address_by_name(name).await?;
    ensure_nonzero(name, address)
}

/// Reject the zero address returned for unknown contracts
pub fn ensure_nonzero(what: &str, address: Address) -> OrchestratorResult<Address> {
    if address.is_zero() {
        return Err(OrchestratorError::Validation(format!(
            "{} resolved to the zero address",
            what
        )));
    }
    Ok(address)
}

/// On-chain registry client
pub struct RegistryResolver<M> {
    contract: FlareContractRegistry<M>,
    call_timeout: Duration,
}

impl<M: Middleware + 'static> RegistryResolver<M> {
    pub fn new(address: Address, client: Arc<M>, call_timeout: Duration) -> Self {
        Self {
            contract: FlareContractRegistry::new(address, client),
            call_timeout,
        }
    }
}

#[async_trait]
impl<M: Middleware + 'static> ContractRegistry for RegistryResolver<M> {
    async fn address_by_name(&self, name: &str) -> OrchestratorResult<Address> {
        let address = bounded("getContractAddressByName", self.call_timeout, async {
            self.contract
                .get_contract_address_by_name(name.to_string())
                .call()
                .await
                .map_err(|e| OrchestratorError::transient("registry", e))
        })
        .await?;
        debug!("Registry: {} -> {:?}", name, address);
        Ok(address)
    }
}
