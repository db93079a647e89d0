//! Chain provider with multi-RPC support and automatic failover

use crate::config::{require_secret, NetworkConfig};
use crate::error::{OrchestratorError, OrchestratorResult};

use super::SignerClient;

use ethers::prelude::*;
use ethers::providers::{Http, Provider};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Multi-provider wrapper with automatic failover
pub struct ChainProvider {
    /// Expected chain ID
    chain_id: u64,
    /// HTTP providers (multiple for failover)
    http_providers: Vec<Provider<Http>>,
    /// Current active provider index
    current_provider: AtomicUsize,
    /// Confirmations awaited for every submitted transaction
    confirmation_blocks: usize,
    /// Upper bound for a single RPC round-trip
    call_timeout: Duration,
}

impl ChainProvider {
    /// Create a new chain provider
    pub fn new(config: &NetworkConfig) -> OrchestratorResult<Self> {
        let mut http_providers = Vec::new();

        for url in &config.rpc_urls {
            match Provider::<Http>::try_from(url.as_str()) {
                Ok(provider) => {
                    let provider = provider.interval(Duration::from_millis(500));
                    http_providers.push(provider);
                    debug!("Added HTTP provider for chain {}: {}", config.chain_id, url);
                }
                Err(e) => {
                    warn!("Failed to create provider for {}: {}", url, e);
                }
            }
        }

        if http_providers.is_empty() {
            return Err(OrchestratorError::ChainConnection {
                chain_id: config.chain_id,
                message: "No valid RPC providers".to_string(),
            });
        }

        Ok(Self {
            chain_id: config.chain_id,
            http_providers,
            current_provider: AtomicUsize::new(0),
            confirmation_blocks: config
                .confirmation_blocks
                .unwrap_or_else(|| recommended_confirmations(config.chain_id)),
            call_timeout: Duration::from_secs(config.call_timeout_secs),
        })
    }

    /// Get the active HTTP provider
    pub fn http(&self) -> &Provider<Http> {
        let idx = self.current_provider.load(Ordering::Relaxed);
        &self.http_providers[idx % self.http_providers.len()]
    }

    /// Switch to next available provider
    pub fn failover(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.http_providers.len();
        self.current_provider.store(next, Ordering::Relaxed);
        warn!("Chain {} failover to provider {}", self.chain_id, next);
    }

    /// Find a provider that answers and serves the configured chain
    pub async fn connect(&self) -> OrchestratorResult<Arc<Provider<Http>>> {
        for _ in 0..self.http_providers.len() {
            let reported =
                tokio::time::timeout(self.call_timeout, self.http().get_chainid()).await;
            match reported {
                Ok(Ok(chain_id)) if chain_id.as_u64() == self.chain_id => {
                    info!("Connected to chain {}", self.chain_id);
                    return Ok(Arc::new(self.http().clone()));
                }
                Ok(Ok(chain_id)) => {
                    return Err(OrchestratorError::Config(format!(
                        "RPC reports chain id {}, expected {}",
                        chain_id, self.chain_id
                    )));
                }
                Ok(Err(e)) => warn!("Chain id query failed on chain {}: {}", self.chain_id, e),
                Err(_) => warn!("Chain id query timed out on chain {}", self.chain_id),
            }
            self.failover();
        }

        Err(OrchestratorError::ChainConnection {
            chain_id: self.chain_id,
            message: "All providers failed".to_string(),
        })
    }

    /// Connect and attach the signing wallet named by `private_key_env`
    pub async fn connect_signer(&self, private_key_env: &str) -> OrchestratorResult<Arc<SignerClient>> {
        let key = require_secret(private_key_env)?;
        let wallet = key
            .trim()
            .trim_start_matches("0x")
            .parse::<LocalWallet>()
            .map_err(|e| OrchestratorError::Config(format!("Invalid private key: {}", e)))?
            .with_chain_id(self.chain_id);

        let provider = self.connect().await?;
        info!("Signing with account {:?}", wallet.address());
        Ok(Arc::new(SignerMiddleware::new((*provider).clone(), wallet)))
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn confirmation_blocks(&self) -> usize {
        self.confirmation_blocks
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }
}

/// Get recommended confirmation blocks for a chain
///
/// Flare-family chains have single-slot finality, so one confirmation is
/// enough there.
pub fn recommended_confirmations(chain_id: u64) -> usize {
    match chain_id {
        // Flare, Songbird
        14 | 19 => 1,
        // Coston, Coston2
        16 | 114 => 1,
        // Default conservative
        _ => 12,
    }
}
