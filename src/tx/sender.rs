//! Transaction sender: simulate, estimate, send, then wait for confirmation

use super::gas::GasEstimator;
use crate::config::RetryConfig;
use crate::error::{OrchestratorError, OrchestratorResult};

use ethers::abi::Detokenize;
use ethers::contract::{ContractCall, ContractError};
use ethers::prelude::*;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Submits contract calls and returns their confirmed receipts.
///
/// Every call is simulated first so an on-chain rejection surfaces with its
/// revert reason before any gas or value is spent.
#[derive(Debug, Clone)]
pub struct TransactionSender {
    chain_id: u64,
    confirmations: usize,
    call_timeout: Duration,
    confirmation_timeout: Duration,
    gas_estimator: GasEstimator,
    retry: RetryConfig,
}

impl TransactionSender {
    pub fn new(
        chain_id: u64,
        confirmations: usize,
        call_timeout: Duration,
        retry: RetryConfig,
    ) -> Self {
        Self {
            chain_id,
            confirmations,
            call_timeout,
            confirmation_timeout: call_timeout * 10,
            gas_estimator: GasEstimator::new(),
            retry,
        }
    }

    /// Send a contract call through `client` and wait for its confirmed receipt
    pub async fn send<M, D>(
        &self,
        operation: &str,
        client: &M,
        call: ContractCall<M, D>,
    ) -> OrchestratorResult<TransactionReceipt>
    where
        M: Middleware + 'static,
        D: Detokenize,
    {
        // Simulate to surface the revert reason verbatim
        self.bounded(operation, call.call())
            .await?
            .map_err(|e| self.contract_error(operation, e))?;

        let estimate = self
            .bounded(operation, call.estimate_gas())
            .await?
            .map_err(|e| self.contract_error(operation, e))?;
        let gas_limit = self.gas_estimator.buffered_limit(estimate);
        let call = call.gas(gas_limit);

        self.ensure_funds(operation, client, &call, gas_limit).await?;

        let mut attempts = 0;
        let pending = loop {
            attempts += 1;
            match timeout(self.call_timeout, call.send()).await {
                Ok(Ok(pending)) => break pending,
                Ok(Err(e)) => {
                    let message = e.to_string();
                    if message.contains("insufficient funds") {
                        return Err(OrchestratorError::InsufficientResource {
                            resource: "native balance".to_string(),
                            have: "unknown".to_string(),
                            need: format!("gas for {}", operation),
                        });
                    }
                    if e.is_revert() || attempts >= self.retry.max_retries {
                        return Err(self.contract_error(operation, e));
                    }
                    warn!(
                        "Sending {} failed (attempt {}/{}): {}",
                        operation, attempts, self.retry.max_retries, message
                    );
                    tokio::time::sleep(Duration::from_millis(self.retry.retry_delay_ms)).await;
                }
                // The node may have accepted it; resending could duplicate the write
                Err(_) => {
                    return Err(OrchestratorError::Timeout {
                        operation: format!("sending {}", operation),
                    })
                }
            }
        };

        let tx_hash = pending.tx_hash();
        info!("{} sent: {:?}", operation, tx_hash);
        crate::metrics::record_tx_submitted(operation);

        let receipt = timeout(
            self.confirmation_timeout,
            pending.confirmations(self.confirmations),
        )
        .await
        .map_err(|_| OrchestratorError::Timeout {
            operation: format!("confirmation of {} tx {:?}", operation, tx_hash),
        })?
        .map_err(|e| OrchestratorError::ChainConnection {
            chain_id: self.chain_id,
            message: e.to_string(),
        })?
        .ok_or_else(|| OrchestratorError::ChainConnection {
            chain_id: self.chain_id,
            message: format!("{} tx {:?} dropped from mempool", operation, tx_hash),
        })?;

        if receipt.status != Some(1u64.into()) {
            crate::metrics::record_tx_reverted(operation);
            return Err(OrchestratorError::revert(
                operation,
                format!("tx {:?} mined with failure status", tx_hash),
            ));
        }

        debug!(
            "{} confirmed in block {:?} ({} confirmations)",
            operation, receipt.block_number, self.confirmations
        );
        Ok(receipt)
    }

    /// Fail before sending when the signer cannot cover gas plus payable value
    async fn ensure_funds<M, D>(
        &self,
        operation: &str,
        client: &M,
        call: &ContractCall<M, D>,
        gas_limit: U256,
    ) -> OrchestratorResult<()>
    where
        M: Middleware + 'static,
        D: Detokenize,
    {
        let Some(from) = client.default_sender() else {
            return Ok(());
        };
        let value = call.tx.value().copied().unwrap_or_default();

        let gas_price = self
            .bounded(operation, client.get_gas_price())
            .await?
            .map_err(|e| self.connection_error(e))?;
        let balance = self
            .bounded(operation, client.get_balance(from, None))
            .await?
            .map_err(|e| self.connection_error(e))?;

        let need = GasEstimator::calculate_cost(gas_limit, gas_price, value);
        if balance < need {
            return Err(OrchestratorError::InsufficientResource {
                resource: "native balance".to_string(),
                have: balance.to_string(),
                need: need.to_string(),
            });
        }
        Ok(())
    }

    async fn bounded<F: std::future::Future>(
        &self,
        operation: &str,
        fut: F,
    ) -> OrchestratorResult<F::Output> {
        timeout(self.call_timeout, fut)
            .await
            .map_err(|_| OrchestratorError::Timeout {
                operation: operation.to_string(),
            })
    }

    fn connection_error(&self, e: impl ToString) -> OrchestratorError {
        OrchestratorError::ChainConnection {
            chain_id: self.chain_id,
            message: e.to_string(),
        }
    }

    fn contract_error<M: Middleware>(&self, operation: &str, e: ContractError<M>) -> OrchestratorError {
        contract_error(self.chain_id, operation, e)
    }
}

/// Map a contract error, keeping revert reasons verbatim
pub fn contract_error<M: Middleware>(
    chain_id: u64,
    operation: &str,
    e: ContractError<M>,
) -> OrchestratorError {
    if e.is_revert() {
        let reason = e
            .decode_revert::<String>()
            .or_else(|| e.as_revert().map(|data| format!("0x{}", hex::encode(data))))
            .unwrap_or_else(|| e.to_string());
        crate::metrics::record_tx_reverted(operation);
        return OrchestratorError::revert(operation, reason);
    }
    OrchestratorError::ChainConnection {
        chain_id,
        message: format!("{}: {}", operation, e),
    }
}
