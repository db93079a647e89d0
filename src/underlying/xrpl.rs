//! XRPL JSON-RPC client
//!
//! Payments are autofilled here (sequence, fee, `LastLedgerSequence`), signed
//! with the local wallet and submitted as a blob. The node never sees the seed.

use super::codec::{decode_classic_address, PaymentFields};
use super::wallet::XrplWallet;
use super::{PaymentInstruction, SubmittedPayment, UnderlyingLedger, UnderlyingPaymentReceipt};
use crate::config::{require_secret, UnderlyingConfig};
use crate::error::{OrchestratorError, OrchestratorResult};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// Seconds between the unix epoch and the ripple epoch (2000-01-01)
pub const RIPPLE_EPOCH_OFFSET: u64 = 946_684_800;

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    result: Value,
}

#[derive(Debug, Deserialize)]
struct AccountInfoResult {
    account_data: AccountData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AccountData {
    sequence: u32,
}

#[derive(Debug, Deserialize)]
struct FeeResult {
    drops: FeeDrops,
    ledger_current_index: u64,
}

#[derive(Debug, Deserialize)]
struct FeeDrops {
    base_fee: String,
    open_ledger_fee: String,
}

#[derive(Debug, Deserialize)]
struct SubmitResult {
    engine_result: String,
    #[serde(default)]
    engine_result_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TxResult {
    #[serde(default)]
    validated: bool,
    #[serde(default)]
    ledger_index: Option<u64>,
    #[serde(default)]
    date: Option<u64>,
    #[serde(default)]
    meta: Option<TxMeta>,
}

#[derive(Debug, Deserialize)]
struct TxMeta {
    #[serde(rename = "TransactionResult")]
    transaction_result: String,
}

#[derive(Debug, Deserialize)]
struct LedgerResult {
    ledger_index: u64,
}

/// Outcome of a `tx` lookup while waiting for validation
#[derive(Debug, PartialEq, Eq)]
enum TxLookup {
    NotFound,
    Unvalidated,
    Validated(UnderlyingPaymentReceipt),
}

pub struct XrplClient {
    http: Client,
    url: String,
    account: String,
    wallet: XrplWallet,
    last_ledger_offset: u32,
    validation_timeout: Duration,
    poll_interval: Duration,
}

impl XrplClient {
    pub fn new(config: &UnderlyingConfig) -> OrchestratorResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| OrchestratorError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        let wallet = XrplWallet::from_seed(&require_secret(&config.secret_env)?)?;
        if wallet.classic_address() != config.account {
            return Err(OrchestratorError::Config(format!(
                "{} holds the key of {}, not of underlying.account {}",
                config.secret_env,
                wallet.classic_address(),
                config.account
            )));
        }

        Ok(Self {
            http,
            url: config.rpc_url.clone(),
            account: config.account.clone(),
            wallet,
            last_ledger_offset: config.last_ledger_offset,
            validation_timeout: Duration::from_secs(config.validation_timeout_secs),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        })
    }

    async fn rpc<T: DeserializeOwned>(&self, method: &str, params: Value) -> OrchestratorResult<T> {
        let response = self
            .http
            .post(&self.url)
            .json(&json!({ "method": method, "params": [params] }))
            .send()
            .await?;

        let status = response.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(OrchestratorError::transient("xrpl", status));
        }
        if !status.is_success() {
            return Err(OrchestratorError::Validation(format!("XRPL {} returned {}", method, status)));
        }

        let envelope: RpcEnvelope = response.json().await?;
        decode_result(method, envelope.result)
    }

    async fn next_sequence(&self) -> OrchestratorResult<u32> {
        let info: AccountInfoResult = self
            .rpc(
                "account_info",
                json!({ "account": self.account, "ledger_index": "current" }),
            )
            .await?;
        Ok(info.account_data.sequence)
    }

    async fn fee_and_ledger(&self) -> OrchestratorResult<(u64, u64)> {
        let fee: FeeResult = self.rpc("fee", json!({})).await?;
        let parse = |field: &str, value: &str| {
            value.parse::<u64>().map_err(|_| {
                OrchestratorError::Validation(format!("fee.{} = {:?} is not a drop amount", field, value))
            })
        };
        let base = parse("base_fee", &fee.drops.base_fee)?;
        let open = parse("open_ledger_fee", &fee.drops.open_ledger_fee)?;
        Ok((base.max(open), fee.ledger_current_index))
    }

    async fn validated_ledger(&self) -> OrchestratorResult<u64> {
        let ledger: LedgerResult = self
            .rpc("ledger", json!({ "ledger_index": "validated" }))
            .await?;
        Ok(ledger.ledger_index)
    }

    async fn lookup(&self, tx_hash: &str) -> OrchestratorResult<TxLookup> {
        match self.rpc::<TxResult>("tx", json!({ "transaction": tx_hash })).await {
            Ok(result) => interpret_tx(tx_hash, result),
            Err(OrchestratorError::Validation(message)) if message.contains("txnNotFound") => {
                Ok(TxLookup::NotFound)
            }
            Err(e) => Err(e),
        }
    }

    /// Poll until the transaction is in a validated ledger or can no longer be
    async fn wait_validated(
        &self,
        tx_hash: &str,
        last_ledger_sequence: u64,
    ) -> OrchestratorResult<UnderlyingPaymentReceipt> {
        let deadline = Instant::now() + self.validation_timeout;

        while Instant::now() < deadline {
            sleep(self.poll_interval).await;
            match self.lookup(tx_hash).await {
                Ok(TxLookup::Validated(receipt)) => return Ok(receipt),
                Ok(TxLookup::Unvalidated) => debug!("XRPL tx {} not validated yet", tx_hash),
                Ok(TxLookup::NotFound) => match self.validated_ledger().await {
                    Ok(validated) if validated > last_ledger_sequence => {
                        return Err(OrchestratorError::UnderlyingPayment {
                            tx_hash: tx_hash.to_string(),
                            result: format!("expired after ledger {}", last_ledger_sequence),
                        });
                    }
                    Ok(_) => debug!("XRPL tx {} not found yet", tx_hash),
                    Err(e) if e.is_retryable() => warn!("XRPL ledger lookup failed: {}", e),
                    Err(e) => return Err(e),
                },
                Err(e) if e.is_retryable() => warn!("XRPL lookup of {} failed: {}", tx_hash, e),
                Err(e) => return Err(e),
            }
        }

        Err(OrchestratorError::Timeout {
            operation: format!("validation of XRPL tx {}", tx_hash),
        })
    }
}

#[async_trait]
impl UnderlyingLedger for XrplClient {
    async fn submit_payment(
        &self,
        instruction: PaymentInstruction,
    ) -> OrchestratorResult<SubmittedPayment> {
        let sequence = self.next_sequence().await?;
        let (fee, current_ledger) = self.fee_and_ledger().await?;
        let last_ledger_sequence = current_ledger + self.last_ledger_offset as u64;
        let payment = payment_fields(&self.wallet, &instruction, sequence, fee, last_ledger_sequence)?;
        let signed = self.wallet.sign(&payment)?;

        info!(
            "Submitting XRPL payment {} of {} drops to {} (memo {})",
            signed.hash, instruction.amount, instruction.destination, instruction.memo.memo_hex()
        );
        let submitted: SubmitResult = self
            .rpc("submit", json!({ "tx_blob": signed.blob }))
            .await
            .map_err(|e| unconfirmed(&signed.hash, e))?;

        if is_rejected(&submitted.engine_result) {
            return Err(OrchestratorError::UnderlyingPayment {
                tx_hash: signed.hash,
                result: format!(
                    "{} {}",
                    submitted.engine_result,
                    submitted.engine_result_message.unwrap_or_default()
                ),
            });
        }
        debug!("XRPL tx {} preliminary result {}", signed.hash, submitted.engine_result);

        Ok(SubmittedPayment {
            tx_hash: signed.hash,
            last_ledger_sequence,
        })
    }

    async fn wait_for_validation(
        &self,
        submitted: &SubmittedPayment,
    ) -> OrchestratorResult<UnderlyingPaymentReceipt> {
        let receipt = self
            .wait_validated(&submitted.tx_hash, submitted.last_ledger_sequence)
            .await
            .map_err(|e| unconfirmed(&submitted.tx_hash, e))?;
        info!(
            "XRPL payment {} validated in ledger {}",
            submitted.tx_hash, receipt.ledger_index
        );
        Ok(receipt)
    }

    async fn confirmed_payment(&self, tx_hash: &str) -> OrchestratorResult<UnderlyingPaymentReceipt> {
        match self.lookup(tx_hash).await? {
            TxLookup::Validated(receipt) => Ok(receipt),
            TxLookup::Unvalidated => Err(OrchestratorError::transient(
                "xrpl",
                format!("tx {} not validated yet", tx_hash),
            )),
            TxLookup::NotFound => Err(OrchestratorError::Validation(format!(
                "XRPL tx {} not found",
                tx_hash
            ))),
        }
    }
}

/// Fields of the payment the wallet signs
fn payment_fields(
    wallet: &XrplWallet,
    instruction: &PaymentInstruction,
    sequence: u32,
    fee: u64,
    last_ledger_sequence: u64,
) -> OrchestratorResult<PaymentFields> {
    let last_ledger_sequence = u32::try_from(last_ledger_sequence).map_err(|_| {
        OrchestratorError::Validation(format!(
            "LastLedgerSequence {} out of range",
            last_ledger_sequence
        ))
    })?;
    Ok(PaymentFields {
        account: wallet.account_id(),
        destination: decode_classic_address(&instruction.destination)?,
        amount_drops: instruction.amount,
        fee_drops: fee,
        sequence,
        last_ledger_sequence,
        memo: instruction.memo.as_bytes().to_vec(),
    })
}

/// Any failure after the blob left this process leaves the outcome open,
/// except a definite ledger result
fn unconfirmed(tx_hash: &str, e: OrchestratorError) -> OrchestratorError {
    match e {
        OrchestratorError::UnderlyingPayment { .. } | OrchestratorError::PaymentUnconfirmed { .. } => e,
        other => OrchestratorError::PaymentUnconfirmed {
            tx_hash: tx_hash.to_string(),
            message: other.to_string(),
        },
    }
}

/// Preliminary results that mean the transaction never reaches a ledger
fn is_rejected(engine_result: &str) -> bool {
    ["tem", "tef", "tel"]
        .iter()
        .any(|prefix| engine_result.starts_with(prefix))
}

fn decode_result<T: DeserializeOwned>(method: &str, result: Value) -> OrchestratorResult<T> {
    if result.get("status").and_then(Value::as_str) == Some("error") {
        let error = result
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        return Err(match error {
            "tooBusy" | "noNetwork" | "noCurrent" | "noClosed" | "slowDown" => {
                OrchestratorError::transient("xrpl", format!("{}: {}", method, error))
            }
            _ => OrchestratorError::Validation(format!("XRPL {} failed: {}", method, error)),
        });
    }
    serde_json::from_value(result)
        .map_err(|e| OrchestratorError::Validation(format!("malformed XRPL {} result: {}", method, e)))
}

fn interpret_tx(tx_hash: &str, result: TxResult) -> OrchestratorResult<TxLookup> {
    if !result.validated {
        return Ok(TxLookup::Unvalidated);
    }
    let outcome = result
        .meta
        .map(|m| m.transaction_result)
        .unwrap_or_else(|| "missing meta".to_string());
    if outcome != "tesSUCCESS" {
        return Err(OrchestratorError::UnderlyingPayment {
            tx_hash: tx_hash.to_string(),
            result: outcome,
        });
    }

    let (Some(ledger_index), Some(date)) = (result.ledger_index, result.date) else {
        return Err(OrchestratorError::Validation(format!(
            "validated XRPL tx {} lacks ledger index or close time",
            tx_hash
        )));
    };
    Ok(TxLookup::Validated(UnderlyingPaymentReceipt {
        tx_hash: tx_hash.to_string(),
        ledger_index,
        close_time: date + RIPPLE_EPOCH_OFFSET,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::minting::PaymentReference;
    use ethers::types::U256;

    const HASH: &str = "EC0FC5F40FBE6AEAD31138898C71687B2902E462FD1BFEF3FB443BE5E2C018F9";

    #[test]
    fn test_payment_fields_carry_reference_memo() {
        let wallet = XrplWallet::from_seed("snoPBrXtMeMyMHUVTgbuqAfg1SUTb").unwrap();
        let instruction = PaymentInstruction {
            destination: "rU6K7V3Po4snVhBBaU29sesqs2qTQJWDw1".to_string(),
            amount: 10_025_000,
            memo: PaymentReference::minting(U256::from(0xf655fbu64)).unwrap(),
        };
        let fields = payment_fields(&wallet, &instruction, 41, 12, 1_020).unwrap();

        assert_eq!(fields.account, wallet.account_id());
        assert_eq!(fields.amount_drops, 10_025_000);
        assert_eq!(fields.fee_drops, 12);
        assert_eq!(fields.last_ledger_sequence, 1_020);
        assert_eq!(
            hex::encode_upper(&fields.memo),
            "4642505266410001000000000000000000000000000000000000000000F655FB"
        );
        assert!(payment_fields(&wallet, &instruction, 41, 12, u64::from(u32::MAX) + 1).is_err());
    }

    #[test]
    fn test_failures_after_submission_keep_the_hash() {
        let lookup_error = decode_result::<TxResult>("tx", json!({ "status": "error", "error": "lgrNotFound" }))
            .unwrap_err();
        let err = unconfirmed(HASH, lookup_error);
        assert!(matches!(&err, OrchestratorError::PaymentUnconfirmed { tx_hash, .. } if tx_hash == HASH));
        assert_eq!(err.submitted_payment(), Some(HASH));

        let timeout = unconfirmed(HASH, OrchestratorError::Timeout { operation: "tx".into() });
        assert!(matches!(timeout, OrchestratorError::PaymentUnconfirmed { .. }));

        // A definite ledger result is kept as is
        let failed = unconfirmed(
            HASH,
            OrchestratorError::UnderlyingPayment {
                tx_hash: HASH.to_string(),
                result: "tecUNFUNDED_PAYMENT".into(),
            },
        );
        assert!(matches!(failed, OrchestratorError::UnderlyingPayment { .. }));
    }

    #[test]
    fn test_validated_success() {
        let result: TxResult = serde_json::from_value(json!({
            "validated": true,
            "ledger_index": 5_000_123u64,
            "date": 800_000_000u64,
            "meta": { "TransactionResult": "tesSUCCESS" }
        }))
        .unwrap();

        let TxLookup::Validated(receipt) = interpret_tx(HASH, result).unwrap() else {
            panic!("expected a validated payment");
        };
        assert_eq!(receipt.ledger_index, 5_000_123);
        assert_eq!(receipt.close_time, 1_746_684_800);
    }

    #[test]
    fn test_validated_failure_is_payment_error() {
        let result: TxResult = serde_json::from_value(json!({
            "validated": true,
            "ledger_index": 1u64,
            "date": 1u64,
            "meta": { "TransactionResult": "tecUNFUNDED_PAYMENT" }
        }))
        .unwrap();

        assert!(matches!(
            interpret_tx(HASH, result),
            Err(OrchestratorError::UnderlyingPayment { result, .. }) if result == "tecUNFUNDED_PAYMENT"
        ));
    }

    #[test]
    fn test_unvalidated_lookup() {
        let result: TxResult = serde_json::from_value(json!({ "validated": false })).unwrap();
        assert_eq!(interpret_tx(HASH, result).unwrap(), TxLookup::Unvalidated);
    }

    #[test]
    fn test_rpc_error_classification() {
        let not_found = decode_result::<TxResult>("tx", json!({ "status": "error", "error": "txnNotFound" }));
        assert!(matches!(not_found, Err(OrchestratorError::Validation(m)) if m.contains("txnNotFound")));

        let busy = decode_result::<TxResult>("tx", json!({ "status": "error", "error": "tooBusy" }));
        assert!(busy.unwrap_err().is_retryable());
    }

    #[test]
    fn test_rejected_engine_results() {
        assert!(is_rejected("temBAD_AMOUNT"));
        assert!(is_rejected("tefPAST_SEQ"));
        assert!(!is_rejected("tesSUCCESS"));
        assert!(!is_rejected("terQUEUED"));
    }
}
