//! Underlying ledger (XRPL) payments
//!
//! The minting flow pays the agent on the underlying ledger with the
//! reservation's payment reference as memo. Amounts cross from the asset's
//! base units into the ledger's minor unit by exact integer scaling.

pub mod codec;
pub mod payment;
pub mod wallet;
pub mod xrpl;

pub use payment::UnderlyingPaymentBuilder;
pub use wallet::XrplWallet;
pub use xrpl::XrplClient;

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::minting::PaymentReference;

use async_trait::async_trait;
use ethers::types::U256;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    // Ripple base58 alphabet, no 0, O, I or l
    static ref CLASSIC_ADDRESS: Regex =
        Regex::new(r"^r[1-9A-HJ-NP-Za-km-z]{24,34}$").expect("valid regex");
}

/// Whether `address` has the shape of an XRPL classic address
pub fn is_classic_address(address: &str) -> bool {
    CLASSIC_ADDRESS.is_match(address)
}

pub fn require_classic_address(what: &str, address: &str) -> OrchestratorResult<()> {
    if !is_classic_address(address) {
        return Err(OrchestratorError::Validation(format!(
            "{} {:?} is not an XRPL classic address",
            what, address
        )));
    }
    Ok(())
}

/// A fully determined payment, ready to be autofilled and signed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentInstruction {
    pub destination: String,
    /// Amount in the ledger's minor unit (drops)
    pub amount: u64,
    pub memo: PaymentReference,
}

/// A signed payment the ledger accepted for relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedPayment {
    pub tx_hash: String,
    /// Last ledger the payment can be included in
    pub last_ledger_sequence: u64,
}

/// A payment that reached a validated ledger with `tesSUCCESS`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnderlyingPaymentReceipt {
    pub tx_hash: String,
    pub ledger_index: u64,
    /// Ledger close time, unix seconds
    pub close_time: u64,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UnderlyingLedger: Send + Sync {
    /// Sign locally and submit. Once the signed blob has been sent, failures
    /// are reported as `PaymentUnconfirmed` with the transaction hash.
    async fn submit_payment(
        &self,
        instruction: PaymentInstruction,
    ) -> OrchestratorResult<SubmittedPayment>;

    /// Wait until a submitted payment is final on a validated ledger
    async fn wait_for_validation(
        &self,
        submitted: &SubmittedPayment,
    ) -> OrchestratorResult<UnderlyingPaymentReceipt>;

    /// Look up an earlier payment; fails unless it succeeded in a validated ledger
    async fn confirmed_payment(&self, tx_hash: &str) -> OrchestratorResult<UnderlyingPaymentReceipt>;
}

/// Rescale `amount` from `from_decimals` to `to_decimals` without losing precision
pub fn rescale_exact(amount: U256, from_decimals: u32, to_decimals: u32) -> OrchestratorResult<u64> {
    let scaled = if from_decimals >= to_decimals {
        let divisor = U256::exp10((from_decimals - to_decimals) as usize);
        if !(amount % divisor).is_zero() {
            return Err(OrchestratorError::Validation(format!(
                "{} with {} decimals is not representable with {} decimals",
                amount, from_decimals, to_decimals
            )));
        }
        amount / divisor
    } else {
        amount
            .checked_mul(U256::exp10((to_decimals - from_decimals) as usize))
            .ok_or_else(|| OrchestratorError::Validation(format!("{} overflows when rescaled", amount)))?
    };

    if scaled > U256::from(u64::MAX) {
        return Err(OrchestratorError::Validation(format!(
            "{} exceeds the ledger amount range",
            scaled
        )));
    }
    Ok(scaled.as_u64())
}
