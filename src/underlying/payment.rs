//! Reservation payment construction and submission

use super::{
    require_classic_address, rescale_exact, PaymentInstruction, SubmittedPayment,
    UnderlyingLedger, UnderlyingPaymentReceipt,
};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::minting::CollateralReservation;

use dashmap::DashMap;
use ethers::types::U256;
use std::sync::Arc;
use tracing::{info, warn};

/// Pays reservations on the underlying ledger, at most once per reservation id
pub struct UnderlyingPaymentBuilder {
    ledger: Arc<dyn UnderlyingLedger>,
    ledger_decimals: u32,
    /// Reservation id -> tx hash, or empty while the payment is in flight
    paid: DashMap<U256, String>,
}

impl UnderlyingPaymentBuilder {
    pub fn new(ledger: Arc<dyn UnderlyingLedger>, ledger_decimals: u32) -> Self {
        Self {
            ledger,
            ledger_decimals,
            paid: DashMap::new(),
        }
    }

    /// Build the payment for a reservation without submitting it
    pub fn instruction(
        &self,
        reservation: &CollateralReservation,
        asset_decimals: u32,
    ) -> OrchestratorResult<PaymentInstruction> {
        require_classic_address("payment address", &reservation.payment_address)?;
        let amount = rescale_exact(
            reservation.underlying_amount_uba(),
            asset_decimals,
            self.ledger_decimals,
        )?;
        if amount == 0 {
            return Err(OrchestratorError::Validation(format!(
                "reservation {} has nothing to pay",
                reservation.reservation_id
            )));
        }

        Ok(PaymentInstruction {
            destination: reservation.payment_address.clone(),
            amount,
            memo: reservation.payment_reference,
        })
    }

    /// Submit the payment for a reservation. The slot stays taken unless the
    /// failure happened before anything was sent.
    pub async fn submit(
        &self,
        reservation: &CollateralReservation,
        asset_decimals: u32,
    ) -> OrchestratorResult<SubmittedPayment> {
        let instruction = self.instruction(reservation, asset_decimals)?;
        let id = reservation.reservation_id;

        match self.paid.entry(id) {
            dashmap::mapref::entry::Entry::Occupied(existing) => {
                return Err(OrchestratorError::Validation(format!(
                    "reservation {} already paid (tx {:?})",
                    id,
                    existing.get()
                )));
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(String::new());
            }
        }

        match self.ledger.submit_payment(instruction).await {
            Ok(submitted) => {
                self.paid.insert(id, submitted.tx_hash.clone());
                Ok(submitted)
            }
            Err(e) => {
                if let Some(tx_hash) = e.submitted_payment() {
                    warn!("Payment {} for reservation {} has unknown outcome: {}", tx_hash, id, e);
                    self.paid.insert(id, tx_hash.to_string());
                } else if matches!(e, OrchestratorError::Validation(_) | OrchestratorError::Config(_)) {
                    self.paid.remove(&id);
                } else {
                    warn!("Payment for reservation {} has unknown outcome: {}", id, e);
                }
                Err(e)
            }
        }
    }

    /// Wait for a submitted payment; the reservation stays marked as paid
    pub async fn confirm(
        &self,
        reservation: &CollateralReservation,
        submitted: &SubmittedPayment,
    ) -> OrchestratorResult<UnderlyingPaymentReceipt> {
        let receipt = self.ledger.wait_for_validation(submitted).await?;
        info!(
            "Reservation {} paid by XRPL tx {} (ledger {})",
            reservation.reservation_id, receipt.tx_hash, receipt.ledger_index
        );
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::minting::PaymentReference;
    use crate::underlying::MockUnderlyingLedger;
    use ethers::types::{Address, H256};

    fn reservation(id: u64) -> CollateralReservation {
        CollateralReservation {
            reservation_id: U256::from(id),
            agent_vault: Address::from_low_u64_be(1),
            lots: 1,
            reservation_fee: U256::zero(),
            value_uba: U256::from(10_000_000u64),
            minting_fee_uba: U256::from(25_000u64),
            payment_address: "r4KgCNzn9ZuNjpf17DEHZnyyiqpuj599Wm".to_string(),
            payment_reference: PaymentReference::minting(U256::from(id)).unwrap(),
            last_underlying_block: U256::zero(),
            last_underlying_timestamp: U256::zero(),
            tx_hash: H256::zero(),
        }
    }

    async fn pay(
        builder: &UnderlyingPaymentBuilder,
        reservation: &CollateralReservation,
    ) -> OrchestratorResult<UnderlyingPaymentReceipt> {
        let submitted = builder.submit(reservation, 6).await?;
        builder.confirm(reservation, &submitted).await
    }

    const TX_HASH: &str = "EC0FC5F40FBE6AEAD31138898C71687B2902E462FD1BFEF3FB443BE5E2C018F9";

    fn submitted() -> SubmittedPayment {
        SubmittedPayment {
            tx_hash: TX_HASH.to_string(),
            last_ledger_sequence: 1_020,
        }
    }

    fn receipt() -> UnderlyingPaymentReceipt {
        UnderlyingPaymentReceipt {
            tx_hash: TX_HASH.to_string(),
            ledger_index: 1,
            close_time: 1_700_000_000,
        }
    }

    #[test]
    fn test_instruction_pays_value_plus_fee_with_reference_memo() {
        let builder = UnderlyingPaymentBuilder::new(Arc::new(MockUnderlyingLedger::new()), 6);
        let instruction = builder.instruction(&reservation(0xf655fb), 6).unwrap();

        assert_eq!(instruction.amount, 10_025_000);
        assert_eq!(instruction.destination, "r4KgCNzn9ZuNjpf17DEHZnyyiqpuj599Wm");
        assert_eq!(
            hex::encode(instruction.memo.as_bytes()),
            "4642505266410001000000000000000000000000000000000000000000f655fb"
        );
    }

    #[test]
    fn test_lossy_conversion_is_rejected() {
        let builder = UnderlyingPaymentBuilder::new(Arc::new(MockUnderlyingLedger::new()), 0);
        assert!(matches!(
            builder.instruction(&reservation(1), 6),
            Err(OrchestratorError::Validation(_))
        ));
    }

    #[test]
    fn test_bad_destination_is_rejected() {
        let builder = UnderlyingPaymentBuilder::new(Arc::new(MockUnderlyingLedger::new()), 6);
        let mut bad = reservation(1);
        bad.payment_address = "0xdeadbeef".to_string();
        assert!(builder.instruction(&bad, 6).is_err());
    }

    #[tokio::test]
    async fn test_second_payment_for_same_reservation_is_refused() {
        let mut ledger = MockUnderlyingLedger::new();
        ledger
            .expect_submit_payment()
            .times(1)
            .returning(|_| Ok(submitted()));
        ledger
            .expect_wait_for_validation()
            .times(1)
            .returning(|_| Ok(receipt()));
        let builder = UnderlyingPaymentBuilder::new(Arc::new(ledger), 6);

        pay(&builder, &reservation(9)).await.unwrap();
        assert!(matches!(
            pay(&builder, &reservation(9)).await,
            Err(OrchestratorError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_ambiguous_failure_keeps_reservation_locked() {
        let mut ledger = MockUnderlyingLedger::new();
        ledger.expect_submit_payment().times(1).returning(|_| {
            Err(OrchestratorError::Timeout {
                operation: "account_info".to_string(),
            })
        });
        let builder = UnderlyingPaymentBuilder::new(Arc::new(ledger), 6);

        assert!(pay(&builder, &reservation(3)).await.is_err());
        assert!(pay(&builder, &reservation(3)).await.is_err());
    }

    #[tokio::test]
    async fn test_validation_failure_after_submission_keeps_reservation_locked() {
        let mut ledger = MockUnderlyingLedger::new();
        ledger
            .expect_submit_payment()
            .times(1)
            .returning(|_| Ok(submitted()));
        ledger.expect_wait_for_validation().times(1).returning(|s| {
            Err(OrchestratorError::PaymentUnconfirmed {
                tx_hash: s.tx_hash.clone(),
                message: "XRPL tx failed: lgrNotFound".into(),
            })
        });
        let builder = UnderlyingPaymentBuilder::new(Arc::new(ledger), 6);

        let err = pay(&builder, &reservation(4)).await.unwrap_err();
        assert_eq!(err.submitted_payment(), Some(TX_HASH));
        let retry = pay(&builder, &reservation(4)).await.unwrap_err();
        assert!(matches!(retry, OrchestratorError::Validation(m) if m.contains(TX_HASH)));
    }

    #[tokio::test]
    async fn test_unsent_payment_frees_the_slot() {
        let mut ledger = MockUnderlyingLedger::new();
        let mut calls = 0;
        ledger.expect_submit_payment().times(2).returning(move |_| {
            calls += 1;
            if calls == 1 {
                Err(OrchestratorError::Validation("XRPL account_info failed: actNotFound".into()))
            } else {
                Ok(submitted())
            }
        });
        let builder = UnderlyingPaymentBuilder::new(Arc::new(ledger), 6);

        assert!(builder.submit(&reservation(5), 6).await.is_err());
        assert_eq!(builder.submit(&reservation(5), 6).await.unwrap(), submitted());
    }
}
