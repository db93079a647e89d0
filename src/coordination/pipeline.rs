//! End-to-end mint: select, reserve, pay, attest, execute
//!
//! Stages run strictly in sequence. The flow record is saved on every stage
//! change so that a crash after the underlying payment leaves enough behind
//! to finish the mint with `execute-minting`.

use super::stage::{Checkpoint, FlowFailure, MintStage};
use crate::agents::AgentSelector;
use crate::attestation::round::unix_now;
use crate::attestation::{
    AttestationClient, AttestationProof, DataAvailabilityLayer, RoundSchedule, RoundTarget,
    VerifierService,
};
use crate::chain::AssetManagerApi;
use crate::config::Settings;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::minting::{CollateralReservation, CollateralReservationClient, MintExecutor, MintOutcome};
use crate::state::{FlowKind, FlowRecord, FlowStore};
use crate::underlying::{UnderlyingLedger, UnderlyingPaymentBuilder, UnderlyingPaymentReceipt};

use chrono::Utc;
use ethers::types::{Address, U256};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use uuid::Uuid;

/// External surfaces the pipeline drives
pub struct MintServices {
    pub asset_manager: Arc<dyn AssetManagerApi>,
    pub ledger: Arc<dyn UnderlyingLedger>,
    pub verifier: Arc<dyn VerifierService>,
    pub da_layer: Arc<dyn DataAvailabilityLayer>,
    pub store: Arc<dyn FlowStore>,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub agent_page_size: u64,
    pub ledger_decimals: u32,
    pub dry_run: bool,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub schedule: RoundSchedule,
}

impl PipelineOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            agent_page_size: settings.minting.agent_page_size,
            ledger_decimals: settings.underlying.decimals,
            dry_run: settings.minting.dry_run,
            initial_backoff: Duration::from_millis(settings.attestation.initial_backoff_ms),
            max_backoff: Duration::from_millis(settings.attestation.max_backoff_ms),
            schedule: settings.round_schedule(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MintRequest {
    pub lots: u64,
    pub executor: Address,
    /// Overrides round discovery from the payment close time
    pub round_id: Option<u64>,
}

#[derive(Debug)]
pub struct MintReport {
    pub flow_id: Uuid,
    pub reservation: CollateralReservation,
    pub payment: UnderlyingPaymentReceipt,
    pub round_id: u64,
    pub outcome: MintOutcome,
}

struct Flow {
    record: FlowRecord,
    stage: MintStage,
    checkpoint: Checkpoint,
    stage_started: Instant,
}

impl Flow {
    fn start(stage: MintStage, checkpoint: Checkpoint) -> Self {
        Self {
            record: FlowRecord::new(FlowKind::Mint, stage.as_str()),
            stage,
            checkpoint,
            stage_started: Instant::now(),
        }
    }

    fn advance(&mut self, stage: MintStage) {
        crate::metrics::record_stage_latency(
            self.stage.as_str(),
            self.stage_started.elapsed().as_secs_f64(),
        );
        self.stage = stage;
        self.stage_started = Instant::now();
    }

    fn snapshot(&mut self) -> &FlowRecord {
        self.record.stage = self.stage.as_str().to_string();
        self.record.reservation_id = self.checkpoint.reservation_id;
        self.record.underlying_tx = self.checkpoint.underlying_tx.clone();
        self.record.round_id = self.checkpoint.round_id;
        self.record.updated_at = Utc::now();
        &self.record
    }
}

pub struct MintPipeline {
    services: MintServices,
    selector: AgentSelector,
    reservations: CollateralReservationClient,
    payments: UnderlyingPaymentBuilder,
    executor: MintExecutor,
    options: PipelineOptions,
    shutdown: Arc<RwLock<bool>>,
}

impl MintPipeline {
    pub fn new(services: MintServices, options: PipelineOptions) -> Self {
        let asset_manager = services.asset_manager.clone();
        Self {
            selector: AgentSelector::new(asset_manager.clone(), options.agent_page_size),
            reservations: CollateralReservationClient::new(asset_manager.clone()),
            payments: UnderlyingPaymentBuilder::new(services.ledger.clone(), options.ledger_decimals),
            executor: MintExecutor::new(asset_manager, options.dry_run),
            services,
            options,
            shutdown: Arc::new(RwLock::new(false)),
        }
    }

    /// Stop before the next stage; a submitted transaction is still observed
    pub async fn stop(&self) {
        *self.shutdown.write().await = true;
        info!("Mint cancellation requested");
    }

    pub fn shutdown_handle(&self) -> Arc<RwLock<bool>> {
        self.shutdown.clone()
    }

    /// Flows left behind by earlier runs
    pub async fn unfinished_flows(&self) -> OrchestratorResult<Vec<FlowRecord>> {
        self.services.store.unfinished().await
    }

    pub async fn run(&self, request: MintRequest) -> Result<MintReport, FlowFailure> {
        let mut flow = Flow::start(MintStage::SelectingAgent, Checkpoint::default());
        info!(
            flow_id = %flow.record.flow_id,
            lots = request.lots,
            dry_run = self.options.dry_run,
            "Starting mint"
        );
        let result = self.mint(&mut flow, request).await;
        self.finish(flow, result).await
    }

    /// Attest and execute a reservation whose underlying payment already happened
    pub async fn execute_existing(
        &self,
        reservation_id: U256,
        transaction_id: &str,
        round_id: Option<u64>,
    ) -> Result<MintOutcome, FlowFailure> {
        let mut flow = Flow::start(
            MintStage::Attesting,
            Checkpoint {
                reservation_id: Some(reservation_id),
                underlying_tx: Some(transaction_id.to_string()),
                round_id: None,
            },
        );
        info!(
            flow_id = %flow.record.flow_id,
            reservation_id = %reservation_id,
            underlying_tx = transaction_id,
            "Resuming mint"
        );
        let result = self.resume(&mut flow, reservation_id, transaction_id, round_id).await;
        self.finish(flow, result).await
    }

    async fn mint(&self, flow: &mut Flow, request: MintRequest) -> OrchestratorResult<MintReport> {
        self.enter(flow, MintStage::SelectingAgent).await?;
        let settings = self.services.asset_manager.settings().await?;
        let agent = self.selector.select(request.lots).await?;

        self.enter(flow, MintStage::Reserving).await?;
        let reservation = self
            .reservations
            .reserve(&agent, request.lots, request.executor, settings.lot_size_uba)
            .await
            .map_err(|e| {
                flow.checkpoint.reservation_id = e.committed_reservation();
                e
            })?;
        flow.checkpoint.reservation_id = Some(reservation.reservation_id);

        self.enter(flow, MintStage::Paying).await?;
        let submitted = self
            .payments
            .submit(&reservation, settings.asset_decimals as u32)
            .await
            .map_err(|e| {
                flow.checkpoint.underlying_tx = e.submitted_payment().map(str::to_string);
                e
            })?;
        flow.checkpoint.underlying_tx = Some(submitted.tx_hash.clone());
        self.persist(flow).await;
        let payment = self.payments.confirm(&reservation, &submitted).await?;

        self.enter(flow, MintStage::Attesting).await?;
        let target = match request.round_id {
            Some(round_id) => self.options.schedule.target(round_id, unix_now())?,
            None => self
                .options
                .schedule
                .target_for_close_time(payment.close_time, unix_now())?,
        };
        let proof = self.attest(flow, &payment.tx_hash, target).await?;

        self.enter(flow, MintStage::Executing).await?;
        let outcome = self.executor.execute(reservation.reservation_id, proof).await?;

        Ok(MintReport {
            flow_id: flow.record.flow_id,
            round_id: target.round_id,
            reservation,
            payment,
            outcome,
        })
    }

    async fn resume(
        &self,
        flow: &mut Flow,
        reservation_id: U256,
        transaction_id: &str,
        round_id: Option<u64>,
    ) -> OrchestratorResult<MintOutcome> {
        self.enter(flow, MintStage::Attesting).await?;
        let target = match round_id {
            Some(round_id) => self.options.schedule.target(round_id, unix_now())?,
            None => {
                let payment = self.services.ledger.confirmed_payment(transaction_id).await?;
                self.options
                    .schedule
                    .target_for_close_time(payment.close_time, unix_now())?
            }
        };
        let proof = self.attest(flow, transaction_id, target).await?;

        self.enter(flow, MintStage::Executing).await?;
        self.executor.execute(reservation_id, proof).await
    }

    async fn attest(
        &self,
        flow: &mut Flow,
        transaction_id: &str,
        target: RoundTarget,
    ) -> OrchestratorResult<AttestationProof> {
        flow.checkpoint.round_id = Some(target.round_id);
        self.persist(flow).await;
        let plan = self.options.schedule.plan(target.round_id)?;
        info!(
            flow_id = %flow.record.flow_id,
            round_id = plan.round_id,
            deadline_unix = plan.deadline_unix,
            "Awaiting attestation proof"
        );

        let mut client = AttestationClient::new(
            self.services.verifier.clone(),
            self.services.da_layer.clone(),
            self.options.initial_backoff,
            self.options.max_backoff,
        );
        client.fetch_proof(transaction_id, target).await
    }

    async fn enter(&self, flow: &mut Flow, stage: MintStage) -> OrchestratorResult<()> {
        if *self.shutdown.read().await {
            return Err(OrchestratorError::Cancelled {
                stage: stage.to_string(),
            });
        }
        flow.advance(stage);
        self.persist(flow).await;
        info!(
            flow_id = %flow.record.flow_id,
            stage = %stage,
            checkpoint = %flow.checkpoint,
            "Entering stage"
        );
        Ok(())
    }

    async fn persist(&self, flow: &mut Flow) {
        let record = flow.snapshot();
        if let Err(e) = self.services.store.save(record).await {
            warn!("Failed to save flow {}: {}", record.flow_id, e);
        }
    }

    async fn finish<T>(&self, mut flow: Flow, result: OrchestratorResult<T>) -> Result<T, FlowFailure> {
        match result {
            Ok(value) => {
                flow.advance(MintStage::Completed);
                self.persist(&mut flow).await;
                crate::metrics::record_flow(FlowKind::Mint, "completed", MintStage::Completed.as_str());
                info!(flow_id = %flow.record.flow_id, checkpoint = %flow.checkpoint, "Mint completed");
                Ok(value)
            }
            Err(e) => {
                flow.record.error = Some(e.to_string());
                self.persist(&mut flow).await;
                let outcome = match &e {
                    OrchestratorError::Cancelled { .. } => "cancelled",
                    _ => "failed",
                };
                crate::metrics::record_flow(FlowKind::Mint, outcome, flow.stage.as_str());
                let failure = FlowFailure {
                    stage: flow.stage,
                    checkpoint: flow.checkpoint,
                    error: e,
                };
                if failure.error.is_caller_recoverable() {
                    warn!(flow_id = %flow.record.flow_id, "{}", failure);
                } else {
                    error!(flow_id = %flow.record.flow_id, "{}", failure);
                }
                Err(failure)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attestation::da_layer::MockDataAvailabilityLayer;
    use crate::attestation::verifier::MockVerifierService;
    use crate::attestation::{EncodedRequest, ProofStatus};
    use crate::chain::asset_manager::MockAssetManagerApi;
    use crate::chain::{AgentInfo, AgentPage, AgentRecord, AgentStatus, AssetSettings, ReservationReceipt};
    use crate::events::ReservedCollateral;
    use crate::minting::PaymentReference;
    use crate::state::MemoryFlowStore;
    use crate::underlying::{MockUnderlyingLedger, SubmittedPayment};
    use ethers::types::{Bytes, H256};

    const LOT: u64 = 10_000_000;
    const RESERVATION: u64 = 10_255_417;
    const TX_ID: &str = "EC0FC5F40FBE6AEAD31138898C71687B2902E462FD1BFEF3FB443BE5E2C018F9";

    fn schedule() -> RoundSchedule {
        RoundSchedule::new(1_658_430_000, 90, 270)
    }

    fn options(dry_run: bool) -> PipelineOptions {
        PipelineOptions {
            agent_page_size: 10,
            ledger_decimals: 6,
            dry_run,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(40),
            schedule: schedule(),
        }
    }

    fn vault() -> Address {
        Address::from_low_u64_be(0xa6e)
    }

    fn asset_manager() -> MockAssetManagerApi {
        let mut mock = MockAssetManagerApi::new();
        mock.expect_settings().returning(|| {
            Ok(AssetSettings {
                lot_size_uba: U256::from(LOT),
                asset_decimals: 6,
                max_redeemed_tickets: 20,
            })
        });
        mock.expect_available_agents().returning(|_, _| {
            Ok(AgentPage {
                agents: vec![AgentRecord {
                    vault: vault(),
                    fee_bips: U256::from(25u64),
                    free_collateral_lots: U256::from(9u64),
                }],
                total_length: 1,
            })
        });
        mock.expect_agent_info().returning(|_| {
            Ok(AgentInfo {
                status: AgentStatus::Healthy,
                fee_bips: U256::from(25u64),
            })
        });
        mock.expect_collateral_reservation_fee()
            .returning(|_| Ok(U256::from(1_000u64)));
        mock.expect_native_balance()
            .returning(|| Ok(U256::from(1_000_000u64)));
        mock.expect_reserve_collateral().times(1).returning(|req| {
            Ok(ReservationReceipt {
                tx_hash: H256::repeat_byte(0x42),
                reserved: ReservedCollateral {
                    reservation_id: U256::from(RESERVATION),
                    agent_vault: req.agent_vault,
                    minter: Address::from_low_u64_be(0x111),
                    value_uba: U256::from(LOT * req.lots),
                    fee_uba: U256::from(25_000u64),
                    last_underlying_block: U256::from(100u64),
                    last_underlying_timestamp: U256::from(1_700_000_000u64),
                    payment_address: "r4KgCNzn9ZuNjpf17DEHZnyyiqpuj599Wm".to_string(),
                    payment_reference: *PaymentReference::minting(U256::from(RESERVATION))
                        .unwrap()
                        .as_bytes(),
                    executor: req.executor,
                },
            })
        });
        mock
    }

    fn submitting_ledger() -> MockUnderlyingLedger {
        let mut ledger = MockUnderlyingLedger::new();
        ledger
            .expect_submit_payment()
            .withf(|instruction| instruction.amount == LOT + 25_000)
            .times(1)
            .returning(|_| {
                Ok(SubmittedPayment {
                    tx_hash: TX_ID.to_string(),
                    last_ledger_sequence: 5_000_020,
                })
            });
        ledger
    }

    fn ledger(close_time: u64) -> MockUnderlyingLedger {
        let mut ledger = submitting_ledger();
        ledger
            .expect_wait_for_validation()
            .times(1)
            .returning(move |submitted| {
                Ok(UnderlyingPaymentReceipt {
                    tx_hash: submitted.tx_hash.clone(),
                    ledger_index: 5_000_000,
                    close_time,
                })
            });
        ledger
    }

    fn verifier() -> MockVerifierService {
        let mut verifier = MockVerifierService::new();
        verifier
            .expect_prepare_request()
            .returning(|tx| Ok(EncodedRequest(Bytes::from(tx.as_bytes().to_vec()))));
        verifier
    }

    fn da_ready() -> MockDataAvailabilityLayer {
        let mut da = MockDataAvailabilityLayer::new();
        da.expect_get_proof().returning(|round_id, _| {
            Ok(ProofStatus::Ready(AttestationProof {
                round_id,
                merkle_proof: vec![[7u8; 32], [8u8; 32]],
                response: Bytes::from(vec![1, 2, 3]),
            }))
        });
        da
    }

    fn pipeline(
        am: MockAssetManagerApi,
        ledger: MockUnderlyingLedger,
        da: MockDataAvailabilityLayer,
        store: Arc<MemoryFlowStore>,
        dry_run: bool,
    ) -> MintPipeline {
        MintPipeline::new(
            MintServices {
                asset_manager: Arc::new(am),
                ledger: Arc::new(ledger),
                verifier: Arc::new(verifier()),
                da_layer: Arc::new(da),
                store,
            },
            options(dry_run),
        )
    }

    fn request(round_id: Option<u64>) -> MintRequest {
        MintRequest {
            lots: 1,
            executor: Address::zero(),
            round_id,
        }
    }

    #[tokio::test]
    async fn test_dry_run_mint_runs_every_stage() {
        let close_time = unix_now();
        let expected_round = schedule().round_for(close_time).unwrap();
        let store = Arc::new(MemoryFlowStore::new());
        let pipeline = pipeline(asset_manager(), ledger(close_time), da_ready(), store.clone(), true);

        let report = pipeline.run(request(None)).await.unwrap();
        assert_eq!(report.round_id, expected_round);
        assert_eq!(report.reservation.reservation_id, U256::from(RESERVATION));
        assert_eq!(report.payment.tx_hash, TX_ID);
        let MintOutcome::DryRun(plan) = report.outcome else {
            panic!("dry run must not execute");
        };
        assert_eq!(plan.round_id, expected_round);
        assert_eq!(plan.merkle_nodes, 2);

        let saved = store.load(report.flow_id).await.unwrap().unwrap();
        assert_eq!(saved.stage, "completed");
        assert_eq!(saved.reservation_id, Some(U256::from(RESERVATION)));
        assert_eq!(saved.round_id, Some(expected_round));
        assert!(store.unfinished().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_attestation_failure_reports_committed_ids() {
        let round = schedule().round_for(unix_now()).unwrap();
        let mut da = MockDataAvailabilityLayer::new();
        da.expect_get_proof()
            .withf(move |round_id, _| *round_id == round)
            .times(1)
            .returning(|_, _| Err(OrchestratorError::Validation("proof is not valid JSON".into())));
        let mut am = asset_manager();
        am.expect_execute_minting().times(0);
        let store = Arc::new(MemoryFlowStore::new());
        let pipeline = pipeline(am, ledger(unix_now()), da, store.clone(), false);

        let failure = pipeline.run(request(Some(round))).await.unwrap_err();
        assert_eq!(failure.stage, MintStage::Attesting);
        assert_eq!(failure.checkpoint.reservation_id, Some(U256::from(RESERVATION)));
        assert_eq!(failure.checkpoint.underlying_tx.as_deref(), Some(TX_ID));
        assert_eq!(failure.checkpoint.round_id, Some(round));
        assert!(failure.resumable());

        // Failed flows are terminal in the store
        assert!(store.unfinished().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_reservation_reports_its_id() {
        let mut am = MockAssetManagerApi::new();
        am.expect_settings().returning(|| {
            Ok(AssetSettings {
                lot_size_uba: U256::from(10u64),
                asset_decimals: 6,
                max_redeemed_tickets: 20,
            })
        });
        am.expect_available_agents().returning(|_, _| {
            Ok(AgentPage {
                agents: vec![AgentRecord {
                    vault: vault(),
                    fee_bips: U256::from(25u64),
                    free_collateral_lots: U256::from(9u64),
                }],
                total_length: 1,
            })
        });
        am.expect_agent_info().returning(|_| {
            Ok(AgentInfo {
                status: AgentStatus::Healthy,
                fee_bips: U256::from(25u64),
            })
        });
        am.expect_collateral_reservation_fee()
            .returning(|_| Ok(U256::from(1_000u64)));
        am.expect_native_balance()
            .returning(|| Ok(U256::from(1_000_000u64)));
        // 10000 UBA reserved against a 10 UBA lot
        am.expect_reserve_collateral().times(1).returning(|req| {
            Ok(ReservationReceipt {
                tx_hash: H256::repeat_byte(0x42),
                reserved: ReservedCollateral {
                    reservation_id: U256::from(777u64),
                    agent_vault: req.agent_vault,
                    minter: Address::from_low_u64_be(0x111),
                    value_uba: U256::from(10_000u64),
                    fee_uba: U256::zero(),
                    last_underlying_block: U256::from(100u64),
                    last_underlying_timestamp: U256::from(1_700_000_000u64),
                    payment_address: "r4KgCNzn9ZuNjpf17DEHZnyyiqpuj599Wm".to_string(),
                    payment_reference: *PaymentReference::minting(U256::from(777u64))
                        .unwrap()
                        .as_bytes(),
                    executor: req.executor,
                },
            })
        });
        let mut ledger = MockUnderlyingLedger::new();
        ledger.expect_submit_payment().times(0);
        let pipeline = pipeline(am, ledger, MockDataAvailabilityLayer::new(), Arc::new(MemoryFlowStore::new()), true);

        let failure = pipeline.run(request(None)).await.unwrap_err();
        assert_eq!(failure.stage, MintStage::Reserving);
        assert_eq!(failure.checkpoint.reservation_id, Some(U256::from(777u64)));
        assert!(failure.to_string().contains("reservation id 777"));
        assert!(!failure.resumable());
    }

    #[tokio::test]
    async fn test_unconfirmed_payment_is_checkpointed_and_resumable() {
        let mut ledger = submitting_ledger();
        ledger.expect_wait_for_validation().times(1).returning(|submitted| {
            Err(OrchestratorError::PaymentUnconfirmed {
                tx_hash: submitted.tx_hash.clone(),
                message: "Timeout waiting for validation".into(),
            })
        });
        let mut da = MockDataAvailabilityLayer::new();
        da.expect_get_proof().times(0);
        let pipeline = pipeline(asset_manager(), ledger, da, Arc::new(MemoryFlowStore::new()), true);

        let failure = pipeline.run(request(None)).await.unwrap_err();
        assert_eq!(failure.stage, MintStage::Paying);
        assert_eq!(failure.checkpoint.reservation_id, Some(U256::from(RESERVATION)));
        assert_eq!(failure.checkpoint.underlying_tx.as_deref(), Some(TX_ID));
        assert!(failure.resumable());
        assert!(failure.to_string().ends_with("resume with execute-minting"));
    }

    #[tokio::test]
    async fn test_no_candidate_stops_before_any_submission() {
        let mut am = MockAssetManagerApi::new();
        am.expect_settings().returning(|| {
            Ok(AssetSettings {
                lot_size_uba: U256::from(LOT),
                asset_decimals: 6,
                max_redeemed_tickets: 20,
            })
        });
        am.expect_available_agents().returning(|_, _| {
            Ok(AgentPage {
                agents: vec![],
                total_length: 0,
            })
        });
        am.expect_reserve_collateral().times(0);
        let mut ledger = MockUnderlyingLedger::new();
        ledger.expect_submit_payment().times(0);
        let pipeline = pipeline(am, ledger, MockDataAvailabilityLayer::new(), Arc::new(MemoryFlowStore::new()), true);

        let failure = pipeline.run(request(None)).await.unwrap_err();
        assert_eq!(failure.stage, MintStage::SelectingAgent);
        assert!(matches!(failure.error, OrchestratorError::NoCandidate { min_free_lots: 1 }));
        assert_eq!(failure.checkpoint, Checkpoint::default());
    }

    #[tokio::test]
    async fn test_cancelled_pipeline_touches_nothing() {
        let mut am = MockAssetManagerApi::new();
        am.expect_settings().times(0);
        let mut ledger = MockUnderlyingLedger::new();
        ledger.expect_submit_payment().times(0);
        let pipeline = pipeline(am, ledger, MockDataAvailabilityLayer::new(), Arc::new(MemoryFlowStore::new()), true);
        pipeline.stop().await;

        let failure = pipeline.run(request(None)).await.unwrap_err();
        assert!(matches!(failure.error, OrchestratorError::Cancelled { .. }));
        assert!(!failure.resumable());
    }

    #[tokio::test]
    async fn test_resume_discovers_round_from_payment() {
        let close_time = unix_now();
        let expected_round = schedule().round_for(close_time).unwrap();
        let mut ledger = MockUnderlyingLedger::new();
        ledger
            .expect_confirmed_payment()
            .withf(|tx| tx.eq_ignore_ascii_case(TX_ID))
            .times(1)
            .returning(move |tx| {
                Ok(UnderlyingPaymentReceipt {
                    tx_hash: tx.to_string(),
                    ledger_index: 5_000_000,
                    close_time,
                })
            });
        let mut am = MockAssetManagerApi::new();
        am.expect_execute_minting()
            .withf(move |proof, id| proof.round_id == expected_round && *id == U256::from(RESERVATION))
            .times(1)
            .returning(|_, _| {
                Ok(crate::chain::MintingReceipt {
                    tx_hash: H256::repeat_byte(9),
                    minted: None,
                })
            });
        let pipeline = pipeline(am, ledger, da_ready(), Arc::new(MemoryFlowStore::new()), false);

        let outcome = pipeline
            .execute_existing(U256::from(RESERVATION), TX_ID, None)
            .await
            .unwrap();
        assert!(matches!(outcome, MintOutcome::Executed(receipt) if receipt.tx_hash == H256::repeat_byte(9)));
    }
}
