//! Attestation state machine
//!
//! `Idle → RequestPrepared → RoundTargeted → ProofPending → {ProofReady | ProofUnavailable}`
//!
//! Polling backs off exponentially between DA layer requests. Every sleep is
//! clipped to the time left before the round deadline, and no request is
//! issued at or after it.

use super::{
    AttestationProof, DataAvailabilityLayer, EncodedRequest, ProofStatus, RoundTarget,
    VerifierService,
};
use crate::config::AttestationConfig;
use crate::error::{OrchestratorError, OrchestratorResult};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttestationState {
    Idle,
    RequestPrepared,
    RoundTargeted,
    ProofPending,
    ProofReady,
    ProofUnavailable,
}

impl AttestationState {
    fn can_transition_to(self, next: AttestationState) -> bool {
        use AttestationState::*;
        matches!(
            (self, next),
            (Idle, RequestPrepared)
                | (RequestPrepared, RoundTargeted)
                | (RoundTargeted, ProofPending)
                | (ProofPending, ProofReady)
                | (ProofPending, ProofUnavailable)
        )
    }
}

impl fmt::Display for AttestationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

pub struct AttestationClient {
    verifier: Arc<dyn VerifierService>,
    da_layer: Arc<dyn DataAvailabilityLayer>,
    initial_backoff: Duration,
    max_backoff: Duration,
    state: AttestationState,
    request: Option<EncodedRequest>,
    target: Option<RoundTarget>,
    attempts: u32,
}

impl AttestationClient {
    pub fn new(
        verifier: Arc<dyn VerifierService>,
        da_layer: Arc<dyn DataAvailabilityLayer>,
        initial_backoff: Duration,
        max_backoff: Duration,
    ) -> Self {
        Self {
            verifier,
            da_layer,
            initial_backoff,
            max_backoff: max_backoff.max(initial_backoff),
            state: AttestationState::Idle,
            request: None,
            target: None,
            attempts: 0,
        }
    }

    pub fn from_config(
        verifier: Arc<dyn VerifierService>,
        da_layer: Arc<dyn DataAvailabilityLayer>,
        config: &AttestationConfig,
    ) -> Self {
        Self::new(
            verifier,
            da_layer,
            Duration::from_millis(config.initial_backoff_ms),
            Duration::from_millis(config.max_backoff_ms),
        )
    }

    pub fn state(&self) -> AttestationState {
        self.state
    }

    /// DA layer requests issued so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    fn transition(&mut self, next: AttestationState) -> OrchestratorResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(OrchestratorError::InvalidStateTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        debug!("Attestation {} -> {}", self.state, next);
        self.state = next;
        Ok(())
    }

    /// Ask the verifier for the encoded request of an underlying payment.
    /// A failure leaves the client idle so the call can be repeated.
    pub async fn prepare(&mut self, transaction_id: &str) -> OrchestratorResult<EncodedRequest> {
        if self.state != AttestationState::Idle {
            return Err(OrchestratorError::InvalidStateTransition {
                from: self.state.to_string(),
                to: AttestationState::RequestPrepared.to_string(),
            });
        }
        let request = self.verifier.prepare_request(transaction_id).await?;
        self.transition(AttestationState::RequestPrepared)?;
        info!("Attestation request prepared for {} ({} bytes)", transaction_id, request.0.len());
        self.request = Some(request.clone());
        Ok(request)
    }

    pub fn target_round(&mut self, target: RoundTarget) -> OrchestratorResult<()> {
        self.transition(AttestationState::RoundTargeted)?;
        info!("Targeting voting round {}", target.round_id);
        self.target = Some(target);
        Ok(())
    }

    /// Poll the DA layer until the proof is ready or the round deadline passes
    pub async fn await_proof(&mut self) -> OrchestratorResult<AttestationProof> {
        self.transition(AttestationState::ProofPending)?;
        let (Some(request), Some(target)) = (self.request.clone(), self.target) else {
            return Err(OrchestratorError::Internal(
                "attestation polled without request or round".to_string(),
            ));
        };

        let mut backoff = self.initial_backoff;
        loop {
            let now = Instant::now();
            if now >= target.deadline {
                self.transition(AttestationState::ProofUnavailable)?;
                crate::metrics::record_da_poll("expired");
                warn!(
                    "Round {} deadline passed after {} proof requests",
                    target.round_id, self.attempts
                );
                return Err(OrchestratorError::RoundExpired {
                    round_id: target.round_id,
                    attempts: self.attempts,
                });
            }

            self.attempts += 1;
            let polled = timeout(
                target.deadline - now,
                self.da_layer.get_proof(target.round_id, &request),
            )
            .await;

            match polled {
                Ok(Ok(ProofStatus::Ready(proof))) => {
                    if proof.round_id != target.round_id {
                        self.transition(AttestationState::ProofUnavailable)?;
                        return Err(OrchestratorError::Validation(format!(
                            "proof for round {} returned while polling round {}",
                            proof.round_id, target.round_id
                        )));
                    }
                    self.transition(AttestationState::ProofReady)?;
                    crate::metrics::record_da_poll("ready");
                    info!(
                        "Proof ready for round {} after {} requests ({} merkle nodes)",
                        target.round_id,
                        self.attempts,
                        proof.merkle_proof.len()
                    );
                    return Ok(proof);
                }
                Ok(Ok(ProofStatus::Pending)) => {
                    crate::metrics::record_da_poll("pending");
                    debug!("Proof for round {} not available yet (attempt {})", target.round_id, self.attempts);
                }
                Ok(Err(e)) if e.is_retryable() => {
                    crate::metrics::record_da_poll("transient");
                    warn!("DA layer request {} failed: {}", self.attempts, e);
                }
                Ok(Err(e)) => {
                    self.transition(AttestationState::ProofUnavailable)?;
                    crate::metrics::record_da_poll("failed");
                    return Err(e);
                }
                // Deadline reached mid-request; the loop head reports expiry
                Err(_) => continue,
            }

            let now = Instant::now();
            if now < target.deadline {
                sleep(backoff.min(target.deadline - now)).await;
            }
            backoff = (backoff * 2).min(self.max_backoff);
        }
    }

    /// Run prepare, target and poll in one go
    pub async fn fetch_proof(
        &mut self,
        transaction_id: &str,
        target: RoundTarget,
    ) -> OrchestratorResult<AttestationProof> {
        self.prepare(transaction_id).await?;
        self.target_round(target)?;
        self.await_proof().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attestation::da_layer::MockDataAvailabilityLayer;
    use crate::attestation::verifier::MockVerifierService;
    use ethers::types::Bytes;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    const TX_ID: &str = "EC0FC5F40FBE6AEAD31138898C71687B2902E462FD1BFEF3FB443BE5E2C018F9";

    fn verifier() -> MockVerifierService {
        let mut verifier = MockVerifierService::new();
        verifier
            .expect_prepare_request()
            .returning(|tx| Ok(EncodedRequest(Bytes::from(tx.as_bytes().to_vec()))));
        verifier
    }

    fn proof(round_id: u64) -> AttestationProof {
        AttestationProof {
            round_id,
            merkle_proof: vec![[7u8; 32]],
            response: Bytes::from(vec![1, 2, 3]),
        }
    }

    fn client(da: MockDataAvailabilityLayer) -> AttestationClient {
        AttestationClient::new(
            Arc::new(verifier()),
            Arc::new(da),
            Duration::from_secs(5),
            Duration::from_secs(30),
        )
    }

    /// DA layer whose requests never answer
    struct StalledDaLayer {
        calls: AtomicU32,
    }

    #[async_trait::async_trait]
    impl DataAvailabilityLayer for StalledDaLayer {
        async fn get_proof(
            &self,
            _round_id: u64,
            _request: &EncodedRequest,
        ) -> OrchestratorResult<ProofStatus> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            sleep(Duration::from_secs(3_600)).await;
            Ok(ProofStatus::Pending)
        }
    }

    fn target(round_id: u64, secs: u64) -> RoundTarget {
        RoundTarget {
            round_id,
            deadline: Instant::now() + Duration::from_secs(secs),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_pending_then_ready_makes_four_requests() {
        let mut da = MockDataAvailabilityLayer::new();
        let mut calls = 0;
        da.expect_get_proof().times(4).returning(move |round, _| {
            calls += 1;
            if calls <= 3 {
                Ok(ProofStatus::Pending)
            } else {
                Ok(ProofStatus::Ready(proof(round)))
            }
        });

        let mut client = client(da);
        let result = client.fetch_proof(TX_ID, target(42, 600)).await.unwrap();
        assert_eq!(result, proof(42));
        assert_eq!(client.attempts(), 4);
        assert_eq!(client.state(), AttestationState::ProofReady);
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_ready_expires_without_polling_past_deadline() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = seen.clone();
        let mut da = MockDataAvailabilityLayer::new();
        da.expect_get_proof().returning(move |_, _| {
            recorder.lock().unwrap().push(Instant::now());
            Ok(ProofStatus::Pending)
        });

        let mut client = client(da);
        let target = target(7, 60);
        let err = client.fetch_proof(TX_ID, target).await.unwrap_err();

        let seen = seen.lock().unwrap();
        assert!(!seen.is_empty());
        assert!(seen.iter().all(|at| *at < target.deadline));
        assert!(matches!(
            err,
            OrchestratorError::RoundExpired { round_id: 7, attempts } if attempts as usize == seen.len()
        ));
        assert_eq!(client.state(), AttestationState::ProofUnavailable);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_in_flight_at_deadline_expires_round() {
        let da = Arc::new(StalledDaLayer {
            calls: AtomicU32::new(0),
        });
        let mut client = AttestationClient::new(
            Arc::new(verifier()),
            da.clone(),
            Duration::from_secs(5),
            Duration::from_secs(30),
        );
        let target = target(11, 60);

        let err = client.fetch_proof(TX_ID, target).await.unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::RoundExpired {
                round_id: 11,
                attempts: 1
            }
        ));
        assert_eq!(da.calls.load(Ordering::SeqCst), 1);
        // Cut off at the deadline, not when the request would have returned
        assert!(Instant::now() < target.deadline + Duration::from_secs(1));
        assert_eq!(client.state(), AttestationState::ProofUnavailable);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_grows_and_is_capped() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = seen.clone();
        let start = Instant::now();
        let mut da = MockDataAvailabilityLayer::new();
        da.expect_get_proof().returning(move |_, _| {
            recorder.lock().unwrap().push(Instant::now());
            Ok(ProofStatus::Pending)
        });

        let mut client = client(da);
        let _ = client.fetch_proof(TX_ID, target(1, 100)).await;

        let offsets: Vec<u64> = seen
            .lock()
            .unwrap()
            .iter()
            .map(|at| (*at - start).as_secs())
            .collect();
        // 5, 10, 20, then capped at 30 and clipped to the deadline
        assert_eq!(offsets, vec![0, 5, 15, 35, 65, 95]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_retried() {
        let mut da = MockDataAvailabilityLayer::new();
        let mut calls = 0;
        da.expect_get_proof().times(2).returning(move |round, _| {
            calls += 1;
            if calls == 1 {
                Err(OrchestratorError::transient("da-layer", "503 Service Unavailable"))
            } else {
                Ok(ProofStatus::Ready(proof(round)))
            }
        });

        let mut client = client(da);
        assert!(client.fetch_proof(TX_ID, target(3, 600)).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_proof_is_not_retried() {
        let mut da = MockDataAvailabilityLayer::new();
        da.expect_get_proof()
            .times(1)
            .returning(|_, _| Err(OrchestratorError::Validation("merkle node has 2 bytes".into())));

        let mut client = client(da);
        let err = client.fetch_proof(TX_ID, target(3, 600)).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Validation(_)));
        assert_eq!(client.state(), AttestationState::ProofUnavailable);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_transaction_and_round_give_identical_payloads() {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let mut results = Vec::new();

        for _ in 0..2 {
            let recorder = requests.clone();
            let mut da = MockDataAvailabilityLayer::new();
            da.expect_get_proof().returning(move |round, request| {
                recorder.lock().unwrap().push((round, request.clone()));
                Ok(ProofStatus::Ready(proof(round)))
            });
            let mut client = client(da);
            results.push(client.fetch_proof(TX_ID, target(9, 600)).await.unwrap());
        }

        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0], requests[1]);
        assert_eq!(results[0], results[1]);
    }

    #[tokio::test]
    async fn test_polling_before_targeting_is_rejected() {
        let mut client = client(MockDataAvailabilityLayer::new());
        client.prepare(TX_ID).await.unwrap();

        assert!(matches!(
            client.await_proof().await,
            Err(OrchestratorError::InvalidStateTransition { .. })
        ));
        assert!(matches!(
            client.prepare(TX_ID).await,
            Err(OrchestratorError::InvalidStateTransition { .. })
        ));
    }
}
