//! Payment attestation: verifier request preparation, voting round targeting
//! and proof retrieval from the data-availability layer

pub mod client;
pub mod da_layer;
pub mod round;
pub mod verifier;

pub use client::{AttestationClient, AttestationState};
pub use da_layer::{DataAvailabilityLayer, HttpDataAvailabilityLayer};
pub use round::{RoundSchedule, RoundTarget};
pub use verifier::{HttpVerifier, VerifierService};

use crate::error::{OrchestratorError, OrchestratorResult};

use ethers::types::Bytes;
use serde::{Deserialize, Serialize};

/// ABI-encoded attestation request as returned by the verifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedRequest(pub Bytes);

impl EncodedRequest {
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.0))
    }
}

/// Merkle proof and response for one attested payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationProof {
    pub round_id: u64,
    pub merkle_proof: Vec<[u8; 32]>,
    pub response: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProofStatus {
    Ready(AttestationProof),
    /// The round is not finalized or the request is not in it yet
    Pending,
}

/// Right-pad an ASCII name into a bytes32 (`"Payment"` → `0x5061796d656e74…00`)
pub fn encode_bytes32_name(name: &str) -> OrchestratorResult<[u8; 32]> {
    if name.is_empty() || name.len() > 32 || !name.is_ascii() {
        return Err(OrchestratorError::Config(format!(
            "{:?} cannot be encoded as bytes32",
            name
        )));
    }
    let mut out = [0u8; 32];
    out[..name.len()].copy_from_slice(name.as_bytes());
    Ok(out)
}

/// Join a base URL and a relative path with exactly one slash between them
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
