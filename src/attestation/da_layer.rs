//! Data-availability layer client: proof lookup by voting round and request bytes

use super::{join_url, AttestationProof, EncodedRequest, ProofStatus};
use crate::config::AttestationConfig;
use crate::error::{OrchestratorError, OrchestratorResult};

use async_trait::async_trait;
use ethers::types::Bytes;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::trace;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DataAvailabilityLayer: Send + Sync {
    async fn get_proof(
        &self,
        round_id: u64,
        request: &EncodedRequest,
    ) -> OrchestratorResult<ProofStatus>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofRequest {
    pub voting_round_id: u64,
    pub request_bytes: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProofResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub proof: Option<Vec<String>>,
    #[serde(default)]
    pub response_hex: Option<String>,
    #[serde(default)]
    pub response: Option<serde_json::Value>,
}

/// Classify a decoded proof response
pub fn interpret_proof_response(round_id: u64, body: ProofResponse) -> OrchestratorResult<ProofStatus> {
    if let Some(status) = &body.status {
        if !status.eq_ignore_ascii_case("ok") {
            trace!("DA layer status {} for round {}", status, round_id);
            return Ok(ProofStatus::Pending);
        }
    }

    let response_hex = body.response_hex.or_else(|| match body.response {
        Some(serde_json::Value::String(s)) => Some(s),
        _ => None,
    });
    let (Some(nodes), Some(response_hex)) = (body.proof, response_hex) else {
        return Ok(ProofStatus::Pending);
    };

    let merkle_proof = nodes
        .iter()
        .map(|node| decode_node(node))
        .collect::<OrchestratorResult<Vec<_>>>()?;
    let response = hex::decode(response_hex.trim_start_matches("0x"))
        .map_err(|e| OrchestratorError::Validation(format!("proof response is not hex: {}", e)))?;
    if response.is_empty() {
        return Err(OrchestratorError::Validation("proof response is empty".to_string()));
    }

    Ok(ProofStatus::Ready(AttestationProof {
        round_id,
        merkle_proof,
        response: Bytes::from(response),
    }))
}

fn decode_node(node: &str) -> OrchestratorResult<[u8; 32]> {
    let raw = hex::decode(node.trim_start_matches("0x"))
        .map_err(|e| OrchestratorError::Validation(format!("merkle node is not hex: {}", e)))?;
    raw.try_into().map_err(|raw: Vec<u8>| {
        OrchestratorError::Validation(format!("merkle node has {} bytes, expected 32", raw.len()))
    })
}

pub struct HttpDataAvailabilityLayer {
    http: Client,
    url: String,
    api_key: Option<String>,
}

impl HttpDataAvailabilityLayer {
    pub fn new(config: &AttestationConfig) -> OrchestratorResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| OrchestratorError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            url: join_url(&config.da_layer_url, &config.proof_path),
            api_key: std::env::var(&config.api_key_env).ok(),
        })
    }
}

#[async_trait]
impl DataAvailabilityLayer for HttpDataAvailabilityLayer {
    async fn get_proof(
        &self,
        round_id: u64,
        request: &EncodedRequest,
    ) -> OrchestratorResult<ProofStatus> {
        let body = ProofRequest {
            voting_round_id: round_id,
            request_bytes: request.to_hex(),
        };

        let mut post = self.http.post(&self.url).json(&body);
        if let Some(key) = &self.api_key {
            post = post.header("X-API-KEY", key);
        }
        let response = post.send().await?;

        let status = response.status();
        match status.as_u16() {
            // Request not known to the DA layer yet
            400 | 404 | 425 => return Ok(ProofStatus::Pending),
            _ if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS => {
                return Err(OrchestratorError::transient("da-layer", status))
            }
            _ if !status.is_success() => {
                return Err(OrchestratorError::Validation(format!("DA layer returned {}", status)))
            }
            _ => {}
        }

        interpret_proof_response(round_id, response.json::<ProofResponse>().await?)
    }
}
