//! Verifier client: turns an underlying transaction id into an ABI-encoded
//! attestation request

use super::{encode_bytes32_name, join_url, EncodedRequest};
use crate::config::{require_secret, AttestationConfig};
use crate::error::{OrchestratorError, OrchestratorResult};

use async_trait::async_trait;
use ethers::types::Bytes;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VerifierService: Send + Sync {
    async fn prepare_request(&self, transaction_id: &str) -> OrchestratorResult<EncodedRequest>;
}

/// `prepareRequest` body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrepareRequest {
    pub attestation_type: String,
    pub source_id: String,
    pub request_body: PaymentRequestBody,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequestBody {
    pub transaction_id: String,
    pub in_utxo: String,
    pub utxo: String,
}

/// `prepareRequest` response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrepareResponse {
    pub status: String,
    #[serde(default)]
    pub abi_encoded_request: Option<String>,
}

impl PrepareRequest {
    pub fn payment(attestation_type: &[u8; 32], source_id: &[u8; 32], transaction_id: &str) -> Self {
        Self {
            attestation_type: format!("0x{}", hex::encode(attestation_type)),
            source_id: format!("0x{}", hex::encode(source_id)),
            request_body: PaymentRequestBody {
                transaction_id: transaction_id.to_string(),
                in_utxo: "0".to_string(),
                utxo: "0".to_string(),
            },
        }
    }
}

/// Accept only a `VALID` response carrying a non-empty request
pub fn validate_prepare_response(response: PrepareResponse) -> OrchestratorResult<EncodedRequest> {
    if response.status != "VALID" {
        return Err(OrchestratorError::Validation(format!(
            "verifier rejected the request with status {}",
            response.status
        )));
    }
    let encoded = response
        .abi_encoded_request
        .as_deref()
        .map(|s| s.trim_start_matches("0x"))
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            OrchestratorError::Validation("verifier returned an empty abiEncodedRequest".to_string())
        })?;
    let bytes = hex::decode(encoded)
        .map_err(|e| OrchestratorError::Validation(format!("abiEncodedRequest is not hex: {}", e)))?;
    Ok(EncodedRequest(Bytes::from(bytes)))
}

/// Normalize an XRPL transaction hash to 64 uppercase hex characters
pub fn normalize_transaction_id(transaction_id: &str) -> OrchestratorResult<String> {
    let id = transaction_id.trim().trim_start_matches("0x");
    if id.len() != 64 || !id.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(OrchestratorError::Validation(format!(
            "{:?} is not a 32-byte transaction id",
            transaction_id
        )));
    }
    Ok(id.to_ascii_uppercase())
}

pub struct HttpVerifier {
    http: Client,
    url: String,
    api_key: String,
    attestation_type: [u8; 32],
    source_id: [u8; 32],
}

impl HttpVerifier {
    pub fn new(config: &AttestationConfig) -> OrchestratorResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| OrchestratorError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            url: join_url(&config.verifier_url, &config.verifier_path),
            api_key: require_secret(&config.api_key_env)?,
            attestation_type: encode_bytes32_name(&config.attestation_type)?,
            source_id: encode_bytes32_name(&config.source_id)?,
        })
    }
}

#[async_trait]
impl VerifierService for HttpVerifier {
    async fn prepare_request(&self, transaction_id: &str) -> OrchestratorResult<EncodedRequest> {
        let transaction_id = normalize_transaction_id(transaction_id)?;
        let body = PrepareRequest::payment(&self.attestation_type, &self.source_id, &transaction_id);

        debug!("Preparing attestation request for {}", transaction_id);
        let response = self
            .http
            .post(&self.url)
            .header("X-API-KEY", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(OrchestratorError::transient("verifier", status));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(OrchestratorError::Validation(format!(
                "verifier returned {}: {}",
                status, text
            )));
        }

        validate_prepare_response(response.json::<PrepareResponse>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        let body = PrepareRequest::payment(
            &encode_bytes32_name("Payment").unwrap(),
            &encode_bytes32_name("testXRP").unwrap(),
            "EC0FC5F40FBE6AEAD31138898C71687B2902E462FD1BFEF3FB443BE5E2C018F9",
        );
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json["attestationType"],
            "0x5061796d656e7400000000000000000000000000000000000000000000000000"
        );
        assert_eq!(json["requestBody"]["inUtxo"], "0");
        assert_eq!(json["requestBody"]["utxo"], "0");
        assert_eq!(
            json["requestBody"]["transactionId"],
            "EC0FC5F40FBE6AEAD31138898C71687B2902E462FD1BFEF3FB443BE5E2C018F9"
        );
    }

    #[test]
    fn test_only_valid_responses_pass() {
        let ok: PrepareResponse =
            serde_json::from_str(r#"{"status":"VALID","abiEncodedRequest":"0x0102"}"#).unwrap();
        assert_eq!(validate_prepare_response(ok).unwrap().0.to_vec(), vec![1, 2]);

        let invalid: PrepareResponse =
            serde_json::from_str(r#"{"status":"INVALID: TRANSACTION NOT FOUND"}"#).unwrap();
        assert!(validate_prepare_response(invalid).is_err());

        let empty: PrepareResponse =
            serde_json::from_str(r#"{"status":"VALID","abiEncodedRequest":"0x"}"#).unwrap();
        assert!(validate_prepare_response(empty).is_err());
    }

    #[test]
    fn test_transaction_id_normalization() {
        let id = "0xec0fc5f40fbe6aead31138898c71687b2902e462fd1bfef3fb443be5e2c018f9";
        assert_eq!(
            normalize_transaction_id(id).unwrap(),
            "EC0FC5F40FBE6AEAD31138898C71687B2902E462FD1BFEF3FB443BE5E2C018F9"
        );
        assert!(normalize_transaction_id("abc").is_err());
    }
}
