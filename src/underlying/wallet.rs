//! XRPL account keys derived from a secp256k1 family seed
//!
//! Transactions are signed in process; the seed never leaves this type.

use super::codec::{
    decode_base58check, encode_classic_address, transaction_id, PaymentFields,
};
use crate::error::{OrchestratorError, OrchestratorResult};

use k256::ecdsa::signature::hazmat::PrehashSigner;
use k256::ecdsa::{Signature, SigningKey};
use k256::elliptic_curve::{Field, PrimeField};
use k256::{FieldBytes, Scalar};
use ripemd::Ripemd160;
use sha2::{Digest, Sha256, Sha512};
use std::fmt;

const SECP256K1_SEED_VERSION: u8 = 0x21;
const ED25519_SEED_PREFIX: [u8; 3] = [0x01, 0xe1, 0x4b];

/// A signed transaction ready for `submit`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    /// Upper-case hex blob
    pub blob: String,
    pub hash: String,
}

pub struct XrplWallet {
    signing_key: SigningKey,
    public_key: [u8; 33],
    account_id: [u8; 20],
}

impl fmt::Debug for XrplWallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XrplWallet")
            .field("address", &self.classic_address())
            .finish_non_exhaustive()
    }
}

impl XrplWallet {
    pub fn from_seed(seed: &str) -> OrchestratorResult<Self> {
        let payload = decode_base58check("XRPL secret", seed.trim())
            .map_err(|_| OrchestratorError::Config("XRPL secret is not a family seed".to_string()))?;
        let entropy = match payload.split_first() {
            Some((&SECP256K1_SEED_VERSION, entropy)) if entropy.len() == 16 => entropy,
            _ if payload.starts_with(&ED25519_SEED_PREFIX) => {
                return Err(OrchestratorError::Config(
                    "ed25519 XRPL seeds are not supported, use a secp256k1 seed".to_string(),
                ))
            }
            _ => {
                return Err(OrchestratorError::Config(
                    "XRPL secret is not a family seed".to_string(),
                ))
            }
        };

        let root = derive_scalar(entropy, None)?;
        let root_public = compressed_public_key(&signing_key(&root)?);
        let intermediate = derive_scalar(&root_public, Some(0))?;
        let account_key = signing_key(&(root + intermediate))?;

        let public_key = compressed_public_key(&account_key);
        let account_id = account_id(&public_key);
        Ok(Self {
            signing_key: account_key,
            public_key,
            account_id,
        })
    }

    pub fn classic_address(&self) -> String {
        encode_classic_address(&self.account_id)
    }

    pub fn account_id(&self) -> [u8; 20] {
        self.account_id
    }

    pub fn sign(&self, payment: &PaymentFields) -> OrchestratorResult<SignedTransaction> {
        let hash = payment.signing_hash(&self.public_key)?;
        let signature: Signature = self
            .signing_key
            .sign_prehash(&hash)
            .map_err(|e| OrchestratorError::Internal(format!("XRPL signing failed: {}", e)))?;
        // rippled only accepts low-S signatures
        let signature = signature.normalize_s().unwrap_or(signature);
        let der = signature.to_der();

        let blob = payment.serialize(&self.public_key, Some(der.as_bytes()))?;
        Ok(SignedTransaction {
            hash: transaction_id(&blob),
            blob: hex::encode_upper(&blob),
        })
    }
}

/// First SHA-512 half of `bytes || discriminator || counter` that is a valid scalar
fn derive_scalar(bytes: &[u8], discriminator: Option<u32>) -> OrchestratorResult<Scalar> {
    for counter in 0..=u32::MAX {
        let mut hasher = Sha512::new();
        hasher.update(bytes);
        if let Some(discriminator) = discriminator {
            hasher.update(discriminator.to_be_bytes());
        }
        hasher.update(counter.to_be_bytes());
        let digest = hasher.finalize();

        let candidate: Option<Scalar> =
            <Scalar as PrimeField>::from_repr(FieldBytes::clone_from_slice(&digest[..32])).into();
        if let Some(scalar) = candidate {
            if !bool::from(Field::is_zero(&scalar)) {
                return Ok(scalar);
            }
        }
    }
    Err(OrchestratorError::Internal("seed yields no valid key".to_string()))
}

fn signing_key(scalar: &Scalar) -> OrchestratorResult<SigningKey> {
    SigningKey::from_bytes(&scalar.to_repr())
        .map_err(|_| OrchestratorError::Internal("derived key is out of range".to_string()))
}

fn compressed_public_key(key: &SigningKey) -> [u8; 33] {
    let point = key.verifying_key().to_encoded_point(true);
    let mut public_key = [0u8; 33];
    public_key.copy_from_slice(point.as_bytes());
    public_key
}

fn account_id(public_key: &[u8; 33]) -> [u8; 20] {
    let digest = Ripemd160::digest(Sha256::digest(public_key));
    let mut id = [0u8; 20];
    id.copy_from_slice(&digest);
    id
}
