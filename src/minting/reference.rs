//! FAssets payment references
//!
//! A reference is 32 bytes: an 8-byte tag `0x4642505266410000 | type` followed
//! by the request id as a big-endian 192-bit integer. It travels as the XRPL
//! memo and must byte-match what the asset manager emitted.

use crate::error::{OrchestratorError, OrchestratorResult};

use ethers::types::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

const PREFIX: u64 = 0x4642_5052_6641_0000;
const TYPE_MASK: u64 = 0xffff;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferenceKind {
    Minting,
    Redemption,
}

impl ReferenceKind {
    fn tag(self) -> u64 {
        match self {
            ReferenceKind::Minting => 0x0001,
            ReferenceKind::Redemption => 0x0002,
        }
    }

    fn from_tag(tag: u64) -> Option<Self> {
        match tag {
            0x0001 => Some(ReferenceKind::Minting),
            0x0002 => Some(ReferenceKind::Redemption),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaymentReference([u8; 32]);

impl PaymentReference {
    pub fn minting(reservation_id: U256) -> OrchestratorResult<Self> {
        Self::encode(ReferenceKind::Minting, reservation_id)
    }

    pub fn redemption(request_id: U256) -> OrchestratorResult<Self> {
        Self::encode(ReferenceKind::Redemption, request_id)
    }

    pub fn encode(kind: ReferenceKind, id: U256) -> OrchestratorResult<Self> {
        if id.bits() > 192 {
            return Err(OrchestratorError::Validation(format!(
                "id {} does not fit in a payment reference",
                id
            )));
        }
        let mut bytes = [0u8; 32];
        id.to_big_endian(&mut bytes);
        bytes[..8].copy_from_slice(&(PREFIX | kind.tag()).to_be_bytes());
        Ok(Self(bytes))
    }

    /// Split a reference back into its kind and id
    pub fn decode(&self) -> OrchestratorResult<(ReferenceKind, U256)> {
        let mut head = [0u8; 8];
        head.copy_from_slice(&self.0[..8]);
        let head = u64::from_be_bytes(head);

        let kind = (head & !TYPE_MASK == PREFIX)
            .then(|| ReferenceKind::from_tag(head & TYPE_MASK))
            .flatten()
            .ok_or_else(|| {
                OrchestratorError::Validation(format!("{} is not an FAssets payment reference", self))
            })?;
        Ok((kind, U256::from_big_endian(&self.0[8..])))
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn from_hex(value: &str) -> OrchestratorResult<Self> {
        let raw = hex::decode(value.trim_start_matches("0x"))
            .map_err(|e| OrchestratorError::Validation(format!("invalid reference hex: {}", e)))?;
        let bytes: [u8; 32] = raw.try_into().map_err(|v: Vec<u8>| {
            OrchestratorError::Validation(format!("payment reference has {} bytes, expected 32", v.len()))
        })?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Uppercase hex, as carried in an XRPL `MemoData` field
    pub fn memo_hex(&self) -> String {
        hex::encode_upper(self.0)
    }
}

impl fmt::Display for PaymentReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_minting_reference() {
        let reference = PaymentReference::minting(U256::from(0xf655fbu64)).unwrap();
        assert_eq!(
            hex::encode(reference.as_bytes()),
            "4642505266410001000000000000000000000000000000000000000000f655fb"
        );
    }

    #[test]
    fn test_decode_recovers_kind_and_id() {
        for (kind, id) in [
            (ReferenceKind::Minting, U256::from(10_255_417u64)),
            (ReferenceKind::Redemption, U256::zero()),
            (ReferenceKind::Redemption, (U256::one() << 192) - U256::one()),
        ] {
            let reference = PaymentReference::encode(kind, id).unwrap();
            assert_eq!(reference.decode().unwrap(), (kind, id));
            assert_eq!(PaymentReference::from_hex(&reference.to_string()).unwrap(), reference);
        }
    }

    #[test]
    fn test_id_above_192_bits_is_rejected() {
        assert!(matches!(
            PaymentReference::minting(U256::one() << 192),
            Err(OrchestratorError::Validation(_))
        ));
    }

    #[test]
    fn test_foreign_prefix_is_rejected() {
        let reference = PaymentReference::from_bytes([0x11; 32]);
        assert!(reference.decode().is_err());
        assert!(PaymentReference::from_hex("abcd").is_err());
    }

    #[test]
    fn test_memo_is_uppercase_hex() {
        let reference = PaymentReference::minting(U256::from(0xf655fbu64)).unwrap();
        assert!(reference.memo_hex().ends_with("F655FB"));
        assert_eq!(reference.memo_hex().len(), 64);
    }
}
