//! XRPL binary encoding for the payments this client signs
//!
//! Only the fields of a single-memo XRP payment are encoded, in canonical
//! (type code, field code) order.

use crate::error::{OrchestratorError, OrchestratorResult};

use sha2::{Digest, Sha256, Sha512};

/// Hash prefix of the single-signing payload ("STX\0")
const SIGNING_PREFIX: [u8; 4] = [0x53, 0x54, 0x58, 0x00];
/// Hash prefix of a signed transaction id ("TXN\0")
const TX_ID_PREFIX: [u8; 4] = [0x54, 0x58, 0x4e, 0x00];

const ACCOUNT_ID_VERSION: u8 = 0x00;

// Field headers, (type << 4) | field where both fit in a nibble
const TRANSACTION_TYPE: &[u8] = &[0x12];
const SEQUENCE: &[u8] = &[0x24];
const LAST_LEDGER_SEQUENCE: &[u8] = &[0x20, 0x1b];
const AMOUNT: &[u8] = &[0x61];
const FEE: &[u8] = &[0x68];
const SIGNING_PUB_KEY: &[u8] = &[0x73];
const TXN_SIGNATURE: &[u8] = &[0x74];
const ACCOUNT: &[u8] = &[0x81];
const DESTINATION: &[u8] = &[0x83];
const MEMOS: &[u8] = &[0xf9];
const MEMO: &[u8] = &[0xea];
const MEMO_DATA: &[u8] = &[0x7d];
const OBJECT_END: u8 = 0xe1;
const ARRAY_END: u8 = 0xf1;

const PAYMENT: u16 = 0;
/// Total XRP supply in drops
const MAX_DROPS: u64 = 100_000_000_000_000_000;

/// First half of SHA-512 over the concatenated parts
pub fn sha512_half(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha512::new();
    for part in parts {
        hasher.update(part);
    }
    let digest = hasher.finalize();
    let mut half = [0u8; 32];
    half.copy_from_slice(&digest[..32]);
    half
}

fn checksum(payload: &[u8]) -> [u8; 4] {
    let digest = Sha256::digest(Sha256::digest(payload));
    [digest[0], digest[1], digest[2], digest[3]]
}

/// Decode a ripple-alphabet base58check string; the version byte stays in front
pub fn decode_base58check(what: &str, encoded: &str) -> OrchestratorResult<Vec<u8>> {
    let invalid = || OrchestratorError::Validation(format!("{} is not valid base58check", what));
    let raw = bs58::decode(encoded)
        .with_alphabet(bs58::Alphabet::RIPPLE)
        .into_vec()
        .map_err(|_| invalid())?;
    if raw.len() < 5 {
        return Err(invalid());
    }
    let (payload, check) = raw.split_at(raw.len() - 4);
    if checksum(payload) != check {
        return Err(invalid());
    }
    Ok(payload.to_vec())
}

pub fn encode_base58check(payload: &[u8]) -> String {
    let mut raw = payload.to_vec();
    raw.extend_from_slice(&checksum(payload));
    bs58::encode(raw)
        .with_alphabet(bs58::Alphabet::RIPPLE)
        .into_string()
}

/// 20-byte account id behind a classic address
pub fn decode_classic_address(address: &str) -> OrchestratorResult<[u8; 20]> {
    let payload = decode_base58check(address, address)?;
    match payload.split_first() {
        Some((&ACCOUNT_ID_VERSION, id)) if id.len() == 20 => {
            let mut account_id = [0u8; 20];
            account_id.copy_from_slice(id);
            Ok(account_id)
        }
        _ => Err(OrchestratorError::Validation(format!(
            "{} is not an XRPL classic address",
            address
        ))),
    }
}

pub fn encode_classic_address(account_id: &[u8; 20]) -> String {
    let mut payload = Vec::with_capacity(21);
    payload.push(ACCOUNT_ID_VERSION);
    payload.extend_from_slice(account_id);
    encode_base58check(&payload)
}

/// Native amount: positive flag set, no issued-currency bit
fn xrp_amount(drops: u64) -> OrchestratorResult<[u8; 8]> {
    if drops > MAX_DROPS {
        return Err(OrchestratorError::Validation(format!(
            "{} drops exceeds the XRP supply",
            drops
        )));
    }
    Ok((drops | 0x4000_0000_0000_0000).to_be_bytes())
}

fn push_vl(out: &mut Vec<u8>, data: &[u8]) -> OrchestratorResult<()> {
    let len = data.len();
    match len {
        0..=192 => out.push(len as u8),
        193..=12_480 => {
            let rest = len - 193;
            out.push(193 + (rest >> 8) as u8);
            out.push((rest & 0xff) as u8);
        }
        _ => {
            return Err(OrchestratorError::Validation(format!(
                "{}-byte field is too long to encode",
                len
            )))
        }
    }
    out.extend_from_slice(data);
    Ok(())
}

/// An XRP payment carrying one memo
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentFields {
    pub account: [u8; 20],
    pub destination: [u8; 20],
    pub amount_drops: u64,
    pub fee_drops: u64,
    pub sequence: u32,
    pub last_ledger_sequence: u32,
    pub memo: Vec<u8>,
}

impl PaymentFields {
    /// Canonical encoding; the signature is left out of the signing payload
    pub fn serialize(
        &self,
        signing_pub_key: &[u8],
        signature: Option<&[u8]>,
    ) -> OrchestratorResult<Vec<u8>> {
        let mut out = Vec::with_capacity(256);
        out.extend_from_slice(TRANSACTION_TYPE);
        out.extend_from_slice(&PAYMENT.to_be_bytes());
        out.extend_from_slice(SEQUENCE);
        out.extend_from_slice(&self.sequence.to_be_bytes());
        out.extend_from_slice(LAST_LEDGER_SEQUENCE);
        out.extend_from_slice(&self.last_ledger_sequence.to_be_bytes());
        out.extend_from_slice(AMOUNT);
        out.extend_from_slice(&xrp_amount(self.amount_drops)?);
        out.extend_from_slice(FEE);
        out.extend_from_slice(&xrp_amount(self.fee_drops)?);
        out.extend_from_slice(SIGNING_PUB_KEY);
        push_vl(&mut out, signing_pub_key)?;
        if let Some(signature) = signature {
            out.extend_from_slice(TXN_SIGNATURE);
            push_vl(&mut out, signature)?;
        }
        out.extend_from_slice(ACCOUNT);
        push_vl(&mut out, &self.account)?;
        out.extend_from_slice(DESTINATION);
        push_vl(&mut out, &self.destination)?;
        out.extend_from_slice(MEMOS);
        out.extend_from_slice(MEMO);
        out.extend_from_slice(MEMO_DATA);
        push_vl(&mut out, &self.memo)?;
        out.push(OBJECT_END);
        out.push(ARRAY_END);
        Ok(out)
    }

    /// Digest a single signer signs
    pub fn signing_hash(&self, signing_pub_key: &[u8]) -> OrchestratorResult<[u8; 32]> {
        let payload = self.serialize(signing_pub_key, None)?;
        Ok(sha512_half(&[&SIGNING_PREFIX[..], &payload[..]]))
    }
}

/// Transaction id of a signed blob, as rippled reports it
pub fn transaction_id(signed_blob: &[u8]) -> String {
    hex::encode_upper(sha512_half(&[&TX_ID_PREFIX[..], signed_blob]))
}
