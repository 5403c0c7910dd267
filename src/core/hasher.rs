//! Block hashing
//!
//! A block's seal covers its previous hash and its transaction map. The
//! content is laid out as length-prefixed `name, value` pairs in sorted
//! field-name order, so two blocks with the same content hash the same no
//! matter how their maps were built. The nonce is appended last as eight
//! big-endian bytes.

use crate::core::{Transaction, TxId, UnsealedBlock};
use crate::error::{BlockchainError, Result};
use crate::utils::sha256_digest;
use ring::digest::{Context, SHA256};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

pub const DIGEST_LEN: usize = 32;

// Sorted; the canonical layout depends on this order
const BLOCK_FIELDS: [&str; 2] = ["previous_hash", "transactions"];
const TRANSACTION_FIELDS: [&str; 5] = [
    "amount",
    "recipient",
    "sender_public_key",
    "sender_signature",
    "timestamp",
];

/// SHA-256 output identifying a sealed block.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, bincode::Encode, bincode::Decode)]
pub struct Digest([u8; DIGEST_LEN]);

impl Digest {
    /// Predecessor of the first block in every chain
    pub const GENESIS: Digest = Digest([0; DIGEST_LEN]);

    pub fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Digest {
        Digest(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(text: &str) -> Result<Digest> {
        let mut bytes = [0u8; DIGEST_LEN];
        hex::decode_to_slice(text, &mut bytes)
            .map_err(|e| BlockchainError::Serialization(format!("Invalid digest '{text}': {e}")))?;
        Ok(Digest(bytes))
    }

    /// Number of leading `0` characters in the hex form
    pub fn leading_zero_nibbles(&self) -> usize {
        let mut count = 0;
        for byte in self.0 {
            if byte == 0 {
                count += 2;
            } else {
                if byte >> 4 == 0 {
                    count += 1;
                }
                break;
            }
        }
        count
    }

    pub fn meets_difficulty(&self, difficulty: usize) -> bool {
        self.leading_zero_nibbles() >= difficulty
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Digest::from_hex(&text).map_err(serde::de::Error::custom)
    }
}

pub(crate) fn write_field(out: &mut Vec<u8>, name: &str, value: &[u8]) {
    out.extend((name.len() as u64).to_be_bytes());
    out.extend(name.as_bytes());
    out.extend((value.len() as u64).to_be_bytes());
    out.extend(value);
}

fn canonical_transaction(tx: &Transaction) -> Vec<u8> {
    let amount = tx.get_amount().to_be_bytes();
    let values: [&[u8]; 5] = [
        &amount,
        tx.get_recipient().as_bytes(),
        tx.get_sender_public_key().as_bytes(),
        tx.get_sender_signature().as_bytes(),
        tx.get_timestamp().as_bytes(),
    ];
    let mut out = Vec::new();
    for (name, value) in TRANSACTION_FIELDS.iter().zip(values) {
        write_field(&mut out, name, value);
    }
    out
}

pub fn canonical_bytes(previous_hash: &Digest, transactions: &BTreeMap<TxId, Transaction>) -> Vec<u8> {
    let mut txs = Vec::new();
    for (id, tx) in transactions {
        write_field(&mut txs, id, &canonical_transaction(tx));
    }

    let mut out = Vec::new();
    write_field(&mut out, BLOCK_FIELDS[0], previous_hash.as_bytes());
    write_field(&mut out, BLOCK_FIELDS[1], &txs);
    out
}

/// Hash of an unsealed block with the given nonce.
pub fn digest(unsealed: &UnsealedBlock, nonce: u64) -> Digest {
    digest_content(unsealed.get_previous_hash(), unsealed.get_transactions(), nonce)
}

pub fn digest_content(
    previous_hash: &Digest,
    transactions: &BTreeMap<TxId, Transaction>,
    nonce: u64,
) -> Digest {
    let mut data = canonical_bytes(previous_hash, transactions);
    data.extend(nonce.to_be_bytes());
    Digest(sha256_digest(&data))
}

/// Hashing state with the block content already absorbed, so a nonce
/// search only pays for the last eight bytes of each trial.
pub struct PreparedHasher {
    context: Context,
}

impl PreparedHasher {
    pub fn new(previous_hash: &Digest, transactions: &BTreeMap<TxId, Transaction>) -> Self {
        let mut context = Context::new(&SHA256);
        context.update(&canonical_bytes(previous_hash, transactions));
        PreparedHasher { context }
    }

    pub fn digest(&self, nonce: u64) -> Digest {
        let mut context = self.context.clone();
        context.update(&nonce.to_be_bytes());
        let mut out = [0u8; DIGEST_LEN];
        out.copy_from_slice(context.finish().as_ref());
        Digest(out)
    }
}
