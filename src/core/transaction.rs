// A transaction moves `amount` from the holder of `sender_public_key` to
// `recipient`. The timestamp doubles as its identity: it is the dedup key
// for intake and the ordering key for block assembly.

use crate::core::hasher::write_field;
use crate::error::{BlockchainError, Result};
use crate::utils::{ecdsa_p256_sha256_sign_digest, ecdsa_p256_sha256_sign_verify, next_timestamp_id};
use data_encoding::HEXLOWER;
use serde::{Deserialize, Serialize};

/// Transaction identity (its timestamp)
pub type TxId = String;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Transaction {
    sender_public_key: String, // hex, uncompressed P-256 point
    sender_signature: String,  // hex, fixed-width ECDSA signature
    recipient: String,
    amount: u64,
    timestamp: TxId,
}

impl Transaction {
    /// Sign a transfer with a fresh identity
    pub fn new_signed(pkcs8: &[u8], public_key: &[u8], recipient: &str, amount: u64) -> Result<Transaction> {
        Self::new_signed_at(pkcs8, public_key, recipient, amount, next_timestamp_id()?)
    }

    /// Sign a transfer with a caller-chosen identity
    pub fn new_signed_at(
        pkcs8: &[u8],
        public_key: &[u8],
        recipient: &str,
        amount: u64,
        timestamp: TxId,
    ) -> Result<Transaction> {
        if recipient.is_empty() {
            return Err(BlockchainError::Transaction(
                "Recipient must not be empty".to_string(),
            ));
        }
        if amount == 0 {
            return Err(BlockchainError::Transaction(
                "Transaction amount must be positive".to_string(),
            ));
        }
        if timestamp.is_empty() {
            return Err(BlockchainError::Transaction(
                "Transaction timestamp must not be empty".to_string(),
            ));
        }

        let sender_public_key = HEXLOWER.encode(public_key);
        let payload = Self::signing_payload(&sender_public_key, recipient, amount, &timestamp);
        let signature = ecdsa_p256_sha256_sign_digest(pkcs8, &payload)?;

        Ok(Transaction {
            sender_public_key,
            sender_signature: HEXLOWER.encode(&signature),
            recipient: recipient.to_string(),
            amount,
            timestamp,
        })
    }

    /// Assemble a transaction from already-signed parts without checking it
    pub fn from_parts(
        sender_public_key: String,
        sender_signature: String,
        recipient: String,
        amount: u64,
        timestamp: TxId,
    ) -> Transaction {
        Transaction {
            sender_public_key,
            sender_signature,
            recipient,
            amount,
            timestamp,
        }
    }

    fn signing_payload(public_key_hex: &str, recipient: &str, amount: u64, timestamp: &str) -> Vec<u8> {
        let mut payload = Vec::new();
        write_field(&mut payload, "amount", &amount.to_be_bytes());
        write_field(&mut payload, "recipient", recipient.as_bytes());
        write_field(&mut payload, "sender_public_key", public_key_hex.as_bytes());
        write_field(&mut payload, "timestamp", timestamp.as_bytes());
        payload
    }

    pub fn verify_signature(&self) -> bool {
        let (Ok(public_key), Ok(signature)) = (
            HEXLOWER.decode(self.sender_public_key.as_bytes()),
            HEXLOWER.decode(self.sender_signature.as_bytes()),
        ) else {
            return false;
        };
        let payload = Self::signing_payload(
            &self.sender_public_key,
            &self.recipient,
            self.amount,
            &self.timestamp,
        );
        ecdsa_p256_sha256_sign_verify(&public_key, &signature, &payload)
    }

    pub fn get_id(&self) -> &str {
        self.timestamp.as_str()
    }

    pub fn get_sender_public_key(&self) -> &str {
        self.sender_public_key.as_str()
    }

    pub fn get_sender_signature(&self) -> &str {
        self.sender_signature.as_str()
    }

    pub fn get_recipient(&self) -> &str {
        self.recipient.as_str()
    }

    pub fn get_amount(&self) -> u64 {
        self.amount
    }

    pub fn get_timestamp(&self) -> &str {
        self.timestamp.as_str()
    }
}
