//! Utility functions and helpers
//!
//! Hashing, signatures, transaction identities and the encoding helpers
//! used by the store and the gossip layer.

pub mod crypto;
pub mod serialization;

pub use crypto::{
    current_timestamp_micros, ecdsa_p256_sha256_sign_digest, ecdsa_p256_sha256_sign_verify,
    new_key_pair, next_timestamp_id, sha256_digest,
};

pub use serialization::{deserialize, from_json, serialize, to_json};
