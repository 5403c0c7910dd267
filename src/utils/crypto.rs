use ring::digest::{Context, SHA256, SHA256_OUTPUT_LEN};
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, ECDSA_P256_SHA256_FIXED, ECDSA_P256_SHA256_FIXED_SIGNING};

use crate::error::{BlockchainError, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

// Width of a transaction identity; u64 microseconds never exceed 20 digits
const TIMESTAMP_WIDTH: usize = 20;

static LAST_TIMESTAMP: AtomicU64 = AtomicU64::new(0);

pub fn current_timestamp_micros() -> Result<u64> {
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| BlockchainError::Crypto(format!("System time error: {e}")))?
        .as_micros();

    u64::try_from(duration).map_err(|_| BlockchainError::Crypto("Timestamp overflow".to_string()))
}

/// Produce a transaction identity: zero-padded microseconds since the epoch.
///
/// Identities are strictly increasing within the process, even when the
/// clock is coarse or steps backwards, and sort lexically in time order.
pub fn next_timestamp_id() -> Result<String> {
    let now = current_timestamp_micros()?;
    let mut last = LAST_TIMESTAMP.load(Ordering::Relaxed);
    loop {
        let next = now.max(last + 1);
        match LAST_TIMESTAMP.compare_exchange_weak(last, next, Ordering::SeqCst, Ordering::Relaxed)
        {
            Ok(_) => return Ok(format!("{next:0width$}", width = TIMESTAMP_WIDTH)),
            Err(observed) => last = observed,
        }
    }
}

pub fn sha256_digest(data: &[u8]) -> [u8; SHA256_OUTPUT_LEN] {
    let mut context = Context::new(&SHA256);
    context.update(data);
    let digest = context.finish();
    let mut out = [0u8; SHA256_OUTPUT_LEN];
    out.copy_from_slice(digest.as_ref());
    out
}

pub fn new_key_pair() -> Result<Vec<u8>> {
    let rng = SystemRandom::new();
    let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &rng)
        .map_err(|e| BlockchainError::Crypto(format!("Failed to generate ECDSA key pair: {e}")))?
        .as_ref()
        .to_vec();
    Ok(pkcs8)
}

pub fn ecdsa_p256_sha256_sign_digest(pkcs8: &[u8], message: &[u8]) -> Result<Vec<u8>> {
    let rng = SystemRandom::new();
    let key_pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8, &rng)
        .map_err(|e| {
            BlockchainError::Crypto(format!("Failed to create key pair from PKCS8: {e}"))
        })?;
    let signature = key_pair
        .sign(&rng, message)
        .map_err(|e| BlockchainError::Crypto(format!("Failed to sign message: {e}")))?
        .as_ref()
        .to_vec();
    Ok(signature)
}

pub fn ecdsa_p256_sha256_sign_verify(public_key: &[u8], signature: &[u8], message: &[u8]) -> bool {
    let peer_public_key =
        ring::signature::UnparsedPublicKey::new(&ECDSA_P256_SHA256_FIXED, public_key);
    peer_public_key.verify(message, signature).is_ok()
}
