// Store values are bincode 2.0 (standard config); gossip packages are JSON.
use crate::error::{BlockchainError, Result};
use serde::{Deserialize, Serialize};

/// Encode a value for the key-value store
pub fn serialize<T: bincode::Encode>(data: &T) -> Result<Vec<u8>> {
    let config = bincode::config::standard();
    bincode::encode_to_vec(data, config)
        .map_err(|e| BlockchainError::Serialization(format!("Serialization failed: {e}")))
}

/// Decode a value read from the key-value store
pub fn deserialize<T: bincode::Decode<()>>(bytes: &[u8]) -> Result<T> {
    let config = bincode::config::standard();
    let (data, read) = bincode::decode_from_slice(bytes, config)
        .map_err(|e| BlockchainError::Serialization(format!("Deserialization failed: {e}")))?;
    if read != bytes.len() {
        return Err(BlockchainError::Serialization(format!(
            "Trailing bytes after value: read {read} of {}",
            bytes.len()
        )));
    }
    Ok(data)
}

pub fn to_json<T: Serialize>(data: &T) -> Result<String> {
    Ok(serde_json::to_string(data)?)
}

pub fn from_json<T: for<'de> Deserialize<'de>>(text: &str) -> Result<T> {
    Ok(serde_json::from_str(text)?)
}
