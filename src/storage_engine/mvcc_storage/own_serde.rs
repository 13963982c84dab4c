use crate::error::Result;
use serde::{de::DeserializeOwned, Serialize};

/// Serializes MVCC metadata and stored documents.
pub fn serialize<V: Serialize>(value: &V) -> Result<Vec<u8>> {
    Ok(bincode::serialize(value)?)
}

/// Deserializes MVCC metadata and stored documents.
pub fn deserialize<V: DeserializeOwned>(bytes: &[u8]) -> Result<V> {
    Ok(bincode::deserialize(bytes)?)
}
