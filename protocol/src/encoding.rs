use serde::{de::DeserializeOwned, Serialize};

/// The single wire/storage encoder for the whole system.
///
/// Identifier derivation hashes canonical key bytes and the transaction log
/// is persisted through this module, so changing the configuration here is a
/// wire and storage format break.
pub fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>, bincode::error::EncodeError> {
    bincode::serde::encode_to_vec(value, bincode::config::legacy())
}

pub fn deserialize<T: DeserializeOwned>(data: &[u8]) -> Result<T, bincode::error::DecodeError> {
    bincode::serde::decode_from_slice(data, bincode::config::legacy()).map(|(data, _len)| data)
}
