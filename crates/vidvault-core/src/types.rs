//! Key material as exchanged with the record store.
//!
//! The codec deals in raw bytes; the web layer persists keys and headers as
//! lowercase hex next to the object's name. This is the one place that
//! conversion happens.

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use vidvault_crypto::{PublicHeader, SecretKey, HEADER_SIZE, KEY_SIZE};

use crate::error::{VaultError, VaultResult};

/// Hex-encoded key and header for one encrypted object.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    pub key_hex: String,
    pub header_hex: String,
}

impl KeyRecord {
    pub fn new(key: &SecretKey, header: &PublicHeader) -> Self {
        Self {
            key_hex: hex::encode(key.as_bytes()),
            header_hex: hex::encode(header.as_bytes()),
        }
    }

    pub fn secret_key(&self) -> VaultResult<SecretKey> {
        let mut bytes = hex::decode(self.key_hex.trim())
            .map_err(|e| VaultError::InvalidRecord(format!("key is not hex: {e}")))?;
        let key = SecretKey::from_slice(&bytes).map_err(|_| {
            VaultError::InvalidRecord(format!(
                "key must be {KEY_SIZE} bytes, got {}",
                bytes.len()
            ))
        });
        bytes.zeroize();
        key
    }

    pub fn public_header(&self) -> VaultResult<PublicHeader> {
        let bytes = hex::decode(self.header_hex.trim())
            .map_err(|e| VaultError::InvalidRecord(format!("header is not hex: {e}")))?;
        PublicHeader::from_slice(&bytes).map_err(|_| {
            VaultError::InvalidRecord(format!(
                "header must be {HEADER_SIZE} bytes, got {}",
                bytes.len()
            ))
        })
    }

    pub fn to_json(&self) -> VaultResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| VaultError::InvalidRecord(format!("serializing record: {e}")))
    }

    pub fn from_json(json: &str) -> VaultResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| VaultError::InvalidRecord(format!("parsing record: {e}")))
    }
}

impl Drop for KeyRecord {
    fn drop(&mut self) {
        self.key_hex.zeroize();
    }
}

impl std::fmt::Debug for KeyRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRecord")
            .field("key_hex", &"[REDACTED]")
            .field("header_hex", &self.header_hex)
            .finish()
    }
}

/// What a vault ingest hands back to the record store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredObject {
    /// File name of the container inside the encrypted directory
    pub encrypted_filename: String,
    #[serde(flatten)]
    pub record: KeyRecord,
    pub plaintext_bytes: u64,
    pub container_bytes: u64,
}
