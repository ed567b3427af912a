//! Per-object secret key and public stream header

use rand::RngCore;
use zeroize::Zeroize;

use crate::error::{CodecError, CodecResult};
use crate::{HEADER_SIZE, KEY_SIZE};

/// A per-object 256-bit stream key. Zeroized on drop.
#[derive(Clone)]
pub struct SecretKey {
    bytes: [u8; KEY_SIZE],
}

impl SecretKey {
    /// Generate a fresh random key. One key per encrypted object.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn from_slice(bytes: &[u8]) -> CodecResult<Self> {
        let bytes: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| CodecError::InvalidLength {
            what: "secret key",
            expected: KEY_SIZE,
            actual: bytes.len(),
        })?;
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for SecretKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// The public header written at the start of every container.
///
/// Not secret, but required (together with the key) to start decrypting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicHeader {
    bytes: [u8; HEADER_SIZE],
}

impl PublicHeader {
    pub fn from_bytes(bytes: [u8; HEADER_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn from_slice(bytes: &[u8]) -> CodecResult<Self> {
        let bytes: [u8; HEADER_SIZE] =
            bytes.try_into().map_err(|_| CodecError::InvalidLength {
                what: "stream header",
                expected: HEADER_SIZE,
                actual: bytes.len(),
            })?;
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8; HEADER_SIZE] {
        &self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_keys_differ() {
        let k1 = SecretKey::generate();
        let k2 = SecretKey::generate();
        assert_ne!(k1.as_bytes(), k2.as_bytes(), "random keys must differ");
    }

    #[test]
    fn test_key_from_slice_checks_length() {
        assert!(SecretKey::from_slice(&[7u8; KEY_SIZE]).is_ok());
        let err = SecretKey::from_slice(&[7u8; 31]).unwrap_err();
        assert!(matches!(
            err,
            CodecError::InvalidLength { expected: 32, actual: 31, .. }
        ));
    }

    #[test]
    fn test_header_from_slice_checks_length() {
        let header = PublicHeader::from_slice(&[1u8; HEADER_SIZE]).unwrap();
        assert_eq!(header.as_bytes(), &[1u8; HEADER_SIZE]);
        assert!(PublicHeader::from_slice(&[1u8; HEADER_SIZE + 1]).is_err());
    }

    #[test]
    fn test_key_debug_is_redacted() {
        let key = SecretKey::from_bytes([0xAB; KEY_SIZE]);
        let rendered = format!("{key:?}");
        assert!(rendered.contains("REDACTED"));
        assert!(!rendered.contains("171"));
    }
}
