use std::path::PathBuf;

use thiserror::Error;
use vidvault_crypto::CodecError;

pub type VaultResult<T> = Result<T, VaultError>;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("invalid key record: {0}")]
    InvalidRecord(String),

    #[error("invalid object name: {0:?}")]
    InvalidName(String),

    #[error("object not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VaultError {
    /// True when the stored ciphertext is corrupt rather than unreachable.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, VaultError::Codec(e) if e.is_corrupt())
    }
}
