//! vidvault-storage: encrypted object directory
//!
//! Uploads arrive as plaintext in a temp directory, are sealed into
//! `<name>.enc` containers, and are streamed back out through the decoder.

pub mod vault;

pub use vault::{validate_name, Vault, ENCRYPTED_SUFFIX};
