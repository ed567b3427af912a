use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use vidvault_crypto::{DecodeOptions, EncodeOptions, LEGACY_CHUNK_SIZE, MAX_FRAME_LEN};

use crate::error::{VaultError, VaultResult};

/// Top-level configuration (loaded from vidvault.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    pub storage: StorageConfig,
    pub codec: CodecConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Where plaintext uploads land before encryption
    pub temp_dir: PathBuf,
    /// Where `.enc` containers are kept
    pub encrypted_dir: PathBuf,
}

/// Container codec settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Plaintext bytes per MESSAGE frame when encrypting (default: 65536)
    pub chunk_size: usize,
    /// Plaintext bytes per chunk when reading legacy containers (default: 65536)
    pub legacy_chunk_size: usize,
    /// Refuse frames declaring more ciphertext than this (default: 100 MiB)
    pub max_frame_len: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl VaultConfig {
    /// Read and parse a TOML config file.
    pub fn load(path: &Path) -> VaultResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = toml::from_str(&content)
            .map_err(|e| VaultError::Config(format!("{}: {e}", path.display())))?;
        debug!(path = %path.display(), "config loaded");
        Ok(config)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            temp_dir: PathBuf::from("uploads/temp"),
            encrypted_dir: PathBuf::from("uploads/encrypted"),
        }
    }
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            chunk_size: vidvault_crypto::DEFAULT_CHUNK_SIZE,
            legacy_chunk_size: LEGACY_CHUNK_SIZE,
            max_frame_len: MAX_FRAME_LEN,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl CodecConfig {
    pub fn encode_options(&self) -> VaultResult<EncodeOptions> {
        EncodeOptions::with_chunk_size(self.chunk_size)
            .map_err(|e| VaultError::Config(format!("codec.chunk_size: {e}")))
    }

    pub fn decode_options(&self) -> VaultResult<DecodeOptions> {
        if self.legacy_chunk_size == 0 {
            return Err(VaultError::Config(
                "codec.legacy_chunk_size must be > 0".into(),
            ));
        }
        if self.legacy_chunk_size != LEGACY_CHUNK_SIZE {
            warn!(
                legacy_chunk_size = self.legacy_chunk_size,
                "non-default legacy chunk size; legacy containers written with {LEGACY_CHUNK_SIZE} byte chunks will fail to decode"
            );
        }
        Ok(DecodeOptions {
            format: None,
            legacy_chunk_size: self.legacy_chunk_size,
            max_frame_len: self.max_frame_len,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[storage]
temp_dir = "/srv/vidvault/temp"
encrypted_dir = "/srv/vidvault/encrypted"

[codec]
chunk_size = 131072
legacy_chunk_size = 65536
max_frame_len = 1048576

[logging]
level = "debug"
format = "json"
"#;
        let config: VaultConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.storage.temp_dir, PathBuf::from("/srv/vidvault/temp"));
        assert_eq!(
            config.storage.encrypted_dir,
            PathBuf::from("/srv/vidvault/encrypted")
        );
        assert_eq!(config.codec.chunk_size, 131072);
        assert_eq!(config.codec.max_frame_len, 1048576);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_parse_defaults() {
        let config: VaultConfig = toml::from_str("").unwrap();

        assert_eq!(config.storage.temp_dir, PathBuf::from("uploads/temp"));
        assert_eq!(config.storage.encrypted_dir, PathBuf::from("uploads/encrypted"));
        assert_eq!(config.codec.chunk_size, 65536);
        assert_eq!(config.codec.legacy_chunk_size, 65536);
        assert_eq!(config.codec.max_frame_len, 100 * 1024 * 1024);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "text");
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_str = r#"
[codec]
chunk_size = 4096
"#;
        let config: VaultConfig = toml::from_str(toml_str).unwrap();

        // Overridden
        assert_eq!(config.codec.chunk_size, 4096);
        // Defaults
        assert_eq!(config.codec.legacy_chunk_size, 65536);
        assert_eq!(config.storage.temp_dir, PathBuf::from("uploads/temp"));
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = VaultConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: VaultConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.storage.temp_dir, parsed.storage.temp_dir);
        assert_eq!(config.codec.chunk_size, parsed.codec.chunk_size);
        assert_eq!(config.logging.format, parsed.logging.format);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vidvault.toml");
        std::fs::write(
            &path,
            "[storage]\nencrypted_dir = \"/var/lib/vidvault\"\n[logging]\nformat = \"json\"\n",
        )
        .unwrap();

        let config = VaultConfig::load(&path).unwrap();
        assert_eq!(
            config.storage.encrypted_dir,
            PathBuf::from("/var/lib/vidvault")
        );
        assert_eq!(config.storage.temp_dir, PathBuf::from("uploads/temp"));
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_load_reports_bad_toml_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[codec\nchunk_size = ").unwrap();
        assert!(matches!(VaultConfig::load(&path), Err(VaultError::Config(_))));

        let missing = dir.path().join("absent.toml");
        assert!(matches!(VaultConfig::load(&missing), Err(VaultError::Io(_))));
    }

    #[test]
    fn test_codec_options_validated() {
        let mut codec = CodecConfig::default();
        assert_eq!(codec.encode_options().unwrap().chunk_size(), 65536);

        codec.chunk_size = 0;
        assert!(matches!(codec.encode_options(), Err(VaultError::Config(_))));

        codec.legacy_chunk_size = 0;
        assert!(codec.decode_options().is_err());
    }
}
