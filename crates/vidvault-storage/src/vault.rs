//! Local vault directory operations
//!
//! Layout:
//! ```text
//! <temp_dir>/<name>             plaintext upload (removed after ingest)
//! <encrypted_dir>/<name>.enc    sealed container
//! ```
//!
//! Containers are written through a temp file in `encrypted_dir` and only
//! renamed into place after the FINAL frame is on disk, so a failed or
//! cancelled ingest never leaves a half-written `.enc` behind.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use vidvault_core::config::VaultConfig;
use vidvault_core::{KeyRecord, StoredObject, VaultError, VaultResult};
use vidvault_crypto::{
    decode, encrypt, DecodeOptions, DecodeSummary, DecryptReader, EncodeOptions, StreamDecoder,
};

/// Suffix appended to an upload's name to form its container name
pub const ENCRYPTED_SUFFIX: &str = ".enc";

#[derive(Debug, Clone)]
pub struct Vault {
    temp_dir: PathBuf,
    encrypted_dir: PathBuf,
    encode: EncodeOptions,
    decode: DecodeOptions,
}

impl Vault {
    pub fn new(
        temp_dir: impl Into<PathBuf>,
        encrypted_dir: impl Into<PathBuf>,
        encode: EncodeOptions,
        decode: DecodeOptions,
    ) -> Self {
        Self {
            temp_dir: temp_dir.into(),
            encrypted_dir: encrypted_dir.into(),
            encode,
            decode,
        }
    }

    pub fn from_config(config: &VaultConfig) -> VaultResult<Self> {
        Ok(Self::new(
            config.storage.temp_dir.clone(),
            config.storage.encrypted_dir.clone(),
            config.codec.encode_options()?,
            config.codec.decode_options()?,
        ))
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    pub fn encrypted_dir(&self) -> &Path {
        &self.encrypted_dir
    }

    /// Create both directories if missing.
    pub fn ensure_dirs(&self) -> VaultResult<()> {
        fs::create_dir_all(&self.temp_dir)?;
        fs::create_dir_all(&self.encrypted_dir)?;
        Ok(())
    }

    /// Seal the upload `temp_dir/name` into `encrypted_dir/name.enc`.
    ///
    /// On success the plaintext upload is deleted and the key record is
    /// returned for the caller to persist.
    pub fn ingest(&self, name: &str) -> VaultResult<StoredObject> {
        validate_name(name)?;
        let input = self.temp_dir.join(name);
        let encrypted_filename = format!("{name}{ENCRYPTED_SUFFIX}");
        let output = self.encrypted_dir.join(&encrypted_filename);
        debug!(input = %input.display(), output = %output.display(), "ingest starting");

        let source = open_existing(&input)?;
        let tmp = NamedTempFile::new_in(&self.encrypted_dir)?;
        let mut writer = BufWriter::new(tmp);
        let sealed = encrypt(BufReader::new(source), &mut writer, &self.encode)?;
        let tmp = writer.into_inner().map_err(|e| e.into_error())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&output).map_err(|e| e.error)?;

        // Never report success while the plaintext is still lying around
        if let Err(e) = fs::remove_file(&input) {
            warn!(path = %input.display(), error = %e, "could not remove plaintext upload");
            if let Err(cleanup) = fs::remove_file(&output) {
                warn!(path = %output.display(), error = %cleanup, "could not remove container");
            }
            return Err(e.into());
        }

        info!(
            object = name,
            frames = sealed.summary.message_frames,
            bytes = sealed.summary.plaintext_bytes,
            "ingest complete"
        );
        Ok(StoredObject {
            encrypted_filename,
            record: KeyRecord::new(&sealed.key, &sealed.header),
            plaintext_bytes: sealed.summary.plaintext_bytes,
            container_bytes: sealed.summary.container_bytes,
        })
    }

    /// Ingest on the blocking pool.
    pub async fn ingest_async(&self, name: String) -> VaultResult<StoredObject> {
        let vault = self.clone();
        tokio::task::spawn_blocking(move || vault.ingest(&name))
            .await
            .map_err(|e| VaultError::Other(anyhow::anyhow!("ingest task failed: {e}")))?
    }

    /// Ingest several uploads concurrently, one session per object.
    ///
    /// Results come back in the order of `names`.
    pub async fn ingest_many(&self, names: Vec<String>) -> Vec<(String, VaultResult<StoredObject>)> {
        let mut tasks = JoinSet::new();
        for (index, name) in names.iter().cloned().enumerate() {
            let vault = self.clone();
            tasks.spawn_blocking(move || (index, vault.ingest(&name)));
        }

        let mut results: Vec<Option<VaultResult<StoredObject>>> =
            names.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = Some(result),
                Err(e) => warn!(error = %e, "ingest task panicked or was cancelled"),
            }
        }

        names
            .into_iter()
            .zip(results)
            .map(|(name, result)| {
                let result = result.unwrap_or_else(|| {
                    Err(VaultError::Other(anyhow::anyhow!("ingest task for {name} did not finish")))
                });
                (name, result)
            })
            .collect()
    }

    /// Open a container for streaming playback.
    ///
    /// The file handle lives inside the returned reader and is closed when it
    /// drops, whether or not the stream was read to the end.
    pub fn open(
        &self,
        encrypted_filename: &str,
        record: &KeyRecord,
    ) -> VaultResult<DecryptReader<BufReader<File>>> {
        let (file, len) = self.open_container(encrypted_filename)?;
        let decoder = StreamDecoder::with_options(
            BufReader::new(file),
            len,
            &record.secret_key()?,
            &record.public_header()?,
            &self.decode,
        )?;
        debug!(object = encrypted_filename, format = %decoder.format(), "container opened");
        Ok(decoder.into_reader())
    }

    /// Decrypt a container into `sink`.
    pub fn export<W: Write>(
        &self,
        encrypted_filename: &str,
        record: &KeyRecord,
        sink: W,
    ) -> VaultResult<DecodeSummary> {
        let (file, len) = self.open_container(encrypted_filename)?;
        let summary = decode(
            BufReader::new(file),
            len,
            &record.secret_key()?,
            &record.public_header()?,
            sink,
            &self.decode,
        )?;
        info!(
            object = encrypted_filename,
            format = %summary.format,
            bytes = summary.plaintext_bytes,
            "export complete"
        );
        Ok(summary)
    }

    /// Decrypt a container into a scratch file under `temp_dir`.
    ///
    /// The file keeps the upload's extension (for tools that sniff it) and is
    /// deleted when the returned handle drops.
    pub fn decrypt_to_temp(
        &self,
        encrypted_filename: &str,
        record: &KeyRecord,
    ) -> VaultResult<NamedTempFile> {
        validate_name(encrypted_filename)?;
        let suffix = plaintext_extension(encrypted_filename)
            .map(|ext| format!(".{ext}"))
            .unwrap_or_default();
        let mut tmp = tempfile::Builder::new()
            .prefix("decrypted-")
            .suffix(&suffix)
            .tempfile_in(&self.temp_dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            self.export(encrypted_filename, record, &mut writer)?;
            writer.flush()?;
        }
        debug!(path = %tmp.path().display(), "decrypted to scratch file");
        Ok(tmp)
    }

    /// Delete a stored container.
    pub fn remove(&self, encrypted_filename: &str) -> VaultResult<()> {
        validate_name(encrypted_filename)?;
        let path = self.encrypted_dir.join(encrypted_filename);
        fs::remove_file(&path).map_err(|e| not_found_or_io(e, &path))?;
        info!(object = encrypted_filename, "container removed");
        Ok(())
    }

    fn open_container(&self, encrypted_filename: &str) -> VaultResult<(File, u64)> {
        validate_name(encrypted_filename)?;
        let path = self.encrypted_dir.join(encrypted_filename);
        let file = open_existing(&path)?;
        let len = file.metadata()?.len();
        Ok((file, len))
    }
}

/// Reject names that could escape the vault directories.
pub fn validate_name(name: &str) -> VaultResult<()> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if bad {
        return Err(VaultError::InvalidName(name.to_string()));
    }
    Ok(())
}

fn plaintext_extension(encrypted_filename: &str) -> Option<&str> {
    let plain = encrypted_filename
        .strip_suffix(ENCRYPTED_SUFFIX)
        .unwrap_or(encrypted_filename);
    Path::new(plain).extension()?.to_str()
}

fn open_existing(path: &Path) -> VaultResult<File> {
    File::open(path).map_err(|e| not_found_or_io(e, path))
}

fn not_found_or_io(err: io::Error, path: &Path) -> VaultError {
    if err.kind() == io::ErrorKind::NotFound {
        VaultError::NotFound(path.to_path_buf())
    } else {
        VaultError::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name() {
        assert!(validate_name("clip.mp4").is_ok());
        assert!(validate_name("clip.mp4.enc").is_ok());
        for bad in ["", ".", "..", "../etc/passwd", "a/b", "a\\b", "nul\0"] {
            assert!(
                matches!(validate_name(bad), Err(VaultError::InvalidName(_))),
                "{bad:?} must be rejected"
            );
        }
    }

    #[test]
    fn test_plaintext_extension() {
        assert_eq!(plaintext_extension("clip.mp4.enc"), Some("mp4"));
        assert_eq!(plaintext_extension("clip.webm"), Some("webm"));
        assert_eq!(plaintext_extension("noext.enc"), None);
    }
}
