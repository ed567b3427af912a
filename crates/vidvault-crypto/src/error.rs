use thiserror::Error;

pub type CodecResult<T> = Result<T, CodecError>;

/// Failure kinds surfaced by the codec.
///
/// Callers branch on these: `Authentication` and `Truncated` mean the
/// container is corrupt, `Io` may be transient, and on the encode path any
/// error means the partial output must be discarded.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("authentication failed on frame {frame}: ciphertext or tag does not verify")]
    Authentication { frame: u64 },

    #[error("container truncated after {frames} frames: no final tag before end of data")]
    Truncated { frames: u64 },

    #[error("frame {frame} declares {len} bytes, above the {max} byte limit")]
    FrameTooLarge { frame: u64, len: u32, max: u32 },

    #[error("encryption failed: {0}")]
    Encrypt(String),

    #[error("invalid {what}: expected {expected} bytes, got {actual}")]
    InvalidLength {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("chunk size {0} out of range")]
    InvalidChunkSize(usize),

    #[error("stream aborted by an earlier error after {frames} frames")]
    Aborted { frames: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CodecError {
    /// True when the container itself is bad (as opposed to the I/O around it).
    pub fn is_corrupt(&self) -> bool {
        matches!(
            self,
            CodecError::Authentication { .. }
                | CodecError::Truncated { .. }
                | CodecError::FrameTooLarge { .. }
        )
    }
}
