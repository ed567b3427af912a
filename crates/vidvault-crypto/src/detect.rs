//! Framed vs legacy container detection
//!
//! Containers carry no format tag. The first four bytes after the header are
//! read as a big-endian length `L`; the container is treated as framed iff
//! `0 < L <= total - offset - 4` and `L < 100 MiB`, otherwise as legacy.
//!
//! A legacy container whose first ciphertext bytes happen to parse as a
//! plausible length is misread as framed and then fails authentication. The
//! thresholds are kept as-is so that existing containers keep decoding the
//! way they always have; callers that know the format can bypass detection
//! with `DecodeOptions::format`.

use std::fmt;
use std::io::{self, Read};
use std::str::FromStr;

use thiserror::Error;
use tracing::debug;

use crate::error::{CodecError, CodecResult};
use crate::frame::{decode_len, read_full};
use crate::{HEADER_SIZE, LEGACY_CHUNK_SIZE, LENGTH_PREFIX_SIZE, MAX_FRAME_LEN, TAG_SIZE};

/// On-disk container layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerFormat {
    /// Every frame is prefixed with its u32 big-endian ciphertext length
    Framed,
    /// Fixed-size ciphertext chunks with no length prefix
    Legacy,
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerFormat::Framed => f.write_str("framed"),
            ContainerFormat::Legacy => f.write_str("legacy"),
        }
    }
}

/// A format name other than `framed` or `legacy`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown container format: {0}")]
pub struct UnknownFormat(pub String);

impl FromStr for ContainerFormat {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "framed" => Ok(ContainerFormat::Framed),
            "legacy" => Ok(ContainerFormat::Legacy),
            other => Err(UnknownFormat(other.to_string())),
        }
    }
}

/// Classify a container from the four bytes found at `offset`.
pub fn classify(prefix: [u8; LENGTH_PREFIX_SIZE], total_len: u64, offset: u64) -> ContainerFormat {
    let Some(remaining) = total_len.checked_sub(offset + LENGTH_PREFIX_SIZE as u64) else {
        return ContainerFormat::Legacy;
    };
    let len = decode_len(prefix);
    if len > 0 && u64::from(len) <= remaining && len < MAX_FRAME_LEN {
        ContainerFormat::Framed
    } else {
        ContainerFormat::Legacy
    }
}

/// Peek up to four bytes from `reader` (positioned at `offset`) and classify.
///
/// The reader is forward-only, so the bytes consumed are handed back for the
/// frame loop to replay.
pub(crate) fn detect_format<R: Read + ?Sized>(
    reader: &mut R,
    total_len: u64,
    offset: u64,
) -> io::Result<(ContainerFormat, Vec<u8>)> {
    let mut peeked = vec![0u8; LENGTH_PREFIX_SIZE];
    let n = read_full(reader, &mut peeked)?;
    peeked.truncate(n);

    let format = match <[u8; LENGTH_PREFIX_SIZE]>::try_from(peeked.as_slice()) {
        Ok(prefix) => classify(prefix, total_len, offset),
        Err(_) => ContainerFormat::Legacy,
    };
    debug!(%format, total_len, offset, "detected container format");
    Ok((format, peeked))
}

/// Keyless structural summary of a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    pub format: ContainerFormat,
    /// Frames (or legacy chunks) up to and including the terminating one
    pub frames: u64,
    /// Plaintext bytes the frames would carry once decrypted
    pub payload_bytes: u64,
    /// Bytes after the terminating frame (ignored by the decoder)
    pub trailing_bytes: u64,
    /// A tag-only frame was seen. This is judged from frame length alone: the
    /// tag itself is sealed, so an empty MESSAGE frame would match as well.
    /// Legacy containers cannot be judged without the key and always report
    /// `false`.
    pub terminated: bool,
}

/// Walk a container's structure without decrypting it.
pub fn inspect<R: Read>(mut reader: R, total_len: u64) -> CodecResult<ContainerSummary> {
    if total_len < HEADER_SIZE as u64 {
        return Err(CodecError::Truncated { frames: 0 });
    }
    skip(&mut reader, HEADER_SIZE as u64, 0)?;
    let offset = HEADER_SIZE as u64;
    let (format, peeked) = detect_format(&mut reader, total_len, offset)?;
    let mut reader = io::Cursor::new(peeked).chain(reader);
    let mut remaining = total_len - offset;

    match format {
        ContainerFormat::Framed => {
            let mut frames = 0u64;
            let mut payload_bytes = 0u64;
            let mut terminated = false;
            while remaining >= LENGTH_PREFIX_SIZE as u64 {
                let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
                reader.read_exact(&mut prefix)?;
                remaining -= LENGTH_PREFIX_SIZE as u64;
                let len = decode_len(prefix);
                if u64::from(len) > remaining {
                    return Err(CodecError::Truncated { frames });
                }
                skip(&mut reader, u64::from(len), frames)?;
                remaining -= u64::from(len);
                frames += 1;
                payload_bytes += u64::from(len).saturating_sub(TAG_SIZE as u64);
                if len as usize == TAG_SIZE {
                    terminated = true;
                    break;
                }
            }
            Ok(ContainerSummary {
                format,
                frames,
                payload_bytes,
                trailing_bytes: remaining,
                terminated,
            })
        }
        ContainerFormat::Legacy => {
            let chunk = (LEGACY_CHUNK_SIZE + TAG_SIZE) as u64;
            let frames = remaining.div_ceil(chunk);
            let last = remaining - frames.saturating_sub(1) * chunk;
            let payload_bytes = frames.saturating_sub(1) * LEGACY_CHUNK_SIZE as u64
                + last.saturating_sub(TAG_SIZE as u64);
            Ok(ContainerSummary {
                format,
                frames,
                payload_bytes,
                trailing_bytes: 0,
                terminated: false,
            })
        }
    }
}

fn skip<R: Read + ?Sized>(reader: &mut R, len: u64, frames: u64) -> CodecResult<()> {
    let skipped = io::copy(&mut reader.take(len), &mut io::sink())?;
    if skipped < len {
        return Err(CodecError::Truncated { frames });
    }
    Ok(())
}
