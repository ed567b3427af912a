//! Plaintext stream → framed container
//!
//! The header goes out first, then one MESSAGE frame per chunk, then a single
//! empty FINAL frame. Success is only reported once the FINAL frame has been
//! flushed; on error the sink holds an invalid prefix that the caller must
//! discard.

use std::io::{Read, Write};

use tracing::{debug, info};

use crate::error::{CodecError, CodecResult};
use crate::frame::{read_full, write_frame};
use crate::keys::{PublicHeader, SecretKey};
use crate::session::{FrameTag, PushSession};
use crate::{DEFAULT_CHUNK_SIZE, HEADER_SIZE, LENGTH_PREFIX_SIZE, MAX_FRAME_LEN, TAG_SIZE};

/// Encoder tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeOptions {
    chunk_size: usize,
}

impl EncodeOptions {
    /// Largest chunk whose frame still classifies as framed on detection.
    pub const MAX_CHUNK_SIZE: usize = MAX_FRAME_LEN as usize - TAG_SIZE - 1;

    pub fn with_chunk_size(chunk_size: usize) -> CodecResult<Self> {
        if chunk_size == 0 || chunk_size > Self::MAX_CHUNK_SIZE {
            return Err(CodecError::InvalidChunkSize(chunk_size));
        }
        Ok(Self { chunk_size })
    }

    /// Maximum plaintext bytes per MESSAGE frame
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Totals for a finished stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeSummary {
    /// MESSAGE frames written (the FINAL frame is not counted)
    pub message_frames: u64,
    pub plaintext_bytes: u64,
    /// Header plus every frame, prefixes included
    pub container_bytes: u64,
}

/// Incremental encoder writing into `sink`.
pub struct StreamEncoder<W: Write> {
    sink: W,
    session: PushSession,
    header: PublicHeader,
    chunk_size: usize,
    frame_buf: Vec<u8>,
    plaintext_bytes: u64,
    container_bytes: u64,
    failed: bool,
}

impl<W: Write> StreamEncoder<W> {
    /// Start a stream under `key` and write its header to `sink`.
    pub fn new(key: &SecretKey, sink: W, options: &EncodeOptions) -> CodecResult<Self> {
        let (session, header) = PushSession::init(key);
        let mut encoder = Self {
            sink,
            session,
            header,
            chunk_size: options.chunk_size,
            frame_buf: Vec::with_capacity(options.chunk_size + TAG_SIZE),
            plaintext_bytes: 0,
            container_bytes: 0,
            failed: false,
        };
        encoder.sink.write_all(header.as_bytes())?;
        encoder.container_bytes = HEADER_SIZE as u64;
        Ok(encoder)
    }

    pub fn header(&self) -> &PublicHeader {
        &self.header
    }

    /// Encrypt `plaintext` as one or more MESSAGE frames.
    ///
    /// Input longer than the chunk size is split; empty input writes nothing.
    /// Once a frame has failed, every later call returns
    /// [`CodecError::Aborted`].
    pub fn write_chunk(&mut self, plaintext: &[u8]) -> CodecResult<()> {
        self.check_alive()?;
        for chunk in plaintext.chunks(self.chunk_size) {
            self.write_frame(chunk, FrameTag::Message)?;
            self.plaintext_bytes += chunk.len() as u64;
        }
        Ok(())
    }

    /// Write the FINAL frame, flush, and hand back the sink.
    ///
    /// Refuses to terminate a stream that already lost a frame.
    pub fn finish(mut self) -> CodecResult<(W, EncodeSummary)> {
        self.check_alive()?;
        self.write_frame(&[], FrameTag::Final)?;
        self.sink.flush()?;
        let summary = EncodeSummary {
            message_frames: self.session.frames() - 1,
            plaintext_bytes: self.plaintext_bytes,
            container_bytes: self.container_bytes,
        };
        debug!(
            frames = summary.message_frames,
            bytes = summary.container_bytes,
            "stream finalized"
        );
        Ok((self.sink, summary))
    }

    fn check_alive(&self) -> CodecResult<()> {
        if self.failed {
            return Err(CodecError::Aborted {
                frames: self.session.frames(),
            });
        }
        Ok(())
    }

    fn write_frame(&mut self, plaintext: &[u8], tag: FrameTag) -> CodecResult<()> {
        let result = match self.session.push_into(plaintext, tag, &mut self.frame_buf) {
            Ok(()) => write_frame(&mut self.sink, &self.frame_buf).map_err(CodecError::from),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            self.failed = true;
            debug!(frame = self.session.frames(), error = %e, "encode aborted");
            return Err(e);
        }
        self.container_bytes += (LENGTH_PREFIX_SIZE + self.frame_buf.len()) as u64;
        Ok(())
    }
}

/// Encrypt everything `source` yields into `sink` under `key`.
///
/// The source is read in chunk-sized pieces, each filled until full or EOF,
/// so all MESSAGE frames but the last carry exactly `chunk_size` bytes.
pub fn encode<R: Read, W: Write>(
    mut source: R,
    sink: W,
    key: &SecretKey,
    options: &EncodeOptions,
) -> CodecResult<(PublicHeader, EncodeSummary)> {
    let mut encoder = StreamEncoder::new(key, sink, options)?;
    let header = encoder.header;
    let mut buf = vec![0u8; options.chunk_size];
    loop {
        let n = read_full(&mut source, &mut buf)?;
        if n == 0 {
            break;
        }
        encoder.write_chunk(&buf[..n])?;
        if n < buf.len() {
            break;
        }
    }
    let (_, summary) = encoder.finish()?;
    Ok((header, summary))
}

/// Result of [`encrypt`]: the material a caller must keep to decrypt.
#[derive(Debug)]
pub struct EncryptedStream {
    pub key: SecretKey,
    pub header: PublicHeader,
    pub summary: EncodeSummary,
}

/// Generate a fresh key and encrypt `source` into `sink` with it.
pub fn encrypt<R: Read, W: Write>(
    source: R,
    sink: W,
    options: &EncodeOptions,
) -> CodecResult<EncryptedStream> {
    let key = SecretKey::generate();
    let (header, summary) = encode(source, sink, &key, options)?;
    info!(
        frames = summary.message_frames,
        plaintext = summary.plaintext_bytes,
        container = summary.container_bytes,
        "encryption complete"
    );
    Ok(EncryptedStream {
        key,
        header,
        summary,
    })
}
