//! Container → lazy plaintext chunks
//!
//! The decoder is a forward-only state machine: it reads one frame, opens it,
//! hands out the plaintext and forgets both buffers' contents before touching
//! the next frame. It stops at the FINAL tag; anything after it is never read.

use std::io::{self, Read, Write};
use std::iter::FusedIterator;

use tracing::{debug, warn};

use crate::detect::{detect_format, ContainerFormat};
use crate::error::{CodecError, CodecResult};
use crate::frame::decode_len;
use crate::keys::{PublicHeader, SecretKey};
use crate::session::{FrameTag, PullSession};
use crate::{HEADER_SIZE, LEGACY_CHUNK_SIZE, LENGTH_PREFIX_SIZE, MAX_FRAME_LEN, TAG_SIZE};

/// Decoder tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Skip detection and assume this layout
    pub format: Option<ContainerFormat>,
    /// Plaintext bytes per legacy chunk
    pub legacy_chunk_size: usize,
    /// Frames declaring more ciphertext than this are refused before allocation
    pub max_frame_len: u32,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            format: None,
            legacy_chunk_size: LEGACY_CHUNK_SIZE,
            max_frame_len: MAX_FRAME_LEN,
        }
    }
}

/// Totals for a fully drained container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeSummary {
    pub format: ContainerFormat,
    /// Frames opened, FINAL included
    pub frames: u64,
    pub plaintext_bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Streaming,
    Finished,
    Failed,
}

/// Lazy, ordered plaintext producer over one container.
///
/// Restarting means opening the container again from the start.
pub struct StreamDecoder<R: Read> {
    reader: io::Chain<io::Cursor<Vec<u8>>, R>,
    session: PullSession,
    format: ContainerFormat,
    remaining: u64,
    legacy_frame_len: usize,
    max_frame_len: u32,
    cipher_buf: Vec<u8>,
    phase: Phase,
    plaintext_bytes: u64,
}

impl<R: Read> StreamDecoder<R> {
    pub fn new(
        reader: R,
        total_len: u64,
        key: &SecretKey,
        header: &PublicHeader,
    ) -> CodecResult<Self> {
        Self::with_options(reader, total_len, key, header, &DecodeOptions::default())
    }

    /// Open a container of `total_len` bytes positioned at its first byte.
    ///
    /// The stored header is skipped; `header` is the one used to start the
    /// session.
    pub fn with_options(
        mut reader: R,
        total_len: u64,
        key: &SecretKey,
        header: &PublicHeader,
        options: &DecodeOptions,
    ) -> CodecResult<Self> {
        if options.legacy_chunk_size == 0 {
            return Err(CodecError::InvalidChunkSize(0));
        }
        if total_len < HEADER_SIZE as u64 {
            return Err(CodecError::Truncated { frames: 0 });
        }
        let mut stored = [0u8; HEADER_SIZE];
        reader.read_exact(&mut stored).map_err(|e| eof_as_truncated(e, 0))?;
        if stored != *header.as_bytes() {
            warn!("stored container header differs from the supplied header");
        }

        let offset = HEADER_SIZE as u64;
        let (format, peeked) = match options.format {
            Some(format) => (format, Vec::new()),
            None => detect_format(&mut reader, total_len, offset)?,
        };

        Ok(Self {
            reader: io::Cursor::new(peeked).chain(reader),
            session: PullSession::init(key, header),
            format,
            remaining: total_len - offset,
            legacy_frame_len: options.legacy_chunk_size + TAG_SIZE,
            max_frame_len: options.max_frame_len,
            cipher_buf: Vec::new(),
            phase: Phase::Streaming,
            plaintext_bytes: 0,
        })
    }

    pub fn format(&self) -> ContainerFormat {
        self.format
    }

    /// Frames successfully opened so far.
    pub fn frames(&self) -> u64 {
        self.session.frames()
    }

    pub fn plaintext_bytes(&self) -> u64 {
        self.plaintext_bytes
    }

    /// True once the FINAL frame has been opened.
    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Finished
    }

    /// Next non-empty plaintext chunk, or `None` after the FINAL frame.
    ///
    /// Any error is terminal: later calls return [`CodecError::Aborted`], so
    /// a failed stream never reads as a clean end.
    pub fn next_chunk(&mut self) -> CodecResult<Option<Vec<u8>>> {
        match self.phase {
            Phase::Streaming => {}
            Phase::Finished => return Ok(None),
            Phase::Failed => {
                return Err(CodecError::Aborted {
                    frames: self.session.frames(),
                })
            }
        }
        match self.advance() {
            Ok(chunk) => Ok(chunk),
            Err(e) => {
                self.phase = Phase::Failed;
                self.cipher_buf.clear();
                debug!(frame = self.session.frames(), error = %e, "decode aborted");
                Err(e)
            }
        }
    }

    /// Wrap this decoder in a `std::io::Read` adapter.
    pub fn into_reader(self) -> DecryptReader<R> {
        DecryptReader {
            decoder: self,
            chunk: Vec::new(),
            pos: 0,
        }
    }

    fn advance(&mut self) -> CodecResult<Option<Vec<u8>>> {
        loop {
            match self.format {
                ContainerFormat::Framed => self.read_framed()?,
                ContainerFormat::Legacy => self.read_legacy()?,
            }
            let mut plaintext = Vec::new();
            let tag = self.session.pull_into(&self.cipher_buf, &mut plaintext)?;
            self.plaintext_bytes += plaintext.len() as u64;

            if tag == FrameTag::Final {
                self.phase = Phase::Finished;
                self.cipher_buf = Vec::new();
                debug!(
                    frames = self.session.frames(),
                    bytes = self.plaintext_bytes,
                    ignored = self.remaining,
                    "final frame reached"
                );
                return Ok((!plaintext.is_empty()).then_some(plaintext));
            }
            if !plaintext.is_empty() {
                return Ok(Some(plaintext));
            }
        }
    }

    fn read_framed(&mut self) -> CodecResult<()> {
        let frame = self.session.frames();
        if self.remaining < LENGTH_PREFIX_SIZE as u64 {
            return Err(CodecError::Truncated { frames: frame });
        }
        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        self.read_exact(&mut prefix, frame)?;
        self.remaining -= LENGTH_PREFIX_SIZE as u64;

        let len = decode_len(prefix);
        if len > self.max_frame_len {
            return Err(CodecError::FrameTooLarge {
                frame,
                len,
                max: self.max_frame_len,
            });
        }
        if u64::from(len) > self.remaining {
            return Err(CodecError::Truncated { frames: frame });
        }
        self.fill_cipher_buf(len as usize, frame)
    }

    fn read_legacy(&mut self) -> CodecResult<()> {
        let frame = self.session.frames();
        if self.remaining == 0 {
            return Err(CodecError::Truncated { frames: frame });
        }
        let len = self.remaining.min(self.legacy_frame_len as u64) as usize;
        self.fill_cipher_buf(len, frame)
    }

    fn fill_cipher_buf(&mut self, len: usize, frame: u64) -> CodecResult<()> {
        let mut buf = std::mem::take(&mut self.cipher_buf);
        buf.clear();
        buf.resize(len, 0);
        let result = self.read_exact(&mut buf, frame);
        self.cipher_buf = buf;
        result?;
        self.remaining -= len as u64;
        Ok(())
    }

    fn read_exact(&mut self, buf: &mut [u8], frame: u64) -> CodecResult<()> {
        self.reader
            .read_exact(buf)
            .map_err(|e| eof_as_truncated(e, frame))
    }
}

/// Yields each chunk, then stops after the FINAL frame or the first error.
///
/// `None` only means success if no `Err` came before it; check
/// [`StreamDecoder::is_finished`] when the items are not inspected one by one.
impl<R: Read> Iterator for StreamDecoder<R> {
    type Item = CodecResult<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.phase == Phase::Failed {
            return None;
        }
        self.next_chunk().transpose()
    }
}

impl<R: Read> FusedIterator for StreamDecoder<R> {}

fn eof_as_truncated(err: io::Error, frames: u64) -> CodecError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        CodecError::Truncated { frames }
    } else {
        CodecError::Io(err)
    }
}

/// `std::io::Read` over decrypted plaintext.
///
/// Codec failures surface as `io::ErrorKind::InvalidData` wrapping the
/// [`CodecError`]; recover it with [`codec_error`]. After any error, including
/// a transient one from the inner reader, every later read fails with
/// [`CodecError::Aborted`] instead of reporting end of stream.
pub struct DecryptReader<R: Read> {
    decoder: StreamDecoder<R>,
    chunk: Vec<u8>,
    pos: usize,
}

impl<R: Read> DecryptReader<R> {
    pub fn decoder(&self) -> &StreamDecoder<R> {
        &self.decoder
    }
}

impl<R: Read> Read for DecryptReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.pos >= self.chunk.len() {
            match self.decoder.next_chunk() {
                Ok(Some(chunk)) => {
                    self.chunk = chunk;
                    self.pos = 0;
                }
                Ok(None) => return Ok(0),
                Err(CodecError::Io(e)) => return Err(e),
                Err(e) => return Err(io::Error::new(io::ErrorKind::InvalidData, e)),
            }
        }
        let n = buf.len().min(self.chunk.len() - self.pos);
        buf[..n].copy_from_slice(&self.chunk[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// The codec failure carried by an error from [`DecryptReader`], if any.
pub fn codec_error(err: &io::Error) -> Option<&CodecError> {
    err.get_ref()?.downcast_ref::<CodecError>()
}

/// Drain a container into `sink`.
pub fn decode<R: Read, W: Write>(
    reader: R,
    total_len: u64,
    key: &SecretKey,
    header: &PublicHeader,
    mut sink: W,
    options: &DecodeOptions,
) -> CodecResult<DecodeSummary> {
    let mut decoder = StreamDecoder::with_options(reader, total_len, key, header, options)?;
    while let Some(chunk) = decoder.next_chunk()? {
        sink.write_all(&chunk)?;
    }
    sink.flush()?;
    Ok(DecodeSummary {
        format: decoder.format(),
        frames: decoder.frames(),
        plaintext_bytes: decoder.plaintext_bytes(),
    })
}
