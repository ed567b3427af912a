//! vidvault-crypto: streaming authenticated encryption for stored media objects
//!
//! Primitive: libsodium `crypto_secretstream_xchacha20poly1305` (via `dryoc`)
//!
//! Container layout:
//! ```text
//! [24 bytes: public header]
//! [4 bytes: len BE][len bytes: ciphertext || 17-byte tag]   (MESSAGE, repeated)
//! [4 bytes: 17    ][17 bytes: empty ciphertext || tag]      (FINAL)
//! ```
//!
//! Legacy containers carry no length prefix: after the header come fixed
//! `LEGACY_CHUNK_SIZE + TAG_SIZE` ciphertext chunks, the last one possibly
//! shorter. [`detect`] tells the two apart before decoding starts.
//!
//! The session state ratchets on every frame, so frames are produced and
//! consumed strictly in order. Neither side buffers more than one frame.

pub mod decoder;
pub mod detect;
pub mod encoder;
pub mod error;
pub mod frame;
pub mod keys;
pub mod session;

pub use decoder::{codec_error, decode, DecodeOptions, DecodeSummary, DecryptReader, StreamDecoder};
pub use detect::{classify, inspect, ContainerFormat, ContainerSummary, UnknownFormat};
pub use encoder::{encode, encrypt, EncodeOptions, EncodeSummary, EncryptedStream, StreamEncoder};
pub use error::{CodecError, CodecResult};
pub use keys::{PublicHeader, SecretKey};
pub use session::{FrameTag, PullSession, PushSession};

/// Size of a secretstream key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of the public secretstream header
pub const HEADER_SIZE: usize = 24;

/// Per-frame authentication overhead (1 encrypted tag byte + 16-byte Poly1305 MAC)
pub const TAG_SIZE: usize = 17;

/// Size of the big-endian frame length prefix
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Default plaintext bytes per MESSAGE frame
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Plaintext bytes per chunk in legacy (unframed) containers
pub const LEGACY_CHUNK_SIZE: usize = 64 * 1024;

/// Largest length prefix the detector accepts as framed (exclusive), and the
/// default cap on a single frame when decoding
pub const MAX_FRAME_LEN: u32 = 100 * 1024 * 1024;
