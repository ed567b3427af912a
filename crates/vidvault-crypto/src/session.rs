//! Binding to the secretstream AEAD primitive
//!
//! Push and pull state are separate types: a session initialised for
//! encryption cannot decrypt and vice versa. Both ratchet on every call, so
//! neither is `Clone`.

use dryoc::classic::crypto_secretstream_xchacha20poly1305::{
    crypto_secretstream_xchacha20poly1305_init_pull,
    crypto_secretstream_xchacha20poly1305_init_push, crypto_secretstream_xchacha20poly1305_pull,
    crypto_secretstream_xchacha20poly1305_push, State,
};
use dryoc::constants::{
    CRYPTO_SECRETSTREAM_XCHACHA20POLY1305_TAG_FINAL,
    CRYPTO_SECRETSTREAM_XCHACHA20POLY1305_TAG_MESSAGE,
};

use crate::error::{CodecError, CodecResult};
use crate::keys::{PublicHeader, SecretKey};
use crate::{HEADER_SIZE, TAG_SIZE};

/// The tag sealed inside each frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameTag {
    /// Ordinary data chunk
    Message,
    /// End of stream; no frame may follow
    Final,
}

impl FrameTag {
    fn to_byte(self) -> u8 {
        match self {
            FrameTag::Message => CRYPTO_SECRETSTREAM_XCHACHA20POLY1305_TAG_MESSAGE,
            FrameTag::Final => CRYPTO_SECRETSTREAM_XCHACHA20POLY1305_TAG_FINAL,
        }
    }

    fn from_byte(tag: u8) -> Self {
        if tag == CRYPTO_SECRETSTREAM_XCHACHA20POLY1305_TAG_FINAL {
            FrameTag::Final
        } else {
            FrameTag::Message
        }
    }
}

/// Encrypt-side session state.
pub struct PushSession {
    state: State,
    frames: u64,
}

impl PushSession {
    /// Start a new stream under `key`, returning the header to publish.
    pub fn init(key: &SecretKey) -> (Self, PublicHeader) {
        let mut state = State::new();
        let mut header = [0u8; HEADER_SIZE];
        crypto_secretstream_xchacha20poly1305_init_push(&mut state, &mut header, key.as_bytes());
        (Self { state, frames: 0 }, PublicHeader::from_bytes(header))
    }

    /// Seal `plaintext` into `out`, replacing its contents.
    ///
    /// `out` ends up exactly `plaintext.len() + TAG_SIZE` bytes long.
    pub fn push_into(
        &mut self,
        plaintext: &[u8],
        tag: FrameTag,
        out: &mut Vec<u8>,
    ) -> CodecResult<()> {
        out.clear();
        out.resize(plaintext.len() + TAG_SIZE, 0);
        crypto_secretstream_xchacha20poly1305_push(
            &mut self.state,
            out,
            plaintext,
            None,
            tag.to_byte(),
        )
        .map_err(|e| CodecError::Encrypt(format!("frame {}: {e}", self.frames)))?;
        self.frames += 1;
        Ok(())
    }

    pub fn push(&mut self, plaintext: &[u8], tag: FrameTag) -> CodecResult<Vec<u8>> {
        let mut out = Vec::with_capacity(plaintext.len() + TAG_SIZE);
        self.push_into(plaintext, tag, &mut out)?;
        Ok(out)
    }

    /// Number of frames sealed so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

/// Decrypt-side session state.
pub struct PullSession {
    state: State,
    frames: u64,
}

impl PullSession {
    pub fn init(key: &SecretKey, header: &PublicHeader) -> Self {
        let mut state = State::new();
        crypto_secretstream_xchacha20poly1305_init_pull(
            &mut state,
            header.as_bytes(),
            key.as_bytes(),
        );
        Self { state, frames: 0 }
    }

    /// Open one sealed frame into `out`, returning the embedded tag.
    ///
    /// On failure the frame counter does not advance and `out` is cleared, so
    /// no unauthenticated bytes are left behind.
    pub fn pull_into(&mut self, ciphertext: &[u8], out: &mut Vec<u8>) -> CodecResult<FrameTag> {
        let frame = self.frames;
        out.clear();
        if ciphertext.len() < TAG_SIZE {
            return Err(CodecError::Authentication { frame });
        }
        out.resize(ciphertext.len() - TAG_SIZE, 0);
        let mut tag = 0u8;
        match crypto_secretstream_xchacha20poly1305_pull(
            &mut self.state,
            out,
            &mut tag,
            ciphertext,
            None,
        ) {
            Ok(len) => {
                out.truncate(len);
                self.frames += 1;
                Ok(FrameTag::from_byte(tag))
            }
            Err(_) => {
                out.clear();
                Err(CodecError::Authentication { frame })
            }
        }
    }

    pub fn pull(&mut self, ciphertext: &[u8]) -> CodecResult<(Vec<u8>, FrameTag)> {
        let mut out = Vec::with_capacity(ciphertext.len().saturating_sub(TAG_SIZE));
        let tag = self.pull_into(ciphertext, &mut out)?;
        Ok((out, tag))
    }

    /// Number of frames opened so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }
}
