//! Frame encoding: `[u32 BE length][ciphertext]`

use std::io::{self, ErrorKind, Read, Write};

use crate::{LENGTH_PREFIX_SIZE, TAG_SIZE};

/// On-disk size of a framed chunk carrying `plaintext_len` bytes.
pub fn framed_size(plaintext_len: usize) -> usize {
    LENGTH_PREFIX_SIZE + plaintext_len + TAG_SIZE
}

/// Write one length-prefixed frame.
pub fn write_frame<W: Write>(sink: &mut W, ciphertext: &[u8]) -> io::Result<()> {
    let len = u32::try_from(ciphertext.len()).map_err(|_| {
        io::Error::new(
            ErrorKind::InvalidInput,
            format!("frame of {} bytes does not fit a u32 length", ciphertext.len()),
        )
    })?;
    sink.write_all(&len.to_be_bytes())?;
    sink.write_all(ciphertext)
}

/// Parse a length prefix.
pub fn decode_len(prefix: [u8; LENGTH_PREFIX_SIZE]) -> u32 {
    u32::from_be_bytes(prefix)
}

/// Read until `buf` is full or the source reports EOF.
///
/// Returns the number of bytes read; less than `buf.len()` only at EOF.
pub fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reader that hands out at most `step` bytes per call.
    struct Trickle<'a> {
        data: &'a [u8],
        step: usize,
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.step.min(buf.len()).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    #[test]
    fn test_write_frame_layout() {
        let mut out = Vec::new();
        write_frame(&mut out, &[0xAA; 20]).unwrap();
        assert_eq!(&out[..4], &[0, 0, 0, 20]);
        assert_eq!(out.len(), 24);
        assert_eq!(decode_len([0, 0, 0, 20]), 20);
    }

    #[test]
    fn test_framed_size_includes_prefix_and_tag() {
        assert_eq!(framed_size(0), 4 + TAG_SIZE);
        assert_eq!(framed_size(1000), 4 + 1000 + TAG_SIZE);
    }

    #[test]
    fn test_read_full_across_short_reads() {
        let data: Vec<u8> = (0..100u8).collect();
        let mut reader = Trickle { data: &data, step: 7 };
        let mut buf = [0u8; 64];
        assert_eq!(read_full(&mut reader, &mut buf).unwrap(), 64);
        assert_eq!(&buf[..], &data[..64]);

        let mut rest = [0u8; 64];
        assert_eq!(read_full(&mut reader, &mut rest).unwrap(), 36);
        assert_eq!(&rest[..36], &data[64..]);
        assert_eq!(read_full(&mut reader, &mut rest).unwrap(), 0);
    }
}
