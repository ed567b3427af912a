//! Whole-stream properties of the container codec: round-trip across chunk
//! boundaries, tamper detection, legacy/framed equivalence, and trailing data.

use std::io::{self, Read, Seek, SeekFrom, Write};

use proptest::prelude::*;
use vidvault_crypto::{
    decode, encode, CodecError, ContainerFormat, DecodeOptions, EncodeOptions, FrameTag,
    PublicHeader, PushSession, SecretKey, StreamDecoder, HEADER_SIZE, LEGACY_CHUNK_SIZE,
    LENGTH_PREFIX_SIZE, TAG_SIZE,
};

fn make_data(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| (i.wrapping_mul(7) ^ (i >> 3)) as u8)
        .collect()
}

fn seal(data: &[u8], key: &SecretKey, chunk_size: usize) -> (PublicHeader, Vec<u8>) {
    let opts = EncodeOptions::with_chunk_size(chunk_size).unwrap();
    let mut out = Vec::new();
    let (header, _) = encode(data, &mut out, key, &opts).unwrap();
    (header, out)
}

fn open(container: &[u8], key: &SecretKey, header: &PublicHeader) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    decode(
        container,
        container.len() as u64,
        key,
        header,
        &mut out,
        &DecodeOptions::default(),
    )?;
    Ok(out)
}

/// Build a legacy container: fixed-size chunks, no prefixes, FINAL on the last.
fn seal_legacy(data: &[u8], key: &SecretKey) -> (PublicHeader, Vec<u8>) {
    let (mut push, header) = PushSession::init(key);
    let mut out = header.as_bytes().to_vec();
    if data.is_empty() {
        out.extend_from_slice(&push.push(&[], FrameTag::Final).unwrap());
        return (header, out);
    }
    let chunks: Vec<&[u8]> = data.chunks(LEGACY_CHUNK_SIZE).collect();
    for (i, chunk) in chunks.iter().enumerate() {
        let tag = if i + 1 == chunks.len() {
            FrameTag::Final
        } else {
            FrameTag::Message
        };
        out.extend_from_slice(&push.push(chunk, tag).unwrap());
    }
    (header, out)
}

/// Byte offsets of every ciphertext/tag byte (length prefixes excluded).
fn sealed_byte_offsets(container: &[u8]) -> Vec<(usize, usize)> {
    let mut offsets = Vec::new();
    let mut pos = HEADER_SIZE;
    let mut frame = 0;
    while pos < container.len() {
        let len = u32::from_be_bytes(container[pos..pos + 4].try_into().unwrap()) as usize;
        pos += LENGTH_PREFIX_SIZE;
        offsets.extend((pos..pos + len).map(|o| (o, frame)));
        pos += len;
        frame += 1;
    }
    offsets
}

#[test]
fn roundtrip_boundary_sizes() {
    let chunk = 1024;
    let key = SecretKey::generate();
    for size in [0, 1, chunk - 1, chunk, chunk + 1, 3 * chunk, 3 * chunk + 17] {
        let data = make_data(size);
        let (header, container) = seal(&data, &key, chunk);
        assert_eq!(open(&container, &key, &header).unwrap(), data, "size {size}");
    }
}

#[test]
fn scenario_200k_plaintext() {
    let data = make_data(200_000);
    let key = SecretKey::generate();
    let mut container = Vec::new();
    let (header, summary) = encode(&data[..], &mut container, &key, &EncodeOptions::default())
        .unwrap();
    assert_eq!(summary.message_frames, 200_000u64.div_ceil(64 * 1024));

    let decoder =
        StreamDecoder::new(&container[..], container.len() as u64, &key, &header).unwrap();
    let mut out = Vec::new();
    for chunk in decoder {
        out.extend_from_slice(&chunk.unwrap());
    }
    assert_eq!(out.len(), 200_000);
    assert_eq!(out, data);
}

#[test]
fn scenario_empty_plaintext() {
    let key = SecretKey::generate();
    let (header, container) = seal(&[], &key, 4096);
    assert_eq!(container.len(), HEADER_SIZE + LENGTH_PREFIX_SIZE + TAG_SIZE);

    let mut decoder =
        StreamDecoder::new(&container[..], container.len() as u64, &key, &header).unwrap();
    assert!(decoder.next().is_none());
    assert_eq!(decoder.frames(), 1, "exactly one FINAL frame");
}

#[test]
fn legacy_and_framed_decode_identically() {
    let key = SecretKey::generate();
    for size in [0, 10, LEGACY_CHUNK_SIZE, 2 * LEGACY_CHUNK_SIZE + 1234] {
        let data = make_data(size);
        let (framed_header, framed) = seal(&data, &key, LEGACY_CHUNK_SIZE);
        let (legacy_header, legacy) = seal_legacy(&data, &key);

        let from_framed = open(&framed, &key, &framed_header).unwrap();
        let mut from_legacy = Vec::new();
        decode(
            &legacy[..],
            legacy.len() as u64,
            &key,
            &legacy_header,
            &mut from_legacy,
            &DecodeOptions {
                format: Some(ContainerFormat::Legacy),
                ..DecodeOptions::default()
            },
        )
        .unwrap();
        assert_eq!(from_framed, data, "framed, size {size}");
        assert_eq!(from_legacy, data, "legacy, size {size}");
    }
}

#[test]
fn legacy_container_is_detected_and_decoded() {
    let key = SecretKey::generate();
    let data = make_data(2 * LEGACY_CHUNK_SIZE + 77);
    let (header, legacy) = seal_legacy(&data, &key);

    let mut decoder =
        StreamDecoder::new(&legacy[..], legacy.len() as u64, &key, &header).unwrap();
    assert_eq!(decoder.format(), ContainerFormat::Legacy);
    let mut out = Vec::new();
    while let Some(chunk) = decoder.next_chunk().unwrap() {
        out.extend_from_slice(&chunk);
    }
    assert!(decoder.is_finished());
    assert_eq!(decoder.frames(), 3);
    assert_eq!(out, data);

    // same result through the one-shot helper with default options
    assert_eq!(open(&legacy, &key, &header).unwrap(), data);
}

#[test]
fn trailing_garbage_after_final_is_ignored() {
    let key = SecretKey::generate();
    let data = make_data(5000);
    let (header, mut container) = seal(&data, &key, 1024);
    // something that looks like another frame
    container.extend_from_slice(&100u32.to_be_bytes());
    container.extend_from_slice(&[0xEE; 100]);
    assert_eq!(open(&container, &key, &header).unwrap(), data);
}

#[test]
fn large_file_decodes_one_frame_at_a_time() {
    const CHUNK: usize = 4096;
    const SIZE: u64 = 8 * 1024 * 1024;

    let key = SecretKey::generate();
    let mut file = tempfile::tempfile().unwrap();
    let source = io::repeat(0x42).take(SIZE);
    let opts = EncodeOptions::with_chunk_size(CHUNK).unwrap();
    let (header, summary) = encode(source, &mut file, &key, &opts).unwrap();
    file.flush().unwrap();
    file.seek(SeekFrom::Start(0)).unwrap();

    let total = file.metadata().unwrap().len();
    assert_eq!(total, summary.container_bytes);

    let decoder = StreamDecoder::new(io::BufReader::new(file), total, &key, &header).unwrap();
    let mut seen = 0u64;
    for chunk in decoder {
        let chunk = chunk.unwrap();
        assert!(chunk.len() <= CHUNK, "chunk of {} bytes", chunk.len());
        assert!(chunk.iter().all(|&b| b == 0x42));
        seen += chunk.len() as u64;
    }
    assert_eq!(seen, SIZE);
}

#[test]
fn independent_streams_decode_in_parallel() {
    let handles: Vec<_> = (0..4)
        .map(|i| {
            std::thread::spawn(move || {
                let data = make_data(30_000 + i * 1000);
                let key = SecretKey::generate();
                let (header, container) = seal(&data, &key, 2048);
                open(&container, &key, &header).unwrap() == data
            })
        })
        .collect();
    for handle in handles {
        assert!(handle.join().unwrap());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_roundtrip(
        data in proptest::collection::vec(any::<u8>(), 0..=20_000),
        chunk_size in 1usize..=8192,
    ) {
        let key = SecretKey::generate();
        let (header, container) = seal(&data, &key, chunk_size);
        prop_assert_eq!(open(&container, &key, &header).unwrap(), data);
    }

    #[test]
    fn prop_single_bit_flip_is_detected(
        size in 0usize..=6000,
        pick in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        const CHUNK: usize = 1000;
        let data = make_data(size);
        let key = SecretKey::generate();
        let (header, mut container) = seal(&data, &key, CHUNK);

        let offsets = sealed_byte_offsets(&container);
        let (offset, frame) = offsets[pick.index(offsets.len())];
        container[offset] ^= 1 << bit;

        let mut decoder =
            StreamDecoder::new(&container[..], container.len() as u64, &key, &header).unwrap();
        let mut out = Vec::new();
        let err = loop {
            match decoder.next() {
                Some(Ok(chunk)) => out.extend_from_slice(&chunk),
                Some(Err(e)) => break e,
                None => panic!("tampered container decoded cleanly"),
            }
        };
        prop_assert!(
            matches!(err, CodecError::Authentication { frame: f } if f == frame as u64),
            "unexpected error {:?}", err
        );
        // only frames before the corrupted one were released
        prop_assert_eq!(&out[..], &data[..(frame * CHUNK).min(data.len())]);
        prop_assert!(decoder.next().is_none());
    }
}
