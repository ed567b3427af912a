use std::io;

use vidvault_crypto::{decode, encode, DecodeOptions, EncodeOptions, SecretKey};

fn make_data(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| (i.wrapping_mul(7) ^ (i >> 3)) as u8)
        .collect()
}

#[divan::bench(args = [65536, 1048576, 16777216])]
fn bench_encode(bencher: divan::Bencher, size: usize) {
    let key = SecretKey::generate();
    let data = make_data(size);
    let opts = EncodeOptions::default();
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| {
            encode(
                divan::black_box(&data[..]),
                io::sink(),
                divan::black_box(&key),
                &opts,
            )
            .unwrap()
        });
}

#[divan::bench(args = [65536, 1048576, 16777216])]
fn bench_decode(bencher: divan::Bencher, size: usize) {
    let key = SecretKey::generate();
    let data = make_data(size);
    let mut container = Vec::new();
    let (header, _) = encode(&data[..], &mut container, &key, &EncodeOptions::default()).unwrap();
    let opts = DecodeOptions::default();
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| {
            decode(
                divan::black_box(&container[..]),
                container.len() as u64,
                &key,
                &header,
                io::sink(),
                &opts,
            )
            .unwrap()
        });
}

fn main() {
    divan::main();
}
