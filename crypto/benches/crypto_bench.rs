use criterion::{black_box, criterion_group, criterion_main, Criterion};
use trustgate_crypto::DerivationInput;
use trustgate_types::BlockSeed;

fn blake2b_256_bench(c: &mut Criterion) {
    let data = [0xABu8; 256];

    c.bench_function("blake2b_256_256B", |b| {
        b.iter(|| trustgate_crypto::blake2b_256(black_box(&data)))
    });
}

fn derive_nonce_bench(c: &mut Criterion) {
    let seed = BlockSeed::new([7u8; 32]);
    let now = 1_700_000_000u64.to_be_bytes();

    c.bench_function("derive_nonce", |b| {
        b.iter(|| {
            let input = DerivationInput::new()
                .with_str("acct_bench")
                .with_str("sms")
                .with(&now);
            trustgate_crypto::derive_nonce(black_box(&seed), &input)
        })
    });
}

fn hash_phone_bench(c: &mut Criterion) {
    c.bench_function("hash_phone", |b| {
        b.iter(|| trustgate_crypto::hash_phone(black_box("+1 (555) 010-0000")))
    });
}

criterion_group!(
    benches,
    blake2b_256_bench,
    derive_nonce_bench,
    hash_phone_bench
);
criterion_main!(benches);
