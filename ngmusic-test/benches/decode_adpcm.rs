use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use ngmusic::codec::{Adpcm, AdpcmA, AdpcmB};

/// A few seconds of synthetic codes at the YM2610's native rates, enough to exercise the
/// adaptive step machinery across its full range.
const NUM_CODES: usize = 4 * 18500;

fn synthetic_codes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 16) as u8).collect()
}

pub fn bench(c: &mut Criterion) {
    let codes = synthetic_codes(NUM_CODES);

    c.bench_with_input(BenchmarkId::new("decode_adpcm_a", NUM_CODES), &codes, |b, codes| {
        b.iter(|| AdpcmA::default().decode(codes))
    });
    c.bench_with_input(BenchmarkId::new("decode_adpcm_b", NUM_CODES), &codes, |b, codes| {
        b.iter(|| AdpcmB::default().decode(codes))
    });
}

criterion_group!(benches, bench);
criterion_main!(benches);
