use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use ngmusic::codec::{Adpcm, AdpcmA, AdpcmB};

/// A few seconds of a synthetic sine-ish wave, enough to exercise the adaptive step machinery
/// across its full range without checking in a WAV fixture.
const NUM_SAMPLES: usize = 4 * 18500;

fn synthetic_pcm(len: usize) -> Vec<i16> {
    (0..len)
        .map(|i| {
            let t = i as f32 / 18500.0;
            (8000.0 * (t * 440.0 * std::f32::consts::TAU).sin()) as i16
        })
        .collect()
}

pub fn bench(c: &mut Criterion) {
    let pcm = synthetic_pcm(NUM_SAMPLES);

    c.bench_with_input(BenchmarkId::new("encode_adpcm_a", NUM_SAMPLES), &pcm, |b, pcm| {
        b.iter(|| AdpcmA::default().encode(pcm))
    });
    c.bench_with_input(BenchmarkId::new("encode_adpcm_b", NUM_SAMPLES), &pcm, |b, pcm| {
        b.iter(|| AdpcmB::default().encode(pcm))
    });
}

criterion_group!(benches, bench);
criterion_main!(benches);
