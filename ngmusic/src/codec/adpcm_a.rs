use super::{padded_len, Adpcm};
use crate::common::clamp_cast;
use tracing::{instrument, trace};

/// Adaptive step size for the quantizer. The size grows roughly geometrically (`size(n) ≈ 1.1 *
/// size(n-1)`); 49 steps is enough to encode a 12-bit input.
const STEP_SIZE: [i32; 49] = [
    16, 17, 19, 21, 23, 25, 28, 31, 34, 37, 41, 45, 50, 55, 60, 66, 73, 80, 88, 97, 107, 118, 130,
    143, 157, 173, 190, 209, 230, 253, 279, 307, 337, 371, 408, 449, 494, 544, 598, 658, 724, 796,
    876, 963, 1060, 1166, 1282, 1411, 1552,
];

/// Step-index adjustment, indexed by a decoded code's 3-bit magnitude.
const STEP_ADJ: [i32; 8] = [-1, -1, -1, -1, 2, 5, 7, 9];

/// YM2610 ADPCM-A: a variant of IMA ADPCM that quantizes a 12-bit input sample into a 4-bit code
/// (1 sign bit, 3 magnitude bits). Close to Dialogic IMA ADPCM.
#[derive(Debug, Clone)]
pub struct AdpcmA {
    step_index: usize,
    sample12: i32,
}

impl Default for AdpcmA {
    fn default() -> Self {
        Self::new()
    }
}

impl AdpcmA {
    /// Creates a codec in its initial state.
    pub fn new() -> Self {
        Self { step_index: 0, sample12: 0 }
    }

    fn encode_sample(&mut self, sample12: i32) -> u8 {
        let diff = sample12 - self.sample12;
        let sign = if diff < 0 { 0b1000 } else { 0 };
        let mut magnitude = 0u8;
        let mut diff = diff.unsigned_abs() as i32;

        let mut threshold = STEP_SIZE[self.step_index];
        if diff >= threshold {
            magnitude |= 0b0100;
            diff -= threshold;
        }
        threshold >>= 1;
        if diff >= threshold {
            magnitude |= 0b0010;
            diff -= threshold;
        }
        threshold >>= 1;
        if diff >= threshold {
            magnitude |= 0b0001;
        }

        let code = sign | magnitude;
        self.decode_sample(code);
        code
    }

    fn decode_sample(&mut self, code: u8) -> i32 {
        let step_size = STEP_SIZE[self.step_index];
        let sign = code & 8;
        let magnitude = (code & 7) as i32;

        let mut quantized_diff = ((2 * magnitude + 1) * step_size) >> 3;
        if sign != 0 {
            quantized_diff = -quantized_diff;
        }

        let decoded = (self.sample12 + quantized_diff).clamp(-2048, 2047);
        let new_step_index = (self.step_index as i32 + STEP_ADJ[magnitude as usize]).clamp(0, 48);

        self.sample12 = decoded;
        self.step_index = new_step_index as usize;
        decoded
    }
}

impl Adpcm for AdpcmA {
    fn reset(&mut self) {
        self.step_index = 0;
        self.sample12 = 0;
    }

    #[instrument(level = "trace", name = "AdpcmA::encode", skip_all)]
    fn encode(&mut self, pcm: &[i16]) -> Vec<u8> {
        self.reset();
        let total = padded_len(pcm.len());
        trace!(samples = pcm.len(), padded = total, "encoding ADPCM-A block");
        let mut out = Vec::with_capacity(total);
        for &s in pcm {
            out.push(self.encode_sample((s as i32) >> 4));
        }
        for _ in pcm.len()..total {
            out.push(self.encode_sample(0));
        }
        out
    }

    #[instrument(level = "trace", name = "AdpcmA::decode", skip_all)]
    fn decode(&mut self, codes: &[u8]) -> Vec<i16> {
        self.reset();
        trace!(codes = codes.len(), "decoding ADPCM-A block");
        codes.iter().map(|&c| clamp_cast(self.decode_sample(c) << 4, i16::MIN, i16::MAX)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset() {
        let mut codec = AdpcmA::new();
        codec.encode_sample(7);
        assert_ne!(codec.step_index, 0);
        codec.reset();
        assert_eq!(codec.step_index, 0);
        assert_eq!(codec.sample12, 0);
    }

    #[test]
    fn test_round_trip_is_lossy_but_bounded() {
        let mut encoder = AdpcmA::new();
        let mut decoder = AdpcmA::new();
        let pcm: Vec<i16> = (0..64)
            .map(|i| (8000.0 * (i as f64 * 0.2).sin()) as i16)
            .collect();
        let codes = encoder.encode(&pcm);
        assert_eq!(codes.len(), super::super::SAMPLES_PER_BLOCK);
        let decoded = decoder.decode(&codes);
        assert_eq!(decoded.len(), codes.len());
        for (i, &s) in pcm.iter().enumerate() {
            assert!((decoded[i] as i32 - s as i32).abs() < 4096, "sample {i} drifted too far");
        }
    }

    #[test]
    fn test_silence_round_trips_to_silence() {
        let mut encoder = AdpcmA::new();
        let mut decoder = AdpcmA::new();
        let pcm = vec![0i16; 512];
        let codes = encoder.encode(&pcm);
        let decoded = decoder.decode(&codes);
        assert!(decoded.iter().all(|&s| s == 0));
    }

    #[test]
    fn test_padding_extends_to_block_boundary() {
        let mut encoder = AdpcmA::new();
        let codes = encoder.encode(&[0i16; 1]);
        assert_eq!(codes.len(), super::super::SAMPLES_PER_BLOCK);
    }
}
