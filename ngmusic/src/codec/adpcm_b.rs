use super::{padded_len, Adpcm};
use tracing::{instrument, trace};

/// Step-size scaling factor (in 64ths, i.e. 90%-240%), indexed by a decoded code's 3-bit
/// magnitude.
const STEP_TABLE: [i32; 8] = [57, 57, 57, 57, 77, 102, 128, 153];

const MIN_STEP: i32 = 127;
const MAX_STEP: i32 = 24576;

/// YM2610 ADPCM-B: encodes a full 16-bit input sample into a 4-bit code (1 sign bit, 3
/// magnitude bits). Unlike ADPCM-A, the step size is rescaled directly by [`STEP_TABLE`] rather
/// than stepping through an index into a fixed table.
#[derive(Debug, Clone)]
pub struct AdpcmB {
    step_size: i32,
    sample16: i32,
}

impl Default for AdpcmB {
    fn default() -> Self {
        Self::new()
    }
}

impl AdpcmB {
    /// Creates a codec in its initial state.
    pub fn new() -> Self {
        Self { step_size: MIN_STEP, sample16: 0 }
    }

    fn encode_sample(&mut self, sample16: i32) -> u8 {
        let step_size = self.step_size;
        let diff = sample16 - self.sample16;
        let magnitude = ((diff.unsigned_abs() as i64) << 16) / ((step_size as i64) << 14);
        let magnitude = magnitude.min(7) as u8;
        let sign = if diff < 0 { 0b1000 } else { 0 };

        let code = sign | magnitude;
        self.decode_sample(code);
        code
    }

    fn decode_sample(&mut self, code: u8) -> i32 {
        let step_size = self.step_size;
        let sign = code & 8;
        let magnitude = (code & 7) as i32;

        let mut quantized_diff = ((2 * magnitude + 1) * step_size) >> 3;
        if sign != 0 {
            quantized_diff = -quantized_diff;
        }

        let decoded = (self.sample16 + quantized_diff).clamp(-32768, 32767);
        let new_step_size = ((step_size * STEP_TABLE[magnitude as usize]) >> 6)
            .clamp(MIN_STEP, MAX_STEP);

        self.sample16 = decoded;
        self.step_size = new_step_size;
        decoded
    }
}

impl Adpcm for AdpcmB {
    fn reset(&mut self) {
        self.step_size = MIN_STEP;
        self.sample16 = 0;
    }

    #[instrument(level = "trace", name = "AdpcmB::encode", skip_all)]
    fn encode(&mut self, pcm: &[i16]) -> Vec<u8> {
        self.reset();
        let total = padded_len(pcm.len());
        trace!(samples = pcm.len(), padded = total, "encoding ADPCM-B block");
        let mut out = Vec::with_capacity(total);
        for &s in pcm {
            out.push(self.encode_sample(s as i32));
        }
        for _ in pcm.len()..total {
            out.push(self.encode_sample(0));
        }
        out
    }

    #[instrument(level = "trace", name = "AdpcmB::decode", skip_all)]
    fn decode(&mut self, codes: &[u8]) -> Vec<i16> {
        self.reset();
        trace!(codes = codes.len(), "decoding ADPCM-B block");
        codes.iter().map(|&c| self.decode_sample(c) as i16).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_restores_initial_step() {
        let mut codec = AdpcmB::new();
        codec.encode_sample(12345);
        assert_ne!(codec.step_size, MIN_STEP);
        codec.reset();
        assert_eq!(codec.step_size, MIN_STEP);
        assert_eq!(codec.sample16, 0);
    }

    #[test]
    fn test_round_trip_is_lossy_but_bounded() {
        let mut encoder = AdpcmB::new();
        let mut decoder = AdpcmB::new();
        let pcm: Vec<i16> = (0..256)
            .map(|i| (20000.0 * (i as f64 * 0.1).sin()) as i16)
            .collect();
        let codes = encoder.encode(&pcm);
        assert_eq!(codes.len(), super::super::SAMPLES_PER_BLOCK);
        let decoded = decoder.decode(&codes);
        for (i, &s) in pcm.iter().enumerate() {
            assert!((decoded[i] as i32 - s as i32).abs() < 16384, "sample {i} drifted too far");
        }
    }

    #[test]
    fn test_step_size_stays_within_bounds() {
        let mut codec = AdpcmB::new();
        let pcm = [32767i16, -32768, 32767, -32768, 0, 32767];
        for &s in pcm.iter().cycle().take(512) {
            codec.encode_sample(s as i32);
            assert!(codec.step_size >= MIN_STEP && codec.step_size <= MAX_STEP);
        }
    }
}
