//! YM2610 ADPCM-A and ADPCM-B codecs.
//!
//! Both codecs are delta modulators: each 4-bit code carries a sign bit and a 3-bit quantized
//! magnitude of the difference from the previously decoded sample, and each decoded sample
//! feeds back into the adaptive step used to decode the next one. Encoding a stream therefore
//! reuses the decoder internally to keep the encoder's state in lock-step with what a real
//! decoder would reconstruct.

mod adpcm_a;
mod adpcm_b;

pub use adpcm_a::AdpcmA;
pub use adpcm_b::AdpcmB;

use thiserror::Error;

/// The result type for codec operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for codec operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("only mono audio is supported")]
    NotMono,

    #[error("only 16-bit PCM samples are supported")]
    UnsupportedSampleWidth,

    #[error(transparent)]
    Io(Box<std::io::Error>),
}

crate::from_error_boxed!(Error::Io, std::io::Error);

/// A codec that turns 16-bit PCM samples into a stream of 4-bit ADPCM codes and back.
///
/// Implementations keep internal adaptive state; [`reset`](Adpcm::reset) returns them to their
/// initial state. [`encode`](Adpcm::encode) and [`decode`](Adpcm::decode) each reset the codec
/// before processing, matching the reference tool's one-shot-per-call behavior.
pub trait Adpcm {
    /// Restores the codec's adaptive state to its initial values.
    fn reset(&mut self);

    /// Encodes a block of 16-bit PCM samples into one 4-bit code per output byte (low nibble),
    /// zero-padding the input to a multiple of [`SAMPLES_PER_BLOCK`] codes so the result always
    /// fills whole YM2610 blocks. Use [`pack_nibbles`] to pack the result two codes per byte.
    fn encode(&mut self, pcm: &[i16]) -> Vec<u8>;

    /// Decodes a block of 4-bit ADPCM codes (one per element, high nibble unused) into 16-bit
    /// PCM samples.
    fn decode(&mut self, codes: &[u8]) -> Vec<i16>;
}

/// The YM2610 only plays back ADPCM data in multiples of this many 4-bit codes (256 bytes).
pub const SAMPLES_PER_BLOCK: usize = 512;

/// Rounds `len` up to the next multiple of [`SAMPLES_PER_BLOCK`].
pub(crate) fn padded_len(len: usize) -> usize {
    (len + (SAMPLES_PER_BLOCK - 1)) / SAMPLES_PER_BLOCK * SAMPLES_PER_BLOCK
}

/// Packs a stream of 4-bit codes into bytes, two codes per byte (first code in the high nibble).
pub fn pack_nibbles(codes: &[u8]) -> Vec<u8> {
    codes.chunks(2).map(|pair| (pair[0] << 4) | pair.get(1).copied().unwrap_or(0)).collect()
}

/// Unpacks a byte stream into one 4-bit code per nibble (high nibble first).
pub fn unpack_nibbles(bytes: &[u8]) -> Vec<u8> {
    let mut codes = Vec::with_capacity(bytes.len() * 2);
    for &b in bytes {
        codes.push(b >> 4);
        codes.push(b & 0xf);
    }
    codes
}
