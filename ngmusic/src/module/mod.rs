//! Parser for the Furnace tracker module container.
//!
//! A module is parsed once at load time into an immutable in-memory tree (`Module`,
//! `Pattern`, `Instrument`, `Sample`). Nothing downstream mutates it; the compiler only reads
//! from it while building an opcode stream.

mod instrument;
mod pattern;
mod sample;

pub(crate) mod parser;

pub use instrument::{
    AdpcmInstrument, FmInstrument, FmOperator, Instrument, SsgProgram, SsgRegisterGroup,
};
pub use pattern::{Effect, Pattern, Row, NOTE_OFF};
pub use sample::{AdpcmASample, AdpcmBSample, PcmSample, Sample};

use crate::common::ReaderError;
use crate::codec;
use std::collections::HashMap;
use thiserror::Error;

/// The result type for module-parsing operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for module-parsing operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("bad module magic")]
    BadMagic,

    #[error("module uses unsupported chip configuration (expected exactly one YM2610)")]
    UnsupportedChip,

    #[error("module declares {0} subsongs; only single-subsong modules are supported")]
    UnsupportedMultisubsong(u16),

    #[error("unrecognized sample type {0}")]
    UnsupportedSampleType(u8),

    #[error("unrecognized instrument type {0}")]
    UnsupportedInstrumentType(u16),

    #[error("instrument format version {0} is older than the minimum supported version 127")]
    UnsupportedInstrumentVersion(u16),

    #[error("macro sequence type {0} is not an 8-bit unsigned sequence")]
    UnsupportedMacroSequenceType(u8),

    #[error("PCM sample-map (NE) tag has non-zero payload: per-note sample maps are unsupported")]
    UnsupportedPcmSampleMap,

    #[error("chunk at offset {offset:#x}: expected magic {expected:?}, found {found:?}")]
    BadChunkMagic { offset: usize, expected: &'static str, found: [u8; 4] },

    #[error("pattern channel {channel} produced {got} rows, expected {expected}")]
    InconsistentPatternLength { channel: u8, got: usize, expected: usize },

    #[error("ADPCM sample byte count is not a multiple of 256")]
    MisalignedAdpcmSample,

    #[error("ADPCM sample count is odd")]
    OddAdpcmSampleCount,

    #[error("instrument feature tag {tag:?} has unexpected payload length {length}")]
    BadFeaturePayload { tag: [u8; 2], length: u16 },

    #[error(transparent)]
    Reader(Box<ReaderError>),

    #[error(transparent)]
    Decompress(Box<std::io::Error>),
}

crate::from_error_boxed!(Error::Reader, ReaderError);

/// A parsed Furnace tracker module.
#[derive(Debug, Clone)]
pub struct Module {
    pub name: String,
    pub author: String,
    /// Tick counts cycled per row, at least one entry.
    pub speeds: Vec<u8>,
    /// Playback tick frequency in Hz.
    pub frequency: f32,
    /// Rows per pattern (shared by every pattern in the module).
    pub pattern_len: u16,
    /// Per-channel count of effect columns (1..=8), 14 entries.
    pub fx_columns: [u8; NUM_CHANNELS],
    /// `orders[order_index][channel]` yields a pattern id.
    pub orders: Vec<[u8; NUM_CHANNELS]>,
    pub instruments: Vec<Instrument>,
    pub samples: Vec<Sample>,
    /// Keyed by `(pattern_id, channel)`; see `furtool`'s per-channel pattern table.
    patterns: HashMap<(u8, u8), Pattern>,
}

/// Total channel count: 4 FM, 3 SSG, 6 ADPCM-A, 1 ADPCM-B.
pub const NUM_CHANNELS: usize = 14;
pub const NUM_FM_CHANNELS: usize = 4;
pub const NUM_SSG_CHANNELS: usize = 3;
pub const NUM_ADPCM_A_CHANNELS: usize = 6;
pub const NUM_ADPCM_B_CHANNELS: usize = 1;

/// A channel family, determining which opcode set and channel-shadow state apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelFamily {
    Fm,
    Ssg,
    AdpcmA,
    AdpcmB,
}

impl ChannelFamily {
    /// Classifies a channel index (0..14) by its position in the fixed FM/SSG/A/B layout.
    pub fn of(channel: u8) -> Self {
        match channel as usize {
            c if c < NUM_FM_CHANNELS => ChannelFamily::Fm,
            c if c < NUM_FM_CHANNELS + NUM_SSG_CHANNELS => ChannelFamily::Ssg,
            c if c < NUM_FM_CHANNELS + NUM_SSG_CHANNELS + NUM_ADPCM_A_CHANNELS => {
                ChannelFamily::AdpcmA
            }
            _ => ChannelFamily::AdpcmB,
        }
    }

    /// The 1-based subchannel slot within the family (e.g. FM channel 5 is slot 2).
    pub fn slot(channel: u8) -> u8 {
        let c = channel as usize;
        (match Self::of(channel) {
            ChannelFamily::Fm => c,
            ChannelFamily::Ssg => c - NUM_FM_CHANNELS,
            ChannelFamily::AdpcmA => c - NUM_FM_CHANNELS - NUM_SSG_CHANNELS,
            ChannelFamily::AdpcmB => c - NUM_FM_CHANNELS - NUM_SSG_CHANNELS - NUM_ADPCM_A_CHANNELS,
        } + 1) as u8
    }

    /// The maximum volume value accepted on this family's channels.
    pub fn max_volume(self) -> u8 {
        match self {
            ChannelFamily::Fm => 0x7f,
            ChannelFamily::Ssg => 0x0f,
            ChannelFamily::AdpcmA => 0x1f,
            ChannelFamily::AdpcmB => 0xff,
        }
    }
}

impl Module {
    /// Parses a module from its DEFLATE-compressed container bytes.
    pub fn parse(data: &[u8]) -> Result<Self> {
        parser::parse(data)
    }

    /// An order-less, pattern-less module, used by compiler tests exercising the empty-module
    /// lowering path.
    #[cfg(test)]
    pub(crate) fn empty() -> Self {
        Module {
            name: String::new(),
            author: String::new(),
            speeds: vec![6],
            frequency: 60.0,
            pattern_len: 0,
            fx_columns: [1; NUM_CHANNELS],
            orders: Vec::new(),
            instruments: Vec::new(),
            samples: Vec::new(),
            patterns: HashMap::new(),
        }
    }

    /// Looks up the decoded rows for a `(pattern_id, channel)` pair, as referenced by an order
    /// cell. Returns `None` if the module never declared a `PATN` chunk for that pair — callers
    /// treat this the same as an all-empty pattern of `pattern_len` rows.
    pub fn pattern(&self, pattern_id: u8, channel: u8) -> Option<&Pattern> {
        self.patterns.get(&(pattern_id, channel))
    }
}
