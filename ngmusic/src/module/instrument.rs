use super::sample::{asm_name, AdpcmASample, AdpcmBSample, Sample};
use super::{Error, Result};
use crate::codec::{pack_nibbles, Adpcm, AdpcmA, AdpcmB};
use crate::common::Reader;
use std::collections::HashMap;
use tracing::warn;

/// One of the four YM2610 FM operators making up an [`FmInstrument`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FmOperator {
    /// Hardware sign-magnitude detune (bit 2 sign, bits 1..0 magnitude), already converted from
    /// Furnace's raw `0..7` representation (`3` = no detune).
    pub detune: u8,
    pub multiply: u8,
    pub total_level: u8,
    pub key_scale: u8,
    pub attack_rate: u8,
    pub am_on: bool,
    pub decay_rate: u8,
    pub kvs: u8,
    pub sustain_rate: u8,
    pub sustain_level: u8,
    pub release_rate: u8,
    pub ssg_eg: u8,
}

/// A 4-operator FM instrument.
#[derive(Debug, Clone, Default)]
pub struct FmInstrument {
    pub algorithm: u8,
    pub feedback: u8,
    pub am_sense: u8,
    pub fm_sense: u8,
    pub operators: [FmOperator; 4],
}

/// A register group an SSG macro step can target. Order matters: it is the fixed interleave
/// order used when flattening separate per-code sequences into one program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SsgRegisterGroup {
    Envelope,
    Pitch,
    Volume,
    Waveform,
    Arpeggio,
    NoiseFreq,
    PhaseReset,
}

/// A compiled SSG micro-program: per-tick register values for the 3-register SSG channel,
/// flattened from Furnace's independent per-code macro sequences.
#[derive(Debug, Clone, Default)]
pub struct SsgProgram {
    /// Distinct register groups referenced by this macro, in interleave order.
    pub keys: Vec<SsgRegisterGroup>,
    /// Each group's starting offset within the flattened `steps` program.
    pub offsets: HashMap<SsgRegisterGroup, u8>,
    /// The flattened, conceptually `0xFF`-terminated step program (kept widened to `i16` so
    /// negative pitch/arpeggio steps and the terminator both fit before final byte packing).
    pub steps: Vec<i16>,
    /// Per-tick mask of which groups must be (re)written, `EVAL_MACRO` bit included.
    pub load_bits: Vec<u16>,
    pub loop_point: Option<u8>,
    /// `(numerator, denominator)` for a simulated auto-envelope, if declared.
    pub auto_env: Option<(u8, u8)>,
}

/// Set on every [`SsgProgram::load_bits`] entry except the last tick of a non-looping macro.
pub const EVAL_MACRO: u16 = 0x8000;

/// Reference to a sample consumed by an ADPCM-A/B instrument.
#[derive(Debug, Clone, Copy)]
pub struct AdpcmInstrument {
    pub sample_index: usize,
}

/// A parsed `INS2` instrument.
#[derive(Debug, Clone)]
pub enum Instrument {
    Fm { name: String, instrument: FmInstrument },
    Ssg { name: String, program: SsgProgram },
    AdpcmA { name: String, instrument: AdpcmInstrument },
    AdpcmB { name: String, instrument: AdpcmInstrument, tuned: i32, looping: bool },
}

impl Instrument {
    pub fn name(&self) -> &str {
        match self {
            Instrument::Fm { name, .. }
            | Instrument::Ssg { name, .. }
            | Instrument::AdpcmA { name, .. }
            | Instrument::AdpcmB { name, .. } => name,
        }
    }
}

/// Minimum `INS2` format version this parser understands.
const MIN_INSTRUMENT_VERSION: u16 = 127;

const FM_TYPE: u16 = 1;
const SSG_TYPE: u16 = 6;
const ADPCM_A_TYPE: u16 = 37;
const ADPCM_B_TYPE: u16 = 38;

fn ubits(b: u8, hi: u8, lo: u8) -> u8 {
    let width = hi - lo + 1;
    let mask = (1u16 << width) - 1;
    ((b as u16 >> lo) & mask) as u8
}

/// Converts Furnace's raw `0..7` detune field (`3` = no detune) into the YM2610's hardware
/// sign-magnitude layout (bit 2 sign, bits 1..0 magnitude).
fn hw_detune(raw: u8) -> u8 {
    let signed = raw as i8 - 3;
    if signed >= 0 {
        signed as u8
    } else {
        (-signed) as u8 | 0b100
    }
}

fn read_fm_instrument(r: &mut Reader<'_>) -> Result<FmInstrument> {
    let header = r.u1()?;
    if header != 0xf4 {
        return Err(Error::BadFeaturePayload { tag: *b"FM", length: header as u16 });
    }
    let b = r.u1()?;
    let algorithm = ubits(b, 6, 4);
    let feedback = ubits(b, 2, 0);
    let b = r.u1()?;
    let am_sense = ubits(b, 4, 3);
    let fm_sense = ubits(b, 2, 0);
    let _unused = r.u1()?;

    let mut operators = [FmOperator::default(); 4];
    for op in operators.iter_mut() {
        let b = r.u1()?;
        let detune = hw_detune(ubits(b, 6, 4));
        let multiply = ubits(b, 3, 0);
        let b = r.u1()?;
        let total_level = ubits(b, 6, 0);
        let b = r.u1()?;
        let key_scale = ubits(b, 7, 6);
        let attack_rate = ubits(b, 4, 0);
        let b = r.u1()?;
        let am_on = ubits(b, 7, 7) != 0;
        let decay_rate = ubits(b, 4, 0);
        let b = r.u1()?;
        let kvs = ubits(b, 6, 5);
        let sustain_rate = ubits(b, 4, 0);
        let b = r.u1()?;
        let sustain_level = ubits(b, 7, 4);
        let release_rate = ubits(b, 3, 0);
        let b = r.u1()?;
        let ssg_eg = ubits(b, 3, 0);
        let _unused = r.u1()?;
        *op = FmOperator {
            detune,
            multiply,
            total_level,
            key_scale,
            attack_rate,
            am_on,
            decay_rate,
            kvs,
            sustain_rate,
            sustain_level,
            release_rate,
            ssg_eg,
        };
    }
    Ok(FmInstrument { algorithm, feedback, am_sense, fm_sense, operators })
}

/// Recognised SSG macro code ids. Furnace does not publish these in the spec text; this mapping
/// follows the macro-type ordering Furnace itself uses internally and is recorded as an
/// implementation decision (see DESIGN.md).
mod ssg_code {
    pub const VOLUME: u8 = 0;
    pub const ARPEGGIO: u8 = 1;
    pub const NOISE_FREQ: u8 = 2;
    pub const WAVEFORM: u8 = 3;
    pub const PITCH: u8 = 4;
    pub const PHASE_RESET: u8 = 5;
    pub const ENVELOPE: u8 = 6;
    pub const ENV_NUM: u8 = 7;
    pub const ENV_DEN: u8 = 8;
}

struct MacroBlock {
    code: u8,
    loop_index: Option<u8>,
    payload: Vec<u8>,
}

fn read_macro_blocks(r: &mut Reader<'_>, end: usize) -> Result<Vec<MacroBlock>> {
    let mut blocks = Vec::new();
    while r.pos() < end {
        let code = r.u1()?;
        let length = r.u1()? as usize;
        let loop_raw = r.u1()?;
        let _release = r.u1()?;
        let _mode = r.u1()?;
        let seq_type = r.u1()?;
        if seq_type != 0 {
            return Err(Error::UnsupportedMacroSequenceType(seq_type));
        }
        let _delay = r.u1()?;
        let _speed = r.u1()?;
        let payload = r.read(length)?.to_vec();
        let loop_index = if loop_raw == 0xff || loop_raw as usize >= length {
            None
        } else {
            Some(loop_raw)
        };
        blocks.push(MacroBlock { code, loop_index, payload });
    }
    Ok(blocks)
}

/// Compiles the per-code macro blocks read from an `MA` feature tag into a flattened
/// [`SsgProgram`], applying the waveform/noise merge and auto-envelope extraction described in
/// the instrument decoder spec.
fn compile_ssg_macro(mut blocks: Vec<MacroBlock>) -> SsgProgram {
    use ssg_code::*;

    let auto_env = {
        let num = blocks.iter().find(|b| b.code == ENV_NUM).and_then(|b| b.payload.first().copied());
        let den = blocks.iter().find(|b| b.code == ENV_DEN).and_then(|b| b.payload.first().copied());
        blocks.retain(|b| b.code != ENV_NUM && b.code != ENV_DEN);
        match (num, den) {
            (Some(n), Some(d)) => Some((n, d)),
            _ => None,
        }
    };

    // Split the waveform block's 3-bit-per-step payload into an envelope-reset bit (merged
    // into the volume sequence) and a noise/tone nibble (inverted, kept as the waveform value).
    let mut env_bits_from_waveform: Option<Vec<u8>> = None;
    for b in blocks.iter_mut() {
        if b.code == WAVEFORM {
            let mut env_bits = Vec::with_capacity(b.payload.len());
            let mut waveform = Vec::with_capacity(b.payload.len());
            for &v in &b.payload {
                let env = (v >> 2) & 1;
                let noise = (v >> 1) & 1;
                let tone = v & 1;
                env_bits.push(env);
                waveform.push(!((noise << 3) | tone));
            }
            b.payload = waveform;
            env_bits_from_waveform = Some(env_bits);
        }
    }
    if let Some(env_bits) = env_bits_from_waveform {
        match blocks.iter_mut().find(|b| b.code == VOLUME) {
            Some(vol) => {
                for (i, bit) in env_bits.iter().enumerate() {
                    if let Some(v) = vol.payload.get_mut(i) {
                        *v |= bit << 4;
                    }
                }
            }
            None => {
                blocks.push(MacroBlock {
                    code: VOLUME,
                    loop_index: None,
                    payload: env_bits.iter().map(|b| b << 4).collect(),
                });
            }
        }
    }

    let group_of = |code: u8| -> Option<SsgRegisterGroup> {
        match code {
            VOLUME => Some(SsgRegisterGroup::Volume),
            ARPEGGIO => Some(SsgRegisterGroup::Arpeggio),
            NOISE_FREQ => Some(SsgRegisterGroup::NoiseFreq),
            WAVEFORM => Some(SsgRegisterGroup::Waveform),
            PITCH => Some(SsgRegisterGroup::Pitch),
            PHASE_RESET => Some(SsgRegisterGroup::PhaseReset),
            ENVELOPE => Some(SsgRegisterGroup::Envelope),
            _ => None,
        }
    };

    // Fixed interleave order; any recognised-but-unlisted groups are appended in first-seen
    // order after it.
    const FIXED_ORDER: [SsgRegisterGroup; 5] = [
        SsgRegisterGroup::Envelope,
        SsgRegisterGroup::Pitch,
        SsgRegisterGroup::Volume,
        SsgRegisterGroup::Waveform,
        SsgRegisterGroup::Arpeggio,
    ];

    let mut present: Vec<(SsgRegisterGroup, &MacroBlock)> = blocks
        .iter()
        .filter_map(|b| group_of(b.code).map(|g| (g, b)))
        .collect();
    present.sort_by_key(|(g, _)| {
        FIXED_ORDER.iter().position(|x| x == g).unwrap_or(FIXED_ORDER.len())
    });

    let keys: Vec<SsgRegisterGroup> = present.iter().map(|(g, _)| *g).collect();
    let total_len = present.iter().map(|(_, b)| b.payload.len()).max().unwrap_or(0);

    let mut steps = Vec::new();
    let mut offsets = HashMap::new();
    for (group, block) in &present {
        offsets.insert(*group, steps.len() as u8);
        for &v in &block.payload {
            let signed = matches!(group, SsgRegisterGroup::Pitch | SsgRegisterGroup::Arpeggio);
            steps.push(if signed { v as i8 as i16 } else { v as i16 });
        }
        steps.push(-1); // 0xFF terminator for this group's region
    }

    let loop_point = present.iter().filter_map(|(_, b)| b.loop_index).min();

    let mut load_bits = Vec::with_capacity(total_len);
    for tick in 0..total_len {
        let mut bits: u16 = 0;
        for (i, (_, block)) in present.iter().enumerate() {
            if tick < block.payload.len() {
                bits |= 1 << i;
            }
        }
        if loop_point.is_some() || tick + 1 < total_len {
            bits |= EVAL_MACRO;
        }
        load_bits.push(bits);
    }

    SsgProgram { keys, offsets, steps, load_bits, loop_point, auto_env }
}

/// Reads a single `INS2` chunk located at the reader's current position. `samples` is the
/// module's already-decoded sample table, looked up by the `SM` feature tag.
pub(crate) fn read_instrument(r: &mut Reader<'_>, samples: &mut [Sample]) -> Result<Instrument> {
    let start = r.pos();
    let magic = r.read(4)?;
    if magic != b"INS2" {
        return Err(Error::BadChunkMagic {
            offset: start,
            expected: "INS2",
            found: magic.try_into().unwrap_or([0; 4]),
        });
    }
    let end = start + r.u4()? as usize;
    let version = r.u2()?;
    if version < MIN_INSTRUMENT_VERSION {
        return Err(Error::UnsupportedInstrumentVersion(version));
    }
    let kind = r.u2()?;
    if kind != FM_TYPE && kind != SSG_TYPE && kind != ADPCM_A_TYPE && kind != ADPCM_B_TYPE {
        return Err(Error::UnsupportedInstrumentType(kind));
    }

    let mut name = String::new();
    let mut fm = None;
    let mut ssg_blocks: Vec<MacroBlock> = Vec::new();
    let mut sample_index: Option<usize> = None;

    while r.pos() < end {
        let tag_bytes = r.read(2)?;
        let tag: [u8; 2] = tag_bytes.try_into().unwrap();
        let length = r.u2()?;
        let tag_end = r.pos() + length as usize;
        match &tag {
            b"NA" => name = asm_name(&r.ustr()?),
            b"FM" => fm = Some(read_fm_instrument(r)?),
            b"LD" => {
                r.read(length as usize)?;
            }
            b"SM" => {
                sample_index = Some(r.u2()? as usize);
                let _flags = r.u2()?;
            }
            b"MA" => {
                if kind == SSG_TYPE {
                    ssg_blocks.extend(read_macro_blocks(r, tag_end)?);
                } else {
                    warn!(instrument_type = kind, "uninterpreted MA macro data on a non-SSG instrument");
                    r.read(length as usize)?;
                }
            }
            b"NE" => {
                let flag = r.u1()?;
                if flag != 0 {
                    return Err(Error::UnsupportedPcmSampleMap);
                }
            }
            _ => {
                r.read(length as usize)?;
            }
        }
        // Feature payloads are sized by their own length header; resynchronize in case a
        // handler above didn't consume exactly that many bytes (e.g. a macro block list whose
        // internal framing already tracks `tag_end`).
        r.seek(tag_end);
    }

    let instrument = match kind {
        FM_TYPE => Instrument::Fm { name, instrument: fm.unwrap_or_default() },
        SSG_TYPE => Instrument::Ssg { name, program: compile_ssg_macro(ssg_blocks) },
        ADPCM_A_TYPE => {
            let idx = sample_index.unwrap_or(0);
            transcode_if_needed_a(samples, idx)?;
            Instrument::AdpcmA { name, instrument: AdpcmInstrument { sample_index: idx } }
        }
        ADPCM_B_TYPE => {
            let idx = sample_index.unwrap_or(0);
            let looping = transcode_if_needed_b(samples, idx)?;
            let tuned = samples.get(idx).map(tuning_offset).unwrap_or(0);
            Instrument::AdpcmB {
                name,
                instrument: AdpcmInstrument { sample_index: idx },
                tuned,
                looping,
            }
        }
        _ => unreachable!(),
    };
    Ok(instrument)
}

/// Transcodes a PCM sample referenced by an ADPCM-A instrument in place, if it hasn't been
/// converted already.
fn transcode_if_needed_a(samples: &mut [Sample], idx: usize) -> Result<()> {
    if let Some(Sample::Pcm(pcm)) = samples.get(idx) {
        let mut codec = AdpcmA::new();
        let data = pack_nibbles(&codec.encode(&pcm.data));
        let name = pcm.name.clone();
        let rate = pcm.rate;
        samples[idx] = Sample::AdpcmA(AdpcmASample { name, data, rate });
    }
    Ok(())
}

/// ADPCM-B's nominal C4 playback rate (`furtool.py` asserts every ADPCM-B `SMP2` chunk carries
/// exactly this rate; a sample digitized at a different rate needs its note operands shifted by
/// the semitone offset between the two so it still sounds at the pitch the tracker intended).
const ADPCM_B_NOMINAL_RATE: f64 = 44100.0;

/// The semitone offset `tune_adpcm_b_notes` (pass 11) adds to every note played on this
/// instrument, derived from how far its sample's digitized rate sits from the nominal rate.
fn tuning_offset(sample: &Sample) -> i32 {
    let rate = match sample {
        Sample::AdpcmB(s) => s.rate,
        _ => return 0,
    };
    if rate == 0 {
        return 0;
    }
    (12.0 * (f64::from(rate) / ADPCM_B_NOMINAL_RATE).log2()).round() as i32
}

/// As [`transcode_if_needed_a`], for ADPCM-B; returns the sample's loop flag either way.
fn transcode_if_needed_b(samples: &mut [Sample], idx: usize) -> Result<bool> {
    if let Some(Sample::Pcm(pcm)) = samples.get(idx) {
        let mut codec = AdpcmB::new();
        let data = pack_nibbles(&codec.encode(&pcm.data));
        let name = pcm.name.clone();
        let rate = pcm.rate;
        samples[idx] = Sample::AdpcmB(AdpcmBSample { name, data, rate, looping: false });
    }
    match samples.get(idx) {
        Some(Sample::AdpcmB(s)) => Ok(s.looping),
        _ => Ok(false),
    }
}

/// Reads every `INS2` chunk pointed to by `ptrs`, in order, transcoding any PCM sample an
/// ADPCM instrument references.
pub(crate) fn read_instruments(ptrs: &[u32], samples: &mut [Sample], r: &mut Reader<'_>) -> Result<Vec<Instrument>> {
    ptrs.iter()
        .map(|&p| {
            r.seek(p as usize);
            read_instrument(r, samples)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hw_detune() {
        assert_eq!(hw_detune(3), 0);
        assert_eq!(hw_detune(4), 1);
        assert_eq!(hw_detune(6), 3);
        assert_eq!(hw_detune(2), 1 | 0b100);
        assert_eq!(hw_detune(0), 3 | 0b100);
    }

    fn feature(tag: &[u8; 2], payload: &[u8]) -> Vec<u8> {
        let mut v = tag.to_vec();
        v.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        v.extend_from_slice(payload);
        v
    }

    #[test]
    fn test_read_fm_instrument_roundtrips_fields() {
        let mut fm_payload = vec![0xf4u8];
        fm_payload.push(0b0101_0_010); // algo=5,fb=2 (bits 6-4=algo,2-0=fb)
        fm_payload.push(0b000_01_010); // am_sense bits4-3=2, fm_sense bits2-0=2
        fm_payload.push(0); // unused
        for _ in 0..4 {
            fm_payload.push(0b0011_0001); // detune raw=3(no detune),multiply=1
            fm_payload.push(0x7f); // total level
            fm_payload.push(0b01_00101); // ks=1,ar=5
            fm_payload.push(0b0_0001111); // am_on=0,dr=15
            fm_payload.push(0b01_01010); // kvs=1,sr=10
            fm_payload.push(0b0101_0011); // sl=5,rr=3
            fm_payload.push(0b0000_0111); // ssg_eg=7
            fm_payload.push(0); // unused
        }

        let mut body = Vec::new();
        body.extend(feature(b"NA", b"kick\0"));
        body.extend(feature(b"FM", &fm_payload));

        let mut chunk = b"INS2".to_vec();
        chunk.extend_from_slice(&0u32.to_le_bytes()); // end, patched below
        chunk.extend_from_slice(&127u16.to_le_bytes());
        chunk.extend_from_slice(&1u16.to_le_bytes()); // FM type
        chunk.extend_from_slice(&body);
        let end = chunk.len() as u32;
        chunk[4..8].copy_from_slice(&end.to_le_bytes());

        let mut r = Reader::new(&chunk);
        let mut samples = Vec::new();
        let ins = read_instrument(&mut r, &mut samples).unwrap();
        match ins {
            Instrument::Fm { name, instrument } => {
                assert_eq!(name, "kick");
                assert_eq!(instrument.algorithm, 5);
                assert_eq!(instrument.feedback, 2);
                assert_eq!(instrument.operators[0].detune, 0);
                assert_eq!(instrument.operators[0].multiply, 1);
                assert_eq!(instrument.operators[0].total_level, 0x7f);
            }
            _ => panic!("expected FM instrument"),
        }
    }

    #[test]
    fn test_tuning_offset_is_zero_at_nominal_rate() {
        let sample = Sample::AdpcmB(AdpcmBSample {
            name: String::new(),
            data: Vec::new(),
            rate: 44100,
            looping: false,
        });
        assert_eq!(tuning_offset(&sample), 0);
    }

    #[test]
    fn test_tuning_offset_shifts_by_octave() {
        let sample = Sample::AdpcmB(AdpcmBSample {
            name: String::new(),
            data: Vec::new(),
            rate: 88200,
            looping: false,
        });
        assert_eq!(tuning_offset(&sample), 12);
    }

    #[test]
    fn test_old_format_version_is_rejected() {
        let mut chunk = b"INS2".to_vec();
        chunk.extend_from_slice(&0u32.to_le_bytes());
        chunk.extend_from_slice(&126u16.to_le_bytes());
        chunk.extend_from_slice(&1u16.to_le_bytes()); // FM
        let end = chunk.len() as u32;
        chunk[4..8].copy_from_slice(&end.to_le_bytes());

        let mut r = Reader::new(&chunk);
        let mut samples = Vec::new();
        assert!(matches!(
            read_instrument(&mut r, &mut samples),
            Err(Error::UnsupportedInstrumentVersion(126))
        ));
    }

    #[test]
    fn test_ne_nonzero_payload_is_fatal() {
        let mut body = Vec::new();
        body.extend(feature(b"NE", &[1]));
        let mut chunk = b"INS2".to_vec();
        chunk.extend_from_slice(&0u32.to_le_bytes());
        chunk.extend_from_slice(&127u16.to_le_bytes());
        chunk.extend_from_slice(&37u16.to_le_bytes()); // ADPCM-A
        chunk.extend_from_slice(&body);
        let end = chunk.len() as u32;
        chunk[4..8].copy_from_slice(&end.to_le_bytes());

        let mut r = Reader::new(&chunk);
        let mut samples = Vec::new();
        assert!(matches!(
            read_instrument(&mut r, &mut samples),
            Err(Error::UnsupportedPcmSampleMap)
        ));
    }
}
