use super::{Error, Result};
use crate::common::Reader;

/// A decoded `SMP2` chunk.
///
/// The parser always reads a loop window even though only ADPCM-B instruments make use of it
/// (`furtool.py`'s `read_sample` reads the same 8 bytes of "looping info" for every sample
/// type); we keep it on every variant rather than special-casing the read.
#[derive(Debug, Clone)]
pub enum Sample {
    Pcm(PcmSample),
    AdpcmA(AdpcmASample),
    AdpcmB(AdpcmBSample),
}

#[derive(Debug, Clone)]
pub struct PcmSample {
    pub name: String,
    /// Signed 16-bit PCM, one element per sample.
    pub data: Vec<i16>,
    pub rate: u32,
}

#[derive(Debug, Clone)]
pub struct AdpcmASample {
    pub name: String,
    /// 4-bit codec-A payload, packed two codes per byte. Length is a multiple of 256 bytes.
    pub data: Vec<u8>,
    pub rate: u32,
}

#[derive(Debug, Clone)]
pub struct AdpcmBSample {
    pub name: String,
    /// 4-bit codec-B payload, packed two codes per byte. Length is a multiple of 256 bytes.
    pub data: Vec<u8>,
    pub rate: u32,
    pub looping: bool,
}

impl Sample {
    pub fn name(&self) -> &str {
        match self {
            Sample::Pcm(s) => &s.name,
            Sample::AdpcmA(s) => &s.name,
            Sample::AdpcmB(s) => &s.name,
        }
    }
}

const ADPCM_A_TYPE: u8 = 5;
const ADPCM_B_TYPE: u8 = 6;
const PCM16_TYPE: u8 = 16;

/// Rounds a byte count up to the next multiple of 256, the YM2610 block size.
fn pad_to_256(data: &mut Vec<u8>) {
    let rem = data.len() % 256;
    if rem != 0 {
        data.resize(data.len() + (256 - rem), 0);
    }
}

/// Sanitizes a Furnace instrument/sample name into an assembler-safe identifier, matching
/// `furtool.py`'s `re.sub(r"\W|^(?=\d)", "_", name).lower()`.
pub fn asm_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 1);
    if name.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        out.push('_');
    }
    for c in name.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c.to_ascii_lowercase());
        } else {
            out.push('_');
        }
    }
    out
}

/// Reads a single `SMP2` chunk located at the reader's current position.
pub(crate) fn read_sample(r: &mut Reader<'_>) -> Result<Sample> {
    let start = r.pos();
    let magic = r.read(4)?;
    if magic != b"SMP2" {
        return Err(Error::BadChunkMagic {
            offset: start,
            expected: "SMP2",
            found: magic.try_into().unwrap_or([0; 4]),
        });
    }
    let _end = r.u4()?;
    let name = asm_name(&r.ustr()?);
    let sample_count = r.u4()?;
    let _compat_freq = r.u4()?;
    let c4_freq = r.u4()?;
    let kind = r.u1()?;

    let sample = match kind {
        ADPCM_A_TYPE | ADPCM_B_TYPE => {
            if sample_count % 2 != 0 {
                return Err(Error::OddAdpcmSampleCount);
            }
            let byte_count = (sample_count / 2) as usize;
            let _direction = r.u1()?;
            let _flags = r.u2()?;
            let loop_start = r.s4()?;
            let loop_end = r.s4()?;
            let looping = loop_start != -1 && loop_end != -1;
            let _rom_alloc = r.read(16)?;
            let mut data = r.read(byte_count)?.to_vec();
            pad_to_256(&mut data);
            if data.len() % 256 != 0 {
                return Err(Error::MisalignedAdpcmSample);
            }
            if kind == ADPCM_A_TYPE {
                Sample::AdpcmA(AdpcmASample { name, data, rate: c4_freq })
            } else {
                Sample::AdpcmB(AdpcmBSample { name, data, rate: c4_freq, looping })
            }
        }
        PCM16_TYPE => {
            let _direction = r.u1()?;
            let _flags = r.u2()?;
            let _loop_start = r.s4()?;
            let _loop_end = r.s4()?;
            let _rom_alloc = r.read(16)?;
            let bytes = r.read(sample_count as usize * 2)?;
            let data = bytes.chunks_exact(2).map(|b| i16::from_le_bytes([b[0], b[1]])).collect();
            Sample::Pcm(PcmSample { name, data, rate: c4_freq })
        }
        other => return Err(Error::UnsupportedSampleType(other)),
    };
    Ok(sample)
}

/// Reads every `SMP2` chunk pointed to by `ptrs`, in order.
pub(crate) fn read_samples(ptrs: &[u32], r: &mut Reader<'_>) -> Result<Vec<Sample>> {
    ptrs.iter()
        .map(|&p| {
            r.seek(p as usize);
            read_sample(r)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_chunk(kind: u8, sample_count: u32, data: &[u8], loop_start: i32, loop_end: i32) -> Vec<u8> {
        let mut body = Vec::new();
        body.push(0); // name terminator -> empty name
        body.extend_from_slice(&sample_count.to_le_bytes());
        body.extend_from_slice(&0u32.to_le_bytes()); // compat freq
        let c4 = match kind {
            5 => 18500u32,
            6 => 44100u32,
            _ => 44100u32,
        };
        body.extend_from_slice(&c4.to_le_bytes());
        body.push(kind);
        body.push(0); // direction
        body.extend_from_slice(&0u16.to_le_bytes()); // flags
        body.extend_from_slice(&loop_start.to_le_bytes());
        body.extend_from_slice(&loop_end.to_le_bytes());
        body.extend_from_slice(&[0u8; 16]); // rom alloc
        body.extend_from_slice(data);

        let mut chunk = b"SMP2".to_vec();
        chunk.extend_from_slice(&0u32.to_le_bytes()); // end offset, unused
        chunk.extend_from_slice(&body);
        chunk
    }

    #[test]
    fn test_adpcm_a_pads_to_256() {
        let chunk = sample_chunk(5, 4, &[0xab, 0xcd], -1, -1);
        let mut r = Reader::new(&chunk);
        let s = read_sample(&mut r).unwrap();
        match s {
            Sample::AdpcmA(s) => {
                assert_eq!(s.data.len(), 256);
                assert_eq!(&s.data[..2], &[0xab, 0xcd]);
                assert!(s.data[2..].iter().all(|&b| b == 0));
            }
            _ => panic!("expected AdpcmA"),
        }
    }

    #[test]
    fn test_adpcm_b_loop_flag() {
        let chunk = sample_chunk(6, 4, &[0x11, 0x22], 0, 3);
        let mut r = Reader::new(&chunk);
        let s = read_sample(&mut r).unwrap();
        match s {
            Sample::AdpcmB(s) => assert!(s.looping),
            _ => panic!("expected AdpcmB"),
        }
    }

    #[test]
    fn test_odd_sample_count_rejected() {
        let chunk = sample_chunk(5, 3, &[0x00], -1, -1);
        let mut r = Reader::new(&chunk);
        assert!(matches!(read_sample(&mut r), Err(Error::OddAdpcmSampleCount)));
    }

    #[test]
    fn test_asm_name_sanitizes() {
        assert_eq!(asm_name("Kick Drum!"), "kick_drum_");
        assert_eq!(asm_name("9lives"), "_9lives");
    }
}
