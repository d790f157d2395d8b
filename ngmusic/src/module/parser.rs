use super::instrument::read_instruments;
use super::pattern::read_pattern;
use super::sample::read_samples;
use super::{Error, Module, Result, NUM_CHANNELS};
use crate::common::Reader;
use std::collections::HashMap;
use std::io::Read;
use tracing::{instrument, trace};

const MAGIC: &[u8; 16] = b"-Furnace module-";

/// The single chip id this toolchain targets (YM2610).
const TARGET_CHIP: u8 = 165;

/// Parses a Furnace module from its DEFLATE-compressed container bytes.
#[instrument(level = "trace", skip_all)]
pub(crate) fn parse(data: &[u8]) -> Result<Module> {
    let mut inflated = Vec::new();
    flate2::read::ZlibDecoder::new(data)
        .read_to_end(&mut inflated)
        .map_err(|e| Error::Decompress(Box::new(e)))?;
    trace!(compressed = data.len(), inflated = inflated.len(), "decompressed module");

    let mut r = Reader::new(&inflated);
    let magic = r.read(16)?;
    if magic != MAGIC.as_slice() {
        return Err(Error::BadMagic);
    }
    let _version_major = r.u2()?;
    let _version_minor = r.u2()?;
    let info_ptr = {
        r.seek(0x14);
        r.u4()?
    };
    r.seek(info_ptr as usize);

    let info_magic = r.read(4)?;
    if info_magic != b"INFO" {
        return Err(Error::BadChunkMagic {
            offset: info_ptr as usize,
            expected: "INFO",
            found: info_magic.try_into().unwrap_or([0; 4]),
        });
    }
    let _chunk_len = r.u4()?;

    let _timebase = r.u1()?;
    let _speed1 = r.u1()?;
    let _speed2 = r.u1()?;
    let _arpeggio_tick = r.u1()?;
    let frequency = r.f4()?;
    let pattern_len = r.u2()?;
    let order_count = r.u2()?;
    let _highlight_a = r.u1()?;
    let _highlight_b = r.u1()?;

    let nb_instruments = r.u2()?;
    let nb_wavetables = r.u2()?;
    let nb_samples = r.u2()?;
    let nb_patterns = r.u4()?;

    let chips = r.read(32)?;
    let chip_count = chips.iter().filter(|&&c| c == TARGET_CHIP).count();
    if chip_count != 1 {
        return Err(Error::UnsupportedChip);
    }
    let _chip_volumes = r.read(32)?;
    let _chip_panning = r.read(32)?;
    let _chip_flags = r.read(32)?;

    let name = r.ustr()?;
    let author = r.ustr()?;
    let _tuning = r.f4()?;
    let _reserved = r.read(20)?;

    let instrument_ptrs: Vec<u32> = (0..nb_instruments).map(|_| r.u4()).collect::<std::result::Result<_, _>>()?;
    let _wavetable_ptrs: Vec<u32> = (0..nb_wavetables).map(|_| r.u4()).collect::<std::result::Result<_, _>>()?;
    let sample_ptrs: Vec<u32> = (0..nb_samples).map(|_| r.u4()).collect::<std::result::Result<_, _>>()?;
    let pattern_ptrs: Vec<u32> = (0..nb_patterns).map(|_| r.u4()).collect::<std::result::Result<_, _>>()?;

    // Orders are stored channel-major: 14 rows of `order_count` bytes. Transpose into
    // `orders[order_index][channel]`.
    let mut by_channel: Vec<Vec<u8>> = Vec::with_capacity(NUM_CHANNELS);
    for _ in 0..NUM_CHANNELS {
        by_channel.push(r.read(order_count as usize)?.to_vec());
    }
    let mut orders = Vec::with_capacity(order_count as usize);
    for i in 0..order_count as usize {
        let mut row = [0u8; NUM_CHANNELS];
        for (ch, row_slot) in row.iter_mut().enumerate() {
            *row_slot = by_channel[ch][i];
        }
        orders.push(row);
    }

    let mut fx_columns = [0u8; NUM_CHANNELS];
    for col in fx_columns.iter_mut() {
        *col = r.u1()?;
    }
    let _ui_show_name = r.read(NUM_CHANNELS)?;
    let _ui_collapsed = r.read(NUM_CHANNELS)?;
    for _ in 0..28 {
        let _ = r.ustr()?;
    }
    let _comment = r.ustr()?;
    let _master_volume = r.f4()?;
    let _reserved2 = r.read(28)?;
    let _virtual_tempo_num = r.u2()?;
    let _virtual_tempo_den = r.u2()?;
    let _subsong_name = r.ustr()?;
    let _subsong_comment = r.ustr()?;
    let subsong_count = r.u1()?;
    if subsong_count != 0 {
        return Err(Error::UnsupportedMultisubsong(subsong_count as u16));
    }

    // Additional localised metadata strings, reserved block, patchbay, auto-patchbay flag and
    // compat flags are all ignored here; only their byte layout matters to stay aligned for the
    // speeds list that follows.
    for _ in 0..5 {
        let _ = r.ustr()?;
    }
    let _reserved3 = r.read(12)?;
    let patchbay_count = r.u4()?;
    let _patchbay = r.read(patchbay_count as usize * 4)?;
    let _auto_patchbay = r.u1()?;
    let _compat_flags = r.read(8)?;

    let speed_count = r.u1()?;
    let mut speeds = Vec::with_capacity(speed_count as usize);
    for _ in 0..speed_count {
        speeds.push(r.u1()?);
    }

    let mut samples = read_samples(&sample_ptrs, &mut r)?;
    let instruments = read_instruments(&instrument_ptrs, &mut samples, &mut r)?;

    let mut patterns = HashMap::with_capacity(pattern_ptrs.len());
    for &p in &pattern_ptrs {
        r.seek(p as usize);
        // `PATN` doesn't carry its own fx-column count; it's keyed by channel and looked up from
        // the per-channel counts read above.
        let channel = peek_pattern_channel(&r, p as usize)?;
        let fx_count = fx_columns[channel as usize];
        let pat = read_pattern(&mut r, pattern_len, fx_count)?;
        patterns.insert((pat.index as u8, pat.channel), pat);
    }

    Ok(Module { name, author, speeds, frequency, pattern_len, fx_columns, orders, instruments, samples, patterns })
}

/// `PATN`'s channel byte sits right after the 4-byte magic, chunk length and 1-byte subsong id.
fn peek_pattern_channel(r: &Reader<'_>, pattern_ptr: usize) -> Result<u8> {
    let mut peek = r.clone();
    peek.seek(pattern_ptr + 4 + 4 + 1);
    Ok(peek.u1()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn deflate(data: &[u8]) -> Vec<u8> {
        let mut enc = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn test_bad_magic_is_rejected() {
        let raw = vec![0u8; 64];
        let compressed = deflate(&raw);
        assert!(matches!(parse(&compressed), Err(Error::BadMagic)));
    }
}
