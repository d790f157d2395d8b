//! Shared test fixtures: builds minimal, well-formed Furnace module containers byte-for-byte so
//! integration tests can drive the real `Module::parse` -> `compile` -> `emit` pipeline without
//! checking in binary `.fur` fixtures.

use std::io::Write;

/// The chip id the parser requires exactly one of (YM2610), matching `ngmusic::module::parser`.
const YM2610: u8 = 165;

/// Installs a `tracing-subscriber` for test output; safe to call from multiple tests since a
/// second `try_init` is a no-op.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Describes the handful of `INFO`-chunk fields a test cares about; everything else is filled
/// with the simplest value the parser accepts.
#[derive(Debug, Clone)]
pub struct ModuleSpec {
    pub name: String,
    pub author: String,
    pub frequency: f32,
    pub pattern_len: u16,
    pub speeds: Vec<u8>,
    /// One entry per order; each inner array is a pattern id per channel (0 when the channel
    /// plays no pattern in that order, which decodes to an all-empty row per
    /// `ngmusic::module::Module::pattern`'s documented fallback).
    pub orders: Vec<[u8; ngmusic::module::NUM_CHANNELS]>,
}

impl Default for ModuleSpec {
    fn default() -> Self {
        ModuleSpec {
            name: String::new(),
            author: String::new(),
            frequency: 60.0,
            pattern_len: 0,
            speeds: vec![6],
            orders: Vec::new(),
        }
    }
}

fn ustr(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(s.as_bytes());
    out.push(0);
}

/// Builds a DEFLATE-compressed Furnace module container with no instruments, samples or pattern
/// chunks: every order cell therefore resolves to an empty row, but `orders.len()` still drives
/// the compiler's row-count loop (see `ngmusic::compiler::graph::build_inline`).
pub fn build_module_bytes(spec: &ModuleSpec) -> Vec<u8> {
    let mut info = Vec::new();
    info.extend_from_slice(b"INFO");
    info.extend_from_slice(&0u32.to_le_bytes()); // chunk length, unread by the parser

    info.push(0); // timebase
    info.push(0); // speed1
    info.push(0); // speed2
    info.push(0); // arpeggio tick
    info.extend_from_slice(&spec.frequency.to_le_bytes());
    info.extend_from_slice(&spec.pattern_len.to_le_bytes());
    info.extend_from_slice(&(spec.orders.len() as u16).to_le_bytes());
    info.push(0); // highlight a
    info.push(0); // highlight b

    info.extend_from_slice(&0u16.to_le_bytes()); // nb_instruments
    info.extend_from_slice(&0u16.to_le_bytes()); // nb_wavetables
    info.extend_from_slice(&0u16.to_le_bytes()); // nb_samples
    info.extend_from_slice(&0u32.to_le_bytes()); // nb_patterns

    let mut chips = [0u8; 32];
    chips[0] = YM2610;
    info.extend_from_slice(&chips); // chips
    info.extend_from_slice(&[0u8; 32]); // chip volumes
    info.extend_from_slice(&[0u8; 32]); // chip panning
    info.extend_from_slice(&[0u8; 32]); // chip flags

    ustr(&mut info, &spec.name);
    ustr(&mut info, &spec.author);
    info.extend_from_slice(&0f32.to_le_bytes()); // tuning
    info.extend_from_slice(&[0u8; 20]); // reserved

    // No instrument/wavetable/sample/pattern pointer tables (all counts are zero above).

    // Orders, stored channel-major: one row of `order_count` bytes per channel.
    for channel in 0..ngmusic::module::NUM_CHANNELS {
        for order in &spec.orders {
            info.push(order[channel]);
        }
    }

    info.extend_from_slice(&[1u8; ngmusic::module::NUM_CHANNELS]); // fx_columns: one column each
    info.extend_from_slice(&[0u8; ngmusic::module::NUM_CHANNELS]); // ui_show_name
    info.extend_from_slice(&[0u8; ngmusic::module::NUM_CHANNELS]); // ui_collapsed
    for _ in 0..28 {
        ustr(&mut info, "");
    }
    ustr(&mut info, ""); // comment
    info.extend_from_slice(&0f32.to_le_bytes()); // master volume
    info.extend_from_slice(&[0u8; 28]); // reserved2
    info.extend_from_slice(&0u16.to_le_bytes()); // virtual tempo num
    info.extend_from_slice(&0u16.to_le_bytes()); // virtual tempo den
    ustr(&mut info, ""); // subsong name
    ustr(&mut info, ""); // subsong comment
    info.push(0); // subsong count

    for _ in 0..5 {
        ustr(&mut info, "");
    }
    info.extend_from_slice(&[0u8; 12]); // reserved3
    info.extend_from_slice(&0u32.to_le_bytes()); // patchbay count
    info.push(0); // auto patchbay
    info.extend_from_slice(&[0u8; 8]); // compat flags

    info.push(spec.speeds.len() as u8);
    for &speed in &spec.speeds {
        info.push(speed);
    }

    let info_ptr: u32 = 24;
    let mut raw = Vec::new();
    raw.extend_from_slice(b"-Furnace module-");
    raw.extend_from_slice(&0u16.to_le_bytes()); // version major
    raw.extend_from_slice(&0u16.to_le_bytes()); // version minor
    raw.extend_from_slice(&info_ptr.to_le_bytes());
    raw.extend_from_slice(&info);

    let mut enc = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    enc.write_all(&raw).expect("in-memory write never fails");
    enc.finish().expect("in-memory flate2 finish never fails")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_module_bytes_round_trips_through_parse() {
        let spec = ModuleSpec {
            name: "song".to_string(),
            author: "tester".to_string(),
            frequency: 60.0,
            ..Default::default()
        };
        let bytes = build_module_bytes(&spec);
        let module = ngmusic::module::Module::parse(&bytes).unwrap();
        assert_eq!(module.name, "song");
        assert_eq!(module.author, "tester");
        assert_eq!(module.frequency, 60.0);
    }
}
