//! Renders a resolved bytecode stream as a text assembler listing: one `.db` line per opcode
//! byte group, labels as assembler globals, and a small stream-table header for compact output.

use crate::compiler::resolve::relative_offset;
use crate::compiler::{Op, ResolvedStream};
use crate::module::Module;

/// Where the emitted listing's code segment lives.
#[derive(Debug, Clone, Copy)]
pub enum Segment {
    Code,
    Bank(u8),
}

impl Segment {
    fn directive(self) -> String {
        match self {
            Segment::Code => "CODE".to_string(),
            Segment::Bank(n) => format!("BANK{n}"),
        }
    }
}

/// Maps a driver channel index to its bit position in the compact/inline header's channel
/// bitfield: bit 7 is unused, so ADPCM-A/B channels (index 7..13) shift up by one bit.
fn channel_bit(channel: u8) -> u8 {
    if channel > 6 {
        channel + 1
    } else {
        channel
    }
}

fn channel_bitfield(channels: &[u8]) -> u16 {
    channels.iter().fold(0u16, |mask, &c| mask | (1u16 << channel_bit(c)))
}

fn total_bytes(stream: &ResolvedStream) -> usize {
    stream.ops.iter().map(Op::size_in_bytes).sum()
}

/// Renders one opcode record as its `.db` line(s), or `None` for zero-width metadata.
fn render_op(op: &Op, label_offsets: &std::collections::HashMap<String, usize>) -> Option<String> {
    if op.is_metadata() {
        return None;
    }
    let mut bytes = Vec::new();
    if let Some(id) = op.id() {
        bytes.push(id);
    }
    bytes.extend(operand_bytes(op, label_offsets));
    let db = bytes.iter().map(|b| format!("0x{b:02x}")).collect::<Vec<_>>().join(", ");
    Some(format!("    .db {db:<18} ; {}", op.mnemonic()))
}

fn operand_bytes(op: &Op, label_offsets: &std::collections::HashMap<String, usize>) -> Vec<u8> {
    match op {
        Op::Tempo(v)
        | Op::Speed(v)
        | Op::Groove(v)
        | Op::CtxFm(v)
        | Op::CtxSsg(v)
        | Op::CtxAdpcmA(v)
        | Op::Instr(v)
        | Op::SMacro(v)
        | Op::Vol(v)
        | Op::Pan(v)
        | Op::NoteDelay(v)
        | Op::NoteCut(v)
        | Op::Retrigger(v)
        | Op::ArpeggioSpeed(v)
        | Op::PitchSlideUp(v)
        | Op::PitchSlideDown(v)
        | Op::Portamento(v)
        | Op::NoteSlideUp(v)
        | Op::NoteSlideDown(v)
        | Op::QuickLegatoUp(v)
        | Op::QuickLegatoDown(v)
        | Op::WaitN(v)
        | Op::CallTbl(v) => vec![*v],
        Op::Note(n) | Op::FmNoteW(n) | Op::SNoteW(n) | Op::AStartW(n) | Op::VolSlide(n) | Op::PitchOffset(n)
        | Op::Legato(n) => vec![*n as u8],
        Op::ArpeggioOn(a, b) | Op::Vibrato(a, b) | Op::FmOpLevel(a, b) | Op::SEnv(a, b) => vec![*a, *b],
        Op::Jmp(label) | Op::Call(label) | Op::CallEntry(label) | Op::PatOffset(label) => {
            let (lsb, msb) = relative_offset(label_offsets, label);
            vec![lsb, msb]
        }
        _ => Vec::new(),
    }
}

/// Renders `stream` (already produced by [`crate::compiler::compile`]) as a complete assembler
/// listing. `name_prefix` prefixes every global label (empty string suppresses the prefix
/// entirely, matching the reference tool's `-n ""` convention); `channels` lists the driver
/// channels actually present in this stream, for the header's bitfield.
pub fn emit(
    module: &Module,
    stream: &ResolvedStream,
    compact: bool,
    segment: Segment,
    name_prefix: &str,
    channels: &[u8],
) -> String {
    let mut out = String::new();
    out.push_str(&format!("; {} — {}\n", module.name, module.author));
    out.push_str(&format!("; total {} bytes\n", total_bytes(stream)));
    out.push_str(&format!(".area {}\n\n", segment.directive()));

    let bitfield = channel_bitfield(channels);
    if compact {
        out.push_str("    .db 0x01                 ; stream count\n");
        out.push_str(&format!("    .dw 0x{bitfield:04x}             ; channel bitfield\n"));
        out.push_str(&format!("    .db 0x{:02x}                 ; speed count\n", module.speeds.len()));
        for speed in &module.speeds {
            out.push_str(&format!("    .db 0x{speed:02x}                 ; speed\n"));
        }
        out.push_str("    .dw 0x0000               ; stream 0 offset\n\n");
    } else {
        out.push_str("    .db 0xff                 ; inline marker\n");
        out.push_str(&format!("    .dw 0x{bitfield:04x}             ; channel bitfield\n\n"));
    }

    for op in &stream.ops {
        if let Op::Label(name) = op {
            let label = if name_prefix.is_empty() { name.clone() } else { format!("{name_prefix}_{name}") };
            out.push_str(&format!("{label}::\n"));
            continue;
        }
        if let Some(line) = render_op(op, &stream.label_offsets) {
            out.push_str(&line);
            out.push('\n');
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::Module;

    #[test]
    fn test_channel_bit_shifts_adpcm_channels() {
        assert_eq!(channel_bit(0), 0);
        assert_eq!(channel_bit(6), 6);
        assert_eq!(channel_bit(7), 8);
        assert_eq!(channel_bit(13), 14);
    }

    #[test]
    fn test_emit_inline_header_has_marker_and_bitfield() {
        let module = Module::empty();
        let compiled = crate::compiler::compile(&module, false).unwrap();
        let text = emit(&module, &compiled.stream, false, Segment::Code, "song", &[0]);
        assert!(text.contains("0xff"));
        assert!(text.contains(".area CODE"));
    }

    #[test]
    fn test_emit_labels_become_globals() {
        let module = Module::empty();
        let compiled = crate::compiler::compile(&module, false).unwrap();
        let text = emit(&module, &compiled.stream, false, Segment::Code, "", &[0]);
        assert!(text.contains("_start::"));
    }
}
