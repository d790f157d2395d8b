//! Pass 14: flattens the main stream and its blocks into one linear op list, computes each
//! label's byte offset, and checks every `jmp`/`call`/`pat_offset` target actually resolves.
//!
//! The two-byte `lsb`/`msb` operand a `jmp`/`call`/`pat_offset` record writes to the final binary
//! is `label_offset − start_offset`, i.e. the target's position relative to the `_start` label,
//! not the referencing record's own position; since that subtraction only needs the label table
//! this pass already built, this pass stops at producing the flattened stream plus a label →
//! offset table, leaving the arithmetic to whichever emitter consumes it (text listing or raw
//! binary).

use super::graph::Block;
use super::opcode::Op;
use super::{Error, Result};
use std::collections::HashMap;

/// A fully flattened, resolved bytecode stream ready for emission.
#[derive(Debug, Clone)]
pub struct ResolvedStream {
    pub ops: Vec<Op>,
    /// Byte offset of each label, relative to the start of `ops`.
    pub label_offsets: HashMap<String, usize>,
}

/// Concatenates the main stream with every block's body, each preceded by a label record naming
/// it — blocks carry their label out-of-band in [`Block::label`], so it is reinserted here as a
/// zero-width [`Op::Label`] to give it a position in the flattened stream.
fn flatten(main: Vec<Op>, blocks: Vec<Block>) -> Vec<Op> {
    let mut ops = main;
    for block in blocks {
        ops.push(Op::Label(block.label));
        ops.extend(block.ops);
    }
    ops
}

fn compute_label_offsets(ops: &[Op]) -> HashMap<String, usize> {
    let mut offsets = HashMap::new();
    let mut offset = 0usize;
    for op in ops {
        if let Op::Label(name) = op {
            offsets.insert(name.clone(), offset);
        }
        offset += op.size_in_bytes();
    }
    offsets
}

fn validate_references(ops: &[Op], label_offsets: &HashMap<String, usize>) -> Result<()> {
    for op in ops {
        let target = match op {
            Op::Jmp(label) | Op::Call(label) | Op::CallEntry(label) | Op::PatOffset(label) => {
                Some(label)
            }
            _ => None,
        };
        if let Some(label) = target {
            if !label_offsets.contains_key(label) {
                return Err(Error::UnresolvedLabel(label.clone()));
            }
        }
    }
    Ok(())
}

/// Flattens `main`/`blocks` and resolves every label reference, failing if any target is missing.
pub fn resolve(main: Vec<Op>, blocks: Vec<Block>) -> Result<ResolvedStream> {
    let ops = flatten(main, blocks);
    let label_offsets = compute_label_offsets(&ops);
    validate_references(&ops, &label_offsets)?;
    Ok(ResolvedStream { ops, label_offsets })
}

/// The two-byte `(lsb, msb)` operand for a `jmp`/`call`/`pat_offset` record targeting `label`:
/// the target's offset relative to the `_start` label, independent of where the referencing
/// record itself sits in the stream.
pub fn relative_offset(label_offsets: &HashMap<String, usize>, label: &str) -> (u8, u8) {
    let target = *label_offsets.get(label).unwrap_or(&0) as i64;
    let start = *label_offsets.get("_start").unwrap_or(&0) as i64;
    let delta = target - start;
    ((delta & 0xff) as u8, ((delta >> 8) & 0xff) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_computes_label_offsets() {
        let main = vec![
            Op::Label("_start".into()),
            Op::Tempo(198),
            Op::Jmp("loop".into()),
            Op::Label("loop".into()),
            Op::End,
        ];
        let resolved = resolve(main, Vec::new()).unwrap();
        assert_eq!(resolved.label_offsets["_start"], 0);
        // tempo(1 byte id + 1 operand) + jmp(1 + 2) = 5 bytes before `loop`.
        assert_eq!(resolved.label_offsets["loop"], 5);
    }

    #[test]
    fn test_resolve_rejects_missing_label() {
        let main = vec![Op::Jmp("nowhere".into())];
        assert!(matches!(resolve(main, Vec::new()), Err(Error::UnresolvedLabel(_))));
    }

    #[test]
    fn test_flatten_places_block_bodies_after_main() {
        let main = vec![Op::Call("pat_00_00_04".into())];
        let blocks = vec![Block { label: "pat_00_00_04".into(), ops: vec![Op::Ret] }];
        let resolved = resolve(main, blocks).unwrap();
        assert_eq!(resolved.label_offsets["pat_00_00_04"], 3); // call is 1 + 2 bytes
    }
}
