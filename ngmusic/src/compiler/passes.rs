use super::diagnostics::Location;
use super::graph::{run_control_flow_pass, Block, ControlFlowVisitor};
use super::opcode::Op;
use super::Error;
use crate::module::{ChannelFamily, Instrument, Module};
use std::collections::{HashMap, HashSet};

/// Applies `f` independently to the main stream and every block, allowing length changes.
fn transform_all(main: &mut Vec<Op>, blocks: &mut [Block], mut f: impl FnMut(&mut Vec<Op>)) {
    f(main);
    for block in blocks.iter_mut() {
        f(&mut block.ops);
    }
}

fn channel_of(op: &Op) -> Option<ChannelFamily> {
    match op {
        Op::CtxFm(_) => Some(ChannelFamily::Fm),
        Op::CtxSsg(_) => Some(ChannelFamily::Ssg),
        Op::CtxAdpcmA(_) => Some(ChannelFamily::AdpcmA),
        Op::CtxAdpcmB => Some(ChannelFamily::AdpcmB),
        _ => None,
    }
}

fn slot_of(op: &Op) -> Option<u8> {
    match op {
        Op::CtxFm(s) | Op::CtxSsg(s) | Op::CtxAdpcmA(s) => Some(*s),
        Op::CtxAdpcmB => Some(1),
        _ => None,
    }
}

/// Pass 1: every `instr`/`s_macro` must name an existing instrument of the matching variant.
pub fn check_instruments_valid_for_channel(
    main: &[Op],
    blocks: &[Block],
    module: &Module,
) -> Result<(), Error> {
    let streams: Vec<&[Op]> = std::iter::once(main).chain(blocks.iter().map(|b| b.ops.as_slice())).collect();
    for stream in streams {
        let mut current = None;
        let mut location = Location { order: 0, channel: 0, row: 0 };
        for op in stream {
            if let Op::Loc { order, channel, row } = op {
                location = Location { order: *order, channel: *channel, row: *row };
            }
            if let Some(family) = channel_of(op) {
                current = Some(family);
            }
            let bad = match op {
                Op::Instr(id) => module
                    .instruments
                    .get(*id as usize)
                    .map(|ins| !instrument_matches(ins, current)),
                Op::SMacro(id) => module
                    .instruments
                    .get(*id as usize)
                    .map(|ins| !matches!(ins, Instrument::Ssg { .. })),
                _ => None,
            };
            if bad == Some(true) || (matches!(op, Op::Instr(_) | Op::SMacro(_)) && bad.is_none()) {
                return Err(Error::BadInstrument {
                    location,
                    detail: "instrument does not exist or does not match the channel's family".to_string(),
                });
            }
        }
    }
    Ok(())
}

fn instrument_matches(ins: &Instrument, family: Option<ChannelFamily>) -> bool {
    matches!(
        (ins, family),
        (Instrument::Fm { .. }, Some(ChannelFamily::Fm))
            | (Instrument::Ssg { .. }, Some(ChannelFamily::Ssg))
            | (Instrument::AdpcmA { .. }, Some(ChannelFamily::AdpcmA))
            | (Instrument::AdpcmB { .. }, Some(ChannelFamily::AdpcmB))
    )
}

/// Pass 2: a `note-on` must be preceded by an instrument/macro selection on the same subchannel.
pub fn check_first_note_has_instrument(main: &[Op], blocks: &[Block]) -> Result<(), Error> {
    let streams: Vec<&[Op]> = std::iter::once(main).chain(blocks.iter().map(|b| b.ops.as_slice())).collect();
    for stream in streams {
        let mut has_instr: HashSet<u8> = HashSet::new();
        let mut current_slot = None;
        let mut location = Location { order: 0, channel: 0, row: 0 };
        for op in stream {
            if let Op::Loc { order, channel, row } = op {
                location = Location { order: *order, channel: *channel, row: *row };
            }
            if let Some(slot) = slot_of(op) {
                current_slot = Some(slot);
            }
            match op {
                Op::Instr(_) | Op::SMacro(_) => {
                    if let Some(slot) = current_slot {
                        has_instr.insert(slot);
                    }
                }
                Op::Note(_) => {
                    if let Some(slot) = current_slot {
                        if !has_instr.contains(&slot) {
                            return Err(Error::BadInstrument {
                                location,
                                detail: "note-on with no preceding instrument on this channel".to_string(),
                            });
                        }
                    }
                }
                _ => {}
            }
        }
    }
    Ok(())
}

/// Pass 3: strip `Loc` records.
pub fn remove_locations(main: &mut Vec<Op>, blocks: &mut [Block]) {
    transform_all(main, blocks, |ops| ops.retain(|op| !matches!(op, Op::Loc { .. })));
}

/// Pass 4: drop labels nothing jumps/calls to, except `_start`.
pub fn remove_unreferenced_labels(main: &mut Vec<Op>, blocks: &mut [Block]) {
    let mut referenced: HashSet<String> = HashSet::new();
    for op in main.iter().chain(blocks.iter().flat_map(|b| b.ops.iter())) {
        match op {
            Op::Jmp(l) | Op::Call(l) | Op::CallEntry(l) | Op::PatOffset(l) => {
                referenced.insert(l.clone());
            }
            _ => {}
        }
    }
    transform_all(main, blocks, |ops| {
        ops.retain(|op| match op {
            Op::Label(name) => name == "_start" || referenced.contains(name),
            _ => true,
        })
    });
}

/// Pass 5: fuse contiguous `wait_n` records, splitting sums over 255 into maximal chunks.
pub fn merge_adjacent_waits(main: &mut Vec<Op>, blocks: &mut [Block]) {
    transform_all(main, blocks, |ops| {
        let mut merged = Vec::with_capacity(ops.len());
        let mut pending: u32 = 0;
        let mut has_pending = false;
        for op in ops.drain(..) {
            if let Op::WaitN(n) = op {
                pending += n as u32;
                has_pending = true;
            } else {
                flush_wait(&mut merged, &mut pending, &mut has_pending);
                merged.push(op);
            }
        }
        flush_wait(&mut merged, &mut pending, &mut has_pending);
        *ops = merged;
    });
}

fn flush_wait(out: &mut Vec<Op>, pending: &mut u32, has_pending: &mut bool) {
    if *has_pending {
        let mut remaining = *pending;
        while remaining > 0 {
            let chunk = remaining.min(255);
            out.push(Op::WaitN(chunk as u8));
            remaining -= chunk;
        }
        *pending = 0;
        *has_pending = false;
    }
}

/// Pass 6 (control-flow-aware): elide redundant `instr` selections per subchannel slot, resetting
/// tracked state at every label.
struct CompactInstr {
    current: HashMap<(ChannelFamily, u8), u8>,
    family: Option<ChannelFamily>,
    slot: Option<u8>,
}

impl ControlFlowVisitor for CompactInstr {
    fn visit(&mut self, op: &Op) -> Option<Op> {
        if let Some(family) = channel_of(op) {
            self.family = Some(family);
            self.slot = slot_of(op);
        }
        if matches!(op, Op::Label(_)) {
            self.current.clear();
        }
        if let Op::Instr(id) = op {
            if let (Some(family), Some(slot)) = (self.family, self.slot) {
                let key = (family, slot);
                if self.current.get(&key) == Some(id) {
                    return Some(Op::Label(String::new())); // marker removed below
                }
                self.current.insert(key, *id);
            }
        }
        None
    }
}

pub fn compact_instr(main: &mut Vec<Op>, blocks: &mut Vec<Block>) {
    let mut visitor = CompactInstr { current: HashMap::new(), family: None, slot: None };
    apply_control_flow(main, blocks, &mut visitor);
}

/// Applies a [`ControlFlowVisitor`]-based pass and writes its rewritten main/block streams back,
/// then strips the empty-label markers passes use to signal "delete this op".
fn apply_control_flow(main: &mut Vec<Op>, blocks: &mut Vec<Block>, visitor: &mut impl ControlFlowVisitor) {
    let (new_main, new_blocks) = run_control_flow_pass(main, blocks, visitor);
    *main = strip_markers(new_main);
    for block in blocks.iter_mut() {
        if let Some(ops) = new_blocks.get(&block.label) {
            block.ops = strip_markers(ops.clone());
        }
    }
}

fn strip_markers(ops: Vec<Op>) -> Vec<Op> {
    ops.into_iter().filter(|op| !matches!(op, Op::Label(l) if l.is_empty())).collect()
}

/// Pass 7 (control-flow-aware): inject a default volume before the first note-on on a
/// subchannel that has no preceding `vol`.
/// Pass 7: the first `note-on` on each subchannel with no preceding `vol` gets a default volume
/// opcode injected ahead of it.
///
/// `ControlFlowVisitor::visit` can only replace one op with one op, so this pass (unlike 6, 12,
/// 13) tracks the same per-subchannel state with a direct scan over each stream instead of
/// `run_control_flow_pass` — a block's body is its own independent stream here, consistent with
/// each call starting in a fresh context.
pub fn insert_missing_vol(main: &mut Vec<Op>, blocks: &mut Vec<Block>) {
    for_each_stream_owned(main, blocks, |ops| {
        let mut has_vol: HashSet<(ChannelFamily, u8)> = HashSet::new();
        let mut family = None;
        let mut slot = None;
        let mut out = Vec::with_capacity(ops.len());
        for op in ops.drain(..) {
            if let Some(f) = channel_of(&op) {
                family = Some(f);
                slot = slot_of(&op);
            }
            match &op {
                Op::Vol(_) => {
                    if let (Some(f), Some(s)) = (family, slot) {
                        has_vol.insert((f, s));
                    }
                }
                Op::Note(_) => {
                    if let (Some(f), Some(s)) = (family, slot) {
                        let key = (f, s);
                        if !has_vol.contains(&key) {
                            has_vol.insert(key);
                            out.push(Op::Vol(f.max_volume()));
                        }
                    }
                }
                _ => {}
            }
            out.push(op);
        }
        *ops = out;
    });
}

fn for_each_stream_owned(main: &mut Vec<Op>, blocks: &mut [Block], mut f: impl FnMut(&mut Vec<Op>)) {
    f(main);
    for block in blocks.iter_mut() {
        f(&mut block.ops);
    }
}

/// Pass 8: an exact-repeat `wait_n(k)` — the same value as the immediately preceding `wait_n` in
/// the same stream — becomes the one-byte `wait_last`.
pub fn compact_wait_n_last(main: &mut Vec<Op>, blocks: &mut [Block]) {
    transform_all(main, blocks, |ops| {
        let mut last: Option<u8> = None;
        for op in ops.iter_mut() {
            if let Op::WaitN(n) = *op {
                if last == Some(n) {
                    *op = Op::WaitLast;
                } else {
                    last = Some(n);
                }
            }
        }
    });
}

/// Pass 9: `note-on` immediately followed by `wait_last` fuses into one opcode.
pub fn fuse_note_wait_last(main: &mut Vec<Op>, blocks: &mut [Block]) {
    transform_all(main, blocks, |ops| {
        let mut out = Vec::with_capacity(ops.len());
        let mut family = None;
        let mut iter = ops.drain(..).peekable();
        while let Some(op) = iter.next() {
            if let Some(f) = channel_of(&op) {
                family = Some(f);
            }
            let fused = match (&op, iter.peek()) {
                (Op::Note(n), Some(Op::WaitLast)) => match family {
                    Some(ChannelFamily::Fm) => Some(Op::FmNoteW(*n)),
                    Some(ChannelFamily::Ssg) => Some(Op::SNoteW(*n)),
                    Some(ChannelFamily::AdpcmA) => Some(Op::AStartW(*n)),
                    _ => None,
                },
                (Op::NoteOff, Some(Op::WaitLast)) if family == Some(ChannelFamily::Fm) => {
                    Some(Op::FmStopW)
                }
                _ => None,
            };
            if let Some(fused) = fused {
                iter.next(); // consume the WaitLast
                out.push(fused);
            } else {
                out.push(op);
            }
        }
        *ops = out;
    });
}

/// Pass 10: consecutive `call`s in the main stream collapse into a `call_tbl(n)` header plus `n`
/// `call_entry` records, with a `pat_offset` prologue (one entry per distinct callee, ordered as
/// `compact_calls` orders them: most-recently-first-seen first — mirrors the reference tool's
/// negative-placeholder-id sort).
pub fn compact_calls(main: &mut Vec<Op>) {
    let mut callees: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for op in main.iter() {
        if let Op::Call(label) = op {
            if seen.insert(label.clone()) {
                callees.push(label.clone());
            }
        }
    }
    // `compact_calls` assigns each distinct callee a negative placeholder id in first-seen order,
    // then sorts ascending by that id — which reverses first-seen order.
    callees.reverse();

    let mut out = Vec::with_capacity(main.len());
    for label in &callees {
        out.push(Op::PatOffset(label.clone()));
    }

    let mut i = 0;
    while i < main.len() {
        if let Op::Call(_) = &main[i] {
            let start = i;
            while i < main.len() && matches!(main[i], Op::Call(_)) {
                i += 1;
            }
            let run = &main[start..i];
            out.push(Op::CallTbl(run.len() as u8));
            for op in run {
                if let Op::Call(label) = op {
                    out.push(Op::CallEntry(label.clone()));
                }
            }
        } else {
            out.push(main[i].clone());
            i += 1;
        }
    }
    *main = out;
}

/// Pass 11: adjust each ADPCM-B `note` operand by the current instrument's tuning offset.
pub fn tune_adpcm_b_notes(main: &mut Vec<Op>, blocks: &mut [Block], module: &Module) {
    transform_all(main, blocks, |ops| {
        let mut family = None;
        let mut tuning: i32 = 0;
        for op in ops.iter_mut() {
            if let Some(f) = channel_of(op) {
                family = Some(f);
            }
            if let Op::Instr(id) = op {
                if let Some(Instrument::AdpcmB { tuned, .. }) = module.instruments.get(*id as usize) {
                    tuning = *tuned;
                }
            }
            if family == Some(ChannelFamily::AdpcmB) {
                if let Op::Note(n) = op {
                    *n = (*n as i32 + tuning).clamp(i8::MIN as i32, i8::MAX as i32) as i8;
                }
            }
        }
    });
}

/// Pass 12a (compact mode): drop every `ctx_*` op entirely — each call block begins fresh.
pub fn remove_ctx(main: &mut Vec<Op>, blocks: &mut [Block]) {
    transform_all(main, blocks, |ops| ops.retain(|op| channel_of(op).is_none()));
}

/// Pass 12b (inline mode, control-flow-aware): elide a `ctx_*` switch that repeats the
/// currently-selected slot; state resets on `wait_n`/`wait_last`.
struct CompactCtx {
    current: Option<(ChannelFamily, u8)>,
}

impl ControlFlowVisitor for CompactCtx {
    fn visit(&mut self, op: &Op) -> Option<Op> {
        match (channel_of(op), slot_of(op)) {
            (Some(family), Some(slot)) => {
                if self.current == Some((family, slot)) {
                    return Some(Op::Label(String::new()));
                }
                self.current = Some((family, slot));
                None
            }
            _ => {
                if matches!(op, Op::WaitN(_) | Op::WaitLast) {
                    self.current = None;
                }
                None
            }
        }
    }
}

pub fn compact_ctx(main: &mut Vec<Op>, blocks: &mut Vec<Block>) {
    let mut visitor = CompactCtx { current: None };
    apply_control_flow(main, blocks, &mut visitor);
}

/// Equal-tempered note frequencies in Hz, A4 = 440 Hz, row = octave 0..7, column = semitone
/// (C..B) 0..11. Shipped literally, per spec: these are not recomputed from a formula.
const FREQS: [[f64; 12]; 8] = [
    [32.7, 34.65, 36.71, 38.89, 41.2, 43.65, 46.25, 49.0, 51.91, 55.0, 58.27, 61.74],
    [65.41, 69.3, 73.42, 77.78, 82.41, 87.31, 92.5, 98.0, 103.8, 110.0, 116.5, 123.5],
    [130.8, 138.6, 146.8, 155.6, 164.8, 174.6, 185.0, 196.0, 207.7, 220.0, 233.1, 246.9],
    [261.6, 277.2, 293.7, 311.1, 329.6, 349.2, 370.0, 392.0, 415.3, 440.0, 466.2, 493.9],
    [523.3, 554.4, 587.3, 622.3, 659.3, 698.5, 740.0, 784.0, 830.6, 880.0, 932.3, 987.8],
    [1047.0, 1109.0, 1175.0, 1245.0, 1319.0, 1397.0, 1480.0, 1568.0, 1661.0, 1760.0, 1865.0, 1976.0],
    [2093.0, 2217.0, 2349.0, 2489.0, 2637.0, 2794.0, 2960.0, 3136.0, 3322.0, 3520.0, 3729.0, 3951.0],
    [4186.0, 4435.0, 4699.0, 4978.0, 5274.0, 5588.0, 5920.0, 6272.0, 6645.0, 7040.0, 7459.0, 7902.0],
];

/// Frequency in Hz of a signed nss `note`, indexed exactly as the original does:
/// `freqs[note // 12][note % 12]` with Python's floor-division/floor-modulo semantics (so a
/// negative octave wraps once from the end of the table, same as Python's negative list
/// indexing).
fn note_freq_hz(note: i32) -> f64 {
    let octave = note.div_euclid(12);
    let semitone = note.rem_euclid(12) as usize;
    let row = if octave >= 0 { octave } else { octave + 8 };
    FREQS[row as usize][semitone]
}

/// Pass 13: when the current SSG macro declares `auto_env = (num, den)`, insert `s_env(fine,
/// coarse)` before each note whose computed period differs from the last one emitted for that
/// subchannel. Like pass 7, this needs to insert an extra op ahead of a note, so it scans each
/// stream directly rather than through [`ControlFlowVisitor`].
pub fn simulate_ssg_autoenv(main: &mut Vec<Op>, blocks: &mut Vec<Block>, module: &Module) {
    let mut last_period: HashMap<u8, u32> = HashMap::new();
    transform_all(main, blocks, |ops| {
        let mut slot = None;
        let mut current_macro: Option<usize> = None;
        let mut out = Vec::with_capacity(ops.len());
        for op in ops.drain(..) {
            if let Op::CtxSsg(s) = op {
                slot = Some(s);
            }
            if let Op::SMacro(id) = op {
                current_macro = Some(id as usize);
            }
            if let Op::Note(n) = op {
                if let (Some(s), Some(macro_id)) = (slot, current_macro) {
                    if let Some(Instrument::Ssg { program, .. }) = module.instruments.get(macro_id) {
                        if let Some((num, den)) = program.auto_env {
                            if num > 0 {
                                // Matches the original's `notefreq = int(freqs[note//12][note%12])`
                                // (Python `int()` truncates; frequencies are always positive, so
                                // truncation and floor agree) followed by three floor divisions.
                                let notefreq = note_freq_hz(n as i32) as i64;
                                if notefreq > 0 {
                                    let period = ((125_000i64 / notefreq) * den as i64 / num as i64) / 16;
                                    let period = period as u32;
                                    if last_period.get(&s) != Some(&period) {
                                        last_period.insert(s, period);
                                        out.push(Op::SEnv(
                                            (period & 0xff) as u8,
                                            ((period >> 8) & 0xff) as u8,
                                        ));
                                    }
                                }
                            }
                        }
                    }
                }
            }
            out.push(op);
        }
        *ops = out;
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_adjacent_waits_splits_over_255() {
        let mut main = vec![Op::WaitN(200), Op::WaitN(200)];
        let mut blocks = Vec::new();
        merge_adjacent_waits(&mut main, &mut blocks);
        assert_eq!(main, vec![Op::WaitN(255), Op::WaitN(145)]);
    }

    #[test]
    fn test_remove_unreferenced_labels_keeps_start() {
        let mut main = vec![Op::Label("_start".into()), Op::Label("dead".into()), Op::End];
        let mut blocks = Vec::new();
        remove_unreferenced_labels(&mut main, &mut blocks);
        assert_eq!(main, vec![Op::Label("_start".into()), Op::End]);
    }

    #[test]
    fn test_compact_wait_n_last_rewrites_exact_repeat() {
        let mut main = vec![Op::WaitN(1), Op::Note(0), Op::WaitN(1)];
        let mut blocks = Vec::new();
        compact_wait_n_last(&mut main, &mut blocks);
        assert_eq!(main, vec![Op::WaitN(1), Op::Note(0), Op::WaitLast]);
    }

    #[test]
    fn test_fuse_note_wait_last() {
        let mut main = vec![Op::CtxFm(1), Op::Note(-12), Op::WaitLast];
        let mut blocks = Vec::new();
        fuse_note_wait_last(&mut main, &mut blocks);
        assert_eq!(main, vec![Op::CtxFm(1), Op::FmNoteW(-12)]);
    }

    #[test]
    fn test_compact_calls_builds_table_and_offsets() {
        let mut main = vec![Op::Call("a".into()), Op::Call("b".into())];
        compact_calls(&mut main);
        assert_eq!(
            main,
            vec![
                Op::PatOffset("b".into()),
                Op::PatOffset("a".into()),
                Op::CallTbl(2),
                Op::CallEntry("a".into()),
                Op::CallEntry("b".into()),
            ]
        );
    }
}
