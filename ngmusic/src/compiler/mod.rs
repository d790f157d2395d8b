//! Compiles a decoded [`Module`](crate::module::Module) into a bytecode stream for the sound
//! driver: row-to-opcode lowering, a fixed sequence of optimisation passes, and final label
//! resolution.

pub mod diagnostics;
pub mod graph;
pub mod lower;
pub mod opcode;
pub mod passes;
pub mod resolve;

pub use diagnostics::{Diagnostics, Location, Warning};
pub use graph::Block;
pub use opcode::Op;
pub use resolve::ResolvedStream;

use crate::module::Module;
use thiserror::Error;
use tracing::instrument;

/// The result type for compiler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for compiler operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A `note-on` with no preceding instrument, or an instrument whose variant doesn't match
    /// the channel it was selected on.
    #[error("bad instrument at {location:?}: {detail}")]
    BadInstrument { location: Location, detail: String },

    /// A `jmp`/`call`/`pat_offset` record whose target label never appears in the stream.
    #[error("unresolved label {0:?}")]
    UnresolvedLabel(String),
}

/// Whether the main stream inlines every channel's rows per order, or calls into deduplicated
/// per-`(channel, pattern)` blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Inline,
    Compact,
}

/// A fully compiled, resolved bytecode program plus the warnings collected while lowering it.
#[derive(Debug)]
pub struct CompiledModule {
    pub stream: ResolvedStream,
    pub diagnostics: Diagnostics,
    pub mode: Mode,
}

/// The driver's tick rate: one tempo tick is `1152` driver ticks.
const DRIVER_TICKS_PER_TEMPO_TICK: f64 = 1152.0;

/// Computes the `tempo` opcode operand for a module's playback frequency: `256 − round(4_000_000
/// / (1152 · frequency))`, wrapping into a `u8`.
fn tempo_operand(frequency: f32) -> u8 {
    let ticks = (4_000_000.0 / (DRIVER_TICKS_PER_TEMPO_TICK * frequency as f64)).round() as i32;
    (256 - ticks).rem_euclid(256) as u8
}

/// Inserts the `tempo` opcode immediately after the `_start` label, ahead of everything else.
fn inject_tempo(main: &mut Vec<Op>, frequency: f32) {
    let pos = main
        .iter()
        .position(|op| matches!(op, Op::Label(l) if l == "_start"))
        .map(|i| i + 1)
        .unwrap_or(0);
    main.insert(pos, Op::Tempo(tempo_operand(frequency)));
}

/// Compiles `module` into a resolved bytecode stream.
///
/// `compact` selects whether the main stream inlines every row (closer to the source pattern
/// layout, easier to read in a listing) or calls into deduplicated per-channel blocks (smaller
/// output for modules that reuse patterns across orders).
#[instrument(level = "debug", skip_all, fields(compact))]
pub fn compile(module: &Module, compact: bool) -> Result<CompiledModule> {
    let mut diagnostics = Diagnostics::new();

    let mut raw = if compact {
        graph::build_compact(module, &mut diagnostics)
    } else {
        graph::build_inline(module, &mut diagnostics)
    };
    inject_tempo(&mut raw.main, module.frequency);

    // Passes 1-2: fatal checks, run before locations are stripped so failures carry source
    // positions.
    passes::check_instruments_valid_for_channel(&raw.main, &raw.blocks, module)?;
    passes::check_first_note_has_instrument(&raw.main, &raw.blocks)?;

    let RawStreamParts { mut main, mut blocks } = RawStreamParts::from(raw);

    passes::remove_locations(&mut main, &mut blocks);
    passes::remove_unreferenced_labels(&mut main, &mut blocks);
    passes::merge_adjacent_waits(&mut main, &mut blocks);
    passes::compact_instr(&mut main, &mut blocks);
    passes::insert_missing_vol(&mut main, &mut blocks);
    passes::compact_wait_n_last(&mut main, &mut blocks);
    passes::fuse_note_wait_last(&mut main, &mut blocks);
    passes::compact_calls(&mut main);
    passes::tune_adpcm_b_notes(&mut main, &mut blocks, module);
    if compact {
        passes::remove_ctx(&mut main, &mut blocks);
    } else {
        passes::compact_ctx(&mut main, &mut blocks);
    }
    passes::simulate_ssg_autoenv(&mut main, &mut blocks, module);

    let stream = resolve::resolve(main, blocks)?;

    Ok(CompiledModule {
        stream,
        diagnostics,
        mode: if compact { Mode::Compact } else { Mode::Inline },
    })
}

/// Plain owned `(main, blocks)` pair, used to thread the raw lowering through the mutation-style
/// pass functions without carrying [`graph::RawStream`]'s naming into the rest of the pipeline.
struct RawStreamParts {
    main: Vec<Op>,
    blocks: Vec<Block>,
}

impl From<graph::RawStream> for RawStreamParts {
    fn from(raw: graph::RawStream) -> Self {
        RawStreamParts { main: raw.main, blocks: raw.blocks }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tempo_operand_matches_reference_scenario() {
        assert_eq!(tempo_operand(60.0), 198);
    }

    #[test]
    fn test_empty_module_compiles_to_tempo_then_end() {
        let module = Module::empty();
        let compiled = compile(&module, false).unwrap();
        // `_start` survives pass 4 as the sentinel label; every other op is on-wire content, so
        // the byte-bearing sequence is tempo then end.
        let content: Vec<&Op> = compiled.stream.ops.iter().filter(|op| !op.is_metadata()).collect();
        assert!(matches!(content[0], Op::Tempo(198)));
        assert!(matches!(content.last().unwrap(), Op::End));
        assert_eq!(content.iter().map(|op| op.size_in_bytes()).sum::<usize>(), 3);
    }
}
