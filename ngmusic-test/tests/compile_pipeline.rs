//! Drives the real `Module::parse` -> `compiler::compile` -> `emit::emit` pipeline against
//! hand-built module containers (see `ngmusic_test::build_module_bytes`), exercising the same
//! concrete scenarios as the core crate's unit tests but starting from actual file bytes rather
//! than the crate-internal `Module::empty()` helper.

use ngmusic::compiler::Op;
use ngmusic::emit::{self, Segment};
use ngmusic::module::{Module, NUM_CHANNELS};
use ngmusic_test::{build_module_bytes, init_logging, ModuleSpec};

#[test]
fn empty_module_parses_and_compiles_to_tempo_then_end() {
    init_logging();
    let spec = ModuleSpec { name: "silence".to_string(), frequency: 60.0, ..Default::default() };
    let bytes = build_module_bytes(&spec);

    let module = Module::parse(&bytes).expect("well-formed container must parse");
    assert_eq!(module.name, "silence");
    assert!(module.orders.is_empty());

    let compiled = ngmusic::compiler::compile(&module, false).expect("empty module always compiles");
    let content: Vec<&Op> = compiled.stream.ops.iter().filter(|op| !op.is_metadata()).collect();
    assert!(matches!(content[0], Op::Tempo(198)));
    assert!(matches!(content.last().unwrap(), Op::End));
}

#[test]
fn orders_with_no_matching_pattern_chunk_compile_as_empty_rows() {
    init_logging();
    // Two orders, every channel referencing pattern id 1; no `PATN` chunk ever declares that
    // pattern, so `Module::pattern` falls back to an absent pattern, and every row lowers to
    // nothing but a final `wait`/`end`.
    let spec = ModuleSpec {
        frequency: 60.0,
        pattern_len: 4,
        orders: vec![[1u8; NUM_CHANNELS], [1u8; NUM_CHANNELS]],
        ..Default::default()
    };
    let bytes = build_module_bytes(&spec);
    let module = Module::parse(&bytes).unwrap();

    let compiled = ngmusic::compiler::compile(&module, false).unwrap();
    assert!(compiled.diagnostics.is_empty());
    assert!(matches!(compiled.stream.ops.last().unwrap(), Op::End));
}

#[test]
fn emit_renders_compact_and_inline_headers_for_the_same_stream() {
    init_logging();
    let spec = ModuleSpec { frequency: 60.0, speeds: vec![6, 6, 5], ..Default::default() };
    let bytes = build_module_bytes(&spec);
    let module = Module::parse(&bytes).unwrap();

    let inline = ngmusic::compiler::compile(&module, false).unwrap();
    let inline_text = emit::emit(&module, &inline.stream, false, Segment::Code, "song", &[0]);
    assert!(inline_text.contains("0xff"));
    assert!(inline_text.contains("song__start::"));

    let compact = ngmusic::compiler::compile(&module, true).unwrap();
    let compact_text = emit::emit(&module, &compact.stream, true, Segment::Bank(2), "song", &[0]);
    assert!(compact_text.contains(".area BANK2"));
    assert!(compact_text.contains("stream count"));
}
