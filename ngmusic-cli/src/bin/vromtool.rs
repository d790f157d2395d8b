//! Packs ADPCM samples from one or more Furnace modules into fixed-size sample ROM banks and
//! dumps the byte-range symbols the sound driver uses to address them.

use anyhow::{Context, Result};
use clap::Parser;
use ngmusic::module::Module;
use ngmusic::rom::{self, RomEntry};
use std::fmt::Write as _;
use std::fs;
use std::io::Write as _;
use std::path::PathBuf;
use std::process;

#[derive(Parser, Debug)]
#[command(about = "Manage ADPCM sample offsets in VROMs")]
struct Args {
    /// Furnace module file(s) to process
    #[arg(required = true)]
    file: Vec<PathBuf>,

    /// Output file path. When generating multiple VROMs, the basename substitutes 'X' for the
    /// ROM number
    #[arg(short, long)]
    output: PathBuf,

    /// Output sample map offsets as ASM defines
    #[arg(short = 'm', long)]
    output_map: Option<PathBuf>,

    /// Size of one VROM in bytes
    #[arg(short, long)]
    size: usize,

    /// Number of VROMs to generate
    #[arg(short, long, default_value_t = 1)]
    nb: usize,

    /// Generate VROMs out of the sample maps
    #[arg(short, long, conflicts_with = "asm")]
    roms: bool,

    /// Dump offsets in ASM format (default)
    #[arg(short, long)]
    asm: bool,

    /// Print details of processing
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

/// The ADPCM family a sample belongs to, for the ASM defines' comment column.
fn sample_kind(sample: &ngmusic::module::Sample) -> Option<&'static str> {
    match sample {
        ngmusic::module::Sample::Pcm(_) => None,
        ngmusic::module::Sample::AdpcmA(_) => Some("ADPCM-A"),
        ngmusic::module::Sample::AdpcmB(_) => Some("ADPCM-B"),
    }
}

fn generate_asm_defines(samples: &[ngmusic::module::Sample], entries: &[RomEntry]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, ";;; ADPCM samples map in VROM");
    let _ = writeln!(out, ";;; generated by vromtool (ngmusic)");
    let _ = writeln!(out);

    let by_name: std::collections::HashMap<&str, &ngmusic::module::Sample> =
        samples.iter().map(|s| (s.name(), s)).collect();

    for entry in entries {
        let Some(sample) = by_name.get(entry.name.as_str()) else { continue };
        let Some(kind) = sample_kind(sample) else { continue };
        let start = entry.start >> 8;
        let stop = (entry.start + entry.length - 1) >> 8;
        let label = entry.name.to_uppercase();
        let _ = writeln!(out, ";;; {}", entry.name);
        let _ = writeln!(
            out,
            ";;; bank {} [{start:04x}00..{stop:04x}ff] {kind}",
            entry.bank
        );
        let _ = writeln!(out, "        .equ    {label}_START_LSB, {:#04x}", entry.start_lsb);
        let _ = writeln!(out, "        .equ    {label}_START_MSB, {:#04x}", entry.start_msb);
        let _ = writeln!(out, "        .equ    {label}_STOP_LSB, {:#04x}", entry.stop_lsb);
        let _ = writeln!(out, "        .equ    {label}_STOP_MSB, {:#04x}", entry.stop_msb);
        let _ = writeln!(out);
    }
    out
}

fn run() -> Result<()> {
    let args = Args::parse();
    ngmusic_cli::init_logging(args.verbose);

    let mut samples = Vec::new();
    for path in &args.file {
        let data = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let module = Module::parse(&data).with_context(|| format!("parsing {}", path.display()))?;
        samples.extend(module.samples);
    }

    let entries = rom::allocate(&samples, args.size, args.nb)?;

    if args.roms {
        let banks = rom::write_roms(&samples, &entries, args.size, args.nb);
        for (i, bank) in banks.iter().enumerate() {
            let out_path = args.output.to_string_lossy().replace('X', &(i + 1).to_string());
            fs::write(&out_path, bank).with_context(|| format!("writing {out_path}"))?;
        }
    } else {
        let asm = generate_asm_defines(&samples, &entries);
        match &args.output_map {
            Some(path) => fs::write(path, asm).with_context(|| format!("writing {}", path.display()))?,
            None => std::io::stdout().write_all(asm.as_bytes())?,
        }
    }
    Ok(())
}

fn main() {
    if let Err(err) = run() {
        tracing::error!("{err:#}");
        process::exit(1);
    }
}
