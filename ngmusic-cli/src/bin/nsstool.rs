//! Compiles a Furnace tracker module into an NSS bytecode assembler listing.

use anyhow::{bail, Context, Result};
use clap::Parser;
use ngmusic::emit::{self, Segment};
use ngmusic::module::Module;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process;

#[derive(Parser, Debug)]
#[command(about = "Compile a Furnace module into an NSS bytecode listing")]
struct Args {
    /// Furnace module
    file: PathBuf,

    /// Output file name
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Generate data for a bank-switched Z80 memory area
    #[arg(short, long)]
    bank: Option<u8>,

    /// Name of the ASM label for the NSS data. Empty name skips label.
    #[arg(short, long)]
    name: Option<String>,

    /// Process specific channels. One hex digit per channel
    #[arg(short, long, default_value = "0123456789abcd")]
    channels: String,

    /// Generate compact NSS stream
    #[arg(short = 'z', long)]
    compact: bool,

    /// Print details of processing
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

/// Parses `-c`'s hex-digit-per-channel filter into the sorted, deduplicated channel list.
fn parse_channels(spec: &str) -> Result<Vec<u8>> {
    let mut channels: Vec<u8> = spec
        .to_lowercase()
        .chars()
        .map(|c| c.to_digit(16).map(|d| d as u8).filter(|&d| d < ngmusic::module::NUM_CHANNELS as u8))
        .collect::<Option<Vec<_>>>()
        .with_context(|| format!("invalid channel filter {spec:?}: expected hex digits 0-d"))?;
    channels.sort_unstable();
    channels.dedup();
    Ok(channels)
}

fn run() -> Result<()> {
    let args = Args::parse();
    ngmusic_cli::init_logging(args.verbose);

    let channels = parse_channels(&args.channels)?;
    if channels.is_empty() {
        bail!("no channels selected");
    }

    let data = fs::read(&args.file).with_context(|| format!("reading {}", args.file.display()))?;
    let module = Module::parse(&data).with_context(|| format!("parsing {}", args.file.display()))?;

    let compiled = ngmusic::compiler::compile(&module, args.compact)?;
    ngmusic_cli::flush_diagnostics(&compiled.diagnostics, &module);

    let name = args.name.unwrap_or_else(|| "nss_stream".to_string());
    let segment = args.bank.map_or(Segment::Code, Segment::Bank);
    let listing = emit::emit(&module, &compiled.stream, args.compact, segment, &name, &channels);

    match args.output {
        Some(path) => fs::write(&path, listing).with_context(|| format!("writing {}", path.display()))?,
        None => std::io::stdout().write_all(listing.as_bytes())?,
    }
    Ok(())
}

fn main() {
    if let Err(err) = run() {
        tracing::error!("{err:#}");
        process::exit(1);
    }
}
