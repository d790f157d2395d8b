//! YM2610 ADPCM-A and ADPCM-B audio converter.

use anyhow::{bail, Context, Result};
use clap::Parser;
use ngmusic::codec::{pack_nibbles, unpack_nibbles, Adpcm, AdpcmA, AdpcmB};
use std::fs;
use std::path::PathBuf;
use std::process;

#[derive(Debug, Clone, Copy)]
enum Codec {
    A,
    B,
}

#[derive(Parser, Debug)]
#[command(about = "YM2610 ADPCM-A and ADPCM-B audio converter")]
struct Args {
    /// Encode and decode with ADPCM-A codec
    #[arg(short = 'a', long, conflicts_with = "adpcmb")]
    adpcma: bool,

    /// Encode and decode with ADPCM-B codec
    #[arg(short = 'b', long)]
    adpcmb: bool,

    /// Encode a input WAV file into ADPCM
    #[arg(short = 'e', long, conflicts_with = "decode")]
    encode: bool,

    /// Decode raw ADPCM input into a WAV file
    #[arg(short = 'd', long)]
    decode: bool,

    /// File to process
    file: PathBuf,

    /// Name of output file
    #[arg(short, long)]
    output: PathBuf,

    /// Set sample rate of decoded ADPCM-B
    #[arg(short, long)]
    rate: Option<u32>,

    /// Print details of processing
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

fn codec_of(args: &Args) -> Codec {
    if args.adpcmb {
        Codec::B
    } else {
        Codec::A
    }
}

/// Reads `path` as a mono 16-bit PCM WAV file, falling back to treating it as headerless raw
/// PCM16LE data if it isn't a valid WAV (matches the reference tool's `wave.Error` fallback).
fn read_pcm(path: &PathBuf) -> Result<Vec<i16>> {
    match hound::WavReader::open(path) {
        Ok(mut reader) => {
            let spec = reader.spec();
            if spec.channels > 1 {
                bail!("Only mono WAV file is supported");
            }
            if spec.bits_per_sample != 16 {
                bail!("Only 16bits per sample is supported");
            }
            reader.samples::<i16>().collect::<std::result::Result<Vec<_>, _>>().context("reading WAV samples")
        }
        Err(_) => {
            tracing::debug!("input is not a valid WAV file, assuming raw PCM16LE");
            let raw = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
            Ok(raw.chunks_exact(2).map(|b| i16::from_le_bytes([b[0], b[1]])).collect())
        }
    }
}

fn encode(args: &Args, codec: Codec) -> Result<()> {
    let samples = read_pcm(&args.file)?;
    let codes = match codec {
        Codec::A => AdpcmA::new().encode(&samples),
        Codec::B => AdpcmB::new().encode(&samples),
    };
    let packed = pack_nibbles(&codes);
    tracing::info!(bytes = packed.len(), "encoded ADPCM output");
    fs::write(&args.output, &packed).with_context(|| format!("writing {}", args.output.display()))?;
    Ok(())
}

fn decode(args: &Args, codec: Codec, rate: u32) -> Result<()> {
    let raw = fs::read(&args.file).with_context(|| format!("reading {}", args.file.display()))?;
    let codes = unpack_nibbles(&raw);
    let pcm = match codec {
        Codec::A => AdpcmA::new().decode(&codes),
        Codec::B => AdpcmB::new().decode(&codes),
    };

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer =
        hound::WavWriter::create(&args.output, spec).with_context(|| format!("creating {}", args.output.display()))?;
    for sample in &pcm {
        writer.write_sample(*sample)?;
    }
    writer.finalize()?;
    Ok(())
}

fn run() -> Result<()> {
    let args = Args::parse();
    ngmusic_cli::init_logging(args.verbose);

    if !(args.encode ^ args.decode) {
        bail!("exactly one of --encode or --decode is required");
    }

    let codec = codec_of(&args);
    let rate = args.rate.unwrap_or(match codec {
        Codec::A => 18500,
        Codec::B => 44100,
    });

    if args.encode {
        encode(&args, codec)
    } else {
        decode(&args, codec, rate)
    }
}

fn main() {
    if let Err(err) = run() {
        tracing::error!("{err:#}");
        process::exit(1);
    }
}
