// Command line front end for compressing and decompressing EarthBound data.

use std::convert::TryFrom;
use std::fs::{self, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ebcomp::{Decoder, EncoderBuilder, SearchBackend, StreamInfo};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Print every command to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
#[command(arg_required_else_help = true)]
enum Commands {
    /// Compress a file
    Compress {
        /// The file to compress
        input: String,
        /// Write the compressed data into this file; it is created if it doesn't exist
        output: Option<String>,
        /// Hexadecimal offset in the output file to write at
        #[arg(value_parser = parse_hex, default_value = "0")]
        offset: u64,
        /// Search for copies on every core
        #[arg(short, long)]
        parallel: bool,
    },
    /// Decompress a block from a ROM image or file
    Decompress {
        /// The file the compressed block is in
        input: String,
        /// Hexadecimal offset of the compressed block
        #[arg(value_parser = parse_hex)]
        offset: u64,
        /// Write the decompressed data to this file
        output: Option<String>,
        /// Give up if the data decompresses to more than this many bytes
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

fn parse_hex(s: &str) -> Result<u64, String> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    u64::from_str_radix(digits, 16).map_err(|e| format!("\"{}\" is not a hex offset: {}", s, e))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match &cli.command {
        Commands::Compress {
            input,
            output,
            offset,
            parallel,
        } => compress(input, output.as_deref(), *offset, *parallel, cli.verbose),
        Commands::Decompress {
            input,
            offset,
            output,
            limit,
        } => decompress(input, *offset, output.as_deref(), *limit, cli.verbose),
    }
}

fn compress(input: &str, output: Option<&str>, offset: u64, parallel: bool, verbose: bool) -> Result<()> {
    let in_path = Path::new(input);
    if !in_path.exists() {
        bail!("Input file \"{}\" could not be found.", in_path.display());
    }
    let raw = fs::read(in_path)?;

    let backend = if parallel {
        SearchBackend::Parallel
    } else {
        SearchBackend::Brute
    };
    let mut stderr = io::stderr();
    let mut encoder = EncoderBuilder::for_bytes(&raw);
    encoder.search_backend(backend);
    if verbose {
        encoder.with_logging(&mut stderr);
    }
    let compressed = encoder
        .encode_to_vec()
        .with_context(|| format!("Failed to compress \"{}\".", in_path.display()))?;

    let info = StreamInfo {
        compressed_size: compressed.len(),
        decompressed_size: raw.len(),
    };

    if let Some(output) = output {
        // patch into an existing file (e.g. a ROM image) without truncating it
        let mut out = OpenOptions::new()
            .create(true)
            .write(true)
            .open(output)
            .with_context(|| format!("Could not open \"{}\" for writing.", output))?;
        out.seek(SeekFrom::Start(offset))?;
        out.write_all(&compressed)?;
        println!("Last offset written, inclusive: {:X}", info.last_offset(offset));
    }

    println!("Uncompressed size: {:#X} ({}) bytes", info.decompressed_size, info.decompressed_size);
    println!("Compressed size: {:#X} ({}) bytes", info.compressed_size, info.compressed_size);
    if info.decompressed_size > 0 {
        println!("Ratio: {:.6}", info.ratio());
    }
    Ok(())
}

fn decompress(input: &str, offset: u64, output: Option<&str>, limit: Option<usize>, verbose: bool) -> Result<()> {
    let in_path = Path::new(input);
    if !in_path.exists() {
        bail!("Compressed file \"{}\" could not be found.", in_path.display());
    }
    let image = fs::read(in_path)?;
    let start = usize::try_from(offset)
        .ok()
        .filter(|&start| start < image.len())
        .with_context(|| format!("Offset {:X} is past the end of \"{}\".", offset, in_path.display()))?;

    let mut stderr = io::stderr();
    let mut decoder = Decoder::for_bytes(&image[start..]);
    if let Some(limit) = limit {
        decoder.with_limit(limit);
    }
    if verbose {
        decoder.with_logging(&mut stderr);
    }
    let (decompressed, info) = decoder
        .decode_with_info()
        .with_context(|| format!("Failed to decompress the block at {:X}.", offset))?;

    if let Some(output) = output {
        fs::write(output, &decompressed)
            .with_context(|| format!("Could not write \"{}\".", output))?;
    }

    println!("Last offset read, inclusive: {:X}", info.last_offset(offset));
    println!("Compressed size: {:#X} ({}) bytes", info.compressed_size, info.compressed_size);
    println!("Uncompressed size: {:#X} ({}) bytes", info.decompressed_size, info.decompressed_size);
    if info.decompressed_size > 0 {
        println!("Ratio: {:.6}", info.ratio());
    }
    Ok(())
}
