use std::fs;
use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand};
use fwdbg_core::blob::decode;
use fwdbg_core::config::{CompressionConfig, ExtractConfig, NormalizerConfig, DEFAULT_SYMBOL_CUTOFF};
use fwdbg_core::pipeline::generate;
use fwdbg_core::types::DEFAULT_FLASH_BASE;
use fwdbg_core::FwdbgResult;
use fwdbg_utils::{error, info, init_logging_with_level, LogFormat, LogLevel};

/// Build-time generator of compact symbol and unwind tables for firmware backtraces.
#[derive(Parser, Debug)]
#[command(name = "fwdbg")]
#[command(version)]
#[command(about = "Generate the on-device debug blob from a linked firmware executable", long_about = None)]
struct Cli
{
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace); overrides RUST_LOG
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    /// Log output format (pretty or json)
    #[arg(long, global = true, env = "FWDBG_LOG_FORMAT", default_value = "pretty")]
    log_format: LogFormat,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// Extract symbols and unwind ranges from an executable and write the blob
    Generate(GenerateArgs),
    /// Decode a blob and print both tables
    Inspect
    {
        /// Path to the blob
        blob: PathBuf,
        /// The blob streams are raw deflate, without zlib headers
        #[arg(long, default_value_t = false)]
        raw_deflate: bool,
    },
}

#[derive(Args, Debug)]
struct GenerateArgs
{
    /// Linked executable with debug information
    input: PathBuf,
    /// Path of the blob to write
    output: PathBuf,
    /// Lowest flash address; functions below it are not unwound (hex format: 0x08000000 or decimal)
    #[arg(long, env = "FWDBG_FLASH_BASE", value_parser = parse_address, default_value_t = DEFAULT_FLASH_BASE)]
    flash_base: u32,
    /// Section whose symbols are kept
    #[arg(long, default_value = ".text")]
    text_section: String,
    /// Byte budget per symbol name, terminator included
    #[arg(long, default_value_t = DEFAULT_SYMBOL_CUTOFF)]
    symbol_cutoff: usize,
    /// Deflate compression level (0-9)
    #[arg(long, default_value_t = 9)]
    level: u32,
    /// Deflate window size as a power of two (9-15)
    #[arg(long, default_value_t = 11)]
    window_bits: u8,
    /// Write raw deflate streams without zlib headers
    #[arg(long, default_value_t = false)]
    raw_deflate: bool,
    /// Only keep symbols with mangled (`_Z`/`_R`) names
    #[arg(long, default_value_t = false)]
    mangled_only: bool,
    /// Keep bit 0 of Thumb function addresses
    #[arg(long, default_value_t = false)]
    keep_thumb_bit: bool,
}

impl GenerateArgs
{
    fn to_config(&self) -> ExtractConfig
    {
        ExtractConfig {
            flash_base: self.flash_base,
            text_section: self.text_section.clone(),
            strip_thumb_bit: !self.keep_thumb_bit,
            mangled_only: self.mangled_only,
            normalizer: NormalizerConfig {
                cutoff: self.symbol_cutoff,
                ..NormalizerConfig::default()
            },
            compression: compression_config(self.level, self.window_bits, self.raw_deflate),
            ..ExtractConfig::default()
        }
    }
}

fn compression_config(level: u32, window_bits: u8, raw_deflate: bool) -> CompressionConfig
{
    CompressionConfig {
        level,
        window_bits,
        zlib_header: !raw_deflate,
    }
}

/// Parse an address given as `0x`-prefixed hex or decimal.
fn parse_address(value: &str) -> Result<u32, String>
{
    let value = value.trim().replace('_', "");
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => value.parse::<u32>(),
    };
    parsed.map_err(|e| format!("invalid address `{value}`: {e}"))
}

fn main()
{
    let cli = Cli::parse();

    // Logs go to stderr; keep the guard so file output is flushed on exit
    let _guard = match init_logging_with_level(cli.log_level, cli.log_format) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = run_command(cli.command) {
        error!("{e}");
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run_command(command: Commands) -> FwdbgResult<()>
{
    match command {
        Commands::Generate(args) => {
            let config = args.to_config();
            info!("Generating debug blob from {}", args.input.display());
            let stats = generate(&args.input, &args.output, &config)?;
            info!(
                "Wrote {} ({} bytes: {} symbols in {} bytes, {} ranges in {} bytes)",
                args.output.display(),
                stats.total_bytes,
                stats.symbols,
                stats.compressed_symbol_bytes,
                stats.ranges,
                stats.compressed_unwind_bytes
            );
            Ok(())
        }
        Commands::Inspect { blob, raw_deflate } => {
            let bytes = fs::read(&blob)?;
            let defaults = CompressionConfig::default();
            let decoded = decode(
                &bytes,
                &compression_config(defaults.level, defaults.window_bits, raw_deflate),
            )?;

            println!("Symbols ({}):", decoded.symbols.len());
            for symbol in &decoded.symbols {
                println!("  {symbol}");
            }
            println!("\nUnwind ranges ({}):", decoded.ranges.len());
            for range in &decoded.ranges {
                println!("  {range} ({})", range.directive.recovery());
            }
            Ok(())
        }
    }
}
