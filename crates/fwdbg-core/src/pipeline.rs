//! # Pipeline
//!
//! One generation run, end to end: read the executable, extract both tables,
//! encode, write.
//!
//! Data flows strictly forward and nothing is written until every stage has
//! succeeded, so a failed run never leaves a partial blob behind.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use tracing::{info, instrument};

use crate::blob::Blob;
use crate::config::ExtractConfig;
use crate::error::FwdbgResult;
use crate::image::ElfImage;
use crate::symbols::{build_symbol_table, extract_symbols, NameNormalizer};
use crate::types::{Symbol, UnwindRange};
use crate::unwind::extract_unwind_table;

/// Both tables extracted from one executable, before encoding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebugTables
{
    /// Sorted by address.
    pub symbols: Vec<Symbol>,
    /// Sorted by start, merged.
    pub ranges: Vec<UnwindRange>,
}

/// Summary of a completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobStats
{
    pub symbols: usize,
    pub ranges: usize,
    pub compressed_symbol_bytes: usize,
    pub compressed_unwind_bytes: usize,
    pub total_bytes: usize,
}

impl BlobStats
{
    fn new(tables: &DebugTables, blob: &Blob) -> Self
    {
        Self {
            symbols: tables.symbols.len(),
            ranges: tables.ranges.len(),
            compressed_symbol_bytes: blob.compressed_symbols().len(),
            compressed_unwind_bytes: blob.compressed_unwind().len(),
            total_bytes: blob.len(),
        }
    }
}

/// Extract the symbol and unwind tables from an in-memory executable.
///
/// ## Errors
///
/// `FwdbgError::InvalidConfig` for a bad config, otherwise any error from the
/// symbol extractor, the name normalizer or the unwind table builder.
pub fn extract_tables(data: &[u8], config: &ExtractConfig) -> FwdbgResult<DebugTables>
{
    config.validate()?;
    extract_validated(data, config)
}

/// Extract and encode without touching the filesystem.
///
/// ## Errors
///
/// See [`extract_tables`] and [`Blob::encode`].
pub fn generate_from_bytes(data: &[u8], config: &ExtractConfig) -> FwdbgResult<(DebugTables, Blob)>
{
    config.validate()?;
    encode_validated(data, config)
}

fn extract_validated(data: &[u8], config: &ExtractConfig) -> FwdbgResult<DebugTables>
{
    let image = ElfImage::parse(data)?;

    let raw = extract_symbols(&image, config)?;
    let normalizer = NameNormalizer::new(&config.normalizer);
    let symbols = build_symbol_table(&raw, &normalizer)?;

    let ranges = extract_unwind_table(&image, config)?;

    Ok(DebugTables { symbols, ranges })
}

fn encode_validated(data: &[u8], config: &ExtractConfig) -> FwdbgResult<(DebugTables, Blob)>
{
    let tables = extract_validated(data, config)?;
    let blob = Blob::encode(&tables.symbols, &tables.ranges, &config.compression)?;
    Ok((tables, blob))
}

/// Read `input`, generate the blob and write it to `output`.
///
/// `output` is only created once the blob is fully encoded.
///
/// ## Errors
///
/// - `FwdbgError::InvalidConfig` before anything is read
/// - `FwdbgError::Io` if `input` cannot be read or `output` cannot be written
/// - any error from [`generate_from_bytes`]
#[instrument(skip_all, fields(input = %input.display(), output = %output.display()))]
pub fn generate(input: &Path, output: &Path, config: &ExtractConfig) -> FwdbgResult<BlobStats>
{
    config.validate()?;
    let data = fs::read(input)?;
    info!(bytes = data.len(), "Read executable");

    let (tables, blob) = encode_validated(&data, config)?;

    let file = File::create(output)?;
    blob.write_to(BufWriter::new(file))?;

    let stats = BlobStats::new(&tables, &blob);
    info!(
        symbols = stats.symbols,
        ranges = stats.ranges,
        bytes = stats.total_bytes,
        "Wrote debug blob"
    );
    Ok(stats)
}
