//! # Blob
//!
//! Serialization of the symbol and unwind tables into the on-device blob.
//!
//! ## Wire format
//!
//! ```text
//! offset 0      u32 LE   length L of the compressed symbol stream
//! offset 4      L bytes  compressed symbol stream
//! offset 4 + L  rest     compressed unwind stream
//! ```
//!
//! Uncompressed, the symbol stream is a sequence of
//! `u32 BE address, ASCII name, 0x00` records sorted by address, and the
//! unwind stream a sequence of 8-byte `u32 BE start, u16 BE length,
//! i16 BE directive` records sorted by start. Each stream is deflated on its
//! own so the device can inflate one without the other.

use std::io::{Read, Write};

use flate2::read::{DeflateDecoder, ZlibDecoder};
use flate2::{Compress, Compression, FlushCompress, Status};
use tracing::debug;

use crate::config::CompressionConfig;
use crate::error::{FwdbgError, FwdbgResult};
use crate::types::{Directive, Symbol, UnwindRange};

/// Size of the little-endian length header.
pub const HEADER_LEN: usize = 4;

/// Serialize symbols into the uncompressed symbol stream.
///
/// Records are written in the order given; callers pass a table sorted by
/// address.
pub fn encode_symbols(symbols: &[Symbol]) -> Vec<u8>
{
    let mut out = Vec::with_capacity(symbols.iter().map(Symbol::encoded_len).sum());
    for symbol in symbols {
        out.extend_from_slice(&symbol.address.to_be_bytes());
        out.extend_from_slice(symbol.name.as_bytes());
        out.push(0);
    }
    out
}

/// Serialize ranges into the uncompressed unwind stream.
///
/// ## Errors
///
/// Returns `FwdbgError::EncodingOverflow` if a range is longer than the
/// 16-bit length field.
pub fn encode_unwind(ranges: &[UnwindRange]) -> FwdbgResult<Vec<u8>>
{
    let mut out = Vec::with_capacity(ranges.len() * UnwindRange::ENCODED_LEN);
    for range in ranges {
        let length = u16::try_from(range.len()).map_err(|_| FwdbgError::EncodingOverflow {
            what: "unwind range length",
            value: i64::from(range.len()),
        })?;
        out.extend_from_slice(&range.start.to_be_bytes());
        out.extend_from_slice(&length.to_be_bytes());
        out.extend_from_slice(&range.directive.value().to_be_bytes());
    }
    Ok(out)
}

/// Deflate one stream with the configured level and window.
///
/// ## Errors
///
/// - `FwdbgError::InvalidConfig` for a level or window outside the deflate limits
/// - `FwdbgError::Compression` if the compressor reports a failure
pub fn compress(data: &[u8], config: &CompressionConfig) -> FwdbgResult<Vec<u8>>
{
    config.validate()?;
    let mut compressor =
        Compress::new_with_window_bits(Compression::new(config.level), config.zlib_header, config.window_bits);
    let mut out = Vec::with_capacity(data.len() / 2 + 64);

    loop {
        let consumed = compressor.total_in() as usize;
        let status = compressor
            .compress_vec(&data[consumed..], &mut out, FlushCompress::Finish)
            .map_err(|err| FwdbgError::Compression(err.to_string()))?;
        match status {
            Status::StreamEnd => break,
            // Output buffer full; give the compressor more room.
            Status::Ok | Status::BufError => out.reserve(out.capacity().max(64)),
        }
    }

    Ok(out)
}

/// Inflate one stream compressed by [`compress`].
///
/// ## Errors
///
/// Returns `FwdbgError::Compression` for corrupt or truncated input.
pub fn decompress(data: &[u8], config: &CompressionConfig) -> FwdbgResult<Vec<u8>>
{
    let mut out = Vec::new();
    let result = if config.zlib_header {
        ZlibDecoder::new(data).read_to_end(&mut out)
    } else {
        DeflateDecoder::new(data).read_to_end(&mut out)
    };
    result.map_err(|err| FwdbgError::Compression(err.to_string()))?;
    Ok(out)
}

/// An encoded blob: both compressed streams, ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob
{
    compressed_symbols: Vec<u8>,
    compressed_unwind: Vec<u8>,
}

impl Blob
{
    /// Serialize and compress both tables.
    ///
    /// ## Errors
    ///
    /// - `FwdbgError::EncodingOverflow` for an over-long range or a symbol
    ///   stream whose compressed size does not fit the header
    /// - `FwdbgError::Compression` if deflate fails
    pub fn encode(symbols: &[Symbol], ranges: &[UnwindRange], config: &CompressionConfig) -> FwdbgResult<Self>
    {
        let symbol_stream = encode_symbols(symbols);
        let unwind_stream = encode_unwind(ranges)?;

        let compressed_symbols = compress(&symbol_stream, config)?;
        let compressed_unwind = compress(&unwind_stream, config)?;
        if u32::try_from(compressed_symbols.len()).is_err() {
            return Err(FwdbgError::EncodingOverflow {
                what: "compressed symbol stream length",
                value: i64::try_from(compressed_symbols.len()).unwrap_or(i64::MAX),
            });
        }

        debug!(
            symbols = symbols.len(),
            symbol_bytes = symbol_stream.len(),
            compressed_symbol_bytes = compressed_symbols.len(),
            ranges = ranges.len(),
            unwind_bytes = unwind_stream.len(),
            compressed_unwind_bytes = compressed_unwind.len(),
            "Encoded blob"
        );

        Ok(Self {
            compressed_symbols,
            compressed_unwind,
        })
    }

    /// The compressed symbol stream.
    pub fn compressed_symbols(&self) -> &[u8]
    {
        &self.compressed_symbols
    }

    /// The compressed unwind stream.
    pub fn compressed_unwind(&self) -> &[u8]
    {
        &self.compressed_unwind
    }

    /// Total size on disk.
    pub fn len(&self) -> usize
    {
        HEADER_LEN + self.compressed_symbols.len() + self.compressed_unwind.len()
    }

    /// Always `false`: the header is present even for empty tables.
    pub fn is_empty(&self) -> bool
    {
        false
    }

    /// Write header and both streams.
    ///
    /// ## Errors
    ///
    /// Returns `FwdbgError::Io` if the writer fails.
    pub fn write_to<W: Write>(&self, mut writer: W) -> FwdbgResult<()>
    {
        // Checked in `encode`.
        let header = self.compressed_symbols.len() as u32;
        writer.write_all(&header.to_le_bytes())?;
        writer.write_all(&self.compressed_symbols)?;
        writer.write_all(&self.compressed_unwind)?;
        writer.flush()?;
        Ok(())
    }

    /// The complete blob as one buffer.
    pub fn to_bytes(&self) -> Vec<u8>
    {
        let mut out = Vec::with_capacity(self.len());
        out.extend_from_slice(&(self.compressed_symbols.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.compressed_symbols);
        out.extend_from_slice(&self.compressed_unwind);
        out
    }
}

/// Both tables read back from a blob.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedBlob
{
    pub symbols: Vec<Symbol>,
    pub ranges: Vec<UnwindRange>,
}

impl DecodedBlob
{
    /// Find the symbol covering `pc`: the last one at or below it.
    pub fn symbol_for(&self, pc: u32) -> Option<&Symbol>
    {
        let index = self.symbols.partition_point(|symbol| symbol.address <= pc);
        index.checked_sub(1).map(|i| &self.symbols[i])
    }

    /// Find the unwind range containing `pc`.
    pub fn range_for(&self, pc: u32) -> Option<&UnwindRange>
    {
        let index = self.ranges.partition_point(|range| range.start <= pc);
        index
            .checked_sub(1)
            .map(|i| &self.ranges[i])
            .filter(|range| range.contains(pc))
    }
}

/// Parse a complete blob.
///
/// ## Errors
///
/// - `FwdbgError::MalformedBlob` for a short header, a header pointing past
///   the end, or records that do not parse
/// - `FwdbgError::Compression` if a stream does not inflate
pub fn decode(bytes: &[u8], config: &CompressionConfig) -> FwdbgResult<DecodedBlob>
{
    let (header, rest) = bytes
        .split_first_chunk::<HEADER_LEN>()
        .ok_or_else(|| FwdbgError::MalformedBlob(format!("{} bytes is too short for the header", bytes.len())))?;
    let symbols_len = u32::from_le_bytes(*header) as usize;
    if symbols_len > rest.len() {
        return Err(FwdbgError::MalformedBlob(format!(
            "symbol stream length {symbols_len} exceeds the {} bytes after the header",
            rest.len()
        )));
    }
    let (compressed_symbols, compressed_unwind) = rest.split_at(symbols_len);

    let symbols = decode_symbols(&decompress(compressed_symbols, config)?)?;
    let ranges = decode_unwind(&decompress(compressed_unwind, config)?)?;
    Ok(DecodedBlob { symbols, ranges })
}

/// Parse an uncompressed symbol stream.
///
/// ## Errors
///
/// Returns `FwdbgError::MalformedBlob` for truncated or non-ASCII records.
pub fn decode_symbols(mut stream: &[u8]) -> FwdbgResult<Vec<Symbol>>
{
    let mut symbols = Vec::new();
    while !stream.is_empty() {
        let (address, rest) = stream
            .split_first_chunk::<4>()
            .ok_or_else(|| FwdbgError::MalformedBlob("truncated symbol address".into()))?;
        let address = u32::from_be_bytes(*address);
        let terminator = rest
            .iter()
            .position(|&byte| byte == 0)
            .ok_or_else(|| FwdbgError::MalformedBlob(format!("unterminated name for symbol 0x{address:08x}")))?;
        let name = &rest[..terminator];
        if !name.is_ascii() {
            return Err(FwdbgError::MalformedBlob(format!(
                "non-ASCII name for symbol 0x{address:08x}"
            )));
        }
        symbols.push(Symbol::new(address, String::from_utf8_lossy(name)));
        stream = &rest[terminator + 1..];
    }
    Ok(symbols)
}

/// Parse an uncompressed unwind stream.
///
/// ## Errors
///
/// Returns `FwdbgError::MalformedBlob` if the stream is not a whole number
/// of records or a range ends past the 32-bit address space.
pub fn decode_unwind(stream: &[u8]) -> FwdbgResult<Vec<UnwindRange>>
{
    if stream.len() % UnwindRange::ENCODED_LEN != 0 {
        return Err(FwdbgError::MalformedBlob(format!(
            "unwind stream length {} is not a multiple of {}",
            stream.len(),
            UnwindRange::ENCODED_LEN
        )));
    }

    stream
        .chunks_exact(UnwindRange::ENCODED_LEN)
        .map(|record| {
            let start = u32::from_be_bytes([record[0], record[1], record[2], record[3]]);
            let length = u16::from_be_bytes([record[4], record[5]]);
            let directive = i16::from_be_bytes([record[6], record[7]]);
            let end = start
                .checked_add(u32::from(length))
                .ok_or_else(|| FwdbgError::MalformedBlob(format!("range at 0x{start:08x} wraps around")))?;
            Ok(UnwindRange::new(start, end, Directive::new(directive)))
        })
        .collect()
}
