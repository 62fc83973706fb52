//! # Symbols
//!
//! Symbol table extraction and name normalization.
//!
//! Only symbols that live in the executable code section are kept. Their names
//! are demangled and squeezed into the per-record budget by [`NameNormalizer`]
//! before they reach the encoder.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use fwdbg_core::config::ExtractConfig;
//! use fwdbg_core::image::ElfImage;
//! use fwdbg_core::symbols::{extract_symbols, NameNormalizer};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>>
//! {
//!     let bytes = std::fs::read("firmware.elf")?;
//!     let image = ElfImage::parse(&bytes)?;
//!     let config = ExtractConfig::default();
//!
//!     let normalizer = NameNormalizer::new(&config.normalizer);
//!     for raw in extract_symbols(&image, &config)? {
//!         let symbol = normalizer.normalize_symbol(&raw)?;
//!         println!("{symbol}");
//!     }
//!     Ok(())
//! }
//! ```

pub mod demangle;
pub mod normalize;

use object::{Object, ObjectSection, ObjectSymbol, ObjectSymbolTable, SymbolKind, SymbolSection};
use tracing::{debug, info};

pub use self::demangle::demangle;
pub use self::normalize::NameNormalizer;
use crate::config::ExtractConfig;
use crate::error::{FwdbgError, FwdbgResult};
use crate::image::ElfImage;
use crate::types::{RawSymbol, Symbol};

/// Collect the code-section symbols of an executable.
///
/// A symbol is kept when its owning section resolves and carries the
/// configured code section name. Names are returned verbatim; no ordering is
/// guaranteed.
///
/// ## Errors
///
/// - `FwdbgError::MissingSection` if the executable has no symbol table or
///   no section with the configured code section name
/// - `FwdbgError::AddressOutOfRange` if a kept symbol does not fit 32 bits
pub fn extract_symbols(image: &ElfImage<'_>, config: &ExtractConfig) -> FwdbgResult<Vec<RawSymbol>>
{
    let file = image.file();
    let table = file
        .symbol_table()
        .ok_or_else(|| FwdbgError::MissingSection(".symtab (is the executable stripped?)".into()))?;
    image.code_section_address(&config.text_section)?;
    let clear_thumb_bit = config.strip_thumb_bit && image.is_arm();

    let mut symbols = Vec::new();
    let mut skipped = 0usize;
    for symbol in table.symbols() {
        if matches!(symbol.kind(), SymbolKind::Section | SymbolKind::File) {
            continue;
        }

        let SymbolSection::Section(index) = symbol.section() else {
            skipped += 1;
            continue;
        };
        let in_code_section = file
            .section_by_index(index)
            .and_then(|section| section.name().map(|name| name == config.text_section))
            .unwrap_or(false);
        if !in_code_section {
            skipped += 1;
            continue;
        }

        let Ok(name) = symbol.name() else {
            debug!("Skipping symbol at 0x{:x} with unreadable name", symbol.address());
            continue;
        };
        if name.is_empty() || is_mapping_symbol(name) {
            continue;
        }
        if config.mangled_only && !is_mangled(name) {
            continue;
        }

        let mut address = symbol.address();
        if clear_thumb_bit && symbol.kind() == SymbolKind::Text {
            address &= !1;
        }
        let address = u32::try_from(address).map_err(|_| FwdbgError::AddressOutOfRange {
            what: format!("symbol {name}"),
            address,
        })?;

        symbols.push(RawSymbol {
            address,
            name: name.to_string(),
        });
    }

    info!(
        kept = symbols.len(),
        skipped,
        section = %config.text_section,
        "Extracted code symbols"
    );
    Ok(symbols)
}

/// Demangle, normalize and sort a batch of raw symbols by address.
///
/// Symbols sharing an address (aliases, constructor variants) are all kept,
/// ordered by name so the output is deterministic.
///
/// ## Errors
///
/// Propagates `FwdbgError::EncodingOverflow` from the normalizer.
pub fn build_symbol_table(raw: &[RawSymbol], normalizer: &NameNormalizer) -> FwdbgResult<Vec<Symbol>>
{
    let mut table = raw
        .iter()
        .map(|symbol| normalizer.normalize_symbol(symbol))
        .collect::<FwdbgResult<Vec<_>>>()?;
    table.sort_by(|a, b| a.address.cmp(&b.address).then_with(|| a.name.cmp(&b.name)));
    Ok(table)
}

/// ARM ELF mapping symbols (`$a`, `$t`, `$d`, optionally `$t.foo`) mark
/// instruction-set transitions, not functions.
fn is_mapping_symbol(name: &str) -> bool
{
    let Some(rest) = name.strip_prefix('$') else {
        return false;
    };
    let kind = rest.split('.').next().unwrap_or_default();
    matches!(kind, "a" | "t" | "d" | "x")
}

fn is_mangled(name: &str) -> bool
{
    name.starts_with("_Z") || name.starts_with("_R")
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_mapping_symbols()
    {
        assert!(is_mapping_symbol("$t"));
        assert!(is_mapping_symbol("$d.realdata"));
        assert!(is_mapping_symbol("$a"));
        assert!(!is_mapping_symbol("$tail"));
        assert!(!is_mapping_symbol("main"));
    }

    #[test]
    fn test_build_symbol_table_sorts_by_address()
    {
        let raw = vec![
            RawSymbol {
                address: 0x0800_0200,
                name: "zeta".into(),
            },
            RawSymbol {
                address: 0x0800_0100,
                name: "beta".into(),
            },
            RawSymbol {
                address: 0x0800_0100,
                name: "alpha".into(),
            },
        ];
        let normalizer = NameNormalizer::new(&crate::config::NormalizerConfig::default());
        let table = build_symbol_table(&raw, &normalizer).unwrap();

        let order: Vec<_> = table.iter().map(|s| (s.address, s.name.as_str())).collect();
        assert_eq!(
            order,
            vec![(0x0800_0100, "alpha"), (0x0800_0100, "beta"), (0x0800_0200, "zeta")]
        );
    }
}
