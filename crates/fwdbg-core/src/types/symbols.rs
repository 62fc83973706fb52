//! Symbol table types.

use std::fmt;

/// A code symbol as it is written to the symbol stream.
///
/// The name is already normalized: ASCII, no interior NUL, and short enough
/// that name plus terminator fits the per-symbol budget.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Symbol
{
    /// Target address of the symbol (Thumb bit cleared).
    pub address: u32,
    /// Normalized human-readable name.
    pub name: String,
}

impl Symbol
{
    /// Construct a symbol record.
    pub fn new(address: u32, name: impl Into<String>) -> Self
    {
        Self {
            address,
            name: name.into(),
        }
    }

    /// Size of this record in the uncompressed symbol stream.
    pub fn encoded_len(&self) -> usize
    {
        4 + self.name.len() + 1
    }
}

impl fmt::Display for Symbol
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "0x{:08x} {}", self.address, self.name)
    }
}

/// A symbol straight out of the ELF symbol table, before demangling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSymbol
{
    /// Symbol value.
    pub address: u32,
    /// Linkage name exactly as stored in the string table.
    pub name: String,
}
