//! Name normalization.
//!
//! The device reserves a fixed number of bytes per symbol name, so demangled
//! signatures are shortened in two steps: verbose integer spellings become
//! fixed-width aliases (`unsigned int` -> `u32`), and whatever is still too
//! long is truncated with a `...` marker.

use super::demangle::demangle;
use crate::config::NormalizerConfig;
use crate::error::{FwdbgError, FwdbgResult};
use crate::types::{RawSymbol, Symbol};

const ELLIPSIS: &str = "...";

/// Applies the configured alias table and length cutoff.
#[derive(Debug, Clone)]
pub struct NameNormalizer
{
    cutoff: usize,
    aliases: Vec<(String, String)>,
}

impl NameNormalizer
{
    pub fn new(config: &NormalizerConfig) -> Self
    {
        Self {
            cutoff: config.cutoff,
            aliases: config.type_aliases.clone(),
        }
    }

    /// Demangle and normalize one raw symbol.
    ///
    /// ## Errors
    ///
    /// See [`NameNormalizer::normalize`].
    pub fn normalize_symbol(&self, raw: &RawSymbol) -> FwdbgResult<Symbol>
    {
        let name = self.normalize(&demangle(&raw.name))?;
        Ok(Symbol::new(raw.address, name))
    }

    /// Normalize an already demangled name.
    ///
    /// Replacements only match whole words, so `print(long)` becomes
    /// `print(i32)` while `print` itself is untouched. Where several entries
    /// match at the same word, the earliest in the table wins, and replaced
    /// text is never rewritten again.
    /// Names at or above the cutoff are cut to `cutoff - 4` bytes plus `...`,
    /// leaving one byte for the terminator.
    ///
    /// ## Example
    ///
    /// ```rust
    /// use fwdbg_core::config::NormalizerConfig;
    /// use fwdbg_core::symbols::NameNormalizer;
    ///
    /// let normalizer = NameNormalizer::new(&NormalizerConfig::default());
    /// assert_eq!(normalizer.normalize("foo(unsigned int, long long)").unwrap(), "foo(u32, i64)");
    /// ```
    ///
    /// ## Errors
    ///
    /// Returns `FwdbgError::EncodingOverflow` if the result plus terminator
    /// still exceeds the cutoff.
    pub fn normalize(&self, demangled: &str) -> FwdbgResult<String>
    {
        let mut name = sanitize(&self.replace_aliases(demangled));

        if name.len() >= self.cutoff {
            name.truncate(self.cutoff.saturating_sub(ELLIPSIS.len() + 1));
            name.push_str(ELLIPSIS);
        }

        if name.len() + 1 > self.cutoff {
            return Err(FwdbgError::EncodingOverflow {
                what: "symbol name",
                value: i64::try_from(name.len()).unwrap_or(i64::MAX),
            });
        }
        Ok(name)
    }

    fn replace_aliases(&self, name: &str) -> String
    {
        let bytes = name.as_bytes();
        let mut out = String::with_capacity(name.len());
        let mut pos = 0;

        while let Some(c) = name[pos..].chars().next() {
            let at_word_start = pos == 0 || !is_word_byte(bytes[pos - 1]);
            let hit = at_word_start
                .then(|| {
                    self.aliases.iter().find(|(verbose, _)| {
                        let end = pos + verbose.len();
                        !verbose.is_empty()
                            && name[pos..].starts_with(verbose.as_str())
                            && (end == bytes.len() || !is_word_byte(bytes[end]))
                    })
                })
                .flatten();

            match hit {
                Some((verbose, compact)) => {
                    out.push_str(compact);
                    pos += verbose.len();
                }
                None => {
                    out.push(c);
                    pos += c.len_utf8();
                }
            }
        }
        out
    }
}

/// Force the name into printable ASCII; the record format has no room for
/// anything else and an interior NUL would end the record early.
fn sanitize(name: &str) -> String
{
    name.chars()
        .map(|c| if c.is_ascii() && !c.is_ascii_control() { c } else { '?' })
        .collect()
}

fn is_word_byte(byte: u8) -> bool
{
    byte.is_ascii_alphanumeric() || byte == b'_'
}
