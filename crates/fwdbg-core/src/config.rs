//! # Configuration
//!
//! Policy knobs for a generation run.
//!
//! The defaults reproduce the blob format the firmware's unwinder expects:
//! flash at `0x0800_0000`, code in `.text`, the ARM link register (DWARF
//! register 14), 64-byte symbol records, and zlib streams with a 2 KiB window.
//! The CLI overrides individual fields; nothing else reads global state.

use crate::error::{FwdbgError, FwdbgResult};
use crate::types::DEFAULT_FLASH_BASE;

/// DWARF register number of the ARM link register (`r14`).
pub const ARM_LINK_REGISTER: u16 = 14;

/// Default byte budget per symbol name, terminator included.
pub const DEFAULT_SYMBOL_CUTOFF: usize = 64;

/// Smallest cutoff that still leaves room for a few characters and `...`.
const MIN_SYMBOL_CUTOFF: usize = 8;

/// Verbose integer spellings and their fixed-width aliases.
///
/// At each word the first matching entry wins, so longer spellings must come
/// before the shorter ones they contain (`unsigned long long` before
/// `long long` before `long`). An entry mapping to itself keeps a spelling
/// intact. `long` is 32 bits wide on the target.
pub const DEFAULT_TYPE_ALIASES: &[(&str, &str)] = &[
    ("unsigned long long", "u64"),
    ("long long", "i64"),
    ("long double", "long double"),
    ("unsigned long", "u32"),
    ("unsigned int", "u32"),
    ("unsigned short", "u16"),
    ("unsigned char", "u8"),
    ("signed char", "i8"),
    ("long", "i32"),
    ("short", "i16"),
    ("int", "i32"),
];

/// Everything a generation run needs to know besides the input and output paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractConfig
{
    /// Functions starting below this address are not unwound.
    pub flash_base: u32,
    /// Name of the executable code section whose symbols are kept.
    pub text_section: String,
    /// DWARF register number of the link register.
    pub link_register: u16,
    /// Clear bit 0 of function symbol values on ARM (Thumb interworking bit).
    pub strip_thumb_bit: bool,
    /// Only keep symbols with a mangled (`_Z` / `_R`) name.
    pub mangled_only: bool,
    /// Name normalization policy.
    pub normalizer: NormalizerConfig,
    /// Stream compression settings.
    pub compression: CompressionConfig,
}

impl Default for ExtractConfig
{
    fn default() -> Self
    {
        Self {
            flash_base: DEFAULT_FLASH_BASE,
            text_section: ".text".to_string(),
            link_register: ARM_LINK_REGISTER,
            strip_thumb_bit: true,
            mangled_only: false,
            normalizer: NormalizerConfig::default(),
            compression: CompressionConfig::default(),
        }
    }
}

impl ExtractConfig
{
    /// Check every field before any work starts.
    ///
    /// ## Errors
    ///
    /// Returns `FwdbgError::InvalidConfig` describing the first bad setting.
    pub fn validate(&self) -> FwdbgResult<()>
    {
        if self.text_section.is_empty() {
            return Err(FwdbgError::InvalidConfig("code section name must not be empty".into()));
        }
        self.normalizer.validate()?;
        self.compression.validate()
    }
}

/// How raw symbol names are turned into bounded display names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizerConfig
{
    /// Byte budget per name including the terminator.
    pub cutoff: usize,
    /// Ordered `(verbose, compact)` replacement table.
    pub type_aliases: Vec<(String, String)>,
}

impl Default for NormalizerConfig
{
    fn default() -> Self
    {
        Self {
            cutoff: DEFAULT_SYMBOL_CUTOFF,
            type_aliases: DEFAULT_TYPE_ALIASES
                .iter()
                .map(|(verbose, compact)| ((*verbose).to_string(), (*compact).to_string()))
                .collect(),
        }
    }
}

impl NormalizerConfig
{
    /// ## Errors
    ///
    /// Rejects cutoffs too small to hold an abbreviated name, empty
    /// replacement patterns, and aliases that are not printable ASCII.
    pub fn validate(&self) -> FwdbgResult<()>
    {
        if self.cutoff < MIN_SYMBOL_CUTOFF {
            return Err(FwdbgError::InvalidConfig(format!(
                "symbol cutoff {} is below the minimum of {MIN_SYMBOL_CUTOFF}",
                self.cutoff
            )));
        }
        if self.type_aliases.iter().any(|(verbose, _)| verbose.is_empty()) {
            return Err(FwdbgError::InvalidConfig("type alias patterns must not be empty".into()));
        }
        let printable = |text: &str| text.bytes().all(|b| b.is_ascii() && !b.is_ascii_control());
        if let Some((verbose, compact)) = self
            .type_aliases
            .iter()
            .find(|(verbose, compact)| !printable(verbose) || !printable(compact))
        {
            return Err(FwdbgError::InvalidConfig(format!(
                "type alias `{verbose}` -> `{compact}` is not printable ASCII"
            )));
        }
        Ok(())
    }
}

/// Deflate settings for both streams.
///
/// The decompressor on the target keeps a sliding window of
/// `1 << window_bits` bytes in RAM, so the window is kept small.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionConfig
{
    /// Compression level, 0-9.
    pub level: u32,
    /// Base-two logarithm of the window size, 9-15.
    pub window_bits: u8,
    /// Wrap each stream in a zlib header and Adler-32 trailer.
    pub zlib_header: bool,
}

impl Default for CompressionConfig
{
    fn default() -> Self
    {
        Self {
            level: 9,
            window_bits: 11,
            zlib_header: true,
        }
    }
}

impl CompressionConfig
{
    /// ## Errors
    ///
    /// Rejects levels above 9 and windows outside 9..=15.
    pub fn validate(&self) -> FwdbgResult<()>
    {
        if self.level > 9 {
            return Err(FwdbgError::InvalidConfig(format!(
                "compression level {} is out of range 0-9",
                self.level
            )));
        }
        if !(9..=15).contains(&self.window_bits) {
            return Err(FwdbgError::InvalidConfig(format!(
                "window bits {} is out of range 9-15",
                self.window_bits
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_default_config_is_valid()
    {
        let config = ExtractConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.flash_base, 0x0800_0000);
        assert_eq!(config.link_register, 14);
        assert_eq!(config.normalizer.cutoff, 64);
        assert_eq!(config.compression.window_bits, 11);
    }

    #[test]
    fn test_alias_table_orders_longer_spellings_first()
    {
        let table = DEFAULT_TYPE_ALIASES;
        for (i, (earlier, _)) in table.iter().enumerate() {
            for (later, _) in &table[i + 1..] {
                assert!(
                    !later.contains(earlier),
                    "`{later}` contains `{earlier}` but is applied after it"
                );
            }
        }
    }

    #[test]
    fn test_rejects_bad_window_bits()
    {
        let mut config = ExtractConfig::default();
        config.compression.window_bits = 8;
        assert!(matches!(config.validate(), Err(FwdbgError::InvalidConfig(_))));
        config.compression.window_bits = 16;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_tiny_cutoff()
    {
        let mut config = ExtractConfig::default();
        config.normalizer.cutoff = 4;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_non_ascii_aliases()
    {
        let mut config = ExtractConfig::default();
        config.normalizer.type_aliases.push(("int".into(), "\u{e9}\u{e9}".into()));
        assert!(matches!(config.validate(), Err(FwdbgError::InvalidConfig(_))));

        let mut config = ExtractConfig::default();
        config.normalizer.type_aliases = vec![("wchar_t\0".into(), "w".into())];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_empty_text_section()
    {
        let config = ExtractConfig {
            text_section: String::new(),
            ..ExtractConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
