//! # Error Types
//!
//! General error handling for blob generation.
//!
//! We use `thiserror` to automatically generate `Error` trait implementations
//! and nice error messages.

use thiserror::Error;

/// Main error type for extraction and encoding
///
/// This enum represents all the ways a generation run can fail. There is no
/// retry logic anywhere: any of these aborts the whole run, and the build
/// step that invoked us must not embed a partial or stale blob.
///
/// ## Error Categories
///
/// 1. **Input errors**: Io, Object, MissingSection, AddressOutOfRange
/// 2. **Call-frame errors**: Dwarf, MalformedCallFrame
/// 3. **Encoding errors**: EncodingOverflow, Compression
/// 4. **Usage errors**: InvalidConfig, MalformedBlob
#[derive(Error, Debug)]
pub enum FwdbgError
{
    /// I/O error (reading the executable, writing the blob)
    ///
    /// This is a standard Rust `std::io::Error` converted to our error type.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The executable could not be parsed as an object file
    #[error("Failed to parse executable: {0}")]
    Object(#[from] object::Error),

    /// A section we cannot work without is absent
    ///
    /// This happens when:
    /// - The ELF was stripped (no `.symtab`)
    /// - The code section has a different name than configured
    /// - The firmware was built without `-g` (no `.debug_frame` / `.eh_frame`)
    #[error("Missing section: {0}")]
    MissingSection(String),

    /// An address from the executable does not fit the 32-bit wire format
    #[error("Address 0x{address:x} of {what} does not fit in 32 bits")]
    AddressOutOfRange
    {
        /// What the address belongs to (symbol name, FDE offset, ...)
        what: String,
        /// The offending address
        address: u64,
    },

    /// gimli failed to parse call-frame data
    #[error("DWARF error while {context}: {source}")]
    Dwarf
    {
        /// Description of the operation that failed
        context: String,
        /// Underlying gimli error
        source: gimli::Error,
    },

    /// Call-frame instructions violate the interpreter's structural assumptions
    ///
    /// Examples:
    /// - `DW_CFA_restore_state` without a matching `DW_CFA_remember_state`
    /// - A location instruction moving backwards or past the function end
    /// - An operand that does not fit the 32-bit interpreter state
    /// - Two functions claiming overlapping code with different unwind rules
    #[error("Malformed call-frame data for function at 0x{function:08x}: {reason}")]
    MalformedCallFrame
    {
        /// Start address of the function being interpreted
        function: u64,
        /// What went wrong
        reason: String,
    },

    /// A value does not fit its fixed-width wire field
    ///
    /// Numeric fields are never wrapped or truncated silently.
    #[error("Encoding overflow: {what} ({value}) does not fit its field")]
    EncodingOverflow
    {
        /// Which field overflowed
        what: &'static str,
        /// The value that was rejected
        value: i64,
    },

    /// The compressor or decompressor reported a failure
    #[error("Compression error: {0}")]
    Compression(String),

    /// A setting was rejected before any work started
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A blob handed to the decoder does not follow the wire format
    #[error("Malformed blob: {0}")]
    MalformedBlob(String),
}

/// Convenience type alias for `Result<T, FwdbgError>`
///
/// ```rust
/// use fwdbg_core::error::FwdbgResult;
/// fn foo() -> FwdbgResult<()>
/// {
///     Ok(())
/// }
/// ```
pub type FwdbgResult<T> = std::result::Result<T, FwdbgError>;

/// Wrap a gimli error with a description of what we were doing.
pub(crate) fn map_gimli_error(context: &str, err: gimli::Error) -> FwdbgError
{
    FwdbgError::Dwarf {
        context: context.to_string(),
        source: err,
    }
}
