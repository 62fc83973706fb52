//! Symbol demangling utilities.
//!
//! Firmware images mix C, C++ and occasionally Rust objects, so a raw linkage
//! name can be in any of three forms:
//!
//! - **Rust**: legacy (`_ZN...17h<hash>E`) or v0 (`_R...`) mangling
//! - **C++**: Itanium ABI mangling (`_Z...`)
//! - **C**: unmangled
//!
//! Rust is tried first because legacy Rust names are also valid-looking
//! Itanium names; `rustc_demangle` rejects real C++ names (they carry a
//! parameter list after the closing `E`), which then fall through to
//! `cpp_demangle`. Anything that neither demangler accepts is returned as is.

use cpp_demangle::{BorrowedSymbol, DemangleOptions};
use rustc_demangle::try_demangle;
use tracing::trace;

/// Turn a raw linkage name into a human-readable signature.
///
/// ## Example
///
/// ```rust
/// use fwdbg_core::symbols::demangle;
///
/// assert_eq!(demangle("_Z3addii"), "add(int, int)");
/// assert_eq!(demangle("Reset_Handler"), "Reset_Handler");
/// ```
pub fn demangle(raw: &str) -> String
{
    if raw.starts_with("_R") || raw.starts_with("_ZN") {
        if let Ok(symbol) = try_demangle(raw) {
            // `{:#}` drops the trailing hash, which is noise on the device.
            return format!("{symbol:#}");
        }
    }

    if raw.starts_with("_Z") {
        match BorrowedSymbol::new(raw.as_bytes()) {
            Ok(symbol) => match symbol.demangle(&DemangleOptions::default()) {
                Ok(name) => return name,
                Err(err) => trace!("cpp_demangle could not print {raw}: {err}"),
            },
            Err(err) => trace!("cpp_demangle could not parse {raw}: {err}"),
        }
    }

    raw.to_string()
}
