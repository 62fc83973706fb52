//! # fwdbg-core
//!
//! Host-side extraction of the debug tables firmware needs for on-device
//! backtraces.
//!
//! Given a linked executable with full debug information, this crate
//! produces two small tables and packs them into one blob:
//! - a symbol table mapping code addresses to short human-readable names
//! - a stack-unwinding table telling the device how to find each caller's
//!   return address
//!
//! ## Pipeline
//!
//! 1. [`symbols`]: ELF symbol table, demangling, name normalization
//! 2. [`unwind`]: DWARF call-frame interpretation and range merging
//! 3. [`blob`]: record encoding and per-stream deflate
//!
//! [`pipeline::generate`] runs all three for one file.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::path::Path;
//!
//! use fwdbg_core::config::ExtractConfig;
//! use fwdbg_core::pipeline::generate;
//!
//! let stats = generate(Path::new("firmware.elf"), Path::new("firmware.dbgblob"), &ExtractConfig::default())?;
//! println!("{} symbols, {} ranges", stats.symbols, stats.ranges);
//! # Ok::<(), fwdbg_core::FwdbgError>(())
//! ```

pub mod blob;
pub mod config;
pub mod error;
pub mod image;
pub mod pipeline;
pub mod prelude;
pub mod symbols;
pub mod types;
pub mod unwind;

pub use config::ExtractConfig;
// Re-export commonly used types
pub use error::{FwdbgError, FwdbgResult};
pub use pipeline::{generate, BlobStats};
pub use types::{Directive, Symbol, UnwindRange};
