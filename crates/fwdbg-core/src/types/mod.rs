//! # Types
//!
//! Target-facing types shared by every stage of the pipeline.
//!
//! Addresses are plain `u32` values: the target is a 32-bit microcontroller
//! and both wire tables store 4-byte addresses.

pub mod symbols;
pub mod unwind;

// Re-export all public types
pub use symbols::{RawSymbol, Symbol};
pub use unwind::{Directive, Recovery, UnwindRange};

/// Lowest address of on-device flash.
///
/// Code below this address is not relocation-stable and never appears in the
/// unwind table.
pub const DEFAULT_FLASH_BASE: u32 = 0x0800_0000;
