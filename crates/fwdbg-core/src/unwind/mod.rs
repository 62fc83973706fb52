//! # Unwind
//!
//! Builds the on-device stack-unwinding table from DWARF call-frame data.
//!
//! The work happens in three steps:
//!
//! 1. [`cfi`] decodes every FDE (with its CIE prologue) into a [`cfi::FunctionFrame`].
//! 2. [`interp`] runs each function's instructions and cuts it into ranges
//!    with a single [`Directive`](crate::types::Directive) each.
//! 3. [`optimize`] sorts the whole table and merges neighbours that unwind
//!    the same way.
//!
//! Functions below the flash base are dropped before interpretation; code
//! there (RAM trampolines, boot ROM stubs) is not relocation-stable.

pub mod cfi;
pub mod interp;
pub mod optimize;

use tracing::{debug, info, warn};

use self::cfi::{decode_frames, FunctionFrame};
use self::interp::interpret_function;
use self::optimize::merge_ranges;
use crate::config::ExtractConfig;
use crate::error::FwdbgResult;
use crate::image::ElfImage;
use crate::types::UnwindRange;

/// Decode, interpret and merge the call-frame data of an executable.
///
/// ## Errors
///
/// - `FwdbgError::MissingSection` if there is no call-frame section or no
///   code section
/// - `FwdbgError::Dwarf` if gimli cannot parse it
/// - anything [`build_unwind_table`] returns
pub fn extract_unwind_table(image: &ElfImage<'_>, config: &ExtractConfig) -> FwdbgResult<Vec<UnwindRange>>
{
    let section = image.frame_section()?;
    let text_address = image.code_section_address(&config.text_section)?;

    let frames = decode_frames(&section, image.endian(), image.address_size(), text_address)?;
    info!(
        functions = frames.len(),
        section = section.kind.section_name(),
        "Decoded call-frame entries"
    );

    build_unwind_table(&frames, config)
}

/// Interpret every function at or above the flash base and merge the result.
///
/// ## Errors
///
/// - `FwdbgError::MalformedCallFrame` for unbalanced state stacks, bad
///   cursor movement or conflicting overlaps
/// - `FwdbgError::EncodingOverflow` for directives outside 16 bits
/// - `FwdbgError::AddressOutOfRange` for functions beyond 32-bit addresses
pub fn build_unwind_table(frames: &[FunctionFrame], config: &ExtractConfig) -> FwdbgResult<Vec<UnwindRange>>
{
    let flash_base = u64::from(config.flash_base);
    let mut ranges = Vec::new();
    let mut discarded = 0usize;

    for frame in frames {
        if frame.start < flash_base {
            debug!(
                "Discarding function at 0x{:08x}: below flash base 0x{:08x}",
                frame.start, config.flash_base
            );
            discarded += 1;
            continue;
        }
        if frame.length == 0 {
            warn!("Function at 0x{:08x} has an empty address range", frame.start);
            continue;
        }
        ranges.extend(interpret_function(frame, config.link_register)?);
    }

    let interpreted = ranges.len();
    let ranges = merge_ranges(ranges)?;
    info!(
        discarded,
        interpreted,
        merged = ranges.len(),
        "Built unwind table"
    );
    Ok(ranges)
}
