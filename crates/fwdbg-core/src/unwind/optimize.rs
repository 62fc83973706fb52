//! Range table compaction.

use tracing::debug;

use crate::error::{FwdbgError, FwdbgResult};
use crate::types::UnwindRange;

/// Sort ranges by start address and merge adjacent ranges that share a
/// directive.
///
/// Two ranges merge only when the second starts exactly where the first ends
/// and the merged length still fits the 16-bit length field, so running the
/// pass twice gives the same table. Exact duplicates (the same function
/// described twice) collapse to one entry.
///
/// ## Example
///
/// ```rust
/// use fwdbg_core::types::{Directive, UnwindRange};
/// use fwdbg_core::unwind::optimize::merge_ranges;
///
/// let merged = merge_ranges(vec![
///     UnwindRange::new(0x0800_0010, 0x0800_0020, Directive::LEAF),
///     UnwindRange::new(0x0800_0000, 0x0800_0010, Directive::LEAF),
/// ])
/// .unwrap();
/// assert_eq!(merged, vec![UnwindRange::new(0x0800_0000, 0x0800_0020, Directive::LEAF)]);
/// ```
///
/// ## Errors
///
/// Returns `FwdbgError::MalformedCallFrame` when two ranges overlap without
/// being identical.
pub fn merge_ranges(mut ranges: Vec<UnwindRange>) -> FwdbgResult<Vec<UnwindRange>>
{
    ranges.sort_unstable_by_key(|range| (range.start, range.end, range.directive));
    let before = ranges.len();

    let mut merged: Vec<UnwindRange> = Vec::with_capacity(ranges.len());
    for range in ranges {
        let Some(last) = merged.last_mut() else {
            merged.push(range);
            continue;
        };

        if *last == range {
            continue;
        }
        if range.start < last.end {
            return Err(FwdbgError::MalformedCallFrame {
                function: u64::from(range.start),
                reason: format!("code range {range} overlaps {last}"),
            });
        }

        let fits = u16::try_from(range.end.saturating_sub(last.start)).is_ok();
        if range.start == last.end && range.directive == last.directive && fits {
            last.end = range.end;
        } else {
            merged.push(range);
        }
    }

    debug!(before, after = merged.len(), "Merged unwind ranges");
    Ok(merged)
}
