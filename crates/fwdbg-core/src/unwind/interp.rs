//! Per-function call-frame interpreter.
//!
//! Executes a [`FunctionFrame`]'s instruction list and cuts the function into
//! contiguous sub-ranges, each tagged with the [`Directive`] that recovers the
//! caller from any PC inside it.
//!
//! Only three facts matter for the directive, and they are all the
//! interpreter tracks:
//!
//! - the CFA offset (bytes the function has pushed so far),
//! - whether the return address is still in the link register,
//! - where on the stack it was saved otherwise.

use smallvec::SmallVec;

use super::cfi::{FrameOp, FunctionFrame};
use crate::error::{FwdbgError, FwdbgResult};
use crate::types::{Directive, UnwindRange};

/// The part of the interpreter state saved by `DW_CFA_remember_state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RuleRow
{
    cfa_offset: i32,
    return_addr_in_link_register: bool,
    return_addr_stack_offset: i32,
}

impl Default for RuleRow
{
    fn default() -> Self
    {
        Self {
            cfa_offset: 0,
            return_addr_in_link_register: true,
            return_addr_stack_offset: 0,
        }
    }
}

impl RuleRow
{
    /// Derive the directive for the current row.
    ///
    /// Returns the unrepresentable value on failure.
    fn directive(&self) -> Result<Directive, i64>
    {
        if self.return_addr_in_link_register && self.cfa_offset == 0 {
            return Ok(Directive::LEAF);
        }

        let value = if self.return_addr_in_link_register {
            -i64::from(self.cfa_offset)
        } else {
            let value = i64::from(self.cfa_offset) + i64::from(self.return_addr_stack_offset);
            // A negative pop would read as "return via lr" on the device.
            if value < 0 {
                return Err(value);
            }
            value
        };

        match i16::try_from(value) {
            Ok(raw) if raw != i16::MIN => Ok(Directive::new(raw)),
            _ => Err(value),
        }
    }
}

/// Mutable state for one function, threaded through [`InterpreterState::step`].
#[derive(Debug)]
pub struct InterpreterState
{
    function_start: u32,
    function_end: u32,
    code_alignment_factor: u64,
    data_alignment_factor: i64,
    link_register: u16,
    row: RuleRow,
    saved: SmallVec<[RuleRow; 4]>,
    block_start: u32,
    block_end: u32,
    ranges: Vec<UnwindRange>,
}

impl InterpreterState
{
    /// Fresh state positioned at the start of `frame`.
    ///
    /// ## Errors
    ///
    /// Returns `FwdbgError::AddressOutOfRange` if the function does not fit
    /// the 32-bit address space.
    pub fn new(frame: &FunctionFrame, link_register: u16) -> FwdbgResult<Self>
    {
        let function_start = u32::try_from(frame.start).map_err(|_| FwdbgError::AddressOutOfRange {
            what: "function start".into(),
            address: frame.start,
        })?;
        let function_end = frame
            .start
            .checked_add(frame.length)
            .and_then(|end| u32::try_from(end).ok())
            .ok_or_else(|| FwdbgError::AddressOutOfRange {
                what: format!("end of function at 0x{function_start:08x}"),
                address: frame.start.saturating_add(frame.length),
            })?;

        Ok(Self {
            function_start,
            function_end,
            code_alignment_factor: frame.code_alignment_factor,
            data_alignment_factor: frame.data_alignment_factor,
            link_register,
            row: RuleRow::default(),
            saved: SmallVec::new(),
            block_start: function_start,
            block_end: function_start,
            ranges: Vec::new(),
        })
    }

    fn malformed(&self, reason: impl Into<String>) -> FwdbgError
    {
        FwdbgError::MalformedCallFrame {
            function: u64::from(self.function_start),
            reason: reason.into(),
        }
    }

    /// Scale a factored data operand into a byte offset that fits the row.
    fn data_offset(&self, factored: i64, what: &str) -> FwdbgResult<i32>
    {
        factored
            .checked_mul(self.data_alignment_factor)
            .and_then(|bytes| i32::try_from(bytes).ok())
            .ok_or_else(|| self.malformed(format!("{what} operand {factored} is out of range")))
    }

    fn set_cfa_offset(&mut self, offset: i64) -> FwdbgResult<()>
    {
        let offset = i32::try_from(offset).map_err(|_| self.malformed(format!("CFA offset {offset} is out of range")))?;
        if offset < 0 {
            return Err(self.malformed(format!("negative CFA offset {offset}")));
        }
        self.row.cfa_offset = offset;
        Ok(())
    }

    /// Move the location cursor, closing the current block if it moved.
    fn move_to(&mut self, location: u64) -> FwdbgResult<()>
    {
        if location < u64::from(self.block_start) {
            return Err(self.malformed(format!(
                "location 0x{location:x} moves backwards from 0x{:08x}",
                self.block_start
            )));
        }
        if location > u64::from(self.function_end) {
            return Err(self.malformed(format!(
                "location 0x{location:x} is past the function end 0x{:08x}",
                self.function_end
            )));
        }

        // Bounded by function_end above.
        self.block_end = location as u32;
        if self.block_end != self.block_start {
            self.close_block()?;
        }
        Ok(())
    }

    /// Emit `[block_start, block_end)` with the current directive.
    fn close_block(&mut self) -> FwdbgResult<()>
    {
        let directive = self.row.directive().map_err(|value| FwdbgError::EncodingOverflow {
            what: "unwind directive",
            value,
        })?;
        self.ranges.push(UnwindRange::new(self.block_start, self.block_end, directive));
        self.block_start = self.block_end;
        Ok(())
    }

    /// Execute one instruction.
    ///
    /// ## Errors
    ///
    /// - `FwdbgError::MalformedCallFrame` for unbalanced state pops, cursor
    ///   movement outside the function, and out-of-range operands
    /// - `FwdbgError::EncodingOverflow` if a closed block's directive does not
    ///   fit the 16-bit field
    pub fn step(&mut self, op: FrameOp) -> FwdbgResult<()>
    {
        match op {
            FrameOp::AdvanceLoc { delta } => {
                let location = delta
                    .checked_mul(self.code_alignment_factor)
                    .and_then(|bytes| bytes.checked_add(u64::from(self.block_end)))
                    .ok_or_else(|| self.malformed(format!("advance by {delta} overflows")))?;
                self.move_to(location)?;
            }
            FrameOp::SetLoc { address } => self.move_to(address)?,
            FrameOp::DefCfaOffset { offset } => {
                let offset = i64::try_from(offset).unwrap_or(i64::MAX);
                self.set_cfa_offset(offset)?;
            }
            FrameOp::DefCfaOffsetFactored { factored_offset } => {
                let offset = self.data_offset(factored_offset, "DW_CFA_def_cfa_offset_sf")?;
                self.set_cfa_offset(i64::from(offset))?;
            }
            FrameOp::RegisterOffset {
                register,
                factored_offset,
            } => {
                if register == self.link_register {
                    let offset = self.data_offset(factored_offset, "DW_CFA_offset")?;
                    self.row.return_addr_in_link_register = false;
                    self.row.return_addr_stack_offset = offset;
                }
            }
            FrameOp::Restore { register } => {
                if register == self.link_register {
                    self.row.return_addr_in_link_register = true;
                    self.row.return_addr_stack_offset = 0;
                }
            }
            FrameOp::RememberState => self.saved.push(self.row),
            FrameOp::RestoreState => {
                self.row = self
                    .saved
                    .pop()
                    .ok_or_else(|| self.malformed("DW_CFA_restore_state without a matching DW_CFA_remember_state"))?;
            }
        }
        Ok(())
    }

    /// Close the last block at the function end and return every range.
    ///
    /// ## Errors
    ///
    /// Same as [`InterpreterState::step`].
    pub fn finish(mut self) -> FwdbgResult<Vec<UnwindRange>>
    {
        self.move_to(u64::from(self.function_end))?;
        Ok(self.ranges)
    }
}

/// Run the interpreter over one function.
///
/// The returned ranges are contiguous, ordered, non-empty, and together cover
/// exactly `[frame.start, frame.start + frame.length)`.
///
/// ## Errors
///
/// See [`InterpreterState::step`].
pub fn interpret_function(frame: &FunctionFrame, link_register: u16) -> FwdbgResult<Vec<UnwindRange>>
{
    let mut state = InterpreterState::new(frame, link_register)?;
    for op in &frame.ops {
        state.step(*op)?;
    }
    state.finish()
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::config::ARM_LINK_REGISTER;

    const LR: u16 = ARM_LINK_REGISTER;

    fn frame(start: u64, length: u64, ops: Vec<FrameOp>) -> FunctionFrame
    {
        FunctionFrame {
            start,
            length,
            code_alignment_factor: 2,
            data_alignment_factor: -4,
            ops,
        }
    }

    #[test]
    fn test_leaf_function_without_instructions()
    {
        let ranges = interpret_function(&frame(0x0800_0200, 0x20, vec![]), LR).unwrap();
        assert_eq!(ranges, vec![UnwindRange::new(0x0800_0200, 0x0800_0220, Directive::LEAF)]);
    }

    #[test]
    fn test_cfa_offset_without_link_register_save()
    {
        let ranges = interpret_function(&frame(0x0800_0100, 0x10, vec![FrameOp::DefCfaOffset { offset: 8 }]), LR).unwrap();
        assert_eq!(ranges, vec![UnwindRange::new(0x0800_0100, 0x0800_0110, Directive::new(-8))]);
    }

    #[test]
    fn test_push_lr_prologue()
    {
        // push {r7, lr} (2 bytes), sub sp, #8 (2 bytes), body, add sp / pop {r7, pc}
        let ops = vec![
            FrameOp::AdvanceLoc { delta: 1 },
            FrameOp::DefCfaOffset { offset: 8 },
            FrameOp::RegisterOffset {
                register: 7,
                factored_offset: 2,
            },
            FrameOp::RegisterOffset {
                register: LR,
                factored_offset: 1,
            },
            FrameOp::AdvanceLoc { delta: 1 },
            FrameOp::DefCfaOffset { offset: 16 },
        ];
        let ranges = interpret_function(&frame(0x0800_1000, 0x20, ops), LR).unwrap();
        assert_eq!(
            ranges,
            vec![
                UnwindRange::new(0x0800_1000, 0x0800_1002, Directive::LEAF),
                UnwindRange::new(0x0800_1002, 0x0800_1004, Directive::new(4)),
                UnwindRange::new(0x0800_1004, 0x0800_1020, Directive::new(12)),
            ]
        );
    }

    #[test]
    fn test_remember_and_restore_state_around_epilogue()
    {
        let ops = vec![
            FrameOp::AdvanceLoc { delta: 1 },
            FrameOp::DefCfaOffset { offset: 8 },
            FrameOp::RegisterOffset {
                register: LR,
                factored_offset: 1,
            },
            FrameOp::AdvanceLoc { delta: 4 },
            FrameOp::RememberState,
            FrameOp::DefCfaOffset { offset: 0 },
            FrameOp::Restore { register: LR },
            FrameOp::AdvanceLoc { delta: 1 },
            FrameOp::RestoreState,
        ];
        let ranges = interpret_function(&frame(0x0800_0000, 0x10, ops), LR).unwrap();
        assert_eq!(
            ranges,
            vec![
                UnwindRange::new(0x0800_0000, 0x0800_0002, Directive::LEAF),
                UnwindRange::new(0x0800_0002, 0x0800_000a, Directive::new(4)),
                UnwindRange::new(0x0800_000a, 0x0800_000c, Directive::LEAF),
                UnwindRange::new(0x0800_000c, 0x0800_0010, Directive::new(4)),
            ]
        );
    }

    #[test]
    fn test_ranges_are_contiguous()
    {
        let ops = vec![
            FrameOp::AdvanceLoc { delta: 2 },
            FrameOp::DefCfaOffset { offset: 4 },
            FrameOp::AdvanceLoc { delta: 0 },
            FrameOp::AdvanceLoc { delta: 3 },
            FrameOp::DefCfaOffset { offset: 24 },
            FrameOp::SetLoc { address: 0x0800_0030 },
        ];
        let ranges = interpret_function(&frame(0x0800_0000, 0x40, ops), LR).unwrap();
        assert_eq!(ranges.first().unwrap().start, 0x0800_0000);
        assert_eq!(ranges.last().unwrap().end, 0x0800_0040);
        for pair in ranges.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        assert!(ranges.iter().all(|range| !range.is_empty()));
    }

    #[test]
    fn test_no_empty_final_range()
    {
        let ops = vec![FrameOp::AdvanceLoc { delta: 8 }];
        let ranges = interpret_function(&frame(0x0800_0000, 0x10, ops), LR).unwrap();
        assert_eq!(ranges, vec![UnwindRange::new(0x0800_0000, 0x0800_0010, Directive::LEAF)]);
    }

    #[test]
    fn test_factored_cfa_offset()
    {
        let ops = vec![FrameOp::DefCfaOffsetFactored { factored_offset: -3 }];
        let ranges = interpret_function(&frame(0x0800_0000, 0x4, ops), LR).unwrap();
        assert_eq!(ranges[0].directive, Directive::new(-12));
    }

    #[test]
    fn test_restore_state_on_empty_stack_is_an_error()
    {
        let ops = vec![FrameOp::DefCfaOffset { offset: 8 }, FrameOp::RestoreState];
        let err = interpret_function(&frame(0x0800_0100, 0x10, ops), LR).unwrap_err();
        match err {
            FwdbgError::MalformedCallFrame { function, reason } => {
                assert_eq!(function, 0x0800_0100);
                assert!(reason.contains("restore_state"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_backwards_location_is_an_error()
    {
        let ops = vec![FrameOp::AdvanceLoc { delta: 4 }, FrameOp::SetLoc { address: 0x0800_0002 }];
        let err = interpret_function(&frame(0x0800_0000, 0x10, ops), LR).unwrap_err();
        assert!(matches!(err, FwdbgError::MalformedCallFrame { .. }));
    }

    #[test]
    fn test_location_past_end_is_an_error()
    {
        let ops = vec![FrameOp::AdvanceLoc { delta: 9 }];
        let err = interpret_function(&frame(0x0800_0000, 0x10, ops), LR).unwrap_err();
        assert!(matches!(err, FwdbgError::MalformedCallFrame { .. }));
    }

    #[test]
    fn test_directive_overflow()
    {
        let ops = vec![FrameOp::DefCfaOffset { offset: 32768 }];
        let err = interpret_function(&frame(0x0800_0000, 0x10, ops), LR).unwrap_err();
        assert!(matches!(
            err,
            FwdbgError::EncodingOverflow {
                what: "unwind directive",
                value: -32768
            }
        ));

        let ops = vec![FrameOp::DefCfaOffset { offset: 32767 }];
        let ranges = interpret_function(&frame(0x0800_0000, 0x10, ops), LR).unwrap();
        assert_eq!(ranges[0].directive, Directive::new(-32767));
    }

    #[test]
    fn test_other_registers_are_ignored()
    {
        let ops = vec![
            FrameOp::DefCfaOffset { offset: 4 },
            FrameOp::RegisterOffset {
                register: 4,
                factored_offset: 1,
            },
            FrameOp::Restore { register: 4 },
        ];
        let ranges = interpret_function(&frame(0x0800_0000, 0x8, ops), LR).unwrap();
        assert_eq!(ranges, vec![UnwindRange::new(0x0800_0000, 0x0800_0008, Directive::new(-4))]);
    }
}
