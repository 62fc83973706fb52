//! Call-frame record decoding.
//!
//! Walks `.debug_frame` / `.eh_frame` with gimli and flattens every FDE into
//! a [`FunctionFrame`]: the function's address range, its CIE alignment
//! factors, and the CIE initial instructions followed by the FDE's own
//! instructions, reduced to the handful of opcodes the interpreter acts on.

use gimli::{BaseAddresses, CallFrameInstruction, CieOrFde, EndianSlice, Reader, RunTimeEndian, UnwindSection};
use tracing::trace;

use crate::error::{map_gimli_error, FwdbgResult};
use crate::image::{FrameSection, FrameSectionKind};

/// A call-frame instruction the interpreter understands.
///
/// Operands are kept exactly as encoded; the interpreter applies the CIE
/// alignment factors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOp
{
    /// `DW_CFA_advance_loc*`: move the location by `delta * code_alignment_factor`.
    AdvanceLoc
    {
        delta: u64,
    },
    /// `DW_CFA_set_loc`: move the location to an absolute address.
    SetLoc
    {
        address: u64,
    },
    /// `DW_CFA_def_cfa_offset`: CFA offset in bytes.
    DefCfaOffset
    {
        offset: u64,
    },
    /// `DW_CFA_def_cfa_offset_sf`: CFA offset in units of the data alignment factor.
    DefCfaOffsetFactored
    {
        factored_offset: i64,
    },
    /// `DW_CFA_offset*`: `register` saved at `CFA + factored_offset * data_alignment_factor`.
    RegisterOffset
    {
        register: u16,
        factored_offset: i64,
    },
    /// `DW_CFA_restore*`: `register` back to its CIE rule.
    Restore
    {
        register: u16,
    },
    /// `DW_CFA_remember_state`
    RememberState,
    /// `DW_CFA_restore_state`
    RestoreState,
}

impl FrameOp
{
    /// Reduce a gimli instruction, dropping the ones that cannot change a directive.
    pub fn from_gimli<T: gimli::ReaderOffset>(instruction: CallFrameInstruction<T>) -> Option<Self>
    {
        let op = match instruction {
            CallFrameInstruction::AdvanceLoc { delta } => FrameOp::AdvanceLoc { delta: u64::from(delta) },
            CallFrameInstruction::SetLoc { address } => FrameOp::SetLoc { address },
            CallFrameInstruction::DefCfaOffset { offset } => FrameOp::DefCfaOffset { offset },
            CallFrameInstruction::DefCfaOffsetSf { factored_offset } => FrameOp::DefCfaOffsetFactored { factored_offset },
            CallFrameInstruction::Offset {
                register,
                factored_offset,
            } => FrameOp::RegisterOffset {
                register: register.0,
                // Saturated operands are rejected by the interpreter's range checks.
                factored_offset: i64::try_from(factored_offset).unwrap_or(i64::MAX),
            },
            CallFrameInstruction::OffsetExtendedSf {
                register,
                factored_offset,
            } => FrameOp::RegisterOffset {
                register: register.0,
                factored_offset,
            },
            CallFrameInstruction::Restore { register } => FrameOp::Restore { register: register.0 },
            CallFrameInstruction::RememberState => FrameOp::RememberState,
            CallFrameInstruction::RestoreState => FrameOp::RestoreState,
            _ => return None,
        };
        Some(op)
    }
}

/// One FDE with its CIE prologue applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionFrame
{
    /// First address of the function.
    pub start: u64,
    /// Size of the function in bytes.
    pub length: u64,
    pub code_alignment_factor: u64,
    pub data_alignment_factor: i64,
    /// CIE initial instructions followed by the FDE instructions.
    pub ops: Vec<FrameOp>,
}

/// Decode every FDE in a call-frame section.
///
/// ## Parameters
///
/// - `section`: raw section bytes and kind, from [`crate::image::ElfImage::frame_section`]
/// - `endian`: target byte order
/// - `address_size`: target pointer size; `.debug_frame` version 1 does not encode it
/// - `text_address`: load address of the code section, for `DW_EH_PE_textrel` pointers
///
/// ## Errors
///
/// Returns `FwdbgError::Dwarf` when gimli cannot parse an entry.
pub fn decode_frames(
    section: &FrameSection<'_>,
    endian: RunTimeEndian,
    address_size: u8,
    text_address: u64,
) -> FwdbgResult<Vec<FunctionFrame>>
{
    let data = EndianSlice::new(&section.data, endian);
    match section.kind {
        FrameSectionKind::DebugFrame => {
            let mut debug_frame = gimli::DebugFrame::from(data);
            debug_frame.set_address_size(address_size);
            let bases = BaseAddresses::default().set_text(text_address);
            collect_frames(&debug_frame, &bases)
        }
        FrameSectionKind::EhFrame => {
            let mut eh_frame = gimli::EhFrame::from(data);
            eh_frame.set_address_size(address_size);
            let bases = BaseAddresses::default()
                .set_text(text_address)
                .set_eh_frame(section.address);
            collect_frames(&eh_frame, &bases)
        }
    }
}

/// Iterate through an unwind section, parsing each FDE against its CIE.
fn collect_frames<R, Section>(section: &Section, bases: &BaseAddresses) -> FwdbgResult<Vec<FunctionFrame>>
where
    R: Reader<Offset = usize>,
    Section: UnwindSection<R>,
{
    let mut frames = Vec::new();
    let mut entries = section.entries(bases);
    while let Some(entry) = entries
        .next()
        .map_err(|err| map_gimli_error("reading call-frame entry", err))?
    {
        let CieOrFde::Fde(partial) = entry else {
            continue;
        };
        let fde = partial
            .parse(|unwind_section, base_addresses, cie_offset| {
                unwind_section.cie_from_offset(base_addresses, cie_offset)
            })
            .map_err(|err| map_gimli_error("parsing frame description entry", err))?;
        let cie = fde.cie();

        let mut ops = Vec::new();
        let mut dropped = 0usize;
        let mut prologue = cie.instructions(section, bases);
        while let Some(instruction) = prologue
            .next()
            .map_err(|err| map_gimli_error("decoding CIE initial instructions", err))?
        {
            match FrameOp::from_gimli(instruction) {
                Some(op) => ops.push(op),
                None => dropped += 1,
            }
        }
        let mut body = fde.instructions(section, bases);
        while let Some(instruction) = body
            .next()
            .map_err(|err| map_gimli_error("decoding FDE instructions", err))?
        {
            match FrameOp::from_gimli(instruction) {
                Some(op) => ops.push(op),
                None => dropped += 1,
            }
        }

        trace!(
            start = fde.initial_address(),
            length = fde.len(),
            kept = ops.len(),
            dropped,
            "Decoded FDE"
        );
        frames.push(FunctionFrame {
            start: fde.initial_address(),
            length: fde.len(),
            code_alignment_factor: cie.code_alignment_factor(),
            data_alignment_factor: cie.data_alignment_factor(),
            ops,
        });
    }

    Ok(frames)
}
