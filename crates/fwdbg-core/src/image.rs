//! Executable parsing and section loading.
//!
//! The whole file is materialized in memory by the caller; [`ElfImage`]
//! borrows it and hands out the symbol table and the call-frame section.

use std::borrow::Cow;

use gimli::RunTimeEndian;
use object::{Object, ObjectSection};

use crate::error::{FwdbgError, FwdbgResult};

/// Which flavour of call-frame data a section holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSectionKind
{
    /// `.debug_frame`, emitted by `-g`.
    DebugFrame,
    /// `.eh_frame`, emitted for exception support.
    EhFrame,
}

impl FrameSectionKind
{
    /// Section name in the ELF file.
    pub fn section_name(self) -> &'static str
    {
        match self {
            FrameSectionKind::DebugFrame => ".debug_frame",
            FrameSectionKind::EhFrame => ".eh_frame",
        }
    }
}

/// Raw bytes of a call-frame section plus what gimli needs to decode them.
#[derive(Debug, Clone)]
pub struct FrameSection<'data>
{
    pub kind: FrameSectionKind,
    pub data: Cow<'data, [u8]>,
    /// Load address of the section, used for `.eh_frame` pc-relative pointers.
    pub address: u64,
}

/// A parsed executable.
pub struct ElfImage<'data>
{
    file: object::File<'data>,
    endian: RunTimeEndian,
}

impl<'data> ElfImage<'data>
{
    /// Parse an in-memory executable.
    ///
    /// ## Errors
    ///
    /// Returns `FwdbgError::Object` if the bytes are not a supported object file.
    pub fn parse(data: &'data [u8]) -> FwdbgResult<Self>
    {
        let file = object::File::parse(data)?;

        let endian = if file.is_little_endian() {
            RunTimeEndian::Little
        } else {
            RunTimeEndian::Big
        };

        Ok(Self { file, endian })
    }

    pub(crate) fn file(&self) -> &object::File<'data>
    {
        &self.file
    }

    /// Byte order of the target.
    pub fn endian(&self) -> RunTimeEndian
    {
        self.endian
    }

    /// Pointer size in bytes (4 for the 32-bit targets this tool is built for).
    pub fn address_size(&self) -> u8
    {
        if self.file.is_64() {
            8
        } else {
            4
        }
    }

    /// Returns `true` for 32-bit ARM executables.
    pub fn is_arm(&self) -> bool
    {
        self.file.architecture() == object::Architecture::Arm
    }

    /// Load address of the configured code section.
    ///
    /// ## Errors
    ///
    /// Returns `FwdbgError::MissingSection` if no section has that name.
    pub fn code_section_address(&self, name: &str) -> FwdbgResult<u64>
    {
        self.file
            .section_by_name(name)
            .map(|section| section.address())
            .ok_or_else(|| FwdbgError::MissingSection(format!("code section {name}")))
    }

    /// Locate the call-frame data, preferring `.debug_frame` over `.eh_frame`.
    ///
    /// ## Errors
    ///
    /// Returns `FwdbgError::MissingSection` when neither section exists, and
    /// `FwdbgError::Object` if a compressed section cannot be inflated.
    pub fn frame_section(&self) -> FwdbgResult<FrameSection<'data>>
    {
        for kind in [FrameSectionKind::DebugFrame, FrameSectionKind::EhFrame] {
            if let Some(section) = self.file.section_by_name(kind.section_name()) {
                let data = section.uncompressed_data()?;
                return Ok(FrameSection {
                    kind,
                    data,
                    address: section.address(),
                });
            }
        }

        Err(FwdbgError::MissingSection(
            "no .debug_frame or .eh_frame (was the firmware built with -g?)".into(),
        ))
    }
}
