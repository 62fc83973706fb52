//! Synthetic firmware executables for integration tests.
//!
//! Builds a little-endian 32-bit ARM ELF in memory with a `.text` section,
//! a symbol table and call-frame data, so tests never depend on a cross
//! toolchain or checked-in binaries.

#![allow(dead_code)]

use gimli::write::{
    Address, CallFrameInstruction, CommonInformationEntry, DebugFrame, EhFrame, EndianVec, FrameDescriptionEntry,
    FrameTable,
};
use gimli::{Encoding, Format, LittleEndian, Register};
use object::write::{Object, StandardSection, Symbol as ObjectSymbol, SymbolSection};
use object::{Architecture, BinaryFormat, Endianness, SectionKind, SymbolFlags, SymbolKind, SymbolScope};

pub const LR: Register = Register(14);
pub const SP: Register = Register(13);

/// Where the call-frame data goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFlavor
{
    DebugFrame,
    EhFrame,
    None,
}

/// One function: a symbol plus an FDE.
pub struct Function
{
    pub name: String,
    pub address: u32,
    pub length: u32,
    /// `(byte offset from function start, instruction)`
    pub instructions: Vec<(u32, CallFrameInstruction)>,
    pub has_fde: bool,
}

pub struct FirmwareBuilder
{
    functions: Vec<Function>,
    data_symbols: Vec<(String, u32)>,
    frames: FrameFlavor,
    thumb: bool,
}

impl FirmwareBuilder
{
    pub fn new() -> Self
    {
        Self {
            functions: Vec::new(),
            data_symbols: Vec::new(),
            frames: FrameFlavor::DebugFrame,
            thumb: false,
        }
    }

    /// Add a function with a symbol and an FDE.
    pub fn function(mut self, name: &str, address: u32, length: u32, instructions: Vec<(u32, CallFrameInstruction)>) -> Self
    {
        self.functions.push(Function {
            name: name.to_string(),
            address,
            length,
            instructions,
            has_fde: true,
        });
        self
    }

    /// Add a function symbol without call-frame data.
    pub fn symbol(mut self, name: &str, address: u32) -> Self
    {
        self.functions.push(Function {
            name: name.to_string(),
            address,
            length: 4,
            instructions: Vec::new(),
            has_fde: false,
        });
        self
    }

    /// Add a symbol in `.data`, which must never reach the symbol table.
    pub fn data_symbol(mut self, name: &str, address: u32) -> Self
    {
        self.data_symbols.push((name.to_string(), address));
        self
    }

    pub fn frames(mut self, frames: FrameFlavor) -> Self
    {
        self.frames = frames;
        self
    }

    /// Set bit 0 on function symbol values, as Thumb code does.
    pub fn thumb(mut self) -> Self
    {
        self.thumb = true;
        self
    }

    pub fn build(self) -> Vec<u8>
    {
        let mut obj = Object::new(BinaryFormat::Elf, Architecture::Arm, Endianness::Little);

        let text = obj.section_id(StandardSection::Text);
        obj.append_section_data(text, &[0u8; 0x100], 4);
        let data = obj.section_id(StandardSection::Data);
        obj.append_section_data(data, &[0u8; 0x10], 4);

        for function in &self.functions {
            obj.add_symbol(ObjectSymbol {
                name: function.name.as_bytes().to_vec(),
                value: u64::from(function.address | u32::from(self.thumb)),
                size: u64::from(function.length),
                kind: SymbolKind::Text,
                scope: SymbolScope::Linkage,
                weak: false,
                section: SymbolSection::Section(text),
                flags: SymbolFlags::None,
            });
        }
        for (name, address) in &self.data_symbols {
            obj.add_symbol(ObjectSymbol {
                name: name.as_bytes().to_vec(),
                value: u64::from(*address),
                size: 4,
                kind: SymbolKind::Data,
                scope: SymbolScope::Linkage,
                weak: false,
                section: SymbolSection::Section(data),
                flags: SymbolFlags::None,
            });
        }

        match self.frames {
            FrameFlavor::DebugFrame => {
                let mut debug_frame = DebugFrame::from(EndianVec::new(LittleEndian));
                self.frame_table().write_debug_frame(&mut debug_frame).unwrap();
                let section = obj.add_section(Vec::new(), b".debug_frame".to_vec(), SectionKind::Debug);
                obj.append_section_data(section, &debug_frame.0.into_vec(), 4);
            }
            FrameFlavor::EhFrame => {
                let mut eh_frame = EhFrame::from(EndianVec::new(LittleEndian));
                self.frame_table().write_eh_frame(&mut eh_frame).unwrap();
                let section = obj.add_section(Vec::new(), b".eh_frame".to_vec(), SectionKind::ReadOnlyData);
                obj.append_section_data(section, &eh_frame.0.into_vec(), 4);
            }
            FrameFlavor::None => {}
        }

        obj.write().unwrap()
    }

    fn frame_table(&self) -> FrameTable
    {
        let encoding = Encoding {
            format: Format::Dwarf32,
            version: 1,
            address_size: 4,
        };
        // Thumb-2 code: halfword-aligned instructions, word-sized stack slots.
        let mut cie = CommonInformationEntry::new(encoding, 2, -4, LR);
        cie.add_instruction(CallFrameInstruction::Cfa(SP, 0));

        let mut table = FrameTable::default();
        let cie_id = table.add_cie(cie);
        for function in self.functions.iter().filter(|f| f.has_fde) {
            let mut fde = FrameDescriptionEntry::new(Address::Constant(u64::from(function.address)), function.length);
            for (offset, instruction) in &function.instructions {
                fde.add_instruction(*offset, instruction.clone());
            }
            table.add_fde(cie_id, fde);
        }
        table
    }
}

/// `push {r7, lr}` at offset 0, frame of `frame` bytes after `sub sp` at offset 2.
pub fn push_lr_prologue(frame: u32) -> Vec<(u32, CallFrameInstruction)>
{
    vec![
        (2, CallFrameInstruction::CfaOffset(8)),
        (2, CallFrameInstruction::Offset(Register(7), -8)),
        (2, CallFrameInstruction::Offset(LR, -4)),
        (4, CallFrameInstruction::CfaOffset(8 + i32::try_from(frame).unwrap())),
    ]
}
