//! Tests for the wire-facing types

use fwdbg_core::types::{Directive, Recovery, Symbol, UnwindRange, DEFAULT_FLASH_BASE};

#[test]
fn test_directive_from_i16()
{
    let directive = Directive::from(-8);
    assert_eq!(directive.value(), -8);
    let raw: i16 = directive.into();
    assert_eq!(raw, -8);
}

#[test]
fn test_directive_leaf_sentinel()
{
    assert_eq!(Directive::LEAF.value(), i16::MIN);
    assert!(Directive::LEAF.is_leaf());
    assert!(!Directive::new(-32767).is_leaf());
    assert!(!Directive::new(0).is_leaf());
}

#[test]
fn test_directive_recovery()
{
    assert_eq!(Directive::LEAF.recovery(), Recovery::Leaf);
    assert_eq!(Directive::new(-8).recovery(), Recovery::PopThenLinkRegister(8));
    assert_eq!(Directive::new(-32767).recovery(), Recovery::PopThenLinkRegister(32767));
    assert_eq!(Directive::new(0).recovery(), Recovery::PopThenStack(0));
    assert_eq!(Directive::new(12).recovery(), Recovery::PopThenStack(12));
}

#[test]
fn test_recovery_display()
{
    assert_eq!(Recovery::Leaf.to_string(), "leaf, return via lr");
    assert_eq!(Recovery::PopThenLinkRegister(8).to_string(), "pop 8, return via lr");
    assert_eq!(Recovery::PopThenStack(4).to_string(), "pop 4, return address on stack");
}

#[test]
fn test_unwind_range_len()
{
    let range = UnwindRange::new(0x0800_0100, 0x0800_0110, Directive::LEAF);
    assert_eq!(range.len(), 0x10);
    assert!(!range.is_empty());

    // end <= start saturates to zero
    let backwards = UnwindRange::new(0x0800_0110, 0x0800_0100, Directive::LEAF);
    assert_eq!(backwards.len(), 0);
    assert!(backwards.is_empty());
}

#[test]
fn test_unwind_range_contains()
{
    let range = UnwindRange::new(0x0800_0100, 0x0800_0110, Directive::new(4));
    assert!(range.contains(0x0800_0100));
    assert!(range.contains(0x0800_010f));
    assert!(!range.contains(0x0800_0110));
    assert!(!range.contains(0x0800_00ff));
}

#[test]
fn test_unwind_range_display()
{
    let range = UnwindRange::new(0x0800_0100, 0x0800_0110, Directive::new(-8));
    assert_eq!(range.to_string(), "08000100-08000110 = -8");
}

#[test]
fn test_symbol_display_and_len()
{
    let symbol = Symbol::new(0x0800_0400, "main");
    assert_eq!(symbol.to_string(), "0x08000400 main");
    assert_eq!(symbol.encoded_len(), 4 + 4 + 1);
}

#[test]
fn test_symbol_ordering()
{
    let mut symbols = vec![
        Symbol::new(0x0800_0200, "b"),
        Symbol::new(0x0800_0100, "z"),
        Symbol::new(0x0800_0100, "a"),
    ];
    symbols.sort();
    assert_eq!(
        symbols,
        vec![
            Symbol::new(0x0800_0100, "a"),
            Symbol::new(0x0800_0100, "z"),
            Symbol::new(0x0800_0200, "b"),
        ]
    );
}

#[test]
fn test_default_flash_base()
{
    assert_eq!(DEFAULT_FLASH_BASE, 0x0800_0000);
}
