//! Unwind table types.

use std::fmt;

/// Signed 16-bit unwind directive for one code range.
///
/// The encoding is shared with the on-device unwinder:
///
/// - `-32768` ([`Directive::LEAF`]): the return address is still in the link
///   register and the function has no stack contribution.
/// - any other negative value: pop `-directive` bytes, then return via the
///   link register.
/// - zero or positive: pop `directive` bytes, then the new top of stack holds
///   the return address.
///
/// ## Example
///
/// ```rust
/// use fwdbg_core::types::{Directive, Recovery};
///
/// assert_eq!(Directive::LEAF.recovery(), Recovery::Leaf);
/// assert_eq!(Directive::new(-8).recovery(), Recovery::PopThenLinkRegister(8));
/// assert_eq!(Directive::new(4).recovery(), Recovery::PopThenStack(4));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Directive(i16);

impl Directive
{
    /// Reserved sentinel for leaf code ranges.
    pub const LEAF: Self = Directive(i16::MIN);

    /// Wrap a raw directive value.
    pub const fn new(value: i16) -> Self
    {
        Directive(value)
    }

    /// Raw value as stored on the wire.
    pub const fn value(self) -> i16
    {
        self.0
    }

    /// Returns `true` for the leaf sentinel.
    pub const fn is_leaf(self) -> bool
    {
        self.0 == i16::MIN
    }

    /// How the on-device unwinder recovers the caller for this directive.
    pub const fn recovery(self) -> Recovery
    {
        if self.0 == i16::MIN {
            Recovery::Leaf
        } else if self.0 < 0 {
            Recovery::PopThenLinkRegister(self.0.unsigned_abs())
        } else {
            Recovery::PopThenStack(self.0.unsigned_abs())
        }
    }
}

impl From<i16> for Directive
{
    fn from(value: i16) -> Self
    {
        Directive(value)
    }
}

impl From<Directive> for i16
{
    fn from(directive: Directive) -> Self
    {
        directive.0
    }
}

impl fmt::Display for Directive
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.0)
    }
}

/// Caller-recovery strategy described by a [`Directive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery
{
    /// Return address in the link register, nothing to pop.
    Leaf,
    /// Pop this many bytes, then return via the link register.
    PopThenLinkRegister(u16),
    /// Pop this many bytes, then the top of stack is the return address.
    PopThenStack(u16),
}

impl fmt::Display for Recovery
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Recovery::Leaf => write!(f, "leaf, return via lr"),
            Recovery::PopThenLinkRegister(bytes) => write!(f, "pop {bytes}, return via lr"),
            Recovery::PopThenStack(bytes) => write!(f, "pop {bytes}, return address on stack"),
        }
    }
}

/// A half-open code range `[start, end)` sharing one unwind directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnwindRange
{
    /// First address covered.
    pub start: u32,
    /// First address past the range.
    pub end: u32,
    /// How to unwind from any PC in the range.
    pub directive: Directive,
}

impl UnwindRange
{
    /// Size of one record in the uncompressed unwind stream.
    pub const ENCODED_LEN: usize = 8;

    /// Construct a range.
    pub const fn new(start: u32, end: u32, directive: Directive) -> Self
    {
        Self { start, end, directive }
    }

    /// Number of bytes covered.
    pub const fn len(&self) -> u32
    {
        self.end.saturating_sub(self.start)
    }

    /// Returns `true` if the range covers no code.
    pub const fn is_empty(&self) -> bool
    {
        self.end <= self.start
    }

    /// Returns `true` if `pc` falls inside the range.
    pub const fn contains(&self, pc: u32) -> bool
    {
        pc >= self.start && pc < self.end
    }
}

impl fmt::Display for UnwindRange
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{:08x}-{:08x} = {}", self.start, self.end, self.directive)
    }
}
