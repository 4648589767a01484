//! Sequence-number space.
//!
//! Sequence numbers occupy a 3-byte field on the wire, so they live in a
//! circular space of [`SEQ_SPACE`] = 2^24 values.  Advancing wraps modulo the
//! space size.
//!
//! Comparisons are **plain integer** comparisons (`Ord` on the inner value),
//! not modular distances.  A connection that crosses the 2^24 boundary can
//! therefore misorder segments; transfers stay far below that in practice.

use std::fmt;

/// Number of distinct sequence numbers (2^24).
pub const SEQ_SPACE: u32 = 1 << 24;

/// A sequence number, always in `[0, SEQ_SPACE)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeqNum(u32);

impl SeqNum {
    pub const ZERO: SeqNum = SeqNum(0);

    /// Wrap `value` into the sequence space.
    pub const fn new(value: u32) -> Self {
        Self(value % SEQ_SPACE)
    }

    pub const fn value(self) -> u32 {
        self.0
    }

    /// The sequence number `n` positions after `self`, wrapping at 2^24.
    pub fn advance(self, n: u32) -> Self {
        Self(((self.0 as u64 + n as u64) % SEQ_SPACE as u64) as u32)
    }

    /// Distance from `base` to `self` using plain integer subtraction.
    ///
    /// Returns `None` when `self` is below `base`.
    pub fn offset_from(self, base: SeqNum) -> Option<u32> {
        self.0.checked_sub(base.0)
    }

    /// `true` when `self` lies in `[base, base + len)` (plain integer ordering).
    pub fn in_window(self, base: SeqNum, len: u32) -> bool {
        matches!(self.offset_from(base), Some(d) if d < len)
    }
}

impl From<u32> for SeqNum {
    fn from(value: u32) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for SeqNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
