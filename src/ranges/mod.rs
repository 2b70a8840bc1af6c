//! Coalesced address ranges and the dense coordinate space derived from them.
//!
//! Every frame maps a slightly different set of VMAs. Outputs that lay frames
//! side by side (the bitmap, the histogram) need one coordinate system shared by
//! all frames, so a pre-pass folds every VMA extent into an
//! [`AddressRangeIndex`]: a sorted list of maximal disjoint intervals. Once all
//! frames have been seen the index is frozen into a [`CoordinateSpace`], which
//! maps each covered address to a dense position in `0..total_size`.

mod index;
mod space;

pub use index::{AddressRangeIndex, RegionIndex};
pub use space::{CoordinateSpace, RegionSpaces};

use std::fmt;

/// Inclusive interval of page numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Range {
    pub lower: u64,
    pub upper: u64,
}

impl Range {
    pub fn new(lower: u64, upper: u64) -> Self {
        debug_assert!(upper >= lower, "range upper {upper:#x} below lower {lower:#x}");
        Self { lower, upper }
    }

    /// Range covered by a VMA's exclusive `start..end` extent, `None` if empty.
    pub fn from_extent(start: u64, end: u64) -> Option<Self> {
        (end > start).then(|| Self::new(start, end - 1))
    }

    /// Number of pages covered.
    pub fn size(&self) -> u64 {
        (self.upper - self.lower).saturating_add(1)
    }

    pub fn contains(&self, address: u64) -> bool {
        self.lower <= address && address <= self.upper
    }

    pub fn intersects(&self, other: &Range) -> bool {
        self.lower <= other.upper && other.lower <= self.upper
    }

    /// True if `other` starts right after `self` ends.
    pub fn precedes_directly(&self, other: &Range) -> bool {
        self.upper.checked_add(1) == Some(other.lower)
    }

    /// Ranges that intersect or touch merge into one.
    pub fn is_mergeable(&self, other: &Range) -> bool {
        self.intersects(other) || self.precedes_directly(other) || other.precedes_directly(self)
    }

    pub fn union(&self, other: &Range) -> Range {
        Range::new(self.lower.min(other.lower), self.upper.max(other.upper))
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:#x}, {:#x})", self.lower, self.upper)
    }
}
