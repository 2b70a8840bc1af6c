use std::collections::BTreeMap;

use super::Range;

/// Frozen per-region coordinate spaces, in region-name order.
pub type RegionSpaces = BTreeMap<String, CoordinateSpace>;

/// Dense coordinates over a finished set of ranges.
///
/// Address `a` inside range `k` maps to the summed size of ranges `0..k` plus
/// `a - ranges[k].lower`, so covered addresses map one-to-one onto
/// `0..total_size()` in address order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoordinateSpace {
    ranges: Vec<Range>,
    /// Coordinate of each range's first address
    offsets: Vec<u64>,
    total: u64,
}

impl CoordinateSpace {
    pub(super) fn new(ranges: Vec<Range>) -> Self {
        let mut offsets = Vec::with_capacity(ranges.len());
        let mut total = 0u64;
        for range in &ranges {
            offsets.push(total);
            total = total.saturating_add(range.size());
        }
        Self {
            ranges,
            offsets,
            total,
        }
    }

    pub fn ranges(&self) -> &[Range] {
        &self.ranges
    }

    pub fn total_size(&self) -> u64 {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Dense position of `address`, `None` if no range covers it.
    pub fn coordinate_of(&self, address: u64) -> Option<u64> {
        let i = self.ranges.partition_point(|r| r.upper < address);
        let range = self.ranges.get(i)?;
        range
            .contains(address)
            .then(|| self.offsets[i] + (address - range.lower))
    }

    /// Inverse of [`coordinate_of`](Self::coordinate_of).
    pub fn address_of(&self, coordinate: u64) -> Option<u64> {
        if coordinate >= self.total {
            return None;
        }
        let i = self.offsets.partition_point(|&o| o <= coordinate) - 1;
        Some(self.ranges[i].lower + (coordinate - self.offsets[i]))
    }

    /// Every covered address in coordinate order.
    pub fn addresses(&self) -> impl Iterator<Item = u64> + '_ {
        self.ranges.iter().flat_map(|r| r.lower..=r.upper)
    }
}
