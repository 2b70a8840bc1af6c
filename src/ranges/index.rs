use std::collections::BTreeMap;

use super::space::{CoordinateSpace, RegionSpaces};
use super::Range;

/// Sorted set of disjoint, non-adjacent address ranges.
///
/// After every [`insert`](Self::insert) the ranges are strictly ordered by
/// `lower` and no two neighbours intersect or touch. The final contents depend
/// only on the multiset of inserted ranges, not on their order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressRangeIndex {
    ranges: Vec<Range>,
}

impl AddressRangeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ranges(&self) -> &[Range] {
        &self.ranges
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Sum of all range sizes.
    pub fn total_size(&self) -> u64 {
        self.ranges.iter().map(Range::size).sum()
    }

    pub fn contains(&self, address: u64) -> bool {
        let i = self.ranges.partition_point(|r| r.upper < address);
        self.ranges.get(i).is_some_and(|r| r.contains(address))
    }

    /// Fold `new` into the set.
    pub fn insert(&mut self, new: Range) {
        log::trace!("considering range {new}");

        let mut matched = false;
        let mut placed = false;
        for i in 0..self.ranges.len() {
            let entry = self.ranges[i];
            if entry.upper < new.lower {
                // not there yet
                continue;
            }
            if entry.intersects(&new) {
                // A single insertion may widen several entries; the
                // normalisation below folds them together.
                self.ranges[i] = entry.union(&new);
                log::trace!("  extending {entry} -> {}", self.ranges[i]);
                matched = true;
                continue;
            }
            // entry.lower > new.upper: the insertion point has been passed
            if !matched {
                log::trace!("  inserting at {i}");
                self.ranges.insert(i, new);
                placed = true;
            }
            break;
        }
        if !matched && !placed {
            log::trace!("  appending at {}", self.ranges.len());
            self.ranges.push(new);
        }

        self.normalize();
    }

    /// Merge neighbours until no adjacent pair intersects or touches.
    fn normalize(&mut self) {
        let mut i = 1;
        while i < self.ranges.len() {
            let (prev, cur) = (self.ranges[i - 1], self.ranges[i]);
            if prev.is_mergeable(&cur) {
                self.ranges[i - 1] = prev.union(&cur);
                self.ranges.remove(i);
                log::trace!("  merging {prev}, {cur} -> {}", self.ranges[i - 1]);
                // re-check the widened entry against its new neighbour
            } else {
                i += 1;
            }
        }
    }

    /// Insert every range of `other`.
    pub fn merge(&mut self, other: &AddressRangeIndex) {
        for &range in &other.ranges {
            self.insert(range);
        }
    }

    /// Finish building and derive the coordinate space.
    pub fn freeze(self) -> CoordinateSpace {
        CoordinateSpace::new(self.ranges)
    }
}

impl Extend<Range> for AddressRangeIndex {
    fn extend<I: IntoIterator<Item = Range>>(&mut self, iter: I) {
        for range in iter {
            self.insert(range);
        }
    }
}

impl FromIterator<Range> for AddressRangeIndex {
    fn from_iter<I: IntoIterator<Item = Range>>(iter: I) -> Self {
        let mut index = Self::new();
        index.extend(iter);
        index
    }
}

/// Address range indices partitioned by VMA name.
///
/// Each region coalesces only its own ranges; regions never merge with each
/// other even when their addresses touch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionIndex {
    regions: BTreeMap<String, AddressRangeIndex>,
}

impl RegionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, range: Range) {
        match self.regions.get_mut(name) {
            Some(index) => index.insert(range),
            None => {
                log::trace!("new region '{name}'");
                self.regions
                    .entry(name.to_string())
                    .or_default()
                    .insert(range);
            }
        }
    }

    pub fn merge(&mut self, other: &RegionIndex) {
        for (name, index) in &other.regions {
            match self.regions.get_mut(name) {
                Some(existing) => existing.merge(index),
                None => {
                    self.regions.insert(name.clone(), index.clone());
                }
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&AddressRangeIndex> {
        self.regions.get(name)
    }

    /// Regions in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AddressRangeIndex)> {
        self.regions.iter().map(|(name, index)| (name.as_str(), index))
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn total_size(&self) -> u64 {
        self.regions.values().map(AddressRangeIndex::total_size).sum()
    }

    pub fn freeze(self) -> RegionSpaces {
        self.regions
            .into_iter()
            .map(|(name, index)| (name, index.freeze()))
            .collect()
    }
}
