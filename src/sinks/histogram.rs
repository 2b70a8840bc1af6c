//! Per-page state counts across all frames, grouped by VMA name.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::TraceError;
use crate::pipeline::{AddressLayout, RangeKeying, Sink};
use crate::ranges::CoordinateSpace;
use crate::trace::{Frame, PageState};

/// How many frames saw a page in each cumulative state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageCounts {
    pub committed: u64,
    pub accessed: u64,
    pub dirty: u64,
}

#[derive(Debug, Default)]
struct Bucket {
    committed: AtomicU64,
    accessed: AtomicU64,
    dirty: AtomicU64,
}

impl Bucket {
    fn record(&self, state: PageState) {
        if state.is_committed() {
            self.committed.fetch_add(1, Ordering::Relaxed);
        }
        if state.is_accessed() {
            self.accessed.fetch_add(1, Ordering::Relaxed);
        }
        if state.is_dirty() {
            self.dirty.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn into_counts(self) -> PageCounts {
        PageCounts {
            committed: self.committed.into_inner(),
            accessed: self.accessed.into_inner(),
            dirty: self.dirty.into_inner(),
        }
    }
}

struct RegionCounters {
    space: CoordinateSpace,
    buckets: Vec<Bucket>,
}

/// Counts page states per named region.
///
/// Counters are atomics, so frames are tallied from any worker thread.
/// Unnamed VMAs are ignored.
#[derive(Default)]
pub struct HistogramSink {
    regions: BTreeMap<String, RegionCounters>,
}

impl HistogramSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Sink for HistogramSink {
    type Output = HistogramReport;

    fn name(&self) -> &'static str {
        "histogram"
    }

    fn layout(&self) -> RangeKeying {
        RangeKeying::ByRegion
    }

    fn prepare(&mut self, layout: AddressLayout, _frame_count: usize) -> Result<(), TraceError> {
        let spaces = match layout {
            AddressLayout::ByRegion(spaces) => spaces,
            other => {
                return Err(TraceError::sink(
                    self.name(),
                    format!("needs a per-region layout, got {}", other.keying()),
                ));
            }
        };

        for (name, space) in spaces {
            let pages = usize::try_from(space.total_size()).map_err(|_| {
                TraceError::sink(
                    "histogram",
                    format!("region '{name}' spans too many pages to count"),
                )
            })?;
            let buckets = std::iter::repeat_with(Bucket::default).take(pages).collect();
            self.regions.insert(name, RegionCounters { space, buckets });
        }
        Ok(())
    }

    fn consume_frame(&self, frame_no: usize, frame: &Frame) -> Result<(), TraceError> {
        for vma in &frame.vmas {
            let Some(region) = vma.name.as_deref().and_then(|n| self.regions.get(n)) else {
                continue;
            };
            for (page, state) in vma.states() {
                match region
                    .space
                    .coordinate_of(page)
                    .and_then(|c| region.buckets.get(c as usize))
                {
                    Some(bucket) => bucket.record(state),
                    None => log::warn!("frame #{frame_no}: page {page:#x} is outside its region"),
                }
            }
        }
        Ok(())
    }

    fn finish(self) -> Result<HistogramReport, TraceError> {
        let regions = self
            .regions
            .into_iter()
            .map(|(name, counters)| {
                let counts = counters.buckets.into_iter().map(Bucket::into_counts).collect();
                (
                    name,
                    RegionHistogram {
                        space: counters.space,
                        counts,
                    },
                )
            })
            .collect();
        Ok(HistogramReport { regions })
    }
}

/// Counters of one region, in coordinate order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionHistogram {
    space: CoordinateSpace,
    counts: Vec<PageCounts>,
}

impl RegionHistogram {
    pub fn space(&self) -> &CoordinateSpace {
        &self.space
    }

    /// Counts for the page at `address`, `None` outside the region.
    pub fn counts_at(&self, address: u64) -> Option<PageCounts> {
        let coordinate = self.space.coordinate_of(address)?;
        self.counts.get(coordinate as usize).copied()
    }

    /// `(page number, counts)` for every page of every range.
    pub fn pages(&self) -> impl Iterator<Item = (u64, PageCounts)> + '_ {
        self.space.addresses().zip(self.counts.iter().copied())
    }
}

/// Overall shape of a histogram, for status output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistogramSummary {
    pub regions: usize,
    pub ranges: usize,
    pub pages: u64,
}

/// Finished histogram, regions ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistogramReport {
    regions: BTreeMap<String, RegionHistogram>,
}

impl HistogramReport {
    pub fn region(&self, name: &str) -> Option<&RegionHistogram> {
        self.regions.get(name)
    }

    pub fn regions(&self) -> impl Iterator<Item = (&str, &RegionHistogram)> {
        self.regions.iter().map(|(name, region)| (name.as_str(), region))
    }

    pub fn summary(&self) -> HistogramSummary {
        HistogramSummary {
            regions: self.regions.len(),
            ranges: self.regions.values().map(|r| r.space.ranges().len()).sum(),
            pages: self.regions.values().map(|r| r.space.total_size()).sum(),
        }
    }

    /// Write the text report, one line per page with its byte address.
    pub fn write_report(&self, page_size: u64, out: &mut impl Write) -> io::Result<()> {
        for (name, region) in &self.regions {
            writeln!(out, "VMA {name}")?;
            for (page, counts) in region.pages() {
                writeln!(
                    out,
                    "{:#x} : {}; {}; {}",
                    page.wrapping_mul(page_size),
                    counts.committed,
                    counts.accessed,
                    counts.dirty
                )?;
            }
        }
        out.flush()
    }
}
