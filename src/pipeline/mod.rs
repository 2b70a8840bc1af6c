//! Two-pass conversion of a trace into an output sink.
//!
//! 1. **Range pre-pass**: when the sink lays pages out spatially, every frame's
//!    VMA extents are folded into an [`AddressRangeIndex`] (or one per region).
//!    Workers build partial indices and reduce them with `merge`, which is
//!    valid because insertion is order independent. The result is frozen into
//!    a coordinate space and handed to [`Sink::prepare`].
//! 2. **Frame pass**: one rayon task per frame decodes it from the shared
//!    buffer and calls [`Sink::consume_frame`]. The first error aborts the run.
//!
//! ```ignore
//! let trace = TraceFile::open(path, TraceFormat::Named)?;
//! let report = Pipeline::new(&trace, PipelineOptions::default())
//!     .run(HistogramSink::new())?;
//! ```

mod progress;

pub use progress::{ProgressCounter, ProgressObserver};

use rayon::prelude::*;

use crate::error::TraceError;
use crate::ranges::{AddressRangeIndex, CoordinateSpace, Range, RegionIndex, RegionSpaces};
use crate::trace::{Frame, TraceFile};

/// Range keying a sink needs from the pre-pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum RangeKeying {
    /// No spatial compaction; the pre-pass is skipped.
    None,
    /// One index over every VMA.
    Flat,
    /// One index per VMA name; unnamed VMAs are left out.
    ByRegion,
}

/// Frozen result of the pre-pass, matching the requested [`RangeKeying`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressLayout {
    Unkeyed,
    Flat(CoordinateSpace),
    ByRegion(RegionSpaces),
}

impl AddressLayout {
    pub fn keying(&self) -> RangeKeying {
        match self {
            AddressLayout::Unkeyed => RangeKeying::None,
            AddressLayout::Flat(_) => RangeKeying::Flat,
            AddressLayout::ByRegion(_) => RangeKeying::ByRegion,
        }
    }
}

/// An output target for the conversion.
///
/// The pipeline calls [`layout`](Self::layout) and [`prepare`](Self::prepare)
/// once, then [`consume_frame`](Self::consume_frame) concurrently from worker
/// threads, each frame exactly once, and finally [`finish`](Self::finish).
pub trait Sink: Send + Sync {
    type Output: Send;

    /// Short name used in error messages and logs.
    fn name(&self) -> &'static str;

    fn layout(&self) -> RangeKeying;

    fn prepare(&mut self, layout: AddressLayout, frame_count: usize) -> Result<(), TraceError>;

    fn consume_frame(&self, frame_no: usize, frame: &Frame) -> Result<(), TraceError>;

    fn finish(self) -> Result<Self::Output, TraceError>;
}

/// Knobs for a single run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Only consider VMAs with exactly this name
    pub vma_filter: Option<String>,
    /// Worker count for a dedicated pool; `None` uses the global rayon pool
    pub threads: Option<usize>,
}

pub struct Pipeline<'a> {
    trace: &'a TraceFile,
    options: PipelineOptions,
    observers: Vec<Box<dyn ProgressObserver + 'a>>,
}

impl<'a> Pipeline<'a> {
    pub fn new(trace: &'a TraceFile, options: PipelineOptions) -> Self {
        Self {
            trace,
            options,
            observers: Vec::new(),
        }
    }

    /// Register an observer for frame completion.
    pub fn observe(mut self, observer: impl ProgressObserver + 'a) -> Self {
        self.observers.push(Box::new(observer));
        self
    }

    /// Run both passes and return the sink's output.
    pub fn run<S: Sink>(&self, sink: S) -> Result<S::Output, TraceError> {
        match self.options.threads {
            Some(threads) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .thread_name(|i| format!("smog-worker-{i}"))
                    .build()?;
                log::debug!("Running on a dedicated pool of {threads} threads");
                pool.install(|| self.run_in_pool(sink))
            }
            None => self.run_in_pool(sink),
        }
    }

    fn run_in_pool<S: Sink>(&self, mut sink: S) -> Result<S::Output, TraceError> {
        let frame_count = self.trace.frame_count();
        let keying = sink.layout();
        log::debug!(
            "Converting {frame_count} frames to {} (keying: {keying})",
            sink.name()
        );

        let layout = self.build_layout(keying)?;
        sink.prepare(layout, frame_count)?;

        let progress = ProgressCounter::new(frame_count);
        (0..frame_count).into_par_iter().try_for_each(|i| {
            let frame = self.load_frame(i)?;
            sink.consume_frame(i, &frame)?;
            let done = progress.complete_one();
            for observer in &self.observers {
                observer.frames_completed(done, frame_count);
            }
            Ok::<_, TraceError>(())
        })?;

        log::debug!("{} frames consumed by {}", progress.completed(), sink.name());
        sink.finish()
    }

    /// Range pre-pass for the requested keying.
    pub fn build_layout(&self, keying: RangeKeying) -> Result<AddressLayout, TraceError> {
        let frames = 0..self.trace.frame_count();
        let layout = match keying {
            RangeKeying::None => AddressLayout::Unkeyed,
            RangeKeying::Flat => {
                let index = frames
                    .into_par_iter()
                    .map(|i| self.load_frame(i))
                    .try_fold(AddressRangeIndex::new, |mut index, frame| {
                        index.extend(frame?.vmas.iter().filter_map(|vma| {
                            Range::from_extent(vma.start, vma.end)
                        }));
                        Ok::<_, TraceError>(index)
                    })
                    .try_reduce(AddressRangeIndex::new, |mut left, right| {
                        left.merge(&right);
                        Ok(left)
                    })?;
                log::debug!(
                    "Address space: {} ranges covering {} pages",
                    index.len(),
                    index.total_size()
                );
                AddressLayout::Flat(index.freeze())
            }
            RangeKeying::ByRegion => {
                let regions = frames
                    .into_par_iter()
                    .map(|i| self.load_frame(i))
                    .try_fold(RegionIndex::new, |mut regions, frame| {
                        for vma in &frame?.vmas {
                            if let (Some(name), Some(range)) =
                                (&vma.name, Range::from_extent(vma.start, vma.end))
                            {
                                regions.insert(name, range);
                            }
                        }
                        Ok::<_, TraceError>(regions)
                    })
                    .try_reduce(RegionIndex::new, |mut left, right| {
                        left.merge(&right);
                        Ok(left)
                    })?;
                log::debug!(
                    "Address space: {} regions covering {} pages",
                    regions.len(),
                    regions.total_size()
                );
                AddressLayout::ByRegion(regions.freeze())
            }
        };
        Ok(layout)
    }

    /// Decode frame `i` and apply the VMA filter.
    fn load_frame(&self, i: usize) -> Result<Frame, TraceError> {
        let mut frame = self.trace.frame(i)?;
        if let Some(name) = &self.options.vma_filter {
            frame.retain_named(name);
        }
        Ok(frame)
    }
}
