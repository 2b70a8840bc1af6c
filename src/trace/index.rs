//! Frame offset index and the loaded trace file.

use std::ops::Range;
use std::path::Path;

use anyhow::Context;

use super::frame::{Frame, TraceFormat, decode_frame_counted, decode_frame_with};
use crate::error::TraceError;
use crate::path::format_path_for_display;

/// Totals gathered during the indexing pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraceStats {
    pub frames: usize,
    pub vmas: u64,
    pub pages: u64,
    /// Legacy records whose declared page count disagreed with their extent
    pub mismatches: u64,
}

/// Byte offset of every frame in a trace buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameIndex {
    offsets: Vec<usize>,
    buffer_len: usize,
    stats: TraceStats,
}

impl FrameIndex {
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// Byte range occupied by frame `i`.
    pub fn extent(&self, i: usize) -> Option<Range<usize>> {
        let start = *self.offsets.get(i)?;
        let end = self.offsets.get(i + 1).copied().unwrap_or(self.buffer_len);
        Some(start..end)
    }

    pub fn stats(&self) -> TraceStats {
        self.stats
    }
}

/// Index a canonical-layout trace.
pub fn index_frames(buf: &[u8]) -> Result<FrameIndex, TraceError> {
    index_frames_with(buf, TraceFormat::Named)
}

/// Walk the whole buffer once, recording where each frame starts.
///
/// The last frame must end exactly at the end of the buffer; a partial frame
/// fails with the error of the read that ran out of bytes.
pub fn index_frames_with(buf: &[u8], format: TraceFormat) -> Result<FrameIndex, TraceError> {
    let mut offsets = Vec::new();
    let mut stats = TraceStats::default();
    let mut offset = 0;

    while offset < buf.len() {
        let frame_no = offsets.len();
        offsets.push(offset);

        let decoded =
            decode_frame_counted(buf, offset, format).map_err(|e| e.in_frame(frame_no))?;
        stats.vmas += decoded.frame.vmas.len() as u64;
        stats.pages = stats.pages.saturating_add(decoded.frame.page_count());
        stats.mismatches += decoded.mismatches;
        offset = decoded.next;
    }
    stats.frames = offsets.len();

    log::debug!(
        "Indexed {} frames ({} VMAs, {} pages) in {} bytes",
        stats.frames,
        stats.vmas,
        stats.pages,
        buf.len()
    );

    Ok(FrameIndex {
        offsets,
        buffer_len: buf.len(),
        stats,
    })
}

/// A trace loaded into memory together with its frame index.
#[derive(Debug)]
pub struct TraceFile {
    buffer: Vec<u8>,
    index: FrameIndex,
    format: TraceFormat,
}

impl TraceFile {
    /// Read and index the trace at `path`.
    pub fn open(path: &Path, format: TraceFormat) -> anyhow::Result<Self> {
        let buffer = std::fs::read(path)
            .with_context(|| format!("Failed to read {}", format_path_for_display(path)))?;
        let trace = Self::from_bytes(buffer, format)
            .with_context(|| format!("Failed to index {}", format_path_for_display(path)))?;
        Ok(trace)
    }

    pub fn from_bytes(buffer: Vec<u8>, format: TraceFormat) -> Result<Self, TraceError> {
        let index = index_frames_with(&buffer, format)?;
        Ok(Self {
            buffer,
            index,
            format,
        })
    }

    pub fn frame_count(&self) -> usize {
        self.index.len()
    }

    pub fn index(&self) -> &FrameIndex {
        &self.index
    }

    pub fn stats(&self) -> TraceStats {
        self.index.stats()
    }

    pub fn format(&self) -> TraceFormat {
        self.format
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Decode frame `i` without touching its predecessors.
    pub fn frame(&self, i: usize) -> Result<Frame, TraceError> {
        let extent = self.index.extent(i).ok_or_else(|| TraceError::FormatError {
            frame: Some(i),
            offset: self.buffer.len(),
            message: format!("trace has only {} frames", self.index.len()),
        })?;
        // Bound the decoder to this frame's bytes so a bad index cannot bleed
        // into the next frame.
        let (frame, _) = decode_frame_with(&self.buffer[..extent.end], extent.start, self.format)
            .map_err(|e| e.in_frame(i))?;
        Ok(frame)
    }

    /// Decode every frame in order.
    pub fn frames(&self) -> impl Iterator<Item = Result<Frame, TraceError>> + '_ {
        (0..self.frame_count()).map(|i| self.frame(i))
    }
}
