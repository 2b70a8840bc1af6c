//! Encoding frames back into the trace wire format.
//!
//! The tracer itself lives elsewhere; this is used to synthesize traces for
//! tests and benchmarks, and to re-emit legacy traces in the canonical layout.

use std::io::{self, Write};

use super::frame::{Frame, TraceFormat, VmaRecord};
use super::page::bitmap_words;

/// Appends encoded frames to an output stream.
pub struct TraceWriter<W> {
    out: W,
    format: TraceFormat,
    frames: usize,
}

impl<W: Write> TraceWriter<W> {
    pub fn new(out: W, format: TraceFormat) -> Self {
        Self {
            out,
            format,
            frames: 0,
        }
    }

    pub fn write_frame(&mut self, frame: &Frame) -> io::Result<()> {
        self.out.write_all(&encode_frame(frame, self.format))?;
        self.frames += 1;
        Ok(())
    }

    pub fn frames_written(&self) -> usize {
        self.frames
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Encode one frame.
///
/// Bitmaps are padded with zero words or cut to exactly the word count the
/// record's page count implies.
pub fn encode_frame(frame: &Frame, format: TraceFormat) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&frame.timestamp.seconds.to_le_bytes());
    buf.extend_from_slice(&frame.timestamp.micros.to_le_bytes());
    buf.extend_from_slice(&(frame.vmas.len() as u32).to_le_bytes());

    for vma in &frame.vmas {
        buf.extend_from_slice(&vma.start.to_le_bytes());
        buf.extend_from_slice(&vma.end.to_le_bytes());
        match format {
            TraceFormat::Named => encode_name(&mut buf, vma),
            TraceFormat::Legacy => buf.extend_from_slice(&(vma.pages() as u32).to_le_bytes()),
        }

        let words = bitmap_words(vma.pages()).unwrap_or(0) as usize;
        for i in 0..words {
            let word = vma.bitmap.get(i).copied().unwrap_or(0);
            buf.extend_from_slice(&word.to_le_bytes());
        }
    }

    buf
}

fn encode_name(buf: &mut Vec<u8>, vma: &VmaRecord) {
    match &vma.name {
        None => buf.extend_from_slice(&0u32.to_le_bytes()),
        Some(name) => {
            buf.extend_from_slice(&(name.len() as u32 + 1).to_le_bytes());
            buf.extend_from_slice(name.as_bytes());
            buf.push(0);
        }
    }
}
