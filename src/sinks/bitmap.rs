//! Frame-by-address RGB bitmap.
//!
//! One row per frame, one column per page of the coalesced address space.
//! Pages a frame does not map stay black.

use std::io::Write;
use std::sync::OnceLock;

use anyhow::Context;

use crate::error::TraceError;
use crate::pipeline::{AddressLayout, RangeKeying, Sink};
use crate::ranges::CoordinateSpace;
use crate::trace::{Frame, PageState};

const BYTES_PER_PIXEL: usize = 3;

/// Pixel color of a page state.
pub fn pixel_color(state: PageState) -> [u8; 3] {
    let v = state.bits();
    let on = |lit: bool| if lit { 255 } else { 0 };
    [on(v >= 3), on((1..=2).contains(&v)), on(v <= 1)]
}

/// Destination for the finished image.
pub trait ImageWriter {
    /// Write a `width` x `height` RGB image, rows top to bottom.
    fn write_image(
        &mut self,
        width: u32,
        height: u32,
        rows: &mut dyn Iterator<Item = &[u8]>,
    ) -> anyhow::Result<()>;
}

/// Streams rows into an 8-bit RGB PNG.
pub struct PngImageWriter<W: Write> {
    out: W,
}

impl<W: Write> PngImageWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ImageWriter for PngImageWriter<W> {
    fn write_image(
        &mut self,
        width: u32,
        height: u32,
        rows: &mut dyn Iterator<Item = &[u8]>,
    ) -> anyhow::Result<()> {
        let mut encoder = png::Encoder::new(&mut self.out, width, height);
        encoder.set_color(png::ColorType::Rgb);
        encoder.set_depth(png::BitDepth::Eight);

        let mut writer = encoder
            .write_header()
            .context("Failed to write PNG header")?;
        let mut stream = writer.stream_writer().context("Failed to start PNG data")?;
        for row in rows {
            stream.write_all(row).context("Failed to write PNG row")?;
        }
        stream.finish().context("Failed to finish PNG")?;
        Ok(())
    }
}

/// Renders each frame's page states into one bitmap row.
pub struct BitmapSink<I> {
    image: I,
    space: CoordinateSpace,
    width: usize,
    rows: Vec<OnceLock<Vec<u8>>>,
}

impl<I: ImageWriter> BitmapSink<I> {
    pub fn new(image: I) -> Self {
        Self {
            image,
            space: CoordinateSpace::default(),
            width: 0,
            rows: Vec::new(),
        }
    }

    fn render_row(&self, frame_no: usize, frame: &Frame) -> Vec<u8> {
        let mut row = vec![0u8; self.width * BYTES_PER_PIXEL];
        for vma in &frame.vmas {
            for (page, state) in vma.states() {
                let x = match self.space.coordinate_of(page) {
                    Some(x) if (x as usize) < self.width => x as usize,
                    other => {
                        log::warn!(
                            "frame #{frame_no}: page {page:#x} at column {other:?} is outside the {}-pixel row",
                            self.width
                        );
                        continue;
                    }
                };
                let at = x * BYTES_PER_PIXEL;
                row[at..at + BYTES_PER_PIXEL].copy_from_slice(&pixel_color(state));
            }
        }
        row
    }
}

impl<I: ImageWriter + Send + Sync> Sink for BitmapSink<I> {
    type Output = I;

    fn name(&self) -> &'static str {
        "png"
    }

    fn layout(&self) -> RangeKeying {
        RangeKeying::Flat
    }

    fn prepare(&mut self, layout: AddressLayout, frame_count: usize) -> Result<(), TraceError> {
        let space = match layout {
            AddressLayout::Flat(space) => space,
            other => {
                return Err(TraceError::sink(
                    self.name(),
                    format!("needs a flat address layout, got {}", other.keying()),
                ));
            }
        };
        // PNG dimensions are 32-bit
        let width = u32::try_from(space.total_size())
            .ok()
            .and_then(|w| usize::try_from(w).ok())
            .filter(|w| w.checked_mul(BYTES_PER_PIXEL).is_some())
            .ok_or_else(|| {
                TraceError::sink(
                    self.name(),
                    format!("{} pages is too wide for a bitmap", space.total_size()),
                )
            })?;
        log::debug!("Bitmap is {width} x {frame_count} pixels");

        self.space = space;
        self.width = width;
        self.rows = (0..frame_count).map(|_| OnceLock::new()).collect();
        Ok(())
    }

    fn consume_frame(&self, frame_no: usize, frame: &Frame) -> Result<(), TraceError> {
        let slot = self.rows.get(frame_no).ok_or_else(|| {
            TraceError::sink(self.name(), format!("frame #{frame_no} has no row"))
        })?;
        slot.set(self.render_row(frame_no, frame)).map_err(|_| {
            TraceError::sink(self.name(), format!("frame #{frame_no} rendered twice"))
        })
    }

    fn finish(mut self) -> Result<I, TraceError> {
        let name = self.name();
        let (width, height) = match (
            u32::try_from(self.width),
            u32::try_from(self.rows.len()),
        ) {
            (Ok(w), Ok(h)) if w > 0 && h > 0 => (w, h),
            _ => {
                return Err(TraceError::sink(
                    name,
                    format!(
                        "cannot encode a {} x {} image",
                        self.width,
                        self.rows.len()
                    ),
                ));
            }
        };

        let blank = vec![0u8; self.width * BYTES_PER_PIXEL];
        let rows: Vec<Vec<u8>> = std::mem::take(&mut self.rows)
            .into_iter()
            .map(|row| row.into_inner().unwrap_or_else(|| blank.clone()))
            .collect();
        let mut iter = rows.iter().map(Vec::as_slice);
        self.image
            .write_image(width, height, &mut iter)
            .map_err(|e| TraceError::sink(name, e))?;
        Ok(self.image)
    }
}
