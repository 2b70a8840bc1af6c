//! Frame records and the per-frame decoder.

use super::cursor::{ByteCursor, Reader};
use super::page::{PAGES_PER_WORD, PageState, bitmap_words, page_state};
use crate::error::TraceError;

/// Sampling time of a frame, as recorded by the tracer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp {
    pub seconds: u32,
    pub micros: u32,
}

/// One mapped address range within a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmaRecord {
    /// First page number of the mapping
    pub start: u64,
    /// One past the last page number
    pub end: u64,
    pub name: Option<String>,
    /// Packed 2-bit page states, see [`super::page`]
    pub bitmap: Vec<u32>,
}

impl VmaRecord {
    /// Number of pages spanned by the mapping.
    pub fn pages(&self) -> u64 {
        self.end - self.start
    }

    pub fn page_state(&self, page: u64) -> PageState {
        page_state(&self.bitmap, page)
    }

    /// Iterate `(page number, state)` for every page of the mapping.
    pub fn states(&self) -> impl Iterator<Item = (u64, PageState)> + '_ {
        (0..self.pages()).map(|page| (self.start + page, self.page_state(page)))
    }
}

/// One timestamped snapshot of a process's mappings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frame {
    pub timestamp: Timestamp,
    pub vmas: Vec<VmaRecord>,
}

impl Frame {
    /// Keep only the mappings named `name`.
    pub fn retain_named(&mut self, name: &str) {
        self.vmas.retain(|vma| vma.name.as_deref() == Some(name));
    }

    pub fn page_count(&self) -> u64 {
        self.vmas
            .iter()
            .map(VmaRecord::pages)
            .fold(0, u64::saturating_add)
    }
}

/// On-disk layout of VMA records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum TraceFormat {
    /// `start | end | name_len | name | bitmap`, page count derived from `end - start`
    #[default]
    Named,
    /// `start | end | pages | bitmap`, no name, explicit page count
    Legacy,
}

/// Decode the frame starting at `offset` using the canonical layout.
///
/// Returns the frame and the offset immediately after its last VMA.
pub fn decode_frame(buf: &[u8], offset: usize) -> Result<(Frame, usize), TraceError> {
    decode_frame_with(buf, offset, TraceFormat::Named)
}

/// Decode the frame starting at `offset` using the given layout.
pub fn decode_frame_with(
    buf: &[u8],
    offset: usize,
    format: TraceFormat,
) -> Result<(Frame, usize), TraceError> {
    decode_frame_counted(buf, offset, format).map(|decoded| (decoded.frame, decoded.next))
}

/// A decoded frame plus what the decoder had to repair along the way.
pub(super) struct DecodedFrame {
    pub frame: Frame,
    pub next: usize,
    /// Legacy records whose declared page count disagreed with their extent
    pub mismatches: u64,
}

pub(super) fn decode_frame_counted(
    buf: &[u8],
    offset: usize,
    format: TraceFormat,
) -> Result<DecodedFrame, TraceError> {
    let mut reader = ByteCursor::new(buf).at(offset);

    let seconds = reader.take_u32()?;
    let micros = reader.take_u32()?;
    let count = reader.take_u32()?;

    // The count is untrusted; let the vector grow as records actually decode.
    let mut vmas = Vec::new();
    let mut mismatches = 0;
    for _ in 0..count {
        let vma = match format {
            TraceFormat::Named => decode_named_vma(&mut reader)?,
            TraceFormat::Legacy => {
                let (vma, mismatched) = decode_legacy_vma(&mut reader)?;
                mismatches += u64::from(mismatched);
                vma
            }
        };
        vmas.push(vma);
    }

    Ok(DecodedFrame {
        frame: Frame {
            timestamp: Timestamp { seconds, micros },
            vmas,
        },
        next: reader.position(),
        mismatches,
    })
}

fn decode_extent(reader: &mut Reader<'_>) -> Result<(u64, u64), TraceError> {
    let offset = reader.position();
    let start = reader.take_u64()?;
    let end = reader.take_u64()?;
    if end < start {
        return Err(TraceError::FormatError {
            frame: None,
            offset,
            message: format!("VMA end {end:#x} precedes start {start:#x}"),
        });
    }
    Ok((start, end))
}

fn decode_named_vma(reader: &mut Reader<'_>) -> Result<VmaRecord, TraceError> {
    let (start, end) = decode_extent(reader)?;

    let name_len = reader.take_u32()? as usize;
    let name = match name_len {
        0 => None,
        len => {
            // The recorded length includes the trailing NUL.
            let bytes = reader.take_bytes(len)?;
            Some(String::from_utf8_lossy(&bytes[..len - 1]).into_owned())
        }
    };

    let bitmap = decode_bitmap(reader, end - start)?;
    Ok(VmaRecord {
        start,
        end,
        name,
        bitmap,
    })
}

/// Decode a legacy record, reporting whether its page count disagreed with its extent.
fn decode_legacy_vma(reader: &mut Reader<'_>) -> Result<(VmaRecord, bool), TraceError> {
    let (start, end) = decode_extent(reader)?;
    let declared = u64::from(reader.take_u32()?);
    let derived = end - start;

    let mismatched = declared != derived;
    if mismatched {
        let mismatch = TraceError::RangeMismatch {
            start,
            end,
            declared,
            derived,
        };
        log::warn!("{mismatch}");
    }

    // The declared count decides how many words are on disk. The record keeps
    // the derived extent, cut to the pages those words cover.
    let bitmap = decode_bitmap(reader, declared)?;
    let covered = (bitmap.len() as u64).saturating_mul(PAGES_PER_WORD);
    let end = start + derived.min(covered);
    let vma = VmaRecord {
        start,
        end,
        name: None,
        bitmap,
    };
    Ok((vma, mismatched))
}

fn decode_bitmap(reader: &mut Reader<'_>, pages: u64) -> Result<Vec<u32>, TraceError> {
    let offset = reader.position();
    let byte_len = bitmap_words(pages)
        .and_then(|words| words.checked_mul(4))
        .and_then(|len| usize::try_from(len).ok())
        .ok_or_else(|| TraceError::FormatError {
            frame: None,
            offset,
            message: format!("bitmap for {pages} pages overflows the address space"),
        })?;

    let bytes = reader.take_bytes(byte_len)?;
    Ok(bytes
        .chunks_exact(4)
        .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
        .collect())
}
