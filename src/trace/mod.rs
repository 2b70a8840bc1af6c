//! SMOG trace decoding.
//!
//! A trace is a flat concatenation of frames with no header or trailer. Each
//! frame is a timestamp followed by the process's VMAs, each carrying a packed
//! 2-bit-per-page state bitmap:
//!
//! ```text
//! frame := seconds:u32 | micros:u32 | vma_count:u32 | vma*
//! vma   := start:u64 | end:u64 | name_len:u32 | name | ceil((end-start)*2/32) × u32
//! ```
//!
//! All integers are little-endian. Reads go through [`cursor::ByteCursor`], so
//! malformed input fails with [`crate::TraceError`] instead of reading out of
//! bounds.
//!
//! # Usage
//!
//! ```ignore
//! use smog_trace::trace::{TraceFile, TraceFormat};
//!
//! let trace = TraceFile::open(path, TraceFormat::Named)?;
//! for frame in trace.frames() {
//!     let frame = frame?;
//!     println!("{} VMAs", frame.vmas.len());
//! }
//! ```

pub mod cursor;
pub mod frame;
pub mod index;
pub mod page;
pub mod writer;

// Re-export main types for convenience
pub use cursor::ByteCursor;
pub use frame::{Frame, Timestamp, TraceFormat, VmaRecord, decode_frame, decode_frame_with};
pub use index::{FrameIndex, TraceFile, TraceStats, index_frames, index_frames_with};
pub use page::{PageState, page_state};
pub use writer::{TraceWriter, encode_frame};
