//! Integration tests for smog-trace: library end-to-end runs and the binary.

mod cli;
mod convert;

use std::path::{Path, PathBuf};

use smog_trace::trace::page::pack_states;
use smog_trace::trace::{Frame, PageState, Timestamp, TraceFormat, TraceWriter, VmaRecord};

pub fn vma(start: u64, name: Option<&str>, states: &[PageState]) -> VmaRecord {
    VmaRecord {
        start,
        end: start + states.len() as u64,
        name: name.map(str::to_string),
        bitmap: pack_states(states),
    }
}

/// Two frames over a heap, a stack and an anonymous mapping.
pub fn sample_frames() -> Vec<Frame> {
    use PageState::*;
    vec![
        Frame {
            timestamp: Timestamp {
                seconds: 1_700_000_000,
                micros: 250,
            },
            vmas: vec![
                vma(0x100, Some("heap"), &[Committed, Accessed, Dirty]),
                vma(0x7ff0, Some("[stack]"), &[Dirty]),
                vma(0x200, None, &[Committed; 4]),
            ],
        },
        Frame {
            timestamp: Timestamp {
                seconds: 1_700_000_001,
                micros: 0,
            },
            vmas: vec![
                vma(0x102, Some("heap"), &[Dirty, Committed]),
                vma(0x7ff0, Some("[stack]"), &[Accessed]),
            ],
        },
    ]
}

pub fn encode(frames: &[Frame], format: TraceFormat) -> Vec<u8> {
    let mut writer = TraceWriter::new(Vec::new(), format);
    for frame in frames {
        writer.write_frame(frame).unwrap();
    }
    writer.into_inner()
}

/// Write the sample trace into `dir` and return its path.
pub fn write_sample_trace(dir: &Path) -> PathBuf {
    let path = dir.join("sample.smog");
    std::fs::write(&path, encode(&sample_frames(), TraceFormat::Named)).unwrap();
    path
}
