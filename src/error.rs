//! Error types for trace decoding and conversion.
//!
//! - **`TraceError`** - A typed enum for domain errors that can be pattern-matched
//!   and tested. Library functions return it directly; the binary converts it into
//!   `anyhow::Error` and recovers the type via downcast for exit-code selection.
//!
//! - **`UsageError`** - Command-line level validation failures (exit code 2).

use std::error::Error as StdError;

/// Boxed cause carried by [`TraceError::SinkFailure`].
pub type BoxedCause = Box<dyn StdError + Send + Sync + 'static>;

/// Domain errors for trace decoding, indexing and output.
///
/// # Usage
///
/// ```ignore
/// // Pattern match on a decode failure
/// if let Err(TraceError::TruncatedInput { offset, .. }) = TraceFile::from_bytes(bytes) {
///     eprintln!("trace ends early near {offset:#x}");
/// }
/// ```
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    /// A read would run past the end of the buffer.
    #[error(
        "truncated input{}: reading {len} bytes at offset {offset:#x} exceeds trace length {total:#x}",
        frame_suffix(*frame)
    )]
    TruncatedInput {
        offset: usize,
        len: usize,
        total: usize,
        /// Frame being decoded when the read failed, if known
        frame: Option<usize>,
    },

    /// Structural violation of the wire format.
    #[error("malformed trace{} at offset {offset:#x}: {message}", frame_suffix(*frame))]
    FormatError {
        frame: Option<usize>,
        offset: usize,
        message: String,
    },

    /// A legacy VMA's explicit page count disagrees with `end - start`.
    ///
    /// Never returned from decoding; it is logged as a warning and counted in
    /// the trace stats. The record keeps the derived extent, cut to the pages
    /// its bitmap covers.
    #[error("mismatched VMA range {start:#x}..{end:#x}: declares {declared} pages, spans {derived}")]
    RangeMismatch {
        start: u64,
        end: u64,
        declared: u64,
        derived: u64,
    },

    /// An output collaborator rejected a write.
    #[error("{sink} output failed: {source}")]
    SinkFailure {
        sink: &'static str,
        #[source]
        source: BoxedCause,
    },

    /// The dedicated worker pool for a run could not be started.
    #[error("failed to start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

fn frame_suffix(frame: Option<usize>) -> String {
    frame.map(|i| format!(" in frame #{i}")).unwrap_or_default()
}

impl TraceError {
    /// Wrap an output failure from the named sink.
    pub fn sink(sink: &'static str, source: impl Into<BoxedCause>) -> Self {
        TraceError::SinkFailure {
            sink,
            source: source.into(),
        }
    }

    /// Attach the frame number to decode errors that don't carry one yet.
    pub fn in_frame(self, index: usize) -> Self {
        match self {
            TraceError::TruncatedInput {
                offset,
                len,
                total,
                frame: None,
            } => TraceError::TruncatedInput {
                offset,
                len,
                total,
                frame: Some(index),
            },
            TraceError::FormatError {
                offset,
                message,
                frame: None,
            } => TraceError::FormatError {
                frame: Some(index),
                offset,
                message,
            },
            other => other,
        }
    }
}

/// Command-line validation failures that should exit with status 2.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct UsageError(pub String);

/// Exit code for an error surfaced by the binary.
///
/// Usage errors exit with 2; everything else (I/O, decoding, output) exits with 1.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<UsageError>().is_some() {
        2
    } else {
        1
    }
}
