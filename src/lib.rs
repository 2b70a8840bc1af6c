pub mod config;
pub mod error;
pub mod path;
pub mod pipeline;
pub mod ranges;
pub mod sinks;
pub mod styling;
pub mod trace;
pub mod utils;

// Re-export the error types for convenience
pub use error::{TraceError, UsageError};
