//! Output sinks for the conversion pipeline.
//!
//! | Kind        | Sink              | Keying    | Collaborator      |
//! |-------------|-------------------|-----------|-------------------|
//! | `png`       | [`BitmapSink`]    | flat      | [`ImageWriter`]   |
//! | `parquet`   | [`TabularSink`]   | none      | [`TableWriter`]   |
//! | `histogram` | [`HistogramSink`] | by region | text report       |

pub mod bitmap;
pub mod histogram;
pub mod tabular;

pub use bitmap::{BitmapSink, ImageWriter, PngImageWriter, pixel_color};
pub use histogram::{HistogramReport, HistogramSink, HistogramSummary, PageCounts};
pub use tabular::{
    PageRow, ParquetTableWriter, TableFactory, TableSummary, TableTarget, TableWriter, TabularSink,
};

/// Output format selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString, strum::EnumIter)]
#[strum(serialize_all = "kebab-case")]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum OutputKind {
    /// One parquet table per frame, or a single table
    Parquet,
    /// Frame-by-address bitmap image
    Png,
    /// Per-page state counts as text
    Histogram,
}
