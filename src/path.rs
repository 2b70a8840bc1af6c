use std::path::{Path, PathBuf};

use chrono::Local;

use crate::error::UsageError;
use crate::trace::Timestamp;
use crate::utils::format_frame_timestamp;

/// Placeholder replaced by the frame timestamp in per-frame output paths.
pub const TIMESTAMP_PLACEHOLDER: &str = "%s";

/// Get the user's home directory.
///
/// Uses the `home` crate which handles platform-specific detection:
/// - Unix: `$HOME` environment variable
/// - Windows: `USERPROFILE` or `HOMEDRIVE`/`HOMEPATH`
pub fn home_dir() -> Option<PathBuf> {
    home::home_dir()
}

/// Format a filesystem path for user-facing output.
///
/// Replaces home directory prefix with `~` (e.g., `/home/ada/traces/run.smog` -> `~/traces/run.smog`).
/// Paths outside home are returned unchanged.
pub fn format_path_for_display(path: &Path) -> String {
    if let Some(home) = home_dir()
        && let Ok(stripped) = path.strip_prefix(&home)
    {
        if stripped.as_os_str().is_empty() {
            return "~".to_string();
        }

        let mut display_path = PathBuf::from("~");
        display_path.push(stripped);
        return display_path.display().to_string();
    }

    path.display().to_string()
}

/// Output path containing a `%s` placeholder for the frame timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePathTemplate {
    template: String,
}

impl FramePathTemplate {
    pub fn new(template: impl Into<String>) -> Result<Self, UsageError> {
        let template = template.into();
        if !template.contains(TIMESTAMP_PLACEHOLDER) {
            return Err(UsageError(format!(
                "per-frame output path '{template}' must contain '{TIMESTAMP_PLACEHOLDER}'"
            )));
        }
        Ok(Self { template })
    }

    /// Path for a frame, with the timestamp rendered in local time.
    pub fn render(&self, timestamp: Timestamp) -> PathBuf {
        self.render_with(&format_frame_timestamp(timestamp, &Local))
    }

    /// Substitute `stamp` for the first placeholder.
    pub fn render_with(&self, stamp: &str) -> PathBuf {
        PathBuf::from(self.template.replacen(TIMESTAMP_PLACEHOLDER, stamp, 1))
    }
}
