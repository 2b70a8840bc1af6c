//! Styling for terminal status output.
//!
//! This module uses the anstyle ecosystem:
//! - anstream for auto-detecting color support
//! - anstyle for composable styling
//! - Semantic style constants for the converter's messages

use anstyle::{AnsiColor, Color, Style};

// ============================================================================
// Re-exports from anstream (auto-detecting output)
// ============================================================================

/// Auto-detecting eprintln that respects NO_COLOR, CLICOLOR_FORCE, and terminal capabilities
pub use anstream::eprintln;

/// Auto-detecting eprint that respects NO_COLOR, CLICOLOR_FORCE, and terminal capabilities
pub use anstream::eprint;

// ============================================================================
// Semantic Style Constants
// ============================================================================

/// Error style (red) - use as `{ERROR}text{ERROR:#}`
pub const ERROR: Style = Style::new().fg_color(Some(Color::Ansi(AnsiColor::Red)));

/// Warning style (yellow) - use as `{WARNING}text{WARNING:#}`
pub const WARNING: Style = Style::new().fg_color(Some(Color::Ansi(AnsiColor::Yellow)));

/// Hint style (dimmed) - use as `{HINT}text{HINT:#}`
pub const HINT: Style = Style::new().dimmed();

/// Progress style (cyan)
pub const PROGRESS: Style = Style::new().fg_color(Some(Color::Ansi(AnsiColor::Cyan)));

/// Success style (green)
pub const SUCCESS: Style = Style::new().fg_color(Some(Color::Ansi(AnsiColor::Green)));

/// Emphasis for values inside messages
pub const BOLD: Style = Style::new().bold();

// ============================================================================
// Message Emojis
// ============================================================================

/// Error emoji - use with ERROR style: `eprintln!("{ERROR_EMOJI} {ERROR}message{ERROR:#}");`
pub const ERROR_EMOJI: &str = "❌";

/// Warning emoji - use with WARNING style
pub const WARNING_EMOJI: &str = "🟡";

/// Progress emoji - use with PROGRESS style
pub const PROGRESS_EMOJI: &str = "🔄";

/// Success emoji - use with SUCCESS style
pub const SUCCESS_EMOJI: &str = "✅";

/// A status line: emoji, then the message in `style`.
pub fn status_line(emoji: &str, style: Style, message: &str) -> String {
    format!("{emoji} {style}{message}{style:#}")
}
