//! Config path management.
//!
//! Handles determining the config file location across platforms,
//! with support for CLI overrides and environment variables.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use etcetera::base_strategy::{BaseStrategy, choose_base_strategy};

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "SMOG_TRACE_CONFIG_PATH";

/// Get the config file path.
///
/// Priority:
/// 1. CLI --config flag
/// 2. SMOG_TRACE_CONFIG_PATH environment variable
/// 3. Platform-specific default location
pub fn get_config_path(cli_path: Option<&Path>) -> Option<PathBuf> {
    config_path_from(cli_path, std::env::var_os(CONFIG_PATH_ENV))
}

/// Resolve the config path from explicit sources, falling back to the
/// platform location.
pub fn config_path_from(cli_path: Option<&Path>, env_path: Option<OsString>) -> Option<PathBuf> {
    if let Some(path) = cli_path {
        return Some(path.to_path_buf());
    }

    if let Some(path) = env_path.filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(path));
    }

    // choose_base_strategy uses:
    // - XDG on Linux (respects XDG_CONFIG_HOME, falls back to ~/.config)
    // - XDG on macOS (~/.config instead of ~/Library/Application Support)
    // - Windows conventions on Windows (%APPDATA%)
    let strategy = choose_base_strategy().ok()?;
    Some(strategy.config_dir().join("smog-trace").join("config.toml"))
}
