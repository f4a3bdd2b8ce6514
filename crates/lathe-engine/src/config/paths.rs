//! Standard locations for configuration files

use std::path::PathBuf;

/// Directory holding the app's configuration files.
///
/// Returns `~/.config/lathe` on Linux (or the platform equivalent);
/// falls back to the working directory when no config dir exists.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lathe")
}

/// Full path for a named config file, e.g. `audio.yaml`.
pub fn default_config_path(filename: &str) -> PathBuf {
    default_config_dir().join(filename)
}
