//! Well-known file and directory locations

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Tool-internal instance config file
pub const CLI_CONFIG_FILE: &str = ".ghost-cli";
/// PID file written by the local process manager
pub const PID_FILE: &str = ".ghostpid";
/// Symlink pointing at the active release
pub const CURRENT_LINK: &str = "current";
/// Directory holding extracted releases
pub const VERSIONS_DIR: &str = "versions";
/// Default content directory
pub const CONTENT_DIR: &str = "content";
/// Directory for generated system files (nginx, systemd)
pub const SYSTEM_FILES_DIR: &str = "system/files";

/// Environment variable overriding the global ghost directory
pub const GHOST_HOME_ENV: &str = "GHOST_CLI_HOME";

/// Get the user's home directory
///
/// Prefers the HOME environment variable over dirs::home_dir() so that
/// `sudo -E` and container setups that remap HOME stay consistent.
pub fn home_dir() -> Result<PathBuf> {
    if let Ok(home) = std::env::var("HOME") {
        if !home.is_empty() {
            return Ok(PathBuf::from(home));
        }
    }

    dirs::home_dir().ok_or_else(|| Error::system("Could not determine home directory"))
}

/// Get the global ghost directory (`$GHOST_CLI_HOME` or `~/.ghost`)
pub fn ghost_home() -> Result<PathBuf> {
    if let Ok(custom) = std::env::var(GHOST_HOME_ENV) {
        if !custom.is_empty() {
            return Ok(PathBuf::from(custom));
        }
    }
    Ok(home_dir()?.join(".ghost"))
}

/// Path of the global per-user config holding the instance registry
pub fn global_config_path() -> Result<PathBuf> {
    Ok(ghost_home()?.join("config"))
}

/// Directory a release version is extracted into
pub fn version_dir(dir: &Path, version: &str) -> PathBuf {
    dir.join(VERSIONS_DIR).join(version)
}
