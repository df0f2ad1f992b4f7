//! Version information for the ghost CLI

use serde::{Deserialize, Serialize};

/// Version information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    /// CLI version
    pub version: String,

    /// Git commit SHA (short)
    pub commit: Option<String>,

    /// Build date
    pub build_date: Option<String>,

    /// Active Ghost version of the instance in the working directory
    pub ghost: Option<String>,
}

impl VersionInfo {
    /// Version info for the current build
    pub fn current() -> Self {
        Self {
            version: ghost_core::CLI_VERSION.to_string(),
            commit: option_env!("GIT_SHA").map(String::from),
            build_date: option_env!("BUILD_DATE").map(String::from),
            ghost: None,
        }
    }

    pub fn display(&self) -> String {
        match &self.commit {
            Some(commit) => format!("Ghost-CLI version: {} ({})", self.version, commit),
            None => format!("Ghost-CLI version: {}", self.version),
        }
    }
}

impl std::fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}
