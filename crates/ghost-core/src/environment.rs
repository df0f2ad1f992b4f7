//! Runtime environment selection

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Environment an instance is configured and run under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Production,
    Development,
}

impl Environment {
    /// Both environments, production first
    pub const ALL: [Environment; 2] = [Environment::Production, Environment::Development];

    /// Pick the environment from a `--development` style flag
    pub fn from_dev_flag(development: bool) -> Self {
        if development {
            Self::Development
        } else {
            Self::Production
        }
    }

    /// Canonical name, also the value of `NODE_ENV`
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Development => "development",
        }
    }

    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }

    /// File name of the application config for this environment
    pub fn config_file_name(&self) -> String {
        format!("config.{}.json", self.as_str())
    }

    /// Full path of the application config inside an instance directory
    pub fn config_path(&self, dir: &Path) -> PathBuf {
        dir.join(self.config_file_name())
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "production" => Ok(Self::Production),
            "development" => Ok(Self::Development),
            other => Err(Error::cli(format!("Unknown environment: {}", other))),
        }
    }
}
