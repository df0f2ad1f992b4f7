//! Error types for ghost-core
//!
//! The variants mirror how a failure should be presented to the operator:
//! configuration problems, unmet environmental preconditions, failed
//! subprocesses, failures reported by the served application itself, and
//! generic tool-level errors.

use thiserror::Error;

/// Result type alias using ghost-core's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for Ghost CLI
#[derive(Error, Debug)]
pub enum Error {
    /// A persisted configuration value is invalid or missing
    #[error("{message}")]
    Config {
        message: String,
        /// Offending config keys
        keys: Vec<String>,
        help: Option<String>,
    },

    /// An environmental precondition is unmet (OS, dependency, privileges)
    #[error("{message}")]
    System {
        message: String,
        help: Option<String>,
    },

    /// A spawned subprocess failed
    #[error("{message}")]
    Process {
        message: String,
        command: Option<String>,
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    /// The served application reported a failure while booting
    #[error("{message}")]
    Application {
        message: String,
        /// Tail of the application log, when available
        log: Option<String>,
    },

    /// Generic tool-level failure with a user-facing message
    #[error("{message}")]
    Cli {
        message: String,
        help: Option<String>,
    },

    /// JSON file could not be parsed
    #[error("Failed to parse {path}: {source}")]
    JsonParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a config error for a single key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            keys: vec![key.into()],
            help: None,
        }
    }

    /// Create a config error spanning several keys
    pub fn config_keys<I, S>(keys: I, message: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Config {
            message: message.into(),
            keys: keys.into_iter().map(Into::into).collect(),
            help: None,
        }
    }

    /// Create a system error
    pub fn system(message: impl Into<String>) -> Self {
        Self::System {
            message: message.into(),
            help: None,
        }
    }

    /// Create a process error without captured output
    pub fn process(message: impl Into<String>) -> Self {
        Self::Process {
            message: message.into(),
            command: None,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    /// Create a process error from a finished command
    pub fn process_output(command: impl Into<String>, output: &std::process::Output) -> Self {
        let command = command.into();
        Self::Process {
            message: match output.status.code() {
                Some(code) => format!("Command '{}' exited with code {}", command, code),
                None => format!("Command '{}' was terminated by a signal", command),
            },
            command: Some(command),
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
    }

    /// Create an application error
    pub fn application(message: impl Into<String>, log: Option<String>) -> Self {
        Self::Application {
            message: message.into(),
            log,
        }
    }

    /// Create a generic CLI error
    pub fn cli(message: impl Into<String>) -> Self {
        Self::Cli {
            message: message.into(),
            help: None,
        }
    }

    /// Attach remediation guidance to errors that carry it
    pub fn with_help(mut self, text: impl Into<String>) -> Self {
        match &mut self {
            Self::Config { help, .. } | Self::System { help, .. } | Self::Cli { help, .. } => {
                *help = Some(text.into());
            }
            _ => {}
        }
        self
    }

    /// Remediation guidance, if any
    pub fn help(&self) -> Option<&str> {
        match self {
            Self::Config { help, .. } | Self::System { help, .. } | Self::Cli { help, .. } => {
                help.as_deref()
            }
            _ => None,
        }
    }

    /// Heading used when presenting the error
    pub fn label(&self) -> &'static str {
        match self {
            Self::Config { .. } | Self::JsonParse { .. } => "Config Error",
            Self::System { .. } => "System Error",
            Self::Process { .. } => "Process Error",
            Self::Application { .. } => "Ghost Error",
            Self::Cli { .. } | Self::Json(_) | Self::Io(_) => "Error",
        }
    }

    /// Whether the served application itself reported this failure
    pub fn is_application(&self) -> bool {
        matches!(self, Self::Application { .. })
    }

    /// Diagnostic detail shown in verbose mode
    pub fn details(&self) -> Option<String> {
        match self {
            Self::Config { keys, .. } if !keys.is_empty() => {
                Some(format!("Config keys: {}", keys.join(", ")))
            }
            Self::Process {
                command,
                exit_code,
                stdout,
                stderr,
                ..
            } => {
                let mut lines = Vec::new();
                if let Some(command) = command {
                    lines.push(format!("Command: {}", command));
                }
                if let Some(code) = exit_code {
                    lines.push(format!("Exit code: {}", code));
                }
                if !stdout.is_empty() {
                    lines.push(format!("--- stdout ---\n{}", stdout));
                }
                if !stderr.is_empty() {
                    lines.push(format!("--- stderr ---\n{}", stderr));
                }
                (!lines.is_empty()).then(|| lines.join("\n"))
            }
            Self::Application { log: Some(log), .. } => Some(log.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_help_only_attaches_to_supported_variants() {
        let err = Error::system("Unsupported OS").with_help("Use Ubuntu");
        assert_eq!(err.help(), Some("Use Ubuntu"));

        let err = Error::process("boom").with_help("ignored");
        assert_eq!(err.help(), None);
    }

    #[test]
    fn test_config_error_details_list_keys() {
        let err = Error::config_keys(["database.user", "database.password"], "Access denied");
        assert_eq!(err.to_string(), "Access denied");
        assert_eq!(
            err.details().as_deref(),
            Some("Config keys: database.user, database.password")
        );
        assert_eq!(err.label(), "Config Error");
    }

    #[test]
    fn test_application_error_is_distinguished() {
        let err = Error::application("Ghost failed to start", None);
        assert!(err.is_application());
        assert!(!Error::process("exit 1").is_application());
    }
}
