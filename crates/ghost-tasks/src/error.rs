//! Task runner error types

use thiserror::Error;

/// Short-circuits a single step without failing the run.
///
/// Not a real failure: a task may return it (converted into `anyhow::Error`)
/// and the runner reports the step as skipped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}", .reason.as_deref().unwrap_or("skipped"))]
pub struct SkipSignal {
    pub reason: Option<String>,
}

impl SkipSignal {
    /// Skip silently
    pub fn silent() -> Self {
        Self { reason: None }
    }

    /// Skip with a reason shown to the user
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
        }
    }
}

/// A step raised an error while checking or executing
#[derive(Error, Debug)]
#[error("{title} failed: {source}")]
pub struct StepFailure {
    /// Step id
    pub id: String,
    /// User-facing step title
    pub title: String,
    #[source]
    pub source: anyhow::Error,
}

/// A step failed after earlier steps of the same run had completed
#[derive(Error, Debug)]
#[error("{failure}")]
pub struct AbortRun {
    pub failure: StepFailure,
    /// Ids of the steps that completed before the failure, in order
    pub completed: Vec<String>,
}

/// Errors surfaced by the task runner
#[derive(Error, Debug)]
pub enum TaskError {
    /// A step failed before anything completed
    #[error(transparent)]
    Failed(StepFailure),

    /// A step failed after partial completion
    #[error(transparent)]
    Aborted(AbortRun),

    /// A step descriptor was rejected at registration time
    #[error("Invalid step '{id}': {reason}")]
    InvalidStep { id: String, reason: String },
}

impl TaskError {
    /// The failing step, if the run got that far
    pub fn failure(&self) -> Option<&StepFailure> {
        match self {
            Self::Failed(failure) => Some(failure),
            Self::Aborted(abort) => Some(&abort.failure),
            Self::InvalidStep { .. } => None,
        }
    }

    /// The error raised by the failing step
    pub fn cause(&self) -> Option<&anyhow::Error> {
        self.failure().map(|f| &f.source)
    }

    pub(crate) fn invalid(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidStep {
            id: id.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_signal_display() {
        assert_eq!(SkipSignal::silent().to_string(), "skipped");
        assert_eq!(SkipSignal::new("nginx missing").to_string(), "nginx missing");
    }

    #[test]
    fn test_failure_accessors() {
        let err = TaskError::Aborted(AbortRun {
            failure: StepFailure {
                id: "start".into(),
                title: "Starting Ghost".into(),
                source: anyhow::anyhow!("port in use"),
            },
            completed: vec!["config".into()],
        });

        assert_eq!(err.failure().unwrap().id, "start");
        assert_eq!(err.cause().unwrap().to_string(), "port in use");
        assert_eq!(err.to_string(), "Starting Ghost failed: port in use");
    }
}
