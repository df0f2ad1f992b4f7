//! Which steps of a run the operator asked for

use std::collections::HashSet;

/// Per-run step selection derived from `--stages`, `--no-setup-<id>` and
/// whether prompting is allowed
#[derive(Debug, Clone, Default)]
pub struct Selection {
    stages: Option<Vec<String>>,
    disabled: HashSet<String>,
    interactive: bool,
}

/// What the runner should do with an enabled step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Choice {
    Run,
    /// Excluded by the stage allow-list
    NotSelected,
    /// Excluded by `--no-setup-<id>`
    Disabled,
    /// Ask the operator first
    Confirm,
}

impl Selection {
    /// Run every enabled step without prompting
    pub fn all() -> Self {
        Self::default()
    }

    /// Only run the listed stage ids
    pub fn only<I, S>(stages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            stages: Some(stages.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// Restrict to the listed stages when any are given
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        if !stages.is_empty() {
            self.stages = Some(stages);
        }
        self
    }

    /// Opt a step out of the run
    pub fn disable(mut self, id: impl Into<String>) -> Self {
        self.disabled.insert(id.into());
        self
    }

    /// Allow confirming optional steps one by one
    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    pub fn stages(&self) -> Option<&[String]> {
        self.stages.as_deref()
    }

    pub fn is_disabled(&self, id: &str) -> bool {
        self.disabled.contains(id)
    }

    /// Decide how to treat a step
    pub fn choose(&self, id: &str, optional: bool) -> Choice {
        if let Some(stages) = &self.stages {
            return if stages.iter().any(|s| s == id) {
                Choice::Run
            } else {
                Choice::NotSelected
            };
        }

        if self.disabled.contains(id) {
            Choice::Disabled
        } else if optional && self.interactive {
            Choice::Confirm
        } else {
            Choice::Run
        }
    }
}
