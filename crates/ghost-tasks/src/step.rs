//! Step descriptors
//!
//! A [`Step`] is built once through [`StepBuilder`] and validated at that
//! point; the runner never has to second-guess a descriptor afterwards.
//! All predicates and tasks receive the shared run context `C`.

use std::fmt;

use futures::future::BoxFuture;

use crate::error::{SkipSignal, TaskError};

/// Outcome of a step's skip predicate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipDecision {
    /// Execute the step
    Run,
    /// Skip without explanation
    Skip,
    /// Skip and show the reason to the user
    SkipWithReason(String),
}

impl SkipDecision {
    pub fn is_skip(&self) -> bool {
        !matches!(self, Self::Run)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::SkipWithReason(reason) => Some(reason),
            _ => None,
        }
    }
}

impl From<bool> for SkipDecision {
    fn from(skip: bool) -> Self {
        if skip {
            Self::Skip
        } else {
            Self::Run
        }
    }
}

impl From<&str> for SkipDecision {
    fn from(reason: &str) -> Self {
        Self::SkipWithReason(reason.to_string())
    }
}

impl From<String> for SkipDecision {
    fn from(reason: String) -> Self {
        Self::SkipWithReason(reason)
    }
}

impl From<Option<String>> for SkipDecision {
    fn from(reason: Option<String>) -> Self {
        reason.map(Self::SkipWithReason).unwrap_or(Self::Run)
    }
}

/// Handle passed to a running task
#[derive(Debug)]
pub struct TaskHandle {
    title: String,
    skipped: Option<Option<String>>,
}

impl TaskHandle {
    pub(crate) fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            skipped: None,
        }
    }

    /// Title of the running step
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Mark the step as skipped from inside the task.
    ///
    /// Returns a [`SkipSignal`] error, so `task.skip("...")?` ends the task
    /// right there. The skip is recorded even if the error is discarded.
    pub fn skip(&mut self, reason: impl Into<String>) -> anyhow::Result<()> {
        let reason = reason.into();
        self.skipped = Some(Some(reason.clone()));
        Err(SkipSignal::new(reason).into())
    }

    pub(crate) fn take_skip(&mut self) -> Option<Option<String>> {
        self.skipped.take()
    }
}

type EnabledFn<C> = Box<dyn Fn(&C) -> bool + Send + Sync>;
type SkipFn<C> =
    Box<dyn for<'a> Fn(&'a C) -> BoxFuture<'a, anyhow::Result<SkipDecision>> + Send + Sync>;
type TaskFn<C> = Box<
    dyn for<'a> Fn(&'a mut C, &'a mut TaskHandle) -> BoxFuture<'a, anyhow::Result<()>>
        + Send
        + Sync,
>;

/// A unit of orchestrated work
pub struct Step<C> {
    id: String,
    title: String,
    prompt: Option<String>,
    optional: bool,
    enabled: Option<EnabledFn<C>>,
    skip: Option<SkipFn<C>>,
    task: TaskFn<C>,
}

impl<C> Step<C> {
    /// Start building a step with the given id
    pub fn builder(id: impl Into<String>) -> StepBuilder<C> {
        StepBuilder::new(id)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Whether the step asks for confirmation in interactive runs
    pub fn is_optional(&self) -> bool {
        self.optional
    }

    /// Question asked before running an optional step
    pub fn prompt(&self) -> String {
        self.prompt
            .clone()
            .unwrap_or_else(|| format!("Do you wish to set up {}?", self.id))
    }

    /// Evaluate the enablement predicate
    pub fn is_enabled(&self, ctx: &C) -> bool {
        self.enabled.as_ref().map(|f| f(ctx)).unwrap_or(true)
    }

    /// Evaluate the skip predicate
    pub async fn check_skip(&self, ctx: &C) -> anyhow::Result<SkipDecision> {
        match &self.skip {
            Some(skip) => skip(ctx).await,
            None => Ok(SkipDecision::Run),
        }
    }

    pub(crate) async fn execute(&self, ctx: &mut C, handle: &mut TaskHandle) -> anyhow::Result<()> {
        (self.task)(ctx, handle).await
    }
}

impl<C> fmt::Debug for Step<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("optional", &self.optional)
            .field("has_enabled", &self.enabled.is_some())
            .field("has_skip", &self.skip.is_some())
            .finish()
    }
}

/// Builder for [`Step`]
pub struct StepBuilder<C> {
    id: String,
    title: Option<String>,
    prompt: Option<String>,
    optional: bool,
    enabled: Option<EnabledFn<C>>,
    skip: Option<SkipFn<C>>,
    task: Option<TaskFn<C>>,
}

impl<C> StepBuilder<C> {
    fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
            prompt: None,
            optional: false,
            enabled: None,
            skip: None,
            task: None,
        }
    }

    /// User-facing title (defaults to `Setting up {id}`)
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Ask before running in interactive mode
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Custom confirmation question for optional steps
    pub fn prompt(mut self, question: impl Into<String>) -> Self {
        self.prompt = Some(question.into());
        self
    }

    /// Predicate deciding whether the step belongs to this run at all
    pub fn enabled<F>(mut self, f: F) -> Self
    where
        F: Fn(&C) -> bool + Send + Sync + 'static,
    {
        self.enabled = Some(Box::new(f));
        self
    }

    /// Predicate deciding whether the step's effect is already in place
    pub fn skip<F>(mut self, f: F) -> Self
    where
        F: for<'a> Fn(&'a C) -> BoxFuture<'a, anyhow::Result<SkipDecision>>
            + Send
            + Sync
            + 'static,
    {
        self.skip = Some(Box::new(f));
        self
    }

    /// The side effect
    pub fn task<F>(mut self, f: F) -> Self
    where
        F: for<'a> Fn(&'a mut C, &'a mut TaskHandle) -> BoxFuture<'a, anyhow::Result<()>>
            + Send
            + Sync
            + 'static,
    {
        self.task = Some(Box::new(f));
        self
    }

    /// Validate and produce the step
    pub fn build(self) -> Result<Step<C>, TaskError> {
        validate_id(&self.id)?;

        let task = self
            .task
            .ok_or_else(|| TaskError::invalid(&self.id, "no task defined"))?;

        if matches!(&self.title, Some(t) if t.trim().is_empty()) {
            return Err(TaskError::invalid(&self.id, "title must not be empty"));
        }

        Ok(Step {
            title: self
                .title
                .unwrap_or_else(|| format!("Setting up {}", self.id)),
            id: self.id,
            prompt: self.prompt,
            optional: self.optional,
            enabled: self.enabled,
            skip: self.skip,
            task,
        })
    }
}

/// Step ids are used as `--stages` values and `--no-setup-<id>` flags
fn validate_id(id: &str) -> Result<(), TaskError> {
    if id.is_empty() {
        return Err(TaskError::invalid(id, "id must not be empty"));
    }
    if id.starts_with('-') || id.ends_with('-') {
        return Err(TaskError::invalid(id, "id must not start or end with '-'"));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(TaskError::invalid(
            id,
            "id may only contain lowercase letters, digits and '-'",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Ctx;

    fn noop() -> StepBuilder<Ctx> {
        Step::builder("noop").task(|_, _| Box::pin(async { Ok(()) }))
    }

    #[test]
    fn test_default_title_and_prompt() {
        let step = noop().build().unwrap();
        assert_eq!(step.title(), "Setting up noop");
        assert_eq!(step.prompt(), "Do you wish to set up noop?");
        assert!(!step.is_optional());
    }

    #[test]
    fn test_rejects_bad_ids() {
        for id in ["", "Nginx", "-ssl", "ssl-", "my step"] {
            let result = Step::<Ctx>::builder(id)
                .task(|_, _| Box::pin(async { Ok(()) }))
                .build();
            assert!(result.is_err(), "id {:?} should be rejected", id);
        }
    }

    #[test]
    fn test_requires_task() {
        let err = Step::<Ctx>::builder("config").build().unwrap_err();
        assert!(err.to_string().contains("no task defined"));
    }

    #[test]
    fn test_skip_decision_conversions() {
        assert_eq!(SkipDecision::from(false), SkipDecision::Run);
        assert_eq!(SkipDecision::from(true), SkipDecision::Skip);
        assert_eq!(
            SkipDecision::from("already exists").reason(),
            Some("already exists")
        );
        assert_eq!(SkipDecision::from(None::<String>), SkipDecision::Run);
    }

    #[test]
    fn test_enabled_defaults_to_true() {
        let step = noop().build().unwrap();
        assert!(step.is_enabled(&Ctx));

        let step = noop().enabled(|_| false).build().unwrap();
        assert!(!step.is_enabled(&Ctx));
    }
}
