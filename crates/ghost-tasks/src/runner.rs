//! Sequential task runner
//!
//! Steps run one at a time in registration order against a shared mutable
//! context. Enablement and skip predicates are evaluated right before each
//! step so they observe what earlier steps wrote. The first error aborts the
//! rest of the run.

use std::collections::HashSet;

use tracing::{debug, info};

use crate::error::{AbortRun, SkipSignal, StepFailure, TaskError};
use crate::render::Renderer;
use crate::selection::{Choice, Selection};
use crate::step::{SkipDecision, Step, TaskHandle};

/// How a step ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    Completed,
    Skipped { reason: Option<String> },
}

/// Outcome of one enabled step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub id: String,
    pub title: String,
    pub status: StepStatus,
}

/// Result of a successful run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub outcomes: Vec<StepOutcome>,
}

impl RunReport {
    /// Ids of steps that executed to completion
    pub fn completed(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| o.status == StepStatus::Completed)
            .map(|o| o.id.as_str())
            .collect()
    }

    /// Ids of steps that were skipped
    pub fn skipped(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, StepStatus::Skipped { .. }))
            .map(|o| o.id.as_str())
            .collect()
    }

    pub fn outcome(&self, id: &str) -> Option<&StepOutcome> {
        self.outcomes.iter().find(|o| o.id == id)
    }

    fn record(&mut self, step_id: &str, title: &str, status: StepStatus) {
        self.outcomes.push(StepOutcome {
            id: step_id.to_string(),
            title: title.to_string(),
            status,
        });
    }
}

/// Ordered list of steps plus the selection policy for one run
pub struct TaskRunner<C> {
    steps: Vec<Step<C>>,
    ids: HashSet<String>,
    selection: Selection,
}

impl<C> std::fmt::Debug for TaskRunner<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRunner")
            .field("steps", &self.steps)
            .field("selection", &self.selection)
            .finish()
    }
}

impl<C> Default for TaskRunner<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> TaskRunner<C> {
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            ids: HashSet::new(),
            selection: Selection::all(),
        }
    }

    /// Replace the selection policy
    pub fn with_selection(mut self, selection: Selection) -> Self {
        self.selection = selection;
        self
    }

    /// Append a step. Ids must be unique within a runner.
    pub fn push(&mut self, step: Step<C>) -> Result<&mut Self, TaskError> {
        if !self.ids.insert(step.id().to_string()) {
            return Err(TaskError::invalid(step.id(), "duplicate step id"));
        }
        self.steps.push(step);
        Ok(self)
    }

    /// Append several steps, preserving their order
    pub fn extend<I>(&mut self, steps: I) -> Result<&mut Self, TaskError>
    where
        I: IntoIterator<Item = Step<C>>,
    {
        for step in steps {
            self.push(step)?;
        }
        Ok(self)
    }

    pub fn steps(&self) -> &[Step<C>] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Ids in execution order
    pub fn ids(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.id()).collect()
    }

    /// Execute every step in order
    pub async fn run(&self, ctx: &mut C, renderer: &dyn Renderer) -> Result<RunReport, TaskError> {
        let mut report = RunReport::default();

        for step in &self.steps {
            if !step.is_enabled(ctx) {
                debug!("Step '{}' is not enabled for this run", step.id());
                continue;
            }

            match self.selection.choose(step.id(), step.is_optional()) {
                Choice::Run => {}
                Choice::NotSelected => {
                    let reason = "not selected".to_string();
                    renderer.step_skipped(step.title(), Some(&reason));
                    report.record(step.id(), step.title(), skipped(Some(reason)));
                    continue;
                }
                Choice::Disabled => {
                    let reason = format!("disabled by --no-setup-{}", step.id());
                    renderer.step_skipped(step.title(), Some(&reason));
                    report.record(step.id(), step.title(), skipped(Some(reason)));
                    continue;
                }
                Choice::Confirm => {
                    let accepted = renderer
                        .confirm(&step.prompt(), true)
                        .map_err(|e| fail(step, e, &report))?;
                    if !accepted {
                        let reason = "declined".to_string();
                        renderer.step_skipped(step.title(), Some(&reason));
                        report.record(step.id(), step.title(), skipped(Some(reason)));
                        continue;
                    }
                }
            }

            renderer.step_started(step.title());

            let decision = match step.check_skip(ctx).await {
                Ok(decision) => decision,
                Err(e) => {
                    renderer.step_failed(step.title(), &e);
                    return Err(fail(step, e, &report));
                }
            };
            if decision.is_skip() {
                let reason = decision.reason().map(str::to_string);
                debug!("Skipping '{}': {:?}", step.id(), reason);
                renderer.step_skipped(step.title(), reason.as_deref());
                report.record(step.id(), step.title(), skipped(reason));
                continue;
            }

            let mut handle = TaskHandle::new(step.title());
            match step.execute(ctx, &mut handle).await {
                Ok(()) => match handle.take_skip() {
                    Some(reason) => {
                        renderer.step_skipped(step.title(), reason.as_deref());
                        report.record(step.id(), step.title(), skipped(reason));
                    }
                    None => {
                        info!("Completed step '{}'", step.id());
                        renderer.step_completed(step.title());
                        report.record(step.id(), step.title(), StepStatus::Completed);
                    }
                },
                Err(e) => {
                    if let Some(signal) = e.downcast_ref::<SkipSignal>() {
                        let reason = signal.reason.clone();
                        renderer.step_skipped(step.title(), reason.as_deref());
                        report.record(step.id(), step.title(), skipped(reason));
                        continue;
                    }
                    renderer.step_failed(step.title(), &e);
                    return Err(fail(step, e, &report));
                }
            }
        }

        Ok(report)
    }
}

fn skipped(reason: Option<String>) -> StepStatus {
    StepStatus::Skipped { reason }
}

fn fail<C>(step: &Step<C>, source: anyhow::Error, report: &RunReport) -> TaskError {
    let failure = StepFailure {
        id: step.id().to_string(),
        title: step.title().to_string(),
        source,
    };

    let completed: Vec<String> = report.completed().into_iter().map(String::from).collect();
    if completed.is_empty() {
        TaskError::Failed(failure)
    } else {
        TaskError::Aborted(AbortRun { failure, completed })
    }
}

/// Convenience for skip predicates that resolve immediately
pub fn ready(decision: impl Into<SkipDecision>) -> anyhow::Result<SkipDecision> {
    Ok(decision.into())
}
