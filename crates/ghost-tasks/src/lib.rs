//! Task orchestration for Ghost CLI
//!
//! This crate provides the engine behind `install`, `setup`, `update` and
//! `doctor`:
//! - Step descriptors with enable/skip/execute semantics
//! - A sequential, fail-fast runner over a shared run context
//! - Stage selection (`--stages`, `--no-setup-<id>`, interactive confirmation)
//! - The renderer interface used for progress output

pub mod error;
pub mod render;
pub mod runner;
pub mod selection;
pub mod step;

pub use error::{AbortRun, SkipSignal, StepFailure, TaskError};
pub use futures::future::BoxFuture;
pub use render::{QuietRenderer, Renderer};
pub use runner::{ready, RunReport, StepOutcome, StepStatus, TaskRunner};
pub use selection::{Choice, Selection};
pub use step::{SkipDecision, Step, StepBuilder, TaskHandle};
