//! # ghost-lifecycle
//!
//! Everything between the command line and the task engine:
//! - [`System`]: environment, global instance registry, extension hooks
//! - [`Instance`]: one installation, its configs and its process manager
//! - [`process`]: the process manager abstraction and the local manager
//! - [`Extension`]: the contract built-in extensions implement
//! - Task lists for `setup`, `install`, `update` and `doctor`

pub mod context;
pub mod doctor;
pub mod extension;
pub mod install;
pub mod instance;
pub mod process;
pub mod release;
pub mod runtime;
pub mod setup;
pub mod system;
pub mod template;
pub mod ui;
pub mod update;

pub use context::{SetupArgs, SetupContext};
pub use extension::{Extension, ExtensionRegistry, Migration};
pub use instance::{Instance, InstanceSummary};
pub use process::{ProcessContext, ProcessManager, ProcessManagerFactory};
pub use system::{RegisteredInstance, System};
pub use template::{template, template_in};
pub use ui::Ui;
