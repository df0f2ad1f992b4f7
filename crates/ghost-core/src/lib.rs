//! # ghost-core
//!
//! Core library for the Ghost CLI providing:
//! - File-backed key-value config stores
//! - The error taxonomy shared by every crate
//! - Environment selection and well-known paths
//! - Shell command helpers

pub mod config;
pub mod environment;
pub mod error;
pub mod paths;
pub mod utils;

pub use config::ConfigStore;
pub use environment::Environment;
pub use error::{Error, Result};

/// Version of the running CLI
pub const CLI_VERSION: &str = env!("CARGO_PKG_VERSION");
