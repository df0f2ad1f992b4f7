//! Named process manager lookup with fallback to the bare-process manager

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use super::{LocalFactory, Operation, ProcessManager, ProcessManagerFactory, LOCAL};
use crate::ui::Ui;

/// Why a configured manager was replaced by the local one
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fallback {
    /// No factory is registered under the name
    Unknown,
    /// The implementation lacks required operations
    Incomplete(Vec<Operation>),
    /// The manager cannot work on this system
    WillNotRun,
}

impl fmt::Display for Fallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => f.write_str("it is not installed"),
            Self::Incomplete(missing) => {
                write!(f, "it does not implement {:?}", missing)
            }
            Self::WillNotRun => f.write_str("it cannot run on this system"),
        }
    }
}

/// Result of resolving a manager name
pub struct Resolved {
    pub manager: Arc<dyn ProcessManager>,
    /// Set when the requested manager was replaced by `local`
    pub fallback: Option<Fallback>,
}

impl fmt::Debug for Resolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolved")
            .field("manager", &self.manager.name())
            .field("fallback", &self.fallback)
            .finish()
    }
}

/// Registry of process manager factories, always containing `local`
pub struct ProcessManagerRegistry {
    factories: HashMap<String, Arc<dyn ProcessManagerFactory>>,
}

impl Default for ProcessManagerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessManagerRegistry {
    pub fn new() -> Self {
        let mut factories: HashMap<String, Arc<dyn ProcessManagerFactory>> = HashMap::new();
        factories.insert(LOCAL.to_string(), Arc::new(LocalFactory));
        Self { factories }
    }

    /// Register a factory. `local` cannot be replaced.
    pub fn register(&mut self, factory: Arc<dyn ProcessManagerFactory>) {
        let name = factory.name().to_string();
        if name == LOCAL {
            warn!("Ignoring attempt to replace the '{}' process manager", LOCAL);
            return;
        }
        debug!("Registered process manager '{}'", name);
        self.factories.insert(name, factory);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check whether `name` would be usable without falling back
    pub fn check(&self, name: &str) -> Result<(), Fallback> {
        let factory = self.factories.get(name).ok_or(Fallback::Unknown)?;

        let provided = factory.operations();
        let missing: Vec<Operation> = Operation::REQUIRED
            .iter()
            .filter(|op| !provided.contains(op))
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(Fallback::Incomplete(missing));
        }

        if !factory.will_run() {
            return Err(Fallback::WillNotRun);
        }
        Ok(())
    }

    /// Create the manager for `name`, falling back to `local` with one warning
    pub fn resolve(&self, name: &str, ui: Arc<dyn Ui>) -> Resolved {
        let fallback = match self.check(name) {
            Ok(()) => {
                if let Some(factory) = self.factories.get(name) {
                    return Resolved {
                        manager: factory.create(ui),
                        fallback: None,
                    };
                }
                Fallback::Unknown
            }
            Err(reason) => reason,
        };

        warn!(
            "Process manager '{}' will not be used because {}; falling back to '{}'",
            name, fallback, LOCAL
        );
        Resolved {
            manager: LocalFactory.create(ui),
            fallback: Some(fallback),
        }
    }
}
