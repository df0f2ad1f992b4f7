//! Extension contract
//!
//! Extensions are compiled in and registered at startup into an
//! [`ExtensionRegistry`]. Registration order is discovery order: it decides
//! where an extension's steps land in the setup task list.

use std::sync::Arc;

use async_trait::async_trait;
use ghost_tasks::{Step, TaskError};
use semver::Version;
use tracing::debug;

use crate::context::SetupContext;
use crate::instance::Instance;
use crate::process::ProcessManagerFactory;
use crate::ui::Ui;

/// A pluggable module contributing setup steps, migrations or process managers
#[async_trait]
pub trait Extension: Send + Sync {
    /// Unique extension name
    fn name(&self) -> &str;

    /// Short description shown by `doctor` and `version`
    fn description(&self) -> &str {
        ""
    }

    /// Steps appended to the setup task list
    fn setup(&self) -> Result<Vec<Step<SetupContext>>, TaskError> {
        Ok(Vec::new())
    }

    /// One-time steps run when upgrading across a CLI version boundary
    fn migrations(&self) -> Result<Vec<Migration>, TaskError> {
        Ok(Vec::new())
    }

    /// Cleanup run while an instance is removed
    async fn uninstall(&self, _instance: &Instance, _ui: &dyn Ui) -> anyhow::Result<()> {
        Ok(())
    }

    /// Process managers this extension provides
    fn process_managers(&self) -> Vec<Arc<dyn ProcessManagerFactory>> {
        Vec::new()
    }
}

/// A setup step gated on the CLI version that last touched the instance
pub struct Migration {
    before: Version,
    step: Step<SetupContext>,
}

impl Migration {
    /// Run `step` for instances last set up by a CLI older than `before`
    pub fn new(before: Version, step: Step<SetupContext>) -> Self {
        Self { before, step }
    }

    pub fn before(&self) -> &Version {
        &self.before
    }

    pub fn step(&self) -> &Step<SetupContext> {
        &self.step
    }

    pub fn into_step(self) -> Step<SetupContext> {
        self.step
    }

    /// Pending when the instance has no recorded CLI version or an older one
    pub fn is_pending(&self, cli_version: Option<&Version>) -> bool {
        cli_version.map(|v| v < &self.before).unwrap_or(true)
    }
}

impl std::fmt::Debug for Migration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migration")
            .field("before", &self.before.to_string())
            .field("step", &self.step.id())
            .finish()
    }
}

/// Loaded extensions in discovery order
#[derive(Clone, Default)]
pub struct ExtensionRegistry {
    extensions: Vec<Arc<dyn Extension>>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an extension. A second extension with the same name is ignored.
    pub fn register(&mut self, extension: Arc<dyn Extension>) -> &mut Self {
        if self.get(extension.name()).is_some() {
            debug!("Extension '{}' already registered", extension.name());
            return self;
        }
        debug!("Registered extension '{}'", extension.name());
        self.extensions.push(extension);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Extension>> {
        self.extensions.iter().find(|e| e.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Extension>> {
        self.extensions.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.extensions.iter().map(|e| e.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }
}

impl std::fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn migration(before: &str) -> Migration {
        let step = Step::builder("move-certs")
            .task(|_, _| Box::pin(async { Ok(()) }))
            .build()
            .unwrap();
        Migration::new(Version::parse(before).unwrap(), step)
    }

    #[test]
    fn test_migration_pending_rules() {
        let m = migration("1.2.0");
        assert!(m.is_pending(None));
        assert!(m.is_pending(Some(&Version::new(1, 1, 9))));
        assert!(!m.is_pending(Some(&Version::new(1, 2, 0))));
        assert!(!m.is_pending(Some(&Version::new(2, 0, 0))));
    }

    struct Named(&'static str);

    impl Extension for Named {
        fn name(&self) -> &str {
            self.0
        }
    }

    #[test]
    fn test_registry_keeps_discovery_order_and_ignores_duplicates() {
        let mut registry = ExtensionRegistry::new();
        registry
            .register(Arc::new(Named("nginx")))
            .register(Arc::new(Named("mysql")))
            .register(Arc::new(Named("nginx")));

        assert_eq!(registry.names(), vec!["nginx", "mysql"]);
        assert!(registry.get("mysql").is_some());
        assert!(registry.get("systemd").is_none());
    }
}
