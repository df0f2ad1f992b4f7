//! Process-wide coordinator
//!
//! [`System`] is cheap to clone and shared by every [`Instance`]. It owns
//! the active environment, the global instance registry and the loaded
//! extensions, and dispatches lifecycle hooks to them.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use ghost_core::config::keys;
use ghost_core::{ConfigStore, Environment, Error, Result};
use ghost_tasks::{Step, TaskError};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::context::SetupContext;
use crate::extension::{ExtensionRegistry, Migration};
use crate::instance::Instance;
use crate::process::ProcessManagerRegistry;
use crate::ui::Ui;

/// One entry of the global registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredInstance {
    pub name: String,
    pub dir: PathBuf,
}

/// Shared process-wide context
#[derive(Clone)]
pub struct System {
    inner: Arc<Inner>,
}

struct Inner {
    environment: RwLock<Environment>,
    registry: Mutex<ConfigStore>,
    extensions: ExtensionRegistry,
    process_managers: ProcessManagerRegistry,
    ui: Arc<dyn Ui>,
}

impl System {
    /// Build the system around the global config at `global_config`
    pub fn new(
        global_config: impl Into<PathBuf>,
        environment: Environment,
        extensions: ExtensionRegistry,
        ui: Arc<dyn Ui>,
    ) -> Self {
        let mut process_managers = ProcessManagerRegistry::new();
        for extension in extensions.iter() {
            for factory in extension.process_managers() {
                process_managers.register(factory);
            }
        }

        Self {
            inner: Arc::new(Inner {
                environment: RwLock::new(environment),
                registry: Mutex::new(ConfigStore::new(global_config)),
                extensions,
                process_managers,
                ui,
            }),
        }
    }

    pub fn environment(&self) -> Environment {
        *self
            .inner
            .environment
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_development(&self) -> bool {
        self.environment().is_development()
    }

    /// Switch environments, optionally exporting `NODE_ENV` for child processes
    pub fn set_environment(&self, development: bool, set_env_var: bool) {
        let env = Environment::from_dev_flag(development);
        *self
            .inner
            .environment
            .write()
            .unwrap_or_else(PoisonError::into_inner) = env;
        if set_env_var {
            std::env::set_var("NODE_ENV", env.as_str());
        }
    }

    pub fn ui(&self) -> Arc<dyn Ui> {
        self.inner.ui.clone()
    }

    pub fn extensions(&self) -> &ExtensionRegistry {
        &self.inner.extensions
    }

    pub fn process_managers(&self) -> &ProcessManagerRegistry {
        &self.inner.process_managers
    }

    /// Instance rooted at `dir`
    pub fn get_instance(&self, dir: impl Into<PathBuf>) -> Instance {
        Instance::new(dir, self.clone())
    }

    fn registry(&self) -> MutexGuard<'_, ConfigStore> {
        self.inner
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn registry_map(store: &ConfigStore) -> Result<Map<String, Value>> {
        match store.get(keys::INSTANCES)? {
            Some(Value::Object(map)) => Ok(map),
            Some(Value::Null) | None => Ok(Map::new()),
            Some(_) => Err(Error::config(
                keys::INSTANCES,
                format!("{} has an invalid instance registry", store.path().display()),
            )),
        }
    }

    /// Every registered instance, in registration order
    pub fn instances(&self) -> Result<Vec<RegisteredInstance>> {
        let registry = self.registry();
        Ok(Self::registry_map(&registry)?
            .into_iter()
            .filter_map(|(name, entry)| {
                let cwd = entry.get("cwd")?.as_str()?.to_string();
                Some(RegisteredInstance {
                    name,
                    dir: PathBuf::from(cwd),
                })
            })
            .collect())
    }

    /// Look an instance up by registered name
    pub fn find_instance(&self, name: &str) -> Result<Option<Instance>> {
        Ok(self
            .instances()?
            .into_iter()
            .find(|entry| entry.name == name)
            .map(|entry| self.get_instance(entry.dir)))
    }

    /// Name under which `dir` is registered
    pub fn registered_name(&self, dir: &Path) -> Result<Option<String>> {
        Ok(self
            .instances()?
            .into_iter()
            .find(|entry| entry.dir == dir)
            .map(|entry| entry.name))
    }

    pub fn has_instance_dir(&self, dir: &Path) -> Result<bool> {
        Ok(self.registered_name(dir)?.is_some())
    }

    /// First of `name`, `name-1`, `name-2`, ... not yet in the registry
    pub fn dedupe_instance_name(&self, name: &str) -> Result<String> {
        let registry = self.registry();
        let map = Self::registry_map(&registry)?;
        if !map.contains_key(name) {
            return Ok(name.to_string());
        }
        let mut suffix = 1u32;
        loop {
            let candidate = format!("{}-{}", name, suffix);
            if !map.contains_key(&candidate) {
                return Ok(candidate);
            }
            suffix += 1;
        }
    }

    /// Register `instance`, renaming it on collision. Returns the final name.
    pub fn add_instance(&self, instance: &mut Instance) -> Result<String> {
        if let Some(existing) = self.registered_name(instance.dir())? {
            debug!("{:?} already registered as '{}'", instance.dir(), existing);
            return Ok(existing);
        }

        let wanted = instance.name();
        let name = self.dedupe_instance_name(&wanted)?;
        if name != wanted {
            info!("Instance name '{}' is taken, using '{}'", wanted, name);
        }
        instance.set_name(&name)?;
        instance.cli_config_mut().save()?;

        let mut registry = self.registry();
        let mut map = Self::registry_map(&registry)?;
        map.insert(
            name.clone(),
            json!({ "cwd": instance.dir().to_string_lossy() }),
        );
        registry.set(keys::INSTANCES, Value::Object(map))?;
        registry.save()?;
        Ok(name)
    }

    /// Drop the registry entry for `instance`'s directory
    pub fn remove_instance(&self, instance: &Instance) -> Result<()> {
        let Some(name) = self.registered_name(instance.dir())? else {
            return Ok(());
        };

        let mut registry = self.registry();
        let mut map = Self::registry_map(&registry)?;
        map.shift_remove(&name);
        registry.set(keys::INSTANCES, Value::Object(map))?;
        registry.save()
    }

    /// Setup steps contributed by every extension, in discovery order
    pub fn setup_steps(&self) -> std::result::Result<Vec<Step<SetupContext>>, TaskError> {
        let mut steps = Vec::new();
        for extension in self.extensions().iter() {
            let contributed = extension.setup()?;
            debug!(
                "Extension '{}' contributed {} setup step(s)",
                extension.name(),
                contributed.len()
            );
            steps.extend(contributed);
        }
        Ok(steps)
    }

    /// Migrations of every extension, in discovery order
    pub fn migrations(&self) -> std::result::Result<Vec<Migration>, TaskError> {
        let mut migrations = Vec::new();
        for extension in self.extensions().iter() {
            migrations.extend(extension.migrations()?);
        }
        Ok(migrations)
    }

    /// Run every extension's uninstall hook; failures are reported, not fatal
    pub async fn uninstall_hooks(&self, instance: &Instance) -> Vec<(String, anyhow::Error)> {
        let ui = self.ui();
        let mut failures = Vec::new();
        for extension in self.extensions().iter() {
            if let Err(e) = extension.uninstall(instance, ui.as_ref()).await {
                warn!("Extension '{}' uninstall failed: {:#}", extension.name(), e);
                failures.push((extension.name().to_string(), e));
            }
        }
        failures
    }
}

impl std::fmt::Debug for System {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("System")
            .field("environment", &self.environment())
            .field("extensions", &self.inner.extensions)
            .finish()
    }
}
