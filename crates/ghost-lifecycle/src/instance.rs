//! The per-installation aggregate
//!
//! An [`Instance`] ties together the tool-internal `.ghost-cli` store, the
//! environment-scoped application config and the process manager named in
//! that config. Running state is cached in `.ghost-cli` under `running` and
//! reconciled against the process manager on every [`Instance::is_running`].

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use ghost_core::config::keys;
use ghost_core::paths::{CLI_CONFIG_FILE, CONTENT_DIR};
use ghost_core::{ConfigStore, Environment, Error, Result};
use semver::Version;
use serde::Serialize;
use tracing::{debug, info};

use crate::process::{
    ProcessContext, ProcessManager, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_RUN_COMMAND,
    DEFAULT_START_TIMEOUT, LOCAL,
};
use crate::system::System;

/// One installed deployment of the application
pub struct Instance {
    dir: PathBuf,
    system: System,
    cli_config: ConfigStore,
    production: ConfigStore,
    development: ConfigStore,
    process: Mutex<Option<(String, Arc<dyn ProcessManager>)>>,
}

/// Flattened view of an instance for listings
#[derive(Debug, Clone, Serialize)]
pub struct InstanceSummary {
    pub name: String,
    pub dir: PathBuf,
    pub version: Option<String>,
    pub running: bool,
    pub environment: Option<Environment>,
    pub url: Option<String>,
    pub port: Option<u16>,
    pub process: Option<String>,
}

impl Instance {
    pub fn new(dir: impl Into<PathBuf>, system: System) -> Self {
        let dir = dir.into();
        Self {
            cli_config: ConfigStore::new(dir.join(CLI_CONFIG_FILE)),
            production: ConfigStore::new(Environment::Production.config_path(&dir)),
            development: ConfigStore::new(Environment::Development.config_path(&dir)),
            process: Mutex::new(None),
            dir,
            system,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn system(&self) -> &System {
        &self.system
    }

    /// Environment the instance is currently addressed in
    pub fn environment(&self) -> Environment {
        self.system.environment()
    }

    /// Tool-internal state (`.ghost-cli`)
    pub fn cli_config(&self) -> &ConfigStore {
        &self.cli_config
    }

    pub fn cli_config_mut(&mut self) -> &mut ConfigStore {
        &mut self.cli_config
    }

    /// Application config for the active environment
    pub fn config(&self) -> &ConfigStore {
        match self.environment() {
            Environment::Production => &self.production,
            Environment::Development => &self.development,
        }
    }

    pub fn config_mut(&mut self) -> &mut ConfigStore {
        match self.environment() {
            Environment::Production => &mut self.production,
            Environment::Development => &mut self.development,
        }
    }

    /// Stored name, else derived from the url host, else the directory name
    pub fn name(&self) -> String {
        if let Ok(Some(name)) = self.cli_config.get_string(keys::NAME) {
            return name;
        }
        if let Some(host) = self.url().as_deref().and_then(url_host) {
            return host.replace('.', "-");
        }
        self.dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "ghost".to_string())
    }

    pub fn set_name(&mut self, name: &str) -> Result<()> {
        self.cli_config.set(keys::NAME, name)?;
        Ok(())
    }

    pub fn url(&self) -> Option<String> {
        self.config().get_string(keys::URL).ok().flatten()
    }

    fn version_key(&self, key: &str) -> Result<Option<Version>> {
        match self.cli_config.get_string(key)? {
            Some(raw) => Version::parse(raw.trim_start_matches('v'))
                .map(Some)
                .map_err(|e| Error::config(key, format!("Invalid version '{}': {}", raw, e))),
            None => Ok(None),
        }
    }

    /// Release currently linked as `current`
    pub fn version(&self) -> Result<Option<Version>> {
        self.version_key(keys::ACTIVE_VERSION)
    }

    /// Release that was active before the last update
    pub fn previous_version(&self) -> Result<Option<Version>> {
        self.version_key(keys::PREVIOUS_VERSION)
    }

    /// CLI version that last ran setup or migrations here
    pub fn cli_version(&self) -> Result<Option<Version>> {
        self.version_key(keys::CLI_VERSION)
    }

    /// Runtime version recorded at install time
    pub fn runtime_version(&self) -> Result<Option<String>> {
        self.cli_config.get_string(keys::RUNTIME_VERSION)
    }

    /// Record `version` as active, keeping the old one as previous.
    /// Not saved.
    pub fn activate(&mut self, version: &Version) -> Result<()> {
        let current = self.cli_config.get_string(keys::ACTIVE_VERSION)?;
        match current {
            Some(current) if current != version.to_string() => {
                self.cli_config.set(keys::PREVIOUS_VERSION, current)?;
            }
            _ => {}
        }
        self.cli_config.set(keys::ACTIVE_VERSION, version.to_string())?;
        Ok(())
    }

    /// Swap active and previous versions, returning the new active one
    pub fn swap_versions(&mut self) -> Result<Version> {
        let previous = self.previous_version()?.ok_or_else(|| {
            Error::cli("No previous version found")
                .with_help("Rollback is only available after an update")
        })?;
        let active = self.cli_config.get_string(keys::ACTIVE_VERSION)?;
        self.cli_config.set(keys::ACTIVE_VERSION, previous.to_string())?;
        if let Some(active) = active {
            self.cli_config.set(keys::PREVIOUS_VERSION, active)?;
        } else {
            self.cli_config.unset(keys::PREVIOUS_VERSION)?;
        }
        Ok(previous)
    }

    /// Whether the instance is present in the global registry
    pub fn is_setup(&self) -> Result<bool> {
        self.system.has_instance_dir(&self.dir)
    }

    /// Name of the configured process manager
    pub fn process_name(&self) -> String {
        self.config()
            .get_string(keys::PROCESS)
            .ok()
            .flatten()
            .unwrap_or_else(|| LOCAL.to_string())
    }

    /// The process manager for the configured name, recreated when it changes
    pub fn process(&self) -> Arc<dyn ProcessManager> {
        let name = self.process_name();
        let mut cached = self.process.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((cached_name, manager)) = cached.as_ref() {
            if *cached_name == name {
                return manager.clone();
            }
        }

        let resolved = self
            .system
            .process_managers()
            .resolve(&name, self.system.ui());
        *cached = Some((name, resolved.manager.clone()));
        resolved.manager
    }

    /// Run settings for the process manager, read from the active config
    pub fn process_context(&self) -> Result<ProcessContext> {
        let config = self.config();
        let mut ctx = ProcessContext::new(self.name(), &self.dir, self.environment());

        let host = config
            .get_string(keys::SERVER_HOST)?
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        ctx.host = match host.as_str() {
            "0.0.0.0" | "::" => DEFAULT_HOST.to_string(),
            _ => host,
        };
        ctx.port = config.get_as::<u16>(keys::SERVER_PORT)?.unwrap_or(DEFAULT_PORT);
        ctx.command = config
            .get_string(keys::RUN_COMMAND)?
            .unwrap_or_else(|| DEFAULT_RUN_COMMAND.to_string());
        ctx.start_timeout = config
            .get_as::<u64>(keys::START_TIMEOUT)?
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_START_TIMEOUT);
        Ok(ctx)
    }

    /// Directory holding themes, images, data and logs
    pub fn content_path(&self) -> Result<PathBuf> {
        Ok(match self.config().get_string(keys::CONTENT_PATH)? {
            Some(path) => self.dir.join(path),
            None => self.dir.join(CONTENT_DIR),
        })
    }

    /// Log file the application writes for the active environment
    pub fn log_file(&self, errors_only: bool) -> Result<PathBuf> {
        let url = self.url().ok_or_else(|| {
            Error::config(keys::URL, "No url configured").with_help("Run `ghost setup` first")
        })?;
        let stem: String = url
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
            .collect();
        let suffix = if errors_only { ".error.log" } else { ".log" };
        Ok(self
            .content_path()?
            .join("logs")
            .join(format!("{}_{}{}", stem, self.environment(), suffix)))
    }

    /// If asked for production but only a development config exists,
    /// switch to development. Returns whether the environment changed.
    pub fn check_environment(&mut self) -> bool {
        let env = self.environment();
        if env == Environment::Production
            && !self.production.exists()
            && self.development.exists()
        {
            info!("Found a development config only, running in development");
            self.system.set_environment(true, true);
            return true;
        }
        false
    }

    /// Environment recorded as running in `.ghost-cli`
    pub fn running_environment(&self) -> Result<Option<Environment>> {
        match self.cli_config.get_string(keys::RUNNING)? {
            Some(env) => Ok(env.parse().ok()),
            None => Ok(None),
        }
    }

    /// Whether the application is running, reconciling the cached flag
    pub async fn is_running(&mut self) -> Result<bool> {
        let cached = self.cli_config.get_string(keys::RUNNING)?;

        let Some(cached) = cached else {
            let previous = self.environment();
            for env in Environment::ALL {
                if !env.config_path(&self.dir).exists() {
                    continue;
                }
                self.system.set_environment(env.is_development(), false);
                let ctx = self.process_context()?;
                if self.process().is_running(&ctx).await {
                    debug!("Found {} running in {}", self.name(), env);
                    self.cli_config.set(keys::RUNNING, env.as_str())?;
                    self.cli_config.save()?;
                    return Ok(true);
                }
            }
            self.system.set_environment(previous.is_development(), false);
            return Ok(false);
        };

        match cached.parse::<Environment>() {
            Ok(env) => {
                self.system.set_environment(env.is_development(), false);
                let ctx = self.process_context()?;
                if self.process().is_running(&ctx).await {
                    return Ok(true);
                }
            }
            Err(_) => debug!("Ignoring unknown running environment '{}'", cached),
        }

        debug!("Clearing stale running flag for {}", self.name());
        self.cli_config.unset(keys::RUNNING)?;
        self.cli_config.save()?;
        Ok(false)
    }

    /// Start through the process manager and record the running environment
    pub async fn start(&mut self, enable: bool) -> Result<()> {
        let manager = self.process();
        let ctx = self.process_context()?;

        manager.start(&ctx).await?;
        self.cli_config.set(keys::RUNNING, ctx.environment.as_str())?;
        self.cli_config.save()?;

        if enable && !manager.is_enabled(&ctx).await? {
            manager.enable(&ctx).await?;
        }
        Ok(())
    }

    /// Stop through the process manager and clear the running flag
    pub async fn stop(&mut self, disable: bool) -> Result<()> {
        let manager = self.process();
        let ctx = self.process_context()?;

        manager.stop(&ctx).await?;
        self.cli_config.unset(keys::RUNNING)?;
        self.cli_config.save()?;

        if disable && manager.is_enabled(&ctx).await? {
            manager.disable(&ctx).await?;
        }
        Ok(())
    }

    pub async fn restart(&mut self) -> Result<()> {
        let manager = self.process();
        let ctx = self.process_context()?;

        manager.restart(&ctx).await?;
        self.cli_config.set(keys::RUNNING, ctx.environment.as_str())?;
        self.cli_config.save()?;
        Ok(())
    }

    /// Snapshot for `ls`; a missing directory yields a bare summary
    pub async fn summary(&mut self) -> Result<InstanceSummary> {
        if !self.dir.exists() {
            return Ok(InstanceSummary {
                name: self.name(),
                dir: self.dir.clone(),
                version: None,
                running: false,
                environment: None,
                url: None,
                port: None,
                process: None,
            });
        }

        let running = self.is_running().await?;
        Ok(InstanceSummary {
            name: self.name(),
            dir: self.dir.clone(),
            version: self.version()?.map(|v| v.to_string()),
            running,
            environment: running.then(|| self.environment()),
            url: self.url(),
            port: self.config().get_as::<u16>(keys::SERVER_PORT)?,
            process: Some(self.process_name()),
        })
    }
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("dir", &self.dir)
            .field("environment", &self.environment())
            .finish()
    }
}

/// Host part of a url, if it parses
pub fn url_host(raw: &str) -> Option<String> {
    url::Url::parse(raw)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
}
