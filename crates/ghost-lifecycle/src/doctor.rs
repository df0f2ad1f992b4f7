//! Environment checks
//!
//! Each check is a step tagged with the categories it belongs to, so
//! `doctor`, `install` and `start` run the same checks through the task
//! runner and render them like any other step.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use ghost_core::config::keys;
use ghost_core::paths::CLI_CONFIG_FILE;
use ghost_core::{Error, Result};
use ghost_tasks::{SkipDecision, Step, TaskError, TaskHandle, TaskRunner};
use walkdir::WalkDir;

use crate::instance::Instance;
use crate::process::{port_in_use, port_taken};
use crate::runtime;

/// Groups of checks relevant to one command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Install,
    Start,
    Setup,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Install, Category::Start, Category::Setup];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Start => "start",
            Self::Setup => "setup",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "install" => Ok(Self::Install),
            "start" => Ok(Self::Start),
            "setup" => Ok(Self::Setup),
            other => Err(Error::cli(format!("Unknown doctor category: {}", other))
                .with_help("Categories are install, start and setup")),
        }
    }
}

/// State for a doctor run
pub struct DoctorContext {
    pub instance: Instance,
    pub categories: Vec<Category>,
}

impl DoctorContext {
    pub fn new(instance: Instance, categories: Vec<Category>) -> Self {
        let categories = if categories.is_empty() {
            Category::ALL.to_vec()
        } else {
            categories
        };
        Self {
            instance,
            categories,
        }
    }

    fn wants(&self, categories: &[Category]) -> bool {
        categories.iter().any(|c| self.categories.contains(c))
    }
}

/// Compose the check list
pub fn doctor_runner() -> std::result::Result<TaskRunner<DoctorContext>, TaskError> {
    let mut runner = TaskRunner::new();
    runner.extend([
        Step::builder("node-version")
            .title("Checking Node.js version")
            .enabled(|ctx: &DoctorContext| {
                ctx.wants(&[Category::Install, Category::Start, Category::Setup])
            })
            .task(|_, _| Box::pin(check_node()))
            .build()?,
        Step::builder("install-directory")
            .title("Checking install directory")
            .enabled(|ctx: &DoctorContext| ctx.wants(&[Category::Install]))
            .task(|ctx, _| Box::pin(check_install_directory(ctx)))
            .build()?,
        Step::builder("validate-config")
            .title("Validating config")
            .enabled(|ctx: &DoctorContext| ctx.wants(&[Category::Start]))
            .skip(|ctx| Box::pin(skip_without_instance(ctx)))
            .task(|ctx, _| Box::pin(validate_config(ctx)))
            .build()?,
        Step::builder("port")
            .title("Checking port availability")
            .enabled(|ctx: &DoctorContext| ctx.wants(&[Category::Start]))
            .skip(|ctx| Box::pin(skip_without_instance(ctx)))
            .task(|ctx, task| Box::pin(check_port(ctx, task)))
            .build()?,
        Step::builder("content-folder")
            .title("Checking content folder")
            .enabled(|ctx: &DoctorContext| ctx.wants(&[Category::Start]))
            .skip(|ctx| Box::pin(skip_without_instance(ctx)))
            .task(|ctx, _| Box::pin(check_content(ctx)))
            .build()?,
        Step::builder("process-manager")
            .title("Checking process manager")
            .enabled(|ctx: &DoctorContext| ctx.wants(&[Category::Start, Category::Setup]))
            .skip(|ctx| Box::pin(skip_without_instance(ctx)))
            .task(|ctx, _| Box::pin(check_process_manager(ctx)))
            .build()?,
    ])?;
    Ok(runner)
}

async fn check_node() -> anyhow::Result<()> {
    let version = runtime::node_version().await?;
    runtime::check_supported(&version, None)?;
    Ok(())
}

async fn check_install_directory(ctx: &mut DoctorContext) -> anyhow::Result<()> {
    install_directory(ctx.instance.dir())?;
    Ok(())
}

/// The install directory must be writable and empty apart from dotfiles
pub fn install_directory(dir: &Path) -> Result<()> {
    if !dir.exists() {
        std::fs::create_dir_all(dir).map_err(|e| {
            Error::system(format!("Cannot create {}: {}", dir.display(), e))
        })?;
    }

    let unexpected: Vec<String> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .filter(|name| !name.starts_with('.') || name == CLI_CONFIG_FILE)
        .collect();
    if !unexpected.is_empty() {
        return Err(Error::system(format!(
            "Install directory {} is not empty",
            dir.display()
        ))
        .with_help("Ghost must be installed into an empty directory"));
    }

    tempfile::tempfile_in(dir).map_err(|e| {
        Error::system(format!("Install directory {} is not writable: {}", dir.display(), e))
            .with_help("Check the directory permissions, or choose a directory you own")
    })?;
    Ok(())
}

async fn skip_without_instance(ctx: &DoctorContext) -> anyhow::Result<SkipDecision> {
    if !ctx.instance.dir().join(CLI_CONFIG_FILE).is_file() {
        return Ok("Not inside a Ghost instance".into());
    }
    Ok(SkipDecision::Run)
}

async fn validate_config(ctx: &mut DoctorContext) -> anyhow::Result<()> {
    validate_instance_config(&ctx.instance)?;
    Ok(())
}

/// The active config must exist with a parseable url and a usable port
pub fn validate_instance_config(instance: &Instance) -> Result<()> {
    let config = instance.config();
    if !config.exists() {
        return Err(Error::config(
            keys::URL,
            format!("Config file {} not found", config.path().display()),
        )
        .with_help("Run `ghost setup` or `ghost config` to create it"));
    }

    let url = config
        .get_string(keys::URL)?
        .ok_or_else(|| Error::config(keys::URL, "No url configured"))?;
    url::Url::parse(&url)
        .map_err(|e| Error::config(keys::URL, format!("Invalid url '{}': {}", url, e)))?;

    match config.get(keys::SERVER_PORT)? {
        None => Ok(()),
        Some(port) => match port.as_u64() {
            Some(p) if (1..=65535).contains(&p) => Ok(()),
            _ => Err(Error::config(
                keys::SERVER_PORT,
                format!("Invalid port {}", port),
            )),
        },
    }
}

async fn check_port(ctx: &mut DoctorContext, task: &mut TaskHandle) -> anyhow::Result<()> {
    if ctx.instance.is_running().await? {
        return task.skip("Ghost is already running");
    }
    port_available(&ctx.instance).await?;
    Ok(())
}

/// Nothing else may be listening on the configured host and port
pub async fn port_available(instance: &Instance) -> Result<()> {
    let process = instance.process_context()?;
    if port_in_use(&process.host, process.port).await {
        return Err(port_taken(&process.host, process.port));
    }
    Ok(())
}

async fn check_content(ctx: &mut DoctorContext) -> anyhow::Result<()> {
    let content = ctx.instance.content_path()?;
    if !content.is_dir() {
        return Err(Error::system(format!(
            "Content folder {} does not exist",
            content.display()
        ))
        .into());
    }

    for entry in WalkDir::new(&content).max_depth(3) {
        if let Err(e) = entry {
            return Err(Error::system(format!("Content folder is not readable: {}", e))
                .with_help("Make sure the content folder is owned by the user running Ghost")
                .into());
        }
    }
    Ok(())
}

async fn check_process_manager(ctx: &mut DoctorContext) -> anyhow::Result<()> {
    let name = ctx.instance.process_name();
    if let Err(reason) = ctx.instance.system().process_managers().check(&name) {
        return Err(Error::system(format!(
            "Process manager '{}' cannot be used because {}",
            name, reason
        ))
        .with_help("Run `ghost config --process local` to use the local process manager")
        .into());
    }
    Ok(())
}
