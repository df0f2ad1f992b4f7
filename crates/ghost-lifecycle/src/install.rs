//! Install task list

use std::path::PathBuf;

use anyhow::Context;
use ghost_core::config::keys;
use ghost_core::paths::{version_dir, CONTENT_DIR, VERSIONS_DIR};
use ghost_core::CLI_VERSION;
use ghost_tasks::{SkipDecision, Step, TaskError, TaskHandle, TaskRunner};
use tracing::{debug, warn};

use crate::instance::Instance;
use crate::release::{self, Release, ReleaseSource};
use crate::runtime;

/// Content subdirectories created for a fresh instance
pub const CONTENT_DIRS: &[&str] = &["apps", "themes", "images", "logs", "data", "settings"];

/// Options of an install run
#[derive(Debug, Clone, Default)]
pub struct InstallArgs {
    /// Version to install; latest when absent
    pub version: Option<String>,
    /// Install from a local release tarball
    pub archive: Option<PathBuf>,
    /// Skip installing the release's dependencies
    pub no_deps: bool,
}

/// State threaded through one install run
pub struct InstallContext {
    pub instance: Instance,
    pub args: InstallArgs,
    pub source: ReleaseSource,
    /// Filled by the `version` step
    pub release: Option<Release>,
}

impl InstallContext {
    pub fn new(instance: Instance, args: InstallArgs) -> Self {
        let source = match &args.archive {
            Some(path) => ReleaseSource::archive(path),
            None => ReleaseSource::registry(),
        };
        Self {
            instance,
            args,
            source,
            release: None,
        }
    }

    /// The resolved release; only valid after the `version` step
    pub fn release(&self) -> anyhow::Result<&Release> {
        self.release.as_ref().context("No release resolved yet")
    }

    fn release_dir(&self) -> anyhow::Result<PathBuf> {
        let release = self.release()?;
        Ok(version_dir(self.instance.dir(), &release.version.to_string()))
    }
}

/// Compose the install task list
pub fn install_runner() -> Result<TaskRunner<InstallContext>, TaskError> {
    let mut runner = TaskRunner::new();
    runner.extend([
        Step::builder("version")
            .title("Resolving the version to install")
            .task(|ctx, _| Box::pin(resolve_version(ctx)))
            .build()?,
        Step::builder("directories")
            .title("Creating directory structure")
            .task(|ctx, _| Box::pin(create_directories(ctx)))
            .build()?,
        Step::builder("download")
            .title("Downloading and extracting Ghost")
            .skip(|ctx| Box::pin(skip_download(ctx)))
            .task(|ctx, _| Box::pin(download(ctx)))
            .build()?,
        Step::builder("dependencies")
            .title("Installing dependencies")
            .enabled(|ctx: &InstallContext| !ctx.args.no_deps)
            .skip(|ctx| Box::pin(skip_dependencies(ctx)))
            .task(|ctx, task| Box::pin(dependencies(ctx, task)))
            .build()?,
        Step::builder("link")
            .title("Linking Ghost and recording versions")
            .task(|ctx, _| Box::pin(link(ctx)))
            .build()?,
    ])?;
    Ok(runner)
}

async fn resolve_version(ctx: &mut InstallContext) -> anyhow::Result<()> {
    let release = ctx.source.resolve(ctx.args.version.as_deref()).await?;

    if let Ok(node) = runtime::node_version().await {
        runtime::check_supported(&node, release.engines.as_deref())?;
    }

    debug!("Installing Ghost {}", release.version);
    ctx.release = Some(release);
    Ok(())
}

async fn create_directories(ctx: &mut InstallContext) -> anyhow::Result<()> {
    let dir = ctx.instance.dir();
    std::fs::create_dir_all(dir.join(VERSIONS_DIR))?;
    let content = dir.join(CONTENT_DIR);
    for sub in CONTENT_DIRS {
        std::fs::create_dir_all(content.join(sub))
            .with_context(|| format!("Failed to create {}", content.join(sub).display()))?;
    }
    Ok(())
}

async fn skip_download(ctx: &InstallContext) -> anyhow::Result<SkipDecision> {
    let release = ctx.release()?;
    if ctx.release_dir()?.join("package.json").is_file() {
        return Ok(format!("Ghost {} is already downloaded", release.version).into());
    }
    Ok(SkipDecision::Run)
}

async fn download(ctx: &mut InstallContext) -> anyhow::Result<()> {
    let release = ctx.release()?.clone();
    let dest = ctx.release_dir()?;
    if let Err(e) = ctx.source.fetch(&release, &dest).await {
        if let Err(cleanup) = std::fs::remove_dir_all(&dest) {
            warn!("Failed to clean up {}: {}", dest.display(), cleanup);
        }
        return Err(e.into());
    }
    Ok(())
}

async fn skip_dependencies(ctx: &InstallContext) -> anyhow::Result<SkipDecision> {
    if ctx.release_dir()?.join("node_modules").is_dir() {
        return Ok("Dependencies already installed".into());
    }
    Ok(SkipDecision::Run)
}

async fn dependencies(ctx: &mut InstallContext, task: &mut TaskHandle) -> anyhow::Result<()> {
    let dir = ctx.release_dir()?;
    if !dir.join("package.json").is_file() {
        return task.skip("Release has no package.json");
    }
    release::install_dependencies(&dir).await?;
    Ok(())
}

async fn link(ctx: &mut InstallContext) -> anyhow::Result<()> {
    let version = ctx.release()?.version.clone();
    release::link_current(ctx.instance.dir(), &version)?;

    let runtime = runtime::node_version().await.ok();
    ctx.instance.activate(&version)?;
    let cli_config = ctx.instance.cli_config_mut();
    cli_config.set(keys::CLI_VERSION, CLI_VERSION)?;
    if let Some(runtime) = runtime {
        cli_config.set(keys::RUNTIME_VERSION, runtime.to_string())?;
    }
    cli_config.save()?;
    Ok(())
}
