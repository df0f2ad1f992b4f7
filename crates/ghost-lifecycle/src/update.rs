//! Update and rollback task lists
//!
//! An update downloads the target release next to the active one, stops the
//! instance, relinks `current`, runs pending migrations and starts it again.
//! When the application itself fails to boot after the relink, the caller
//! may run the rollback list to go back to the previous release.

use std::path::PathBuf;

use anyhow::Context;
use ghost_core::paths::version_dir;
use ghost_tasks::{SkipDecision, Step, TaskError, TaskRunner};
use semver::Version;
use tracing::{debug, info};

use crate::context::SetupContext;
use crate::release::{self, Release, ReleaseSource, KEEP_VERSIONS};
use crate::setup::{pending_migrations, run_migrations};

/// Options of an update run
#[derive(Debug, Clone, Default)]
pub struct UpdateArgs {
    /// Target version; latest when absent
    pub version: Option<String>,
    /// Reinstall even when the target is already active
    pub force: bool,
    /// Update from a local release tarball
    pub archive: Option<PathBuf>,
    /// Skip installing the release's dependencies
    pub no_deps: bool,
}

/// State threaded through an update or rollback run
pub struct UpdateContext {
    /// System, instance and the values bag migrations run against
    pub setup: SetupContext,
    pub args: UpdateArgs,
    pub source: ReleaseSource,
    /// Release being updated to
    pub release: Option<Release>,
    /// Whether the instance was running when the update began
    pub was_running: bool,
}

impl UpdateContext {
    pub fn new(setup: SetupContext, args: UpdateArgs) -> Self {
        let source = match &args.archive {
            Some(path) => ReleaseSource::archive(path),
            None => ReleaseSource::registry(),
        };
        Self {
            setup,
            args,
            source,
            release: None,
            was_running: false,
        }
    }

    pub fn release(&self) -> anyhow::Result<&Release> {
        self.release.as_ref().context("No target release resolved")
    }

    fn release_dir(&self) -> anyhow::Result<PathBuf> {
        let version = self.release()?.version.to_string();
        Ok(version_dir(self.setup.instance.dir(), &version))
    }

    /// Resolve the target release and record the current running state.
    ///
    /// Returns `false` when the target is already active and `--force` was
    /// not given, meaning there is nothing to do.
    pub async fn prepare(&mut self) -> anyhow::Result<bool> {
        let release = self.source.resolve(self.args.version.as_deref()).await?;
        let active = self.setup.instance.version()?;
        if active.as_ref() == Some(&release.version) && !self.args.force {
            info!("Ghost {} is already the active version", release.version);
            return Ok(false);
        }
        if let Some(active) = &active {
            if release.version < *active && !self.args.force {
                anyhow::bail!(
                    "Ghost {} is older than the active version {}; pass --force to downgrade",
                    release.version,
                    active
                );
            }
        }

        self.was_running = self.setup.instance.is_running().await?;
        debug!(
            "Updating {:?} -> {} (running: {})",
            active, release.version, self.was_running
        );
        self.release = Some(release);
        Ok(true)
    }
}

/// Compose the update task list
pub fn update_runner() -> Result<TaskRunner<UpdateContext>, TaskError> {
    let mut runner = TaskRunner::new();
    runner.extend([
        Step::builder("download")
            .title("Downloading and updating Ghost")
            .skip(|ctx| Box::pin(skip_download(ctx)))
            .task(|ctx, _| Box::pin(download(ctx)))
            .build()?,
        Step::builder("dependencies")
            .title("Installing dependencies")
            .enabled(|ctx: &UpdateContext| !ctx.args.no_deps)
            .skip(|ctx| Box::pin(skip_dependencies(ctx)))
            .task(|ctx, _| Box::pin(dependencies(ctx)))
            .build()?,
        Step::builder("stop")
            .title("Stopping Ghost")
            .enabled(|ctx: &UpdateContext| ctx.was_running)
            .task(|ctx, _| Box::pin(stop(ctx)))
            .build()?,
        Step::builder("link")
            .title("Linking latest Ghost and recording versions")
            .task(|ctx, _| Box::pin(link(ctx)))
            .build()?,
        Step::builder("migrate")
            .title("Running migrations")
            .skip(|ctx| Box::pin(skip_migrate(ctx)))
            .task(|ctx, _| Box::pin(migrate(ctx)))
            .build()?,
        Step::builder("start")
            .title("Restarting Ghost")
            .enabled(|ctx: &UpdateContext| ctx.was_running)
            .task(|ctx, _| Box::pin(start(ctx)))
            .build()?,
    ])?;
    Ok(runner)
}

/// Compose the rollback task list
pub fn rollback_runner() -> Result<TaskRunner<UpdateContext>, TaskError> {
    let mut runner = TaskRunner::new();
    runner.extend([
        Step::builder("stop")
            .title("Stopping Ghost")
            .skip(|ctx| Box::pin(skip_stopped(ctx)))
            .task(|ctx, _| Box::pin(stop(ctx)))
            .build()?,
        Step::builder("rollback")
            .title("Rolling back to the previous version")
            .task(|ctx, _| Box::pin(swap_back(ctx)))
            .build()?,
        Step::builder("start")
            .title("Restarting Ghost")
            .enabled(|ctx: &UpdateContext| ctx.was_running)
            .task(|ctx, _| Box::pin(start(ctx)))
            .build()?,
    ])?;
    Ok(runner)
}

/// Whether a failed update should offer a rollback.
///
/// Only when the new release was already linked and the application itself
/// reported the failure.
pub fn wants_rollback(err: &TaskError) -> bool {
    let TaskError::Aborted(abort) = err else {
        return false;
    };
    abort.completed.iter().any(|id| id == "link")
        && abort
            .failure
            .source
            .chain()
            .find_map(|e| e.downcast_ref::<ghost_core::Error>())
            .is_some_and(ghost_core::Error::is_application)
}

/// Remove old releases after a successful update
pub fn prune(ctx: &UpdateContext) -> anyhow::Result<Vec<Version>> {
    let instance = &ctx.setup.instance;
    let protect: Vec<Version> = [instance.version()?, instance.previous_version()?]
        .into_iter()
        .flatten()
        .collect();
    Ok(release::prune_versions(instance.dir(), KEEP_VERSIONS, &protect)?)
}

async fn skip_download(ctx: &UpdateContext) -> anyhow::Result<SkipDecision> {
    if ctx.release_dir()?.join("package.json").is_file() && !ctx.args.force {
        return Ok(format!("Ghost {} is already downloaded", ctx.release()?.version).into());
    }
    Ok(SkipDecision::Run)
}

async fn download(ctx: &mut UpdateContext) -> anyhow::Result<()> {
    let release = ctx.release()?.clone();
    let dest = ctx.release_dir()?;
    ctx.source.fetch(&release, &dest).await?;
    Ok(())
}

async fn skip_dependencies(ctx: &UpdateContext) -> anyhow::Result<SkipDecision> {
    if ctx.release_dir()?.join("node_modules").is_dir() {
        return Ok("Dependencies already installed".into());
    }
    Ok(SkipDecision::Run)
}

async fn dependencies(ctx: &mut UpdateContext) -> anyhow::Result<()> {
    release::install_dependencies(&ctx.release_dir()?).await?;
    Ok(())
}

async fn skip_stopped(ctx: &UpdateContext) -> anyhow::Result<SkipDecision> {
    let instance = &ctx.setup.instance;
    let process = instance.process_context()?;
    if !instance.process().is_running(&process).await {
        return Ok("Ghost is not running".into());
    }
    Ok(SkipDecision::Run)
}

async fn stop(ctx: &mut UpdateContext) -> anyhow::Result<()> {
    ctx.setup.instance.stop(false).await?;
    Ok(())
}

async fn link(ctx: &mut UpdateContext) -> anyhow::Result<()> {
    let version = ctx.release()?.version.clone();
    let instance = &mut ctx.setup.instance;
    release::link_current(instance.dir(), &version)?;
    instance.activate(&version)?;
    instance.cli_config_mut().save()?;
    Ok(())
}

async fn skip_migrate(ctx: &UpdateContext) -> anyhow::Result<SkipDecision> {
    if pending_migrations(&ctx.setup.system, &ctx.setup.instance)?.is_empty() {
        return Ok("No migrations to run".into());
    }
    Ok(SkipDecision::Run)
}

async fn migrate(ctx: &mut UpdateContext) -> anyhow::Result<()> {
    run_migrations(&mut ctx.setup).await?;
    Ok(())
}

async fn start(ctx: &mut UpdateContext) -> anyhow::Result<()> {
    ctx.setup.instance.start(false).await?;
    Ok(())
}

async fn swap_back(ctx: &mut UpdateContext) -> anyhow::Result<()> {
    let instance = &mut ctx.setup.instance;
    let previous = instance.swap_versions()?;
    release::link_current(instance.dir(), &previous)?;
    instance.cli_config_mut().save()?;
    info!("Rolled back to Ghost {}", previous);
    Ok(())
}
