//! Uninstall command

use std::io::ErrorKind;

use anyhow::{Context, Result};
use ghost_lifecycle::Instance;
use ghost_tasks::{SkipDecision, Step, TaskError, TaskRunner};
use tracing::debug;

use super::Session;
use crate::cli::UninstallArgs;

/// State for an uninstall run
struct UninstallContext {
    instance: Instance,
}

pub async fn run(session: &Session, args: UninstallArgs) -> Result<()> {
    let ui = session.ui();
    let instance = session.instance(None)?;

    if !args.force {
        ui.warn(
            "Running this command will delete all of your themes, images, data, logs \
             and any other files related to this Ghost instance!",
        );
        if !ui.confirm("Are you sure you want to do this?", false)? {
            ui.info("Uninstall cancelled; pass --force to skip this question");
            return Ok(());
        }
    }

    let mut ctx = UninstallContext { instance };
    uninstall_runner()?.run(&mut ctx, ui.renderer()).await?;
    ui.success("Ghost was uninstalled");
    Ok(())
}

fn uninstall_runner() -> std::result::Result<TaskRunner<UninstallContext>, TaskError> {
    let mut runner = TaskRunner::new();
    runner.extend([
        Step::builder("stop")
            .title("Stopping Ghost")
            .skip(|ctx| Box::pin(skip_stopped(ctx)))
            .task(|ctx, _| Box::pin(stop(ctx)))
            .build()?,
        Step::builder("extensions")
            .title("Removing related configuration")
            .task(|ctx, _| Box::pin(run_hooks(ctx)))
            .build()?,
        Step::builder("files")
            .title("Removing content and files")
            .task(|ctx, _| Box::pin(remove_files(ctx)))
            .build()?,
    ])?;
    Ok(runner)
}

async fn skip_stopped(ctx: &UninstallContext) -> anyhow::Result<SkipDecision> {
    let process = ctx.instance.process_context()?;
    if !ctx.instance.process().is_running(&process).await {
        return Ok("Ghost is not running".into());
    }
    Ok(SkipDecision::Run)
}

async fn stop(ctx: &mut UninstallContext) -> anyhow::Result<()> {
    ctx.instance.stop(true).await?;
    Ok(())
}

async fn run_hooks(ctx: &mut UninstallContext) -> anyhow::Result<()> {
    let system = ctx.instance.system();
    for (extension, err) in system.uninstall_hooks(&ctx.instance).await {
        system
            .ui()
            .warn(&format!("The {} extension could not clean up: {:#}", extension, err));
    }
    Ok(())
}

/// Empty the instance directory, elevating for files owned by another user,
/// and drop the registry entry
async fn remove_files(ctx: &mut UninstallContext) -> anyhow::Result<()> {
    let dir = ctx.instance.dir().to_path_buf();
    let system = ctx.instance.system().clone();

    let entries = std::fs::read_dir(&dir)
        .with_context(|| format!("Failed to read {}", dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        let removed = if path.is_dir() && !path.is_symlink() {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        };
        match removed {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                debug!("Removing {} with elevation", path.display());
                system
                    .ui()
                    .sudo("rm", &["-rf", &path.to_string_lossy()])
                    .await?;
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to remove {}", path.display()))
            }
        }
    }

    system.remove_instance(&ctx.instance)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uninstall_steps_in_order() {
        assert_eq!(uninstall_runner().unwrap().ids(), ["stop", "extensions", "files"]);
    }
}
