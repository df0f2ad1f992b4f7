//! Update command

use anyhow::Result;
use ghost_core::Error;
use ghost_lifecycle::update::{
    prune, rollback_runner, update_runner, wants_rollback, UpdateArgs as UpdateOptions,
    UpdateContext,
};
use ghost_lifecycle::{SetupArgs, SetupContext, Ui};
use ghost_tasks::TaskError;
use tracing::debug;

use super::Session;
use crate::cli::UpdateArgs;

pub async fn run(session: &Session, args: UpdateArgs) -> Result<()> {
    let ui = session.ui();
    let mut instance = session.instance(None)?;
    instance.check_environment();

    let options = UpdateOptions {
        version: args.target.clone(),
        force: args.force,
        archive: args.archive.clone(),
        no_deps: args.no_deps,
    };
    let setup = SetupContext::new(session.system.clone(), instance, SetupArgs::default());
    let mut ctx = UpdateContext::new(setup, options);

    if args.rollback {
        return rollback(&mut ctx, ui.as_ref()).await;
    }

    if !ctx.prepare().await? {
        ui.info("Ghost is already up to date; pass --force to reinstall");
        return Ok(());
    }
    let version = ctx.release()?.version.clone();

    match update_runner()?.run(&mut ctx, ui.renderer()).await {
        Ok(_) => {}
        Err(err) if wants_rollback(&err) => return offer_rollback(&mut ctx, ui.as_ref(), err).await,
        Err(err) => return Err(err.into()),
    }

    let pruned = prune(&ctx)?;
    debug!("Pruned old versions: {:?}", pruned);
    ui.success(&format!("Ghost was updated to {}", version));
    Ok(())
}

/// Explicit `update --rollback`
async fn rollback(ctx: &mut UpdateContext, ui: &dyn Ui) -> Result<()> {
    let instance = &mut ctx.setup.instance;
    let Some(previous) = instance.previous_version()? else {
        return Err(Error::cli("No previous version found")
            .with_help("Rollback is only available after an update")
            .into());
    };
    ctx.was_running = instance.is_running().await?;

    rollback_runner()?.run(ctx, ui.renderer()).await?;
    ui.success(&format!("Ghost was rolled back to {}", previous));
    Ok(())
}

/// The new release failed to boot: offer to go back, then report the
/// original failure either way
async fn offer_rollback(ctx: &mut UpdateContext, ui: &dyn Ui, err: TaskError) -> Result<()> {
    if let Some(cause) = err.cause() {
        ui.warn(&format!("Ghost failed to start after the update: {:#}", cause));
    }
    if !ui.confirm("Do you want to roll back to the previous version?", true)? {
        return Err(err.into());
    }

    rollback_runner()?.run(ctx, ui.renderer()).await?;
    ui.warn("Ghost was rolled back to the previous version");
    Err(err.into())
}
