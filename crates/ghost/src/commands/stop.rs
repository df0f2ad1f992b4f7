//! Stop command

use anyhow::Result;
use ghost_lifecycle::Instance;
use tracing::debug;

use super::Session;
use crate::cli::StopArgs;
use crate::output;

pub async fn run(session: &Session, args: StopArgs) -> Result<()> {
    let ui = session.ui();
    let disable = !args.no_disable;

    if args.all {
        let mut stopped = 0;
        for entry in session.system.instances()? {
            if !entry.dir.is_dir() {
                debug!("Skipping '{}': {} is missing", entry.name, entry.dir.display());
                continue;
            }
            let mut instance = session.system.get_instance(&entry.dir);
            if instance.is_running().await? {
                stop(&mut instance, disable).await?;
                ui.success(&format!("Stopped '{}'", entry.name));
                stopped += 1;
            }
        }
        if stopped == 0 {
            ui.info("No running Ghost instances found");
        }
        return Ok(());
    }

    let mut instance = session.instance(args.instance.name.as_deref())?;
    if !instance.is_running().await? {
        ui.info("Ghost is already stopped");
        return Ok(());
    }
    stop(&mut instance, disable).await?;
    ui.success("Ghost was stopped");
    Ok(())
}

async fn stop(instance: &mut Instance, disable: bool) -> Result<()> {
    let spinner = output::spinner(&format!("Stopping '{}'", instance.name()));
    let stopped = instance.stop(disable).await;
    spinner.finish_and_clear();
    Ok(stopped?)
}
