//! Restart command

use anyhow::Result;

use super::Session;
use crate::cli::NameArgs;
use crate::output;

pub async fn run(session: &Session, args: NameArgs) -> Result<()> {
    let ui = session.ui();
    let mut instance = session.instance(args.name.as_deref())?;

    let spinner = output::spinner("Restarting Ghost");
    let restarted = if instance.is_running().await? {
        instance.restart().await
    } else {
        spinner.suspend(|| ui.info("Ghost is not running, starting it"));
        instance.check_environment();
        instance.start(false).await
    };
    spinner.finish_and_clear();
    restarted?;

    ui.success("Ghost was restarted");
    Ok(())
}
