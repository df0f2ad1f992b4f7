//! Start command

use anyhow::Result;
use ghost_lifecycle::doctor::{doctor_runner, Category, DoctorContext};

use super::Session;
use crate::cli::StartArgs;
use crate::output;

pub async fn run(session: &Session, args: StartArgs) -> Result<()> {
    let ui = session.ui();
    let mut instance = session.instance(args.instance.name.as_deref())?;
    instance.check_environment();

    if instance.is_running().await? {
        ui.info(&format!("Ghost is already running in {}", instance.environment()));
        return Ok(());
    }

    let mut checks = DoctorContext::new(instance, vec![Category::Start]);
    doctor_runner()?.run(&mut checks, ui.renderer()).await?;
    let mut instance = checks.instance;

    let spinner = output::spinner("Starting Ghost");
    let started = instance.start(!args.no_enable).await;
    spinner.finish_and_clear();
    started?;

    let url = instance.url().unwrap_or_default();
    ui.success(&format!("Ghost was started successfully at {}", url));
    Ok(())
}
