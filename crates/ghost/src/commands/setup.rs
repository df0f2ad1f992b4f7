//! Setup command

use anyhow::Result;
use ghost_lifecycle::setup::setup_runner;
use ghost_lifecycle::SetupContext;

use super::Session;
use crate::cli::SetupCommandArgs;

pub async fn run(session: &Session, args: SetupCommandArgs) -> Result<()> {
    let ui = session.ui();
    let mut instance = session.instance(None)?;
    instance.check_environment();

    let mut setup_args = args.setup.to_setup_args();
    setup_args.stages.extend(args.steps);

    let runner = setup_runner(&session.system, &setup_args)?;
    let mut ctx = SetupContext::new(session.system.clone(), instance, setup_args);
    let report = runner.run(&mut ctx, ui.renderer()).await?;

    if report.completed().is_empty() {
        ui.info("Nothing to set up");
    } else {
        ui.success("Setup complete");
    }
    Ok(())
}
