//! Install command

use anyhow::Result;
use ghost_lifecycle::doctor::{doctor_runner, Category, DoctorContext};
use ghost_lifecycle::install::{install_runner, InstallArgs as InstallOptions, InstallContext};
use ghost_lifecycle::setup::setup_runner;
use ghost_lifecycle::SetupContext;
use tracing::debug;

use super::Session;
use crate::cli::InstallArgs;

pub async fn run(session: &Session, args: InstallArgs) -> Result<()> {
    let ui = session.ui();
    let system = &session.system;
    debug!("Installing into {}", session.dir.display());

    let mut checks = DoctorContext::new(system.get_instance(&session.dir), vec![Category::Install]);
    doctor_runner()?.run(&mut checks, ui.renderer()).await?;

    let options = InstallOptions {
        version: args.target.clone(),
        archive: args.archive.clone(),
        no_deps: args.no_deps,
    };
    let mut ctx = InstallContext::new(checks.instance, options);
    install_runner()?.run(&mut ctx, ui.renderer()).await?;

    let version = ctx.release()?.version.clone();
    if args.no_setup {
        ui.success(&format!("Ghost {} was installed", version));
        ui.info("Run `ghost setup` to configure and start it");
        return Ok(());
    }

    let setup_args = args.setup.to_setup_args();
    let runner = setup_runner(system, &setup_args)?;
    let mut setup = SetupContext::new(system.clone(), ctx.instance, setup_args);
    runner.run(&mut setup, ui.renderer()).await?;

    ui.success(&format!("Ghost {} was installed successfully", version));
    Ok(())
}
