//! CLI command implementations

pub mod config;
pub mod doctor;
pub mod install;
pub mod log;
pub mod ls;
pub mod restart;
pub mod run;
pub mod setup;
pub mod start;
pub mod stop;
pub mod uninstall;
pub mod update;
pub mod version;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use ghost_core::{paths, Environment, Error};
use ghost_lifecycle::{Instance, System, Ui};

use crate::cli::{Cli, Commands};
use crate::ui::ConsoleUi;

/// Dispatch the parsed command line
pub async fn run(cli: Cli) -> Result<()> {
    let session = Session::new(&cli)?;

    match cli.command {
        Commands::Install(args) => install::run(&session, args).await,
        Commands::Setup(args) => setup::run(&session, args).await,
        Commands::Start(args) => start::run(&session, args).await,
        Commands::Stop(args) => stop::run(&session, args).await,
        Commands::Restart(args) => restart::run(&session, args).await,
        Commands::Run(args) => run::run(&session, args).await,
        Commands::Update(args) => update::run(&session, args).await,
        Commands::Uninstall(args) => uninstall::run(&session, args).await,
        Commands::Ls => ls::run(&session).await,
        Commands::Log(args) => log::run(&session, args).await,
        Commands::Config(args) => config::run(&session, args).await,
        Commands::Doctor(args) => doctor::run(&session, args).await,
        Commands::Version(args) => version::run(&session, args),
    }
}

/// Everything a command needs: the shared system and the directory it
/// was pointed at
pub struct Session {
    pub system: System,
    pub dir: PathBuf,
}

impl Session {
    pub fn new(cli: &Cli) -> Result<Self> {
        let dir = match &cli.dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().context("Failed to read the working directory")?,
        };
        let development = cli.development || wants_local(&cli.command);
        let ui: Arc<dyn Ui> = Arc::new(ConsoleUi::new(cli.verbose > 0, cli.no_prompt));
        Ok(Self::with_ui(dir, development, ui)?)
    }

    pub fn with_ui(dir: PathBuf, development: bool, ui: Arc<dyn Ui>) -> ghost_core::Result<Self> {
        let system = System::new(
            paths::global_config_path()?,
            Environment::from_dev_flag(development),
            ghost_extensions::builtin(),
            ui,
        );
        system.set_environment(development, true);
        Ok(Self { system, dir })
    }

    pub fn ui(&self) -> Arc<dyn Ui> {
        self.system.ui()
    }

    /// Instance registered as `name`, else the installation in the
    /// session directory
    pub fn instance(&self, name: Option<&str>) -> Result<Instance> {
        if let Some(name) = name {
            return self.system.find_instance(name)?.ok_or_else(|| {
                Error::cli(format!("Ghost instance '{}' does not exist", name))
                    .with_help("Run `ghost ls` to see registered instances")
                    .into()
            });
        }

        let instance = self.system.get_instance(&self.dir);
        if !instance.cli_config().exists() {
            return Err(Error::system(format!(
                "Working directory {} is not a recognisable Ghost installation",
                self.dir.display()
            ))
            .with_help("Run the command inside a Ghost directory, or pass --dir")
            .into());
        }
        Ok(instance)
    }
}

/// `--local` installs and setups run against the development config
fn wants_local(command: &Commands) -> bool {
    match command {
        Commands::Install(args) => args.setup.local,
        Commands::Setup(args) => args.setup.local,
        _ => false,
    }
}
