//! CLI argument parsing with clap

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use ghost_lifecycle::doctor::Category;
use ghost_lifecycle::SetupArgs;

/// Prefix of the per-step opt-out flags, e.g. `--no-setup-nginx`
const NO_SETUP_PREFIX: &str = "--no-setup-";

/// Ghost - install, configure and run self-hosted Ghost blogs
#[derive(Parser, Debug)]
#[command(name = "ghost")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Run against the development config
    #[arg(short = 'D', long, global = true)]
    pub development: bool,

    /// Never ask questions; accept defaults instead
    #[arg(long, global = true)]
    pub no_prompt: bool,

    /// Instance directory (defaults to the working directory)
    #[arg(short, long, global = true)]
    pub dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Install a new instance
    Install(InstallArgs),

    /// Set up an installed instance
    Setup(SetupCommandArgs),

    /// Start an instance
    Start(StartArgs),

    /// Stop an instance
    Stop(StopArgs),

    /// Restart an instance
    Restart(NameArgs),

    /// Run an instance in the foreground
    Run(NameArgs),

    /// Update an instance to a newer release
    Update(UpdateArgs),

    /// Remove an instance and its files
    Uninstall(UninstallArgs),

    /// List registered instances
    Ls,

    /// Show the application log
    Log(LogArgs),

    /// Read or change the instance config
    Config(ConfigArgs),

    /// Check the system for problems
    Doctor(DoctorArgs),

    /// Show version information
    Version(VersionArgs),
}

/// Flags shared by `install`, `setup` and `config`
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigFlags {
    /// Blog url
    #[arg(long)]
    pub url: Option<String>,

    /// Address the application listens on
    #[arg(long)]
    pub ip: Option<String>,

    /// Port the application listens on
    #[arg(long)]
    pub port: Option<u16>,

    /// Process manager to run the application with
    #[arg(long)]
    pub process: Option<String>,

    /// Content directory
    #[arg(long = "content-path")]
    pub content_path: Option<String>,

    /// Database client (mysql or sqlite3)
    #[arg(long)]
    pub db: Option<String>,

    /// Database host
    #[arg(long)]
    pub dbhost: Option<String>,

    /// Database user
    #[arg(long)]
    pub dbuser: Option<String>,

    /// Database password
    #[arg(long)]
    pub dbpass: Option<String>,

    /// Database name
    #[arg(long)]
    pub dbname: Option<String>,

    /// Database file (sqlite3)
    #[arg(long)]
    pub dbpath: Option<String>,
}

/// Flags controlling a setup run
#[derive(Args, Debug, Clone, Default)]
pub struct SetupFlags {
    /// Development-friendly setup: local process, sqlite, no system services
    #[arg(long)]
    pub local: bool,

    /// Only run these setup steps
    #[arg(long, value_delimiter = ',')]
    pub stages: Vec<String>,

    /// Turn off one setup step; also accepted as `--no-setup-<id>`
    #[arg(long = "no-setup-step", value_name = "ID", hide = true)]
    pub no_setup_step: Vec<String>,

    /// Leave the application stopped
    #[arg(long)]
    pub no_start: bool,

    /// Do not start the application on boot
    #[arg(long)]
    pub no_enable: bool,

    /// Email for the TLS certificate
    #[arg(long)]
    pub sslemail: Option<String>,

    #[command(flatten)]
    pub config: ConfigFlags,
}

impl SetupFlags {
    pub fn to_setup_args(&self) -> SetupArgs {
        let config = self.config.clone();
        SetupArgs {
            local: self.local,
            stages: self.stages.clone(),
            disabled: self.no_setup_step.clone(),
            no_start: self.no_start,
            no_enable: self.no_enable,
            url: config.url,
            ip: config.ip,
            port: config.port,
            process: config.process,
            content_path: config.content_path,
            db: config.db,
            dbhost: config.dbhost,
            dbuser: config.dbuser,
            dbpass: config.dbpass,
            dbname: config.dbname,
            dbpath: config.dbpath,
            sslemail: self.sslemail.clone(),
        }
    }
}

#[derive(Args, Debug)]
pub struct InstallArgs {
    /// Version to install (latest when omitted)
    #[arg(value_name = "VERSION")]
    pub target: Option<String>,

    /// Install from a local release tarball
    #[arg(long)]
    pub archive: Option<PathBuf>,

    /// Skip installing dependencies
    #[arg(long)]
    pub no_deps: bool,

    /// Only install, do not run setup
    #[arg(long)]
    pub no_setup: bool,

    #[command(flatten)]
    pub setup: SetupFlags,
}

#[derive(Args, Debug)]
pub struct SetupCommandArgs {
    /// Setup steps to run (same as --stages)
    #[arg(value_name = "STAGE")]
    pub steps: Vec<String>,

    #[command(flatten)]
    pub setup: SetupFlags,
}

/// Commands addressing one instance, by name or directory
#[derive(Args, Debug, Clone, Default)]
pub struct NameArgs {
    /// Registered instance name
    pub name: Option<String>,
}

#[derive(Args, Debug)]
pub struct StartArgs {
    #[command(flatten)]
    pub instance: NameArgs,

    /// Do not start the application on boot
    #[arg(long)]
    pub no_enable: bool,
}

#[derive(Args, Debug)]
pub struct StopArgs {
    #[command(flatten)]
    pub instance: NameArgs,

    /// Stop every running instance
    #[arg(long, conflicts_with = "name")]
    pub all: bool,

    /// Keep starting the application on boot
    #[arg(long)]
    pub no_disable: bool,
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Version to update to (latest when omitted)
    #[arg(value_name = "VERSION")]
    pub target: Option<String>,

    /// Go back to the previously active version
    #[arg(long, conflicts_with = "target")]
    pub rollback: bool,

    /// Reinstall or downgrade
    #[arg(short, long)]
    pub force: bool,

    /// Update from a local release tarball
    #[arg(long)]
    pub archive: Option<PathBuf>,

    /// Skip installing dependencies
    #[arg(long)]
    pub no_deps: bool,
}

#[derive(Args, Debug)]
pub struct UninstallArgs {
    /// Do not ask for confirmation
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct LogArgs {
    #[command(flatten)]
    pub instance: NameArgs,

    /// Number of lines to show
    #[arg(short = 'n', long, default_value_t = 20)]
    pub number: usize,

    /// Show the error log
    #[arg(short, long)]
    pub error: bool,

    /// Keep printing new lines
    #[arg(short, long)]
    pub follow: bool,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Dotted config key, e.g. `server.port`
    pub key: Option<String>,

    /// New value; prints the current one when omitted
    pub value: Option<String>,

    #[command(flatten)]
    pub flags: ConfigFlags,
}

#[derive(Args, Debug)]
pub struct DoctorArgs {
    /// Check categories (install, start, setup)
    pub categories: Vec<Category>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Rewrite `--no-setup-<id>` into `--no-setup-step <id>` so clap can parse
/// step ids contributed by extensions
pub fn normalize_args<I>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut out = Vec::new();
    for arg in args {
        match arg.strip_prefix(NO_SETUP_PREFIX) {
            Some(id) if !id.is_empty() && id != "step" && !id.starts_with("step=") => {
                out.push("--no-setup-step".to_string());
                out.push(id.to_string());
            }
            _ => out.push(arg),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        let argv = std::iter::once("ghost")
            .chain(args.iter().copied())
            .map(String::from);
        Cli::try_parse_from(normalize_args(argv)).unwrap()
    }

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_no_setup_flags_become_step_ids() {
        let cli = parse(&["setup", "--no-setup-nginx", "--no-setup-linux-user"]);
        let Commands::Setup(args) = cli.command else {
            panic!("expected setup");
        };
        assert_eq!(args.setup.no_setup_step, ["nginx", "linux-user"]);
        assert_eq!(args.setup.to_setup_args().disabled, ["nginx", "linux-user"]);
    }

    #[test]
    fn test_install_no_setup_is_not_a_step() {
        let cli = parse(&["install", "5.80.0", "--no-setup", "--local"]);
        let Commands::Install(args) = cli.command else {
            panic!("expected install");
        };
        assert!(args.no_setup);
        assert!(args.setup.local);
        assert!(args.setup.no_setup_step.is_empty());
        assert_eq!(args.target.as_deref(), Some("5.80.0"));
    }

    #[test]
    fn test_stages_accept_lists() {
        let cli = parse(&["setup", "nginx", "ssl", "--stages", "start,systemd"]);
        let Commands::Setup(args) = cli.command else {
            panic!("expected setup");
        };
        assert_eq!(args.steps, ["nginx", "ssl"]);
        assert_eq!(args.setup.stages, ["start", "systemd"]);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = parse(&["stop", "--all", "--no-prompt", "-D", "-vv"]);
        assert!(cli.no_prompt);
        assert!(cli.development);
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Stop(StopArgs { all: true, .. })));
    }

    #[test]
    fn test_config_flags_map_to_setup_args() {
        let cli = parse(&[
            "install",
            "--url",
            "https://blog.example.com",
            "--port",
            "2369",
            "--db",
            "mysql",
            "--dbuser",
            "root",
            "--sslemail",
            "ops@example.com",
        ]);
        let Commands::Install(args) = cli.command else {
            panic!("expected install");
        };
        let setup = args.setup.to_setup_args();
        assert_eq!(setup.url.as_deref(), Some("https://blog.example.com"));
        assert_eq!(setup.port, Some(2369));
        assert_eq!(setup.db.as_deref(), Some("mysql"));
        assert_eq!(setup.dbuser.as_deref(), Some("root"));
        assert_eq!(setup.sslemail.as_deref(), Some("ops@example.com"));
        assert!(setup.has_config_overrides());
    }

    #[test]
    fn test_doctor_categories_parse() {
        let cli = parse(&["doctor", "start", "setup"]);
        let Commands::Doctor(args) = cli.command else {
            panic!("expected doctor");
        };
        assert_eq!(args.categories, [Category::Start, Category::Setup]);
        assert!(Cli::try_parse_from(["ghost", "doctor", "bogus"]).is_err());
    }

    #[test]
    fn test_rollback_conflicts_with_version() {
        assert!(Cli::try_parse_from(["ghost", "update", "5.0.0", "--rollback"]).is_err());
    }
}
