//! Setup task list
//!
//! Built-in steps run first in a fixed order
//! (`config`, `instance`, `linux-user`, `migrate`, `start`), followed by the
//! steps of every extension in discovery order.

use anyhow::Context;
use ghost_core::config::keys;
use ghost_core::utils::run_command;
use ghost_core::{Error, CLI_VERSION};
use ghost_tasks::{RunReport, Selection, SkipDecision, Step, TaskError, TaskHandle, TaskRunner};
use serde_json::json;
use tracing::debug;

use crate::context::{SetupArgs, SetupContext};
use crate::extension::Migration;
use crate::instance::{url_host, Instance};
use crate::process::{DEFAULT_HOST, DEFAULT_PORT, LOCAL};
use crate::system::System;

/// System account owning production content
pub const GHOST_USER: &str = "ghost";

/// Name of the init-system process manager
pub const SYSTEMD: &str = "systemd";

/// Compose the full setup task list for one run
pub fn setup_runner(
    system: &System,
    args: &SetupArgs,
) -> Result<TaskRunner<SetupContext>, TaskError> {
    let interactive = system.ui().allow_prompt() && args.stages.is_empty();
    let mut selection = Selection::all()
        .with_stages(args.stages.clone())
        .interactive(interactive);
    for id in &args.disabled {
        selection = selection.disable(id.clone());
    }

    let mut runner = TaskRunner::new().with_selection(selection);
    runner.extend(builtin_steps()?)?;
    runner.extend(system.setup_steps()?)?;
    debug!("Setup task list: {:?}", runner.ids());
    Ok(runner)
}

/// The core steps, in execution order
pub fn builtin_steps() -> Result<Vec<Step<SetupContext>>, TaskError> {
    Ok(vec![
        Step::builder("config")
            .title("Configuring Ghost")
            .skip(|ctx| Box::pin(skip_config(ctx)))
            .task(|ctx, _| Box::pin(configure(ctx)))
            .build()?,
        Step::builder("instance")
            .title("Registering instance")
            .skip(|ctx| Box::pin(skip_instance(ctx)))
            .task(|ctx, _| Box::pin(register_instance(ctx)))
            .build()?,
        Step::builder("linux-user")
            .title(format!("Setting up \"{}\" system user", GHOST_USER))
            .optional()
            .prompt(format!(
                "Do you wish to set up the \"{}\" system user?",
                GHOST_USER
            ))
            .enabled(|ctx: &SetupContext| {
                !ctx.args.local && ctx.instance.process_name() == SYSTEMD
            })
            .skip(|ctx| Box::pin(skip_linux_user(ctx)))
            .task(|ctx, _| Box::pin(create_linux_user(ctx)))
            .build()?,
        Step::builder("migrate")
            .title("Running migrations")
            .skip(|ctx| Box::pin(skip_migrate(ctx)))
            .task(|ctx, task| Box::pin(migrate(ctx, task)))
            .build()?,
        Step::builder("start")
            .title("Starting Ghost")
            .optional()
            .prompt("Do you want to start Ghost?")
            .enabled(|ctx: &SetupContext| !ctx.args.no_start)
            .skip(|ctx| Box::pin(skip_start(ctx)))
            .task(|ctx, _| Box::pin(start(ctx)))
            .build()?,
    ])
}

async fn skip_config(ctx: &SetupContext) -> anyhow::Result<SkipDecision> {
    if ctx.instance.config().exists() && !ctx.args.has_config_overrides() {
        return Ok("Configuration already exists".into());
    }
    Ok(SkipDecision::Run)
}

async fn configure(ctx: &mut SetupContext) -> anyhow::Result<()> {
    let ui = ctx.ui();
    let args = ctx.args.clone();
    let process = args
        .process
        .clone()
        .unwrap_or_else(|| default_process(&ctx.system, &args));
    let environment = ctx.instance.environment();

    let existing_url = ctx.instance.url();
    let url = match args.url.clone().or(existing_url) {
        Some(url) => url,
        None => {
            let default = format!("http://localhost:{}", args.port.unwrap_or(DEFAULT_PORT));
            if ui.allow_prompt() && !args.local {
                ui.prompt_text("Enter your blog URL:", Some(&default))?
            } else {
                default
            }
        }
    };
    validate_url(&url)?;
    let name = match ctx.instance.cli_config().get_string(keys::NAME)? {
        Some(name) => name,
        None => url_host(&url)
            .map(|host| host.replace('.', "-"))
            .unwrap_or_else(|| ctx.instance.name()),
    };

    let config = ctx.instance.config_mut();
    config.set(keys::URL, &url)?;
    match args.port {
        Some(port) => config.set(keys::SERVER_PORT, port)?,
        None => config.set_default(keys::SERVER_PORT, DEFAULT_PORT)?,
    };
    match &args.ip {
        Some(ip) => config.set(keys::SERVER_HOST, ip)?,
        None => config.set_default(keys::SERVER_HOST, DEFAULT_HOST)?,
    };
    match &args.process {
        Some(_) => config.set(keys::PROCESS, &process)?,
        None => config.set_default(keys::PROCESS, &process)?,
    };
    if let Some(content) = &args.content_path {
        config.set(keys::CONTENT_PATH, content)?;
    }
    config.set_default(keys::LOGGING_TRANSPORTS, json!(["file", "stdout"]))?;

    let client = args
        .db
        .clone()
        .or(config.get_string(keys::DATABASE_CLIENT)?)
        .unwrap_or_else(|| if args.local { "sqlite3" } else { "mysql" }.to_string());

    match client.as_str() {
        "sqlite3" => {
            let file = args.dbpath.clone().unwrap_or_else(|| {
                let suffix = if environment.is_development() { "-dev" } else { "" };
                format!("content/data/ghost{}.db", suffix)
            });
            config.set(keys::DATABASE_CLIENT, "sqlite3")?;
            match args.dbpath {
                Some(_) => config.set(keys::DATABASE_FILE, &file)?,
                None => config.set_default(keys::DATABASE_FILE, &file)?,
            };
        }
        "mysql" => {
            config.set(keys::DATABASE_CLIENT, "mysql")?;
            let host = args
                .dbhost
                .clone()
                .or(config.get_string(keys::DATABASE_HOST)?)
                .unwrap_or_else(|| "localhost".to_string());
            config.set(keys::DATABASE_HOST, host)?;

            let user = match args.dbuser.clone().or(config.get_string(keys::DATABASE_USER)?) {
                Some(user) => user,
                None if ui.allow_prompt() => ui.prompt_text("Enter your MySQL username:", None)?,
                None => {
                    return Err(Error::config(keys::DATABASE_USER, "No MySQL username provided")
                        .with_help("Pass --dbuser and --dbpass, or use --db sqlite3")
                        .into())
                }
            };
            config.set(keys::DATABASE_USER, user)?;

            let password = match args
                .dbpass
                .clone()
                .or(config.get_string(keys::DATABASE_PASSWORD)?)
            {
                Some(password) => password,
                None if ui.allow_prompt() => ui.prompt_secret("Enter your MySQL password:")?,
                None => String::new(),
            };
            config.set(keys::DATABASE_PASSWORD, password)?;

            let database = args
                .dbname
                .clone()
                .or(config.get_string(keys::DATABASE_NAME)?)
                .unwrap_or_else(|| default_database_name(&name, environment.is_development()));
            config.set(keys::DATABASE_NAME, database)?;
        }
        other => {
            return Err(Error::config(
                keys::DATABASE_CLIENT,
                format!("Unsupported database client '{}'", other),
            )
            .with_help("Supported clients are mysql and sqlite3")
            .into())
        }
    }

    config.save().context("Failed to save the Ghost config")?;
    Ok(())
}

/// `systemd` for production installs where it can run, `local` otherwise
fn default_process(system: &System, args: &SetupArgs) -> String {
    if !args.local && system.process_managers().check(SYSTEMD).is_ok() {
        SYSTEMD.to_string()
    } else {
        LOCAL.to_string()
    }
}

fn validate_url(raw: &str) -> Result<(), Error> {
    let parsed = url::Url::parse(raw)
        .map_err(|e| Error::config(keys::URL, format!("Invalid url '{}': {}", raw, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(Error::config(
            keys::URL,
            format!("Invalid url '{}': must be an http or https address", raw),
        )
        .with_help("Example: https://blog.example.com"));
    }
    Ok(())
}

/// Database name derived from the instance name, e.g. `blog_example_com_prod`
pub fn default_database_name(name: &str, development: bool) -> String {
    let base: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    format!("{}_{}", base, if development { "dev" } else { "prod" })
}

async fn skip_instance(ctx: &SetupContext) -> anyhow::Result<SkipDecision> {
    if ctx.instance.is_setup()? {
        return Ok("Instance already registered".into());
    }
    Ok(SkipDecision::Run)
}

async fn register_instance(ctx: &mut SetupContext) -> anyhow::Result<()> {
    let name = ctx.system.add_instance(&mut ctx.instance)?;
    debug!("Registered instance '{}'", name);

    let config = ctx.instance.config_mut();
    config.set_default(keys::CONTENT_PATH, ghost_core::paths::CONTENT_DIR)?;
    config.save()?;
    Ok(())
}

async fn skip_linux_user(_ctx: &SetupContext) -> anyhow::Result<SkipDecision> {
    if !cfg!(target_os = "linux") {
        return Ok("Operating system is not Linux".into());
    }
    if run_command("id", &["-u", GHOST_USER], None).await.is_ok() {
        return Ok(format!("'{}' user already exists", GHOST_USER).into());
    }
    Ok(SkipDecision::Run)
}

async fn create_linux_user(ctx: &mut SetupContext) -> anyhow::Result<()> {
    let ui = ctx.ui();
    ui.sudo("useradd", &["--system", "--user-group", GHOST_USER]).await?;

    let content = ctx.instance.content_path()?;
    let owner = format!("{}:{}", GHOST_USER, GHOST_USER);
    ui.sudo("chown", &["-R", &owner, &content.to_string_lossy()]).await?;
    Ok(())
}

/// Migrations not yet applied to `instance`
pub fn pending_migrations(system: &System, instance: &Instance) -> anyhow::Result<Vec<Migration>> {
    let cli_version = instance.cli_version()?;
    Ok(system
        .migrations()?
        .into_iter()
        .filter(|m| m.is_pending(cli_version.as_ref()))
        .collect())
}

async fn skip_migrate(ctx: &SetupContext) -> anyhow::Result<SkipDecision> {
    if pending_migrations(&ctx.system, &ctx.instance)?.is_empty() {
        return Ok("No migrations to run".into());
    }
    Ok(SkipDecision::Run)
}

async fn migrate(ctx: &mut SetupContext, _task: &mut TaskHandle) -> anyhow::Result<()> {
    run_migrations(ctx).await?;
    Ok(())
}

/// Run pending migrations in order, then record the running CLI version
pub async fn run_migrations(ctx: &mut SetupContext) -> anyhow::Result<RunReport> {
    let mut runner = TaskRunner::new();
    for migration in pending_migrations(&ctx.system, &ctx.instance)? {
        runner.push(migration.into_step())?;
    }

    let ui = ctx.ui();
    let report = runner.run(ctx, ui.renderer()).await?;

    let cli_config = ctx.instance.cli_config_mut();
    cli_config.set(keys::CLI_VERSION, CLI_VERSION)?;
    cli_config.save()?;
    Ok(report)
}

async fn skip_start(ctx: &SetupContext) -> anyhow::Result<SkipDecision> {
    let process = ctx.instance.process_context()?;
    if ctx.instance.process().is_running(&process).await {
        return Ok("Ghost is already running".into());
    }
    Ok(SkipDecision::Run)
}

async fn start(ctx: &mut SetupContext) -> anyhow::Result<()> {
    ctx.instance.check_environment();
    ctx.instance.start(!ctx.args.no_enable).await?;

    let url = ctx.instance.url().unwrap_or_default();
    ctx.ui().info(&format!("Ghost was started successfully at {}", url));
    Ok(())
}

/// Whether `url` points at this machine or a bare IP address
pub fn is_local_url(url: &str) -> bool {
    match url_host(url) {
        Some(host) => {
            let bare = host.trim_start_matches('[').trim_end_matches(']');
            bare == "localhost" || bare.parse::<std::net::IpAddr>().is_ok()
        }
        None => true,
    }
}
