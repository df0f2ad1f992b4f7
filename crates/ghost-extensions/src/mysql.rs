//! Dedicated MySQL user
//!
//! Running the application as the MySQL `root` user is discouraged. When setup
//! was given root credentials for a local server, the `mysql` step creates a
//! user limited to the instance's database and the `mysql-config` step swaps
//! those credentials into the config.

use std::process::Stdio;

use anyhow::Context;
use async_trait::async_trait;
use ghost_core::config::keys;
use ghost_core::utils::command_exists;
use ghost_core::Error;
use ghost_lifecycle::{Extension, SetupContext};
use ghost_tasks::{SkipDecision, Step, TaskError};
use rand::distr::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info};

/// Key of the generated credentials in the setup values bag
pub const MYSQL_VALUES: &str = "mysql";

const PASSWORD_LENGTH: usize = 20;

/// Credentials of the generated user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Random `ghost-NNNN` user with an alphanumeric password
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let suffix: u16 = rng.random_range(0..10_000);
        let password: String = rng
            .sample_iter(Alphanumeric)
            .take(PASSWORD_LENGTH)
            .map(char::from)
            .collect();
        Self {
            username: format!("ghost-{:04}", suffix),
            password,
        }
    }

    /// Statements creating the user and granting it the database
    pub fn grant_sql(&self, database: &str) -> String {
        let user = format!("'{}'@'localhost'", self.username.replace('\'', "''"));
        format!(
            "CREATE USER {user} IDENTIFIED BY '{password}'; \
             GRANT ALL PRIVILEGES ON `{database}`.* TO {user}; \
             FLUSH PRIVILEGES;",
            user = user,
            password = self.password.replace('\'', "''"),
            database = database.replace('`', "``"),
        )
    }
}

/// Replaces root database credentials with a dedicated user
#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlExtension;

#[async_trait]
impl Extension for MysqlExtension {
    fn name(&self) -> &str {
        "mysql"
    }

    fn description(&self) -> &str {
        "Creates a dedicated MySQL user for the instance"
    }

    fn setup(&self) -> Result<Vec<Step<SetupContext>>, TaskError> {
        Ok(vec![
            Step::builder("mysql")
                .title("Setting up a \"ghost\" mysql user")
                .optional()
                .prompt("Do you wish to set up a \"ghost\" mysql user?")
                .enabled(uses_local_root)
                .skip(|ctx| Box::pin(skip_without_client(ctx)))
                .task(|ctx, _| Box::pin(create_user(ctx)))
                .build()?,
            Step::builder("mysql-config")
                .title("Saving mysql credentials")
                .enabled(|ctx: &SetupContext| ctx.values.contains_key(MYSQL_VALUES))
                .task(|ctx, _| Box::pin(save_credentials(ctx)))
                .build()?,
        ])
    }
}

/// A local MySQL server reached as `root`
pub fn uses_local_root(ctx: &SetupContext) -> bool {
    if ctx.args.local {
        return false;
    }
    let config = ctx.instance.config();
    let get = |key: &str| config.get_string(key).ok().flatten();

    get(keys::DATABASE_CLIENT).as_deref() == Some("mysql")
        && matches!(
            get(keys::DATABASE_HOST).as_deref(),
            Some("localhost" | "127.0.0.1")
        )
        && get(keys::DATABASE_USER).as_deref() == Some("root")
}

async fn skip_without_client(_ctx: &SetupContext) -> anyhow::Result<SkipDecision> {
    if !command_exists("mysql") {
        return Ok("MySQL client is not installed".into());
    }
    Ok(SkipDecision::Run)
}

async fn create_user(ctx: &mut SetupContext) -> anyhow::Result<()> {
    let config = ctx.instance.config();
    let host = config
        .get_string(keys::DATABASE_HOST)?
        .unwrap_or_else(|| "localhost".to_string());
    let root_password = config
        .get_string(keys::DATABASE_PASSWORD)?
        .unwrap_or_default();
    let database = config.get_string(keys::DATABASE_NAME)?.ok_or_else(|| {
        Error::config(keys::DATABASE_NAME, "No database name configured")
            .with_help("Run `ghost setup config` or pass --dbname")
    })?;

    let credentials = Credentials::generate();
    execute(&host, "root", &root_password, &credentials.grant_sql(&database))
        .await
        .context("Failed to create the mysql user")?;
    info!("Created mysql user '{}'", credentials.username);

    ctx.values
        .insert(MYSQL_VALUES.to_string(), serde_json::to_value(&credentials)?);
    Ok(())
}

/// Run statements with the `mysql` client; the password travels in `MYSQL_PWD`
async fn execute(host: &str, user: &str, password: &str, sql: &str) -> ghost_core::Result<()> {
    let rendered = format!("mysql --host {} --user {}", host, user);
    debug!("Running: {}", rendered);

    let output = Command::new("mysql")
        .args(["--host", host, "--user", user, "--batch", "--execute", sql])
        .env("MYSQL_PWD", password)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if output.status.success() {
        Ok(())
    } else {
        Err(Error::process_output(rendered, &output))
    }
}

async fn save_credentials(ctx: &mut SetupContext) -> anyhow::Result<()> {
    let value = ctx
        .values
        .get(MYSQL_VALUES)
        .cloned()
        .context("No mysql credentials were generated")?;
    let credentials: Credentials = serde_json::from_value(value)?;

    let config = ctx.instance.config_mut();
    config.set(keys::DATABASE_USER, &credentials.username)?;
    config.set(keys::DATABASE_PASSWORD, &credentials.password)?;
    config.save()?;

    // the start step ran with the root credentials
    let process = ctx.instance.process_context()?;
    if ctx.instance.process().is_running(&process).await {
        ctx.instance.restart().await?;
    }
    Ok(())
}
