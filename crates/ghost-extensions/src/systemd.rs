//! systemd process manager and unit file
//!
//! Each instance runs as the `ghost_<name>` service. The unit is rendered
//! into the instance's `system/files` and linked into the unit directory,
//! either by the `systemd` setup step or on first start.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use ghost_core::utils::{command_exists, command_stdout, run_command};
use ghost_core::{Error, Result};
use ghost_lifecycle::process::{
    wait_for_port, ProcessContext, ProcessManager, ProcessManagerFactory,
};
use ghost_lifecycle::setup::{GHOST_USER, SYSTEMD};
use ghost_lifecycle::{template_in, Extension, Instance, SetupContext, Ui};
use ghost_tasks::{SkipDecision, Step, TaskError};
use tracing::{debug, warn};

use crate::templates::{Templates, UnitContext, SYSTEMD_UNIT};

/// Default directory units are linked into
pub const UNIT_DIR: &str = "/lib/systemd/system";

/// Journal lines attached to a failed start
const JOURNAL_LINES: &str = "50";

/// Service name for an instance
pub fn unit_name(instance_name: &str) -> String {
    format!("ghost_{}", instance_name)
}

pub fn unit_file(instance_name: &str) -> String {
    format!("{}.service", unit_name(instance_name))
}

/// Account the service runs as: the dedicated user when present
async fn service_user() -> String {
    if run_command("id", &["-u", GHOST_USER], None).await.is_ok() {
        return GHOST_USER.to_string();
    }
    command_stdout("id", &["-un"])
        .await
        .unwrap_or_else(|_| "root".to_string())
}

/// Render the unit for `ctx` and link it into `unit_dir`
async fn install_unit(
    ui: &dyn Ui,
    ctx: &ProcessContext,
    unit_dir: &Path,
) -> anyhow::Result<()> {
    let contents = render_unit(ctx, &service_user().await)?;
    template_in(
        &ctx.dir,
        ui,
        &contents,
        "systemd service",
        &unit_file(&ctx.name),
        unit_dir,
    )
    .await?;
    ui.sudo("systemctl", &["daemon-reload"]).await?;
    Ok(())
}

pub fn render_unit(ctx: &ProcessContext, user: &str) -> anyhow::Result<String> {
    Templates::new()?.render(
        SYSTEMD_UNIT,
        &UnitContext {
            name: ctx.name.clone(),
            dir: ctx.dir.to_string_lossy().to_string(),
            user: user.to_string(),
            environment: ctx.environment.to_string(),
            command: ctx.command.clone(),
        },
    )
}

/// Supervises the application through systemd
pub struct SystemdManager {
    ui: Arc<dyn Ui>,
    unit_dir: PathBuf,
}

impl SystemdManager {
    async fn systemctl(&self, action: &str, ctx: &ProcessContext) -> Result<()> {
        let unit = unit_name(&ctx.name);
        self.ui.sudo("systemctl", &[action, &unit]).await?;
        Ok(())
    }

    async fn journal(&self, unit: &str) -> Option<String> {
        command_stdout(
            "journalctl",
            &["-u", unit, "-n", JOURNAL_LINES, "--no-pager"],
        )
        .await
        .ok()
        .filter(|out| !out.is_empty())
    }

    /// Wait for the port, turning a crashed unit into an application error
    async fn await_startup(&self, ctx: &ProcessContext) -> Result<()> {
        match wait_for_port(&ctx.host, ctx.port, ctx.start_timeout, || None).await {
            Ok(()) => {
                self.success(ctx);
                Ok(())
            }
            Err(timeout) => {
                let unit = unit_name(&ctx.name);
                let err = if self.is_running(ctx).await {
                    timeout
                } else {
                    Error::application(
                        format!("{} stopped while starting", unit),
                        self.journal(&unit).await,
                    )
                };
                Err(self.error(ctx, err))
            }
        }
    }
}

#[async_trait]
impl ProcessManager for SystemdManager {
    fn name(&self) -> &str {
        SYSTEMD
    }

    async fn start(&self, ctx: &ProcessContext) -> Result<()> {
        if !self.unit_dir.join(unit_file(&ctx.name)).exists() {
            debug!("Installing missing unit for {}", ctx.name);
            install_unit(self.ui.as_ref(), ctx, &self.unit_dir)
                .await
                .map_err(|e| {
                    Error::system(format!("Failed to install the systemd unit: {:#}", e))
                })?;
        }
        self.systemctl("start", ctx).await?;
        self.await_startup(ctx).await
    }

    async fn stop(&self, ctx: &ProcessContext) -> Result<()> {
        self.systemctl("stop", ctx).await
    }

    async fn restart(&self, ctx: &ProcessContext) -> Result<()> {
        self.systemctl("restart", ctx).await?;
        self.await_startup(ctx).await
    }

    async fn is_running(&self, ctx: &ProcessContext) -> bool {
        let unit = unit_name(&ctx.name);
        run_command("systemctl", &["is-active", "--quiet", &unit], None)
            .await
            .is_ok()
    }

    async fn is_enabled(&self, ctx: &ProcessContext) -> Result<bool> {
        let unit = unit_name(&ctx.name);
        Ok(run_command("systemctl", &["is-enabled", "--quiet", &unit], None)
            .await
            .is_ok())
    }

    async fn enable(&self, ctx: &ProcessContext) -> Result<()> {
        self.systemctl("enable", ctx).await
    }

    async fn disable(&self, ctx: &ProcessContext) -> Result<()> {
        self.systemctl("disable", ctx).await
    }
}

/// Registers the `systemd` manager; usable where `systemctl` exists
pub struct SystemdFactory {
    unit_dir: PathBuf,
}

impl ProcessManagerFactory for SystemdFactory {
    fn name(&self) -> &str {
        SYSTEMD
    }

    fn will_run(&self) -> bool {
        command_exists("systemctl")
    }

    fn create(&self, ui: Arc<dyn Ui>) -> Arc<dyn ProcessManager> {
        Arc::new(SystemdManager {
            ui,
            unit_dir: self.unit_dir.clone(),
        })
    }
}

/// systemd process manager plus the unit setup step
#[derive(Debug, Clone)]
pub struct SystemdExtension {
    unit_dir: PathBuf,
}

impl Default for SystemdExtension {
    fn default() -> Self {
        Self::new(UNIT_DIR)
    }
}

impl SystemdExtension {
    pub fn new(unit_dir: impl Into<PathBuf>) -> Self {
        Self {
            unit_dir: unit_dir.into(),
        }
    }
}

#[async_trait]
impl Extension for SystemdExtension {
    fn name(&self) -> &str {
        SYSTEMD
    }

    fn description(&self) -> &str {
        "Runs instances as systemd services"
    }

    fn setup(&self) -> std::result::Result<Vec<Step<SetupContext>>, TaskError> {
        let skip_dir = self.unit_dir.clone();
        let task_dir = self.unit_dir.clone();
        Ok(vec![Step::builder("systemd")
            .title("Creating systemd service file")
            .optional()
            .prompt("Do you wish to set up systemd?")
            .enabled(|ctx: &SetupContext| {
                !ctx.args.local && ctx.instance.process_name() == SYSTEMD
            })
            .skip(move |ctx| Box::pin(skip_existing_unit(skip_dir.clone(), ctx)))
            .task(move |ctx, _| Box::pin(create_unit(task_dir.clone(), ctx)))
            .build()?])
    }

    async fn uninstall(&self, instance: &Instance, ui: &dyn Ui) -> anyhow::Result<()> {
        let name = instance.name();
        let path = self.unit_dir.join(unit_file(&name));
        if path.symlink_metadata().is_err() {
            return Ok(());
        }

        let unit = unit_name(&name);
        if let Err(e) = ui.sudo("systemctl", &["disable", "--quiet", &unit]).await {
            warn!("Failed to disable {}: {}", unit, e);
        }
        ui.sudo("rm", &["-f", &path.to_string_lossy()]).await?;
        ui.sudo("systemctl", &["daemon-reload"]).await?;
        Ok(())
    }

    fn process_managers(&self) -> Vec<Arc<dyn ProcessManagerFactory>> {
        vec![Arc::new(SystemdFactory {
            unit_dir: self.unit_dir.clone(),
        })]
    }
}

async fn skip_existing_unit(
    unit_dir: PathBuf,
    ctx: &SetupContext,
) -> anyhow::Result<SkipDecision> {
    if unit_dir.join(unit_file(&ctx.instance.name())).exists() {
        return Ok("Systemd service has already been set up".into());
    }
    Ok(SkipDecision::Run)
}

async fn create_unit(unit_dir: PathBuf, ctx: &mut SetupContext) -> anyhow::Result<()> {
    let process = ctx.instance.process_context()?;
    install_unit(ctx.ui().as_ref(), &process, &unit_dir).await
}
