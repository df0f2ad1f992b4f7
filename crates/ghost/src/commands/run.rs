//! Run command: the application in the foreground
//!
//! The child is tied to this process; an interrupt or terminate signal
//! kills it before the CLI exits.

use std::process::Stdio;

use anyhow::{Context, Result};
use ghost_core::Error;
use tokio::process::Command;
use tracing::debug;

use super::Session;
use crate::cli::NameArgs;

pub async fn run(session: &Session, args: NameArgs) -> Result<()> {
    let ui = session.ui();
    let mut instance = session.instance(args.name.as_deref())?;
    instance.check_environment();
    let process = instance.process_context()?;

    ui.info(&format!(
        "Running Ghost in {} at {}:{}",
        process.environment, process.host, process.port
    ));
    let mut child = Command::new("sh")
        .args(["-c", &process.command])
        .current_dir(&process.dir)
        .env("NODE_ENV", process.environment.as_str())
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("Failed to spawn '{}'", process.command))?;

    let exited = tokio::select! {
        status = child.wait() => Some(status?),
        signal = shutdown_signal() => {
            signal?;
            None
        }
    };

    match exited {
        Some(status) if status.success() => Ok(()),
        Some(status) => Err(Error::application(format!("Ghost exited ({})", status), None).into()),
        None => {
            debug!("Interrupted, stopping '{}'", process.command);
            child.kill().await?;
            Ok(())
        }
    }
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
