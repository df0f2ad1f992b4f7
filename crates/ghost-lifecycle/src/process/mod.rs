//! Process manager abstraction
//!
//! A [`ProcessManager`] supervises the application process of one instance.
//! Managers are produced by a [`ProcessManagerFactory`] registered under a
//! name; the [`ProcessManagerRegistry`] resolves the name stored in the
//! instance config and degrades to the bare-process [`LocalProcess`] manager
//! when the configured one cannot be used.

mod local;
mod registry;

pub use local::{LocalFactory, LocalProcess};
pub use registry::{Fallback, ProcessManagerRegistry, Resolved};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ghost_core::{Environment, Error, Result};
use tracing::{info, warn};

use crate::ui::Ui;

/// Name of the always-available bare-process manager
pub const LOCAL: &str = "local";

/// Default port the application listens on
pub const DEFAULT_PORT: u16 = 2368;

/// Default interface the application binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default time allowed for the application to accept connections
pub const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(60);

/// Default command starting the application from the instance directory
pub const DEFAULT_RUN_COMMAND: &str = "node current/index.js";

/// Everything a manager needs to know about the instance it supervises
#[derive(Debug, Clone)]
pub struct ProcessContext {
    /// Instance name, used for service unit names
    pub name: String,
    /// Instance root directory
    pub dir: PathBuf,
    pub environment: Environment,
    pub host: String,
    pub port: u16,
    /// Shell command starting the application
    pub command: String,
    pub start_timeout: Duration,
    /// File receiving the application's stdout/stderr
    pub log_file: PathBuf,
}

impl ProcessContext {
    /// Context with default run settings for `dir`
    pub fn new(name: impl Into<String>, dir: impl Into<PathBuf>, environment: Environment) -> Self {
        let dir = dir.into();
        Self {
            name: name.into(),
            log_file: dir
                .join(ghost_core::paths::CONTENT_DIR)
                .join("logs")
                .join("ghost-local.log"),
            dir,
            environment,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            command: DEFAULT_RUN_COMMAND.to_string(),
            start_timeout: DEFAULT_START_TIMEOUT,
        }
    }

    /// Location of the PID file used by the bare-process manager
    pub fn pid_file(&self) -> PathBuf {
        self.dir.join(ghost_core::paths::PID_FILE)
    }
}

/// Lifecycle contract over one way of supervising the application
#[async_trait]
pub trait ProcessManager: Send + Sync {
    /// Registered name of this manager
    fn name(&self) -> &str;

    /// Begin running the application
    async fn start(&self, ctx: &ProcessContext) -> Result<()>;

    /// Terminate the application. Already stopped is not an error.
    async fn stop(&self, ctx: &ProcessContext) -> Result<()>;

    /// Stop then start, unless the manager has a native equivalent
    async fn restart(&self, ctx: &ProcessContext) -> Result<()> {
        self.stop(ctx).await?;
        self.start(ctx).await
    }

    /// Whether the application is running. Never fails; unknown means no.
    async fn is_running(&self, ctx: &ProcessContext) -> bool;

    /// Whether the supervisor starts the application on boot
    async fn is_enabled(&self, _ctx: &ProcessContext) -> Result<bool> {
        Ok(true)
    }

    async fn enable(&self, _ctx: &ProcessContext) -> Result<()> {
        Ok(())
    }

    async fn disable(&self, _ctx: &ProcessContext) -> Result<()> {
        Ok(())
    }

    /// Startup outcome hook: the application came up
    fn success(&self, ctx: &ProcessContext) {
        info!(
            "Application '{}' accepting connections on {}:{}",
            ctx.name, ctx.host, ctx.port
        );
    }

    /// Startup outcome hook: the application failed to come up
    fn error(&self, ctx: &ProcessContext, err: Error) -> Error {
        warn!("Application '{}' failed to start: {}", ctx.name, err);
        err
    }
}

/// Operations a manager implementation can provide
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Start,
    Stop,
    Restart,
    IsRunning,
    IsEnabled,
    Enable,
    Disable,
}

impl Operation {
    pub const ALL: &'static [Operation] = &[
        Operation::Start,
        Operation::Stop,
        Operation::Restart,
        Operation::IsRunning,
        Operation::IsEnabled,
        Operation::Enable,
        Operation::Disable,
    ];

    /// Operations a manager must provide to be selectable
    pub const REQUIRED: &'static [Operation] =
        &[Operation::Start, Operation::Stop, Operation::IsRunning];
}

/// Produces process managers of one kind
pub trait ProcessManagerFactory: Send + Sync {
    /// Name stored in the `process` config key
    fn name(&self) -> &str;

    /// Operations the produced manager actually implements
    fn operations(&self) -> &[Operation] {
        Operation::ALL
    }

    /// Probe whether this manager can work on the current system
    fn will_run(&self) -> bool {
        true
    }

    fn create(&self, ui: Arc<dyn Ui>) -> Arc<dyn ProcessManager>;
}

/// Whether something already accepts connections on `host:port`
pub async fn port_in_use(host: &str, port: u16) -> bool {
    let address = format!("{}:{}", host, port);
    matches!(
        tokio::time::timeout(
            Duration::from_secs(1),
            tokio::net::TcpStream::connect(&address)
        )
        .await,
        Ok(Ok(_))
    )
}

/// Error for a port another process is listening on
pub fn port_taken(host: &str, port: u16) -> Error {
    Error::system(format!("Port {} is already in use on {}", port, host)).with_help(format!(
        "Stop whatever is listening on {}:{}, or pick another port with `ghost config --port <port>`",
        host, port
    ))
}

/// Poll `host:port` until it accepts a TCP connection or `timeout` elapses.
///
/// `exited` is checked before every attempt; returning `Some(err)` from it
/// stops the wait with that error.
pub async fn wait_for_port<F>(host: &str, port: u16, timeout: Duration, mut exited: F) -> Result<()>
where
    F: FnMut() -> Option<Error>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    let address = format!("{}:{}", host, port);

    loop {
        if let Some(err) = exited() {
            return Err(err);
        }
        if tokio::net::TcpStream::connect(&address).await.is_ok() {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(Error::process(format!(
                "Timed out after {}s waiting for {} to accept connections",
                timeout.as_secs(),
                address
            )));
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
}

/// Last `lines` lines of a log file, if it can be read
pub fn log_tail(path: &Path, lines: usize) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    let all: Vec<&str> = content.lines().collect();
    let start = all.len().saturating_sub(lines);
    let tail = all[start..].join("\n");
    (!tail.trim().is_empty()).then_some(tail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_context_defaults() {
        let ctx = ProcessContext::new("blog", "/var/www/blog", Environment::Production);
        assert_eq!(ctx.port, 2368);
        assert_eq!(ctx.pid_file(), PathBuf::from("/var/www/blog/.ghostpid"));
        assert_eq!(
            ctx.log_file,
            PathBuf::from("/var/www/blog/content/logs/ghost-local.log")
        );
    }

    #[test]
    fn test_log_tail_takes_last_lines() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("app.log");
        std::fs::write(&path, "one\ntwo\nthree\n").unwrap();

        assert_eq!(log_tail(&path, 2).as_deref(), Some("two\nthree"));
        assert_eq!(log_tail(&temp.path().join("missing.log"), 2), None);
    }

    #[tokio::test]
    async fn test_wait_for_port_accepts_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        wait_for_port("127.0.0.1", port, Duration::from_secs(2), || None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_port_in_use_detects_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(port_in_use("127.0.0.1", port).await);

        drop(listener);
        assert!(!port_in_use("127.0.0.1", port).await);
    }

    #[tokio::test]
    async fn test_wait_for_port_stops_on_exit() {
        let err = wait_for_port("127.0.0.1", 1, Duration::from_secs(5), || {
            Some(Error::application("exited early", None))
        })
        .await
        .unwrap_err();
        assert!(err.is_application());
    }
}
