//! Bare-process manager
//!
//! Runs the application as a detached child of the CLI, tracked through a
//! PID file in the instance directory.

use std::fs::OpenOptions;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ghost_core::{Error, Result};
use tracing::{debug, warn};

use super::{
    log_tail, port_in_use, port_taken, wait_for_port, ProcessContext, ProcessManager,
    ProcessManagerFactory, LOCAL,
};
use crate::ui::Ui;

/// How long a stopping process gets before it is killed
const STOP_GRACE: Duration = Duration::from_secs(10);

/// Supervises the application as a plain background process
#[derive(Debug, Default)]
pub struct LocalProcess;

impl LocalProcess {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessManager for LocalProcess {
    fn name(&self) -> &str {
        LOCAL
    }

    async fn start(&self, ctx: &ProcessContext) -> Result<()> {
        if self.is_running(ctx).await {
            debug!("Application in {:?} is already running", ctx.dir);
            return Ok(());
        }

        if port_in_use(&ctx.host, ctx.port).await {
            return Err(self.error(ctx, port_taken(&ctx.host, ctx.port)));
        }

        if let Some(parent) = ctx.log_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let stdout = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&ctx.log_file)?;
        let stderr = stdout.try_clone()?;

        let mut cmd = shell_command(&ctx.command);
        cmd.current_dir(&ctx.dir)
            .env("NODE_ENV", ctx.environment.as_str())
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr);
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::process(format!("Failed to spawn '{}': {}", ctx.command, e)))?;
        let pid = child.id();
        std::fs::write(ctx.pid_file(), pid.to_string())?;
        debug!("Spawned '{}' as pid {}", ctx.command, pid);

        let log_file = ctx.log_file.clone();
        let ready = wait_for_port(&ctx.host, ctx.port, ctx.start_timeout, || {
            match child.try_wait() {
                Ok(Some(status)) => Some(Error::application(
                    format!("Ghost exited ({}) before it was ready", status),
                    log_tail(&log_file, 20),
                )),
                _ => None,
            }
        })
        .await;

        match ready {
            Ok(()) => {
                self.success(ctx);
                Ok(())
            }
            Err(err) => {
                if !err.is_application() {
                    if let Err(stop_err) = terminate(pid as i32, STOP_GRACE).await {
                        warn!("Could not stop pid {}: {}", pid, stop_err);
                    }
                }
                let _ = child.try_wait();
                remove_pid_file(&ctx.pid_file());
                Err(self.error(ctx, err))
            }
        }
    }

    async fn stop(&self, ctx: &ProcessContext) -> Result<()> {
        let pid_file = ctx.pid_file();
        let Some(pid) = read_pid(&pid_file) else {
            remove_pid_file(&pid_file);
            return Ok(());
        };

        if is_alive(pid) {
            terminate(pid, STOP_GRACE).await?;
        }
        remove_pid_file(&pid_file);
        Ok(())
    }

    async fn is_running(&self, ctx: &ProcessContext) -> bool {
        let pid_file = ctx.pid_file();
        match read_pid(&pid_file) {
            Some(pid) if is_alive(pid) => true,
            Some(pid) => {
                debug!("Removing stale PID file for pid {}", pid);
                remove_pid_file(&pid_file);
                false
            }
            None => {
                remove_pid_file(&pid_file);
                false
            }
        }
    }
}

/// Factory registered under [`LOCAL`]
#[derive(Debug, Default)]
pub struct LocalFactory;

impl ProcessManagerFactory for LocalFactory {
    fn name(&self) -> &str {
        LOCAL
    }

    fn create(&self, _ui: Arc<dyn Ui>) -> Arc<dyn ProcessManager> {
        Arc::new(LocalProcess::new())
    }
}

fn shell_command(command: &str) -> Command {
    if cfg!(windows) {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", command]);
        cmd
    } else {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", command]);
        cmd
    }
}

fn read_pid(path: &Path) -> Option<i32> {
    let content = std::fs::read_to_string(path).ok()?;
    content.trim().parse::<i32>().ok().filter(|pid| *pid > 0)
}

fn remove_pid_file(path: &Path) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            warn!("Failed to remove {:?}: {}", path, e);
        }
    }
}

#[cfg(unix)]
fn is_alive(pid: i32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::sys::wait::{waitpid, WaitPidFlag};
    use nix::unistd::Pid;

    let pid = Pid::from_raw(pid);
    // Reap the process if it is our own exited child
    let _ = waitpid(pid, Some(WaitPidFlag::WNOHANG));
    match kill(pid, None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn is_alive(pid: i32) -> bool {
    Command::new("tasklist")
        .args(["/FI", &format!("PID eq {}", pid), "/NH"])
        .output()
        .map(|out| String::from_utf8_lossy(&out.stdout).contains(&pid.to_string()))
        .unwrap_or(false)
}

/// Ask the process (group) to exit, escalating to a kill after `grace`
#[cfg(unix)]
async fn terminate(pid: i32, grace: Duration) -> Result<()> {
    use nix::sys::signal::{kill, killpg, Signal};
    use nix::unistd::Pid;

    let target = Pid::from_raw(pid);
    let signal = |sig: Signal| {
        killpg(target, sig)
            .or_else(|_| kill(target, sig))
            .map_err(|e| Error::process(format!("Could not send {:?} to pid {}: {}", sig, pid, e)))
    };

    signal(Signal::SIGTERM)?;
    let deadline = tokio::time::Instant::now() + grace;
    while tokio::time::Instant::now() < deadline {
        if !is_alive(pid) {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    warn!("pid {} did not exit after {}s, killing it", pid, grace.as_secs());
    if is_alive(pid) {
        signal(Signal::SIGKILL)?;
    }
    Ok(())
}

#[cfg(not(unix))]
async fn terminate(pid: i32, _grace: Duration) -> Result<()> {
    ghost_core::utils::run_command("taskkill", &["/PID", &pid.to_string(), "/T", "/F"], None)
        .await
        .map(|_| ())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use ghost_core::Environment;
    use tempfile::TempDir;

    fn context(dir: &Path, command: &str, port: u16) -> ProcessContext {
        let mut ctx = ProcessContext::new("test", dir, Environment::Development);
        ctx.command = command.to_string();
        ctx.port = port;
        ctx.start_timeout = Duration::from_secs(5);
        ctx
    }

    #[tokio::test]
    async fn test_stale_pid_file_is_cleaned_up() {
        let temp = TempDir::new().unwrap();
        let ctx = context(temp.path(), "true", 1);
        std::fs::write(ctx.pid_file(), i32::MAX.to_string()).unwrap();

        assert!(!LocalProcess::new().is_running(&ctx).await);
        assert!(!ctx.pid_file().exists());
    }

    #[tokio::test]
    async fn test_garbage_pid_file_reads_as_stopped() {
        let temp = TempDir::new().unwrap();
        let ctx = context(temp.path(), "true", 1);
        std::fs::write(ctx.pid_file(), "not-a-pid").unwrap();

        assert!(!LocalProcess::new().is_running(&ctx).await);
        assert!(!ctx.pid_file().exists());
    }

    #[tokio::test]
    async fn test_stop_without_pid_file_is_ok() {
        let temp = TempDir::new().unwrap();
        let ctx = context(temp.path(), "true", 1);
        LocalProcess::new().stop(&ctx).await.unwrap();
    }

    #[tokio::test]
    async fn test_early_exit_is_an_application_error() {
        let temp = TempDir::new().unwrap();
        let ctx = context(temp.path(), "echo booting; echo 'database refused'; exit 3", 1);

        let err = LocalProcess::new().start(&ctx).await.unwrap_err();
        assert!(err.is_application());
        assert!(err.details().unwrap().contains("database refused"));
        assert!(!ctx.pid_file().exists());
    }

    #[tokio::test]
    async fn test_port_already_in_use_fails_before_spawning() {
        let temp = TempDir::new().unwrap();
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let ctx = context(temp.path(), "sleep 1; echo EADDRINUSE; exit 1", port);

        let err = LocalProcess::new().start(&ctx).await.unwrap_err();
        assert!(matches!(err, Error::System { .. }));
        assert!(err.to_string().contains(&port.to_string()));
        assert!(!ctx.pid_file().exists());
        assert!(!ctx.log_file.exists());
    }

    /// Stand-in for the application: the port starts accepting connections
    /// shortly after the child is spawned
    fn listen_later(port: u16) -> tokio::task::JoinHandle<tokio::net::TcpListener> {
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            tokio::net::TcpListener::bind(("127.0.0.1", port)).await.unwrap()
        })
    }

    fn free_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn test_start_then_stop() {
        let temp = TempDir::new().unwrap();
        let port = free_port();
        let ctx = context(temp.path(), "exec sleep 30", port);
        let manager = LocalProcess::new();
        let app = listen_later(port);

        manager.start(&ctx).await.unwrap();
        let _listener = app.await.unwrap();
        assert!(ctx.pid_file().exists());
        assert!(manager.is_running(&ctx).await);

        manager.stop(&ctx).await.unwrap();
        assert!(!manager.is_running(&ctx).await);
        assert!(!ctx.pid_file().exists());
    }
}
