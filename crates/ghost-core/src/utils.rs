//! Shell command helpers shared across crates

use std::path::Path;
use std::process::{Output, Stdio};

use tokio::process::Command;
use tracing::debug;

use crate::error::{Error, Result};

/// Check if a command is available in PATH
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// Run a command to completion, failing with a process error on non-zero exit
pub async fn run_command(program: &str, args: &[&str], cwd: Option<&Path>) -> Result<Output> {
    let rendered = render_command(program, args);
    debug!("Running: {}", rendered);

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(cwd) = cwd {
        cmd.current_dir(cwd);
    }

    let output = cmd.output().await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::system(format!("Command not found: {}", program))
        } else {
            Error::process(format!("Failed to run '{}': {}", rendered, e))
        }
    })?;

    if output.status.success() {
        Ok(output)
    } else {
        Err(Error::process_output(rendered, &output))
    }
}

/// Run a command and return trimmed stdout
pub async fn command_stdout(program: &str, args: &[&str]) -> Result<String> {
    let output = run_command(program, args, None).await?;
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Whether the current process already runs with root privileges
pub fn is_root() -> bool {
    #[cfg(unix)]
    {
        nix::unistd::geteuid().is_root()
    }
    #[cfg(not(unix))]
    {
        false
    }
}

/// Run a single command with elevated privileges.
///
/// Runs directly when already root, otherwise through `sudo -E`. Stdin is
/// inherited so sudo can ask for a password on the terminal.
pub async fn run_elevated(program: &str, args: &[&str]) -> Result<Output> {
    if is_root() {
        return run_command(program, args, None).await;
    }

    let mut sudo_args = vec!["-E", program];
    sudo_args.extend_from_slice(args);
    let rendered = render_command("sudo", &sudo_args);
    debug!("Running elevated: {}", rendered);

    let output = Command::new("sudo")
        .args(&sudo_args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::system("sudo is required to run privileged commands")
                    .with_help("Install sudo or re-run the command as root")
            } else {
                Error::process(format!("Failed to run '{}': {}", rendered, e))
            }
        })?;

    if output.status.success() {
        Ok(output)
    } else {
        Err(Error::process_output(rendered, &output))
    }
}

/// Join a program and its arguments for display
pub fn render_command(program: &str, args: &[&str]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_command() {
        assert_eq!(render_command("nginx", &[]), "nginx");
        assert_eq!(render_command("nginx", &["-s", "reload"]), "nginx -s reload");
    }

    #[tokio::test]
    async fn test_missing_program_is_system_error() {
        let err = run_command("definitely-not-a-real-binary-xyz", &[], None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::System { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_command_captures_output() {
        let err = run_command("sh", &["-c", "echo oops >&2; exit 3"], None)
            .await
            .unwrap_err();
        match err {
            Error::Process {
                exit_code, stderr, ..
            } => {
                assert_eq!(exit_code, Some(3));
                assert_eq!(stderr, "oops");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
