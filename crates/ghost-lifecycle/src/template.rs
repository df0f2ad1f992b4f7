//! Generated system files
//!
//! Files such as an nginx site or a systemd unit are written into the
//! instance's `system/files` directory first and then linked into their
//! privileged location, so the instance keeps the authoritative copy.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ghost_core::paths::SYSTEM_FILES_DIR;
use tracing::debug;

use crate::instance::Instance;
use crate::ui::Ui;

/// Write `contents` as `file` into the instance and link it into `target_dir`.
///
/// With prompting allowed the operator may view or edit the file first.
/// Returns the path of the link.
pub async fn template(
    instance: &Instance,
    ui: &dyn Ui,
    contents: &str,
    descriptor: &str,
    file: &str,
    target_dir: &Path,
) -> Result<PathBuf> {
    template_in(instance.dir(), ui, contents, descriptor, file, target_dir).await
}

/// [`template`] for callers that only know the instance directory
pub async fn template_in(
    dir: &Path,
    ui: &dyn Ui,
    contents: &str,
    descriptor: &str,
    file: &str,
    target_dir: &Path,
) -> Result<PathBuf> {
    let files_dir = dir.join(SYSTEM_FILES_DIR);
    std::fs::create_dir_all(&files_dir)
        .with_context(|| format!("Failed to create {}", files_dir.display()))?;
    let source = files_dir.join(file);
    std::fs::write(&source, contents)
        .with_context(|| format!("Failed to write {}", source.display()))?;

    if ui.allow_prompt() {
        review(ui, &source, descriptor)?;
    }

    let target = target_dir.join(file);
    let source_str = source.to_string_lossy();
    let target_str = target.to_string_lossy();
    ui.sudo("ln", &["-sf", &source_str, &target_str])
        .await
        .with_context(|| format!("Failed to link {} into {}", descriptor, target_dir.display()))?;

    debug!("Linked {} -> {}", target.display(), source.display());
    Ok(target)
}

fn review(ui: &dyn Ui, source: &Path, descriptor: &str) -> Result<()> {
    const CHOICES: [&str; 3] = ["Continue", "View file", "Edit file"];
    loop {
        let question = format!("Would you like to view or edit the {}?", descriptor);
        match ui.select(&question, &CHOICES, 0)? {
            1 => {
                let contents = std::fs::read_to_string(source)?;
                ui.show(&contents);
            }
            2 => {
                let editor = std::env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());
                let status = std::process::Command::new(&editor)
                    .arg(source)
                    .status()
                    .with_context(|| format!("Failed to launch editor '{}'", editor))?;
                if !status.success() {
                    ui.warn(&format!("Editor exited with {}", status));
                }
            }
            _ => return Ok(()),
        }
    }
}
