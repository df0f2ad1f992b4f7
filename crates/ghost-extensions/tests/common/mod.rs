//! Common test utilities for ghost-extensions

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ghost_core::{Environment, Error};
use ghost_lifecycle::{ExtensionRegistry, Instance, SetupArgs, SetupContext, System, Ui};
use ghost_tasks::Renderer;
use serde_json::Value;

/// Non-interactive UI that records privileged commands instead of running them
#[derive(Default)]
pub struct DryRunUi {
    elevated: Mutex<Vec<String>>,
}

impl DryRunUi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every command passed to `sudo`, rendered as one line
    pub fn elevated(&self) -> Vec<String> {
        self.elevated.lock().unwrap().clone()
    }
}

impl Renderer for DryRunUi {
    fn step_started(&self, _title: &str) {}

    fn step_completed(&self, _title: &str) {}

    fn step_skipped(&self, _title: &str, _reason: Option<&str>) {}

    fn step_failed(&self, _title: &str, _error: &anyhow::Error) {}

    fn confirm(&self, _question: &str, default: bool) -> anyhow::Result<bool> {
        Ok(default)
    }
}

#[async_trait]
impl Ui for DryRunUi {
    fn renderer(&self) -> &dyn Renderer {
        self
    }

    fn allow_prompt(&self) -> bool {
        false
    }

    fn verbose(&self) -> bool {
        false
    }

    fn info(&self, _message: &str) {}

    fn success(&self, _message: &str) {}

    fn warn(&self, _message: &str) {}

    fn show(&self, _text: &str) {}

    fn prompt_text(&self, _question: &str, default: Option<&str>) -> anyhow::Result<String> {
        Ok(default.unwrap_or_default().to_string())
    }

    fn prompt_secret(&self, _question: &str) -> anyhow::Result<String> {
        Ok(String::new())
    }

    fn select(&self, _question: &str, _options: &[&str], default: usize) -> anyhow::Result<usize> {
        Ok(default)
    }

    async fn sudo(&self, program: &str, args: &[&str]) -> Result<Output, Error> {
        self.elevated
            .lock()
            .unwrap()
            .push(ghost_core::utils::render_command(program, args));
        ghost_core::utils::run_command("true", &[], None).await
    }
}

pub fn system(root: &Path, extensions: ExtensionRegistry, ui: Arc<DryRunUi>) -> System {
    System::new(
        root.join("home/config"),
        Environment::Production,
        extensions,
        ui,
    )
}

/// Instance directory with a production config holding `config`
pub fn instance_with_config(system: &System, root: &Path, config: Value) -> Instance {
    let dir = root.join("blog");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        Environment::Production.config_path(&dir),
        config.to_string(),
    )
    .unwrap();
    system.get_instance(dir)
}

pub fn setup_context(system: &System, instance: Instance, args: SetupArgs) -> SetupContext {
    SetupContext::new(system.clone(), instance, args)
}

pub fn touch(path: &Path) -> PathBuf {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, "").unwrap();
    path.to_path_buf()
}
