//! Common test utilities for the ghost binary

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::Value;
use tempfile::TempDir;

/// Isolated home for the global registry plus a scratch area
pub struct Sandbox {
    root: TempDir,
}

impl Sandbox {
    pub fn new() -> Self {
        let root = TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join("home")).unwrap();
        Self { root }
    }

    pub fn home(&self) -> PathBuf {
        self.root.path().join("home")
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.path().join(name)
    }

    /// Run the binary non-interactively against this sandbox
    pub fn ghost(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_ghost"))
            .args(args)
            .arg("--no-prompt")
            .env("GHOST_CLI_HOME", self.home())
            .env_remove("RUST_LOG")
            .env_remove("NODE_ENV")
            .output()
            .unwrap()
    }

    /// An installed-looking directory with the given tool-internal config
    pub fn instance(&self, name: &str, cli_config: Value) -> PathBuf {
        let dir = self.path(name);
        std::fs::create_dir_all(&dir).unwrap();
        write_json(&dir.join(".ghost-cli"), &cli_config);
        dir
    }

    pub fn register(&self, entries: &[(&str, &Path)]) {
        let mut instances = serde_json::Map::new();
        for (name, dir) in entries {
            instances.insert(
                name.to_string(),
                serde_json::json!({ "cwd": dir.to_string_lossy() }),
            );
        }
        write_json(
            &self.home().join("config"),
            &serde_json::json!({ "instances": instances }),
        );
    }
}

pub fn write_json(path: &Path, value: &Value) {
    std::fs::write(path, serde_json::to_string_pretty(value).unwrap()).unwrap();
}

pub fn read_json(path: &Path) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}
