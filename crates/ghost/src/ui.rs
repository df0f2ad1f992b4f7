//! Interactive terminal implementation of the lifecycle [`Ui`]

use std::process::Output;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use console::Term;
use dialoguer::{Confirm, Input, Password, Select};
use ghost_core::utils::{render_command, run_elevated};
use ghost_core::Error;
use ghost_lifecycle::Ui;
use ghost_tasks::Renderer;
use indicatif::{ProgressBar, ProgressDrawTarget};
use tracing::debug;

use crate::output;

/// Renders steps as spinners and asks questions through `dialoguer`
pub struct ConsoleUi {
    verbose: bool,
    allow_prompt: bool,
    spinner: Mutex<Option<ProgressBar>>,
}

impl ConsoleUi {
    /// Prompting is only allowed on a terminal and without `--no-prompt`
    pub fn new(verbose: bool, no_prompt: bool) -> Self {
        Self {
            verbose,
            allow_prompt: !no_prompt && Term::stdout().is_term() && Term::stderr().is_term(),
            spinner: Mutex::new(None),
        }
    }

    fn spinner(&self) -> MutexGuard<'_, Option<ProgressBar>> {
        self.spinner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn finish_spinner(&self) {
        if let Some(pb) = self.spinner().take() {
            pb.finish_and_clear();
        }
    }

    /// Run `f` with the active spinner hidden
    fn suspend<T>(&self, f: impl FnOnce() -> T) -> T {
        let current = self.spinner().clone();
        match current {
            Some(pb) => pb.suspend(f),
            None => f(),
        }
    }

    fn no_prompt_error(question: &str) -> anyhow::Error {
        Error::cli(format!("Cannot ask \"{}\" without a terminal", question))
            .with_help("Pass the value as a flag, or run without --no-prompt")
            .into()
    }
}

impl Renderer for ConsoleUi {
    fn step_started(&self, title: &str) {
        let pb = output::spinner(title);
        if let Some(previous) = self.spinner().replace(pb) {
            previous.finish_and_clear();
        }
    }

    fn step_completed(&self, title: &str) {
        self.finish_spinner();
        output::success(title);
    }

    fn step_skipped(&self, title: &str, reason: Option<&str>) {
        self.finish_spinner();
        output::skipped(title, reason);
    }

    fn step_failed(&self, title: &str, error: &anyhow::Error) {
        self.finish_spinner();
        output::error(title);
        debug!("{} failed: {:#}", title, error);
    }

    fn confirm(&self, question: &str, default: bool) -> anyhow::Result<bool> {
        if !self.allow_prompt {
            return Ok(default);
        }
        let answer = self.suspend(|| {
            Confirm::new()
                .with_prompt(question)
                .default(default)
                .interact()
        })?;
        Ok(answer)
    }
}

#[async_trait]
impl Ui for ConsoleUi {
    fn renderer(&self) -> &dyn Renderer {
        self
    }

    fn allow_prompt(&self) -> bool {
        self.allow_prompt
    }

    fn verbose(&self) -> bool {
        self.verbose
    }

    fn info(&self, message: &str) {
        self.suspend(|| output::info(message));
    }

    fn success(&self, message: &str) {
        self.suspend(|| output::success(message));
    }

    fn warn(&self, message: &str) {
        self.suspend(|| output::warning(message));
    }

    fn show(&self, text: &str) {
        self.suspend(|| println!("{}", text));
    }

    fn prompt_text(&self, question: &str, default: Option<&str>) -> anyhow::Result<String> {
        if !self.allow_prompt {
            return default
                .map(str::to_string)
                .ok_or_else(|| Self::no_prompt_error(question));
        }
        let answer = self.suspend(|| {
            let mut input = Input::<String>::new().with_prompt(question);
            if let Some(default) = default {
                input = input.default(default.to_string());
            }
            input.interact_text()
        })?;
        Ok(answer)
    }

    fn prompt_secret(&self, question: &str) -> anyhow::Result<String> {
        if !self.allow_prompt {
            return Err(Self::no_prompt_error(question));
        }
        let answer = self.suspend(|| {
            Password::new()
                .with_prompt(question)
                .allow_empty_password(true)
                .interact()
        })?;
        Ok(answer)
    }

    fn select(&self, question: &str, options: &[&str], default: usize) -> anyhow::Result<usize> {
        if !self.allow_prompt {
            return Ok(default);
        }
        let index = self.suspend(|| {
            Select::new()
                .with_prompt(question)
                .items(options)
                .default(default)
                .interact()
        })?;
        Ok(index)
    }

    async fn sudo(&self, program: &str, args: &[&str]) -> ghost_core::Result<Output> {
        debug!("Elevating: {}", render_command(program, args));

        // keep the spinner from drawing over a password prompt
        let current = self.spinner().clone();
        if let Some(pb) = &current {
            pb.set_draw_target(ProgressDrawTarget::hidden());
        }
        let result = run_elevated(program, args).await;
        if let Some(pb) = &current {
            pb.set_draw_target(ProgressDrawTarget::stderr());
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet() -> ConsoleUi {
        ConsoleUi::new(false, true)
    }

    #[test]
    fn test_no_prompt_accepts_defaults() {
        let ui = quiet();
        assert!(!ui.allow_prompt());
        assert!(ui.confirm("Continue?", true).unwrap());
        assert!(!ui.confirm("Continue?", false).unwrap());
        assert_eq!(ui.select("Pick", &["a", "b"], 1).unwrap(), 1);
        assert_eq!(
            ui.prompt_text("Enter your blog URL:", Some("http://localhost:2368"))
                .unwrap(),
            "http://localhost:2368"
        );
    }

    #[test]
    fn test_no_prompt_without_default_is_an_error() {
        let ui = quiet();
        let err = ui.prompt_text("Enter your MySQL username:", None).unwrap_err();
        assert!(err.to_string().contains("Enter your MySQL username:"));
        assert!(ui.prompt_secret("Password").is_err());
    }

    #[test]
    fn test_step_lifecycle_clears_spinner() {
        let ui = quiet();
        ui.step_started("Configuring Ghost");
        assert!(ui.spinner().is_some());
        ui.step_completed("Configuring Ghost");
        assert!(ui.spinner().is_none());

        ui.step_started("Setting up Nginx");
        ui.step_skipped("Setting up Nginx", Some("Nginx is not installed"));
        assert!(ui.spinner().is_none());
    }
}
