//! Operator-facing interface consumed by lifecycle code and extensions

use std::process::Output;

use async_trait::async_trait;
use ghost_tasks::Renderer;

/// Everything a step may need from the terminal.
///
/// Extends the task [`Renderer`] with prompts, plain messages and the single
/// elevation primitive. Privileged work goes through [`Ui::sudo`] only.
#[async_trait]
pub trait Ui: Renderer {
    /// Borrow as a plain step renderer
    fn renderer(&self) -> &dyn Renderer;

    /// Whether the operator can be asked questions
    fn allow_prompt(&self) -> bool;

    /// Whether verbose diagnostics were requested
    fn verbose(&self) -> bool;

    fn info(&self, message: &str);

    fn success(&self, message: &str);

    fn warn(&self, message: &str);

    /// Print a block of text verbatim
    fn show(&self, text: &str);

    /// Ask for a line of text
    fn prompt_text(&self, question: &str, default: Option<&str>) -> anyhow::Result<String>;

    /// Ask for a secret without echoing it
    fn prompt_secret(&self, question: &str) -> anyhow::Result<String>;

    /// Pick one of `options`, returning its index
    fn select(&self, question: &str, options: &[&str], default: usize) -> anyhow::Result<usize>;

    /// Run one command with elevated privileges
    async fn sudo(&self, program: &str, args: &[&str]) -> ghost_core::Result<Output> {
        ghost_core::utils::run_elevated(program, args).await
    }
}
