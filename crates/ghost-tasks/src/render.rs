//! Progress reporting interface consumed by the runner

/// Renders step progress and answers confirmation prompts
pub trait Renderer: Send + Sync {
    /// A step began executing (its skip check is about to run)
    fn step_started(&self, title: &str);

    /// A step finished successfully
    fn step_completed(&self, title: &str);

    /// A step was skipped, with an optional reason
    fn step_skipped(&self, title: &str, reason: Option<&str>);

    /// A step raised an error
    fn step_failed(&self, title: &str, error: &anyhow::Error);

    /// Ask a yes/no question
    fn confirm(&self, question: &str, default: bool) -> anyhow::Result<bool>;
}

/// Renderer that prints nothing and accepts every default
#[derive(Debug, Default, Clone, Copy)]
pub struct QuietRenderer;

impl Renderer for QuietRenderer {
    fn step_started(&self, _title: &str) {}
    fn step_completed(&self, _title: &str) {}
    fn step_skipped(&self, _title: &str, _reason: Option<&str>) {}
    fn step_failed(&self, _title: &str, _error: &anyhow::Error) {}

    fn confirm(&self, _question: &str, default: bool) -> anyhow::Result<bool> {
        Ok(default)
    }
}
