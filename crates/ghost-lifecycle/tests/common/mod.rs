//! Common test utilities for ghost-lifecycle

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ghost_core::Environment;
use ghost_lifecycle::process::Operation;
use ghost_lifecycle::{
    Extension, ExtensionRegistry, ProcessContext, ProcessManager, ProcessManagerFactory, System,
    Ui,
};
use ghost_tasks::Renderer;
use tracing::field::{Field, Visit};
use tracing::{Event as TracingEvent, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

/// Non-interactive UI that records output and runs "elevated" commands
/// directly
#[derive(Default)]
pub struct TestUi {
    lines: Mutex<Vec<String>>,
    elevated: Mutex<Vec<String>>,
}

impl TestUi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub fn elevated(&self) -> Vec<String> {
        self.elevated.lock().unwrap().clone()
    }

    fn push(&self, line: String) {
        self.lines.lock().unwrap().push(line);
    }
}

impl Renderer for TestUi {
    fn step_started(&self, title: &str) {
        self.push(format!("started: {}", title));
    }

    fn step_completed(&self, title: &str) {
        self.push(format!("completed: {}", title));
    }

    fn step_skipped(&self, title: &str, reason: Option<&str>) {
        self.push(format!("skipped: {} ({})", title, reason.unwrap_or("")));
    }

    fn step_failed(&self, title: &str, error: &anyhow::Error) {
        self.push(format!("failed: {}: {}", title, error));
    }

    fn confirm(&self, _question: &str, default: bool) -> anyhow::Result<bool> {
        Ok(default)
    }
}

#[async_trait]
impl Ui for TestUi {
    fn renderer(&self) -> &dyn Renderer {
        self
    }

    fn allow_prompt(&self) -> bool {
        false
    }

    fn verbose(&self) -> bool {
        false
    }

    fn info(&self, message: &str) {
        self.push(format!("info: {}", message));
    }

    fn success(&self, message: &str) {
        self.push(format!("success: {}", message));
    }

    fn warn(&self, message: &str) {
        self.push(format!("warn: {}", message));
    }

    fn show(&self, text: &str) {
        self.push(text.to_string());
    }

    fn prompt_text(&self, _question: &str, default: Option<&str>) -> anyhow::Result<String> {
        Ok(default.unwrap_or_default().to_string())
    }

    fn prompt_secret(&self, _question: &str) -> anyhow::Result<String> {
        Ok(String::new())
    }

    fn select(&self, _question: &str, _options: &[&str], default: usize) -> anyhow::Result<usize> {
        Ok(default)
    }

    async fn sudo(&self, program: &str, args: &[&str]) -> ghost_core::Result<Output> {
        let mut line = vec![program];
        line.extend_from_slice(args);
        self.elevated.lock().unwrap().push(line.join(" "));
        ghost_core::utils::run_command(program, args, None).await
    }
}

/// Shared state of a [`FakeManager`]
#[derive(Default, Clone)]
pub struct FakeState {
    pub running: Arc<AtomicBool>,
    pub starts: Arc<AtomicUsize>,
    pub stops: Arc<AtomicUsize>,
    /// Lifecycle calls in the order they happened
    pub calls: Arc<Mutex<Vec<&'static str>>>,
}

impl FakeState {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }
}

/// In-memory process manager
pub struct FakeManager {
    name: String,
    state: FakeState,
}

#[async_trait]
impl ProcessManager for FakeManager {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self, _ctx: &ProcessContext) -> ghost_core::Result<()> {
        self.state.starts.fetch_add(1, Ordering::SeqCst);
        self.state.calls.lock().unwrap().push("start");
        self.state.set_running(true);
        Ok(())
    }

    async fn stop(&self, _ctx: &ProcessContext) -> ghost_core::Result<()> {
        self.state.stops.fetch_add(1, Ordering::SeqCst);
        self.state.calls.lock().unwrap().push("stop");
        self.state.set_running(false);
        Ok(())
    }

    async fn is_running(&self, _ctx: &ProcessContext) -> bool {
        self.state.is_running()
    }
}

/// Factory for [`FakeManager`] with configurable validity
pub struct FakeFactory {
    pub name: String,
    pub will_run: bool,
    pub operations: Vec<Operation>,
    pub state: FakeState,
}

impl FakeFactory {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            will_run: true,
            operations: Operation::ALL.to_vec(),
            state: FakeState::default(),
        }
    }
}

impl ProcessManagerFactory for FakeFactory {
    fn name(&self) -> &str {
        &self.name
    }

    fn operations(&self) -> &[Operation] {
        &self.operations
    }

    fn will_run(&self) -> bool {
        self.will_run
    }

    fn create(&self, _ui: Arc<dyn Ui>) -> Arc<dyn ProcessManager> {
        Arc::new(FakeManager {
            name: self.name.clone(),
            state: self.state.clone(),
        })
    }
}

/// Extension that only contributes process managers
pub struct ManagerExtension(pub Vec<Arc<dyn ProcessManagerFactory>>);

impl Extension for ManagerExtension {
    fn name(&self) -> &str {
        "managers"
    }

    fn process_managers(&self) -> Vec<Arc<dyn ProcessManagerFactory>> {
        self.0.clone()
    }
}

/// Build a production system whose global config lives under `root`
pub fn system(root: &Path, extensions: ExtensionRegistry, ui: Arc<TestUi>) -> System {
    System::new(
        root.join("home/config"),
        Environment::Production,
        extensions,
        ui,
    )
}

/// Create `root/<name>` and return it
pub fn instance_dir(root: &Path, name: &str) -> PathBuf {
    let dir = root.join(name);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Counts WARN events and keeps their messages
#[derive(Clone, Default)]
pub struct WarnCounter {
    messages: Arc<Mutex<Vec<String>>>,
}

impl WarnCounter {
    pub fn count(&self) -> usize {
        self.messages.lock().unwrap().len()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{:?}", value);
        }
    }
}

impl<S: Subscriber> Layer<S> for WarnCounter {
    fn on_event(&self, event: &TracingEvent<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == Level::WARN {
            let mut visitor = MessageVisitor(String::new());
            event.record(&mut visitor);
            self.messages.lock().unwrap().push(visitor.0);
        }
    }
}
