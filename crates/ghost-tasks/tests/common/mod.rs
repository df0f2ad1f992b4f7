//! Common test utilities for ghost-tasks

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;

use ghost_tasks::Renderer;

/// Event captured by [`RecordingRenderer`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Started(String),
    Completed(String),
    Skipped(String, Option<String>),
    Failed(String, String),
    Asked(String),
}

/// Renderer that records every call and answers prompts from a queue
#[derive(Default)]
pub struct RecordingRenderer {
    events: Mutex<Vec<Event>>,
    answers: Mutex<VecDeque<bool>>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue answers for upcoming confirmation prompts
    pub fn with_answers(answers: &[bool]) -> Self {
        let renderer = Self::default();
        renderer.answers.lock().unwrap().extend(answers.iter().copied());
        renderer
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

impl Renderer for RecordingRenderer {
    fn step_started(&self, title: &str) {
        self.push(Event::Started(title.to_string()));
    }

    fn step_completed(&self, title: &str) {
        self.push(Event::Completed(title.to_string()));
    }

    fn step_skipped(&self, title: &str, reason: Option<&str>) {
        self.push(Event::Skipped(title.to_string(), reason.map(String::from)));
    }

    fn step_failed(&self, title: &str, error: &anyhow::Error) {
        self.push(Event::Failed(title.to_string(), error.to_string()));
    }

    fn confirm(&self, question: &str, default: bool) -> anyhow::Result<bool> {
        self.push(Event::Asked(question.to_string()));
        Ok(self.answers.lock().unwrap().pop_front().unwrap_or(default))
    }
}
