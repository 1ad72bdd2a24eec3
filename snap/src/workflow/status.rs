//! Operator-facing status output.

use std::fmt;
use std::sync::Mutex;

/// One piece of operator-facing text. Events are append-only and ordered;
/// a block of device output travels as a single event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEvent {
    text: String,
}

impl StatusEvent {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Receives status events in emission order.
///
/// Implementations must return quickly; a workflow waits for `emit`.
pub trait StatusSink: Send + Sync {
    fn emit(&self, event: StatusEvent);
}

impl<F> StatusSink for F
where
    F: Fn(StatusEvent) + Send + Sync,
{
    fn emit(&self, event: StatusEvent) {
        self(event)
    }
}

/// A sink that keeps everything it receives.
#[derive(Debug, Default)]
pub struct Transcript {
    events: Mutex<Vec<StatusEvent>>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<StatusEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Event texts, in order.
    pub fn lines(&self) -> Vec<String> {
        self.events().into_iter().map(StatusEvent::into_text).collect()
    }

    pub fn contains(&self, text: &str) -> bool {
        self.events().iter().any(|e| e.text().contains(text))
    }
}

impl StatusSink for Transcript {
    fn emit(&self, event: StatusEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
