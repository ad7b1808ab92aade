//! Progress reporting handle passed to providers.

use tokio::sync::mpsc;
use vdub_models::ProgressEvent;

/// Non-blocking sender for a stage's intermediate progress.
///
/// Providers only emit `InProgress` events through this handle; the terminal
/// event belongs to whoever runs the stage. Events are dropped when the
/// consumer falls behind.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    tx: Option<mpsc::Sender<ProgressEvent>>,
}

impl ProgressReporter {
    pub fn new(tx: mpsc::Sender<ProgressEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A reporter that discards everything.
    pub fn noop() -> Self {
        Self { tx: None }
    }

    /// Report a percentage with a message.
    pub fn progress(&self, percent: u8, message: impl Into<String>) {
        self.send(ProgressEvent::progress(percent, message));
    }

    /// Report a step that has no meaningful percentage.
    pub fn message(&self, message: impl Into<String>) {
        self.send(ProgressEvent::message(message));
    }

    fn send(&self, event: ProgressEvent) {
        if let Some(tx) = &self.tx {
            // Use try_send to avoid blocking; drop events if channel is full
            let _ = tx.try_send(event);
        }
    }
}

/// Scale `done / total` into the `[from, to]` percentage band.
pub fn scaled_percent(done: u64, total: u64, from: u8, to: u8) -> u8 {
    if total == 0 {
        return from;
    }
    let span = u64::from(to.saturating_sub(from));
    let fraction = done.min(total) * span / total;
    from + fraction as u8
}
