//! Progress streams.
//!
//! A [`ProgressStream`] runs one stage operation on its own task and yields
//! its events in emission order. Intermediate events come from the stage's
//! [`ProgressReporter`] and are dropped if the consumer falls behind; the
//! terminal event is always delivered last and nothing follows it.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::mpsc;
use tracing::{debug, error};
use vdub_models::ProgressEvent;
use vdub_providers::ProgressReporter;

/// Message of the terminal event produced when a stage task panics.
pub const STAGE_PANIC_MESSAGE: &str = "Internal error: the stage stopped unexpectedly";

/// Ordered, single-terminal event stream of one stage run.
///
/// The stage keeps running if the stream is dropped.
#[derive(Debug)]
pub struct ProgressStream {
    rx: mpsc::Receiver<ProgressEvent>,
    finished: bool,
}

impl ProgressStream {
    /// Spawn `work` and stream its progress.
    ///
    /// `work` receives a reporter for intermediate events and resolves to the
    /// terminal event. A non-terminal result or a panic is turned into a
    /// single `Error` event.
    pub fn spawn<F, Fut>(capacity: usize, work: F) -> Self
    where
        F: FnOnce(ProgressReporter) -> Fut,
        Fut: Future<Output = ProgressEvent> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(work(ProgressReporter::new(tx.clone())));

        tokio::spawn(async move {
            let terminal = match handle.await {
                Ok(event) if event.is_terminal() => event,
                Ok(event) => ProgressEvent::error(format!(
                    "Stage ended without a result: {}",
                    event.message_text()
                )),
                Err(e) => {
                    error!("Stage task failed: {}", e);
                    ProgressEvent::error(STAGE_PANIC_MESSAGE)
                }
            };

            // Awaited so the terminal event is never dropped for a slow consumer
            if tx.send(terminal).await.is_err() {
                debug!("Progress consumer went away before the terminal event");
            }
        });

        Self {
            rx,
            finished: false,
        }
    }

    /// Whether the terminal event has been yielded.
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Stream for ProgressStream {
    type Item = ProgressEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<ProgressEvent>> {
        if self.finished {
            return Poll::Ready(None);
        }

        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(event)) => {
                if event.is_terminal() {
                    self.finished = true;
                    self.rx.close();
                }
                Poll::Ready(Some(event))
            }
            Poll::Ready(None) => {
                self.finished = true;
                Poll::Ready(Some(ProgressEvent::error(
                    "Stage ended without reporting a result",
                )))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
