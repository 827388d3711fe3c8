//! Timestamped phase-progress events for a pipeline run.

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseEvent {
    pub elapsed_ms: u64,
    pub message: String,
}

/// Logs every phase message with the run-relative timestamp and forwards it to an
/// optional sink. Cheap to clone; all clones share the run's start instant.
#[derive(Debug, Clone)]
pub struct Phase {
    started: Instant,
    sink: Option<UnboundedSender<PhaseEvent>>,
}

impl Phase {
    pub fn start(sink: Option<UnboundedSender<PhaseEvent>>) -> Self {
        Self {
            started: Instant::now(),
            sink,
        }
    }

    /// A reporter that only logs.
    pub fn detached() -> Self {
        Self::start(None)
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    pub fn emit(&self, message: impl Into<String>) {
        let message = message.into();
        let elapsed_ms = self.elapsed_ms();
        info!(target: "news_scrape", elapsed_ms, "{message}");
        if let Some(tx) = &self.sink {
            // Receiver may be gone; progress is best-effort.
            let _ = tx.send(PhaseEvent {
                elapsed_ms,
                message,
            });
        }
    }
}
