//! Log observer - stream, filter, batch.
//!
//! Per-container readers push filtered [`LogEvent`]s into a single
//! coordinator that owns the buffer and the debounce timer. Batches are
//! emitted on `window` of inactivity or immediately when the buffer hits
//! [`MAX_BUFFER_SIZE`], and only one batch is in flight at a time: the
//! consumer signals completion before the next batch may be cut.
//!
//! Shutdown cancels any pending timer without flushing, so teardown never
//! triggers new work.

pub mod filter;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::runtime::{ContainerRuntime, LogEvent};

/// Backpressure cap: a buffer at this size flushes immediately.
pub const MAX_BUFFER_SIZE: usize = 100;

/// One unit of orchestrator work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogBatch {
    /// Formatted `[container] message` lines, in arrival order
    pub logs: Vec<String>,

    /// Unique source containers, in first-seen order
    pub containers: Vec<String>,

    /// Monotonic emission time
    pub triggered_at: Instant,
}

impl LogBatch {
    fn from_events(events: Vec<LogEvent>) -> Self {
        let mut containers: Vec<String> = Vec::new();
        for event in &events {
            if !containers.contains(&event.container) {
                containers.push(event.container.clone());
            }
        }
        let logs = events
            .iter()
            .map(|e| format!("[{}] {}", e.container, e.message))
            .collect();
        Self {
            logs,
            containers,
            triggered_at: Instant::now(),
        }
    }
}

/// Channels wiring the coordinator to its consumer.
pub struct ObserverChannels {
    /// Filtered events in
    pub event_tx: mpsc::Sender<LogEvent>,
    /// Batches out
    pub batch_rx: mpsc::Receiver<LogBatch>,
    /// Consumer completion signal in
    pub done_tx: mpsc::Sender<()>,
    /// Flip to true to stop the coordinator
    pub shutdown_tx: watch::Sender<bool>,
}

/// Spawn the batching coordinator. Returns the channel endpoints the
/// caller wires to stream pumps and the consumer loop.
pub fn spawn_coordinator(window: Duration) -> ObserverChannels {
    let (event_tx, event_rx) = mpsc::channel(MAX_BUFFER_SIZE * 2);
    let (batch_tx, batch_rx) = mpsc::channel(1);
    let (done_tx, done_rx) = mpsc::channel(1);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(run_coordinator(
        window,
        event_rx,
        batch_tx,
        done_rx,
        shutdown_rx,
    ));

    ObserverChannels {
        event_tx,
        batch_rx,
        done_tx,
        shutdown_tx,
    }
}

async fn run_coordinator(
    window: Duration,
    mut event_rx: mpsc::Receiver<LogEvent>,
    batch_tx: mpsc::Sender<LogBatch>,
    mut done_rx: mpsc::Receiver<()>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut buffer: Vec<LogEvent> = Vec::new();
    let mut deadline: Option<Instant> = None;
    let mut processing = false;

    loop {
        let timer_at = deadline.unwrap_or_else(Instant::now);

        tokio::select! {
            event = event_rx.recv() => {
                match event {
                    Some(event) => {
                        buffer.push(event);
                        if !processing {
                            if buffer.len() >= MAX_BUFFER_SIZE {
                                // Backpressure trumps debounce: flush now,
                                // cancelling any pending timer.
                                deadline = None;
                                flush(&mut buffer, &batch_tx, &mut processing).await;
                            } else {
                                deadline = Some(Instant::now() + window);
                            }
                        }
                        // While a batch is in flight events only accumulate.
                    }
                    None => break,
                }
            }

            _ = tokio::time::sleep_until(timer_at), if deadline.is_some() && !processing => {
                deadline = None;
                flush(&mut buffer, &batch_tx, &mut processing).await;
            }

            _ = done_rx.recv(), if processing => {
                processing = false;
                if !buffer.is_empty() {
                    if buffer.len() >= MAX_BUFFER_SIZE {
                        // Already over the cap again: zero-delay flush.
                        flush(&mut buffer, &batch_tx, &mut processing).await;
                    } else {
                        deadline = Some(Instant::now() + window);
                    }
                }
            }

            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    // Cancel the pending window; deliberately no flush.
                    debug!("[*]  observer stopping, {} buffered events discarded", buffer.len());
                    break;
                }
            }
        }
    }
}

/// Cut a batch of at most [`MAX_BUFFER_SIZE`] events and hand it to the
/// consumer. Marks the coordinator as processing until `done` arrives.
async fn flush(
    buffer: &mut Vec<LogEvent>,
    batch_tx: &mpsc::Sender<LogBatch>,
    processing: &mut bool,
) {
    if buffer.is_empty() {
        return;
    }
    let take = buffer.len().min(MAX_BUFFER_SIZE);
    let batch = LogBatch::from_events(buffer.drain(..take).collect());
    info!(
        "[>]  batch: {} lines from {:?}",
        batch.logs.len(),
        batch.containers
    );
    *processing = true;
    if batch_tx.send(batch).await.is_err() {
        *processing = false;
    }
}

/// Follow one container and forward its incident-worthy lines to the
/// coordinator. Returns when the log stream or the coordinator goes away.
pub async fn pump_container(
    runtime: Arc<dyn ContainerRuntime>,
    container: String,
    event_tx: mpsc::Sender<LogEvent>,
) {
    let mut rx = match runtime.follow_logs(&container).await {
        Ok(rx) => rx,
        Err(e) => {
            warn!("[!]  cannot follow logs for {}: {}", container, e);
            return;
        }
    };

    info!("[*]  observing {}", container);
    while let Some(event) = rx.recv().await {
        if filter::should_include(&event) {
            if event_tx.send(event).await.is_err() {
                break;
            }
        }
    }
    debug!("[*]  log stream for {} ended", container);
}

// ============================================================================
// Tests
// ============================================================================
