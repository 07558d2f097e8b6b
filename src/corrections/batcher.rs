//! Batched-tier queue and its background flusher.
//!
//! Batched corrections accumulate until the batch reaches `max_batch_size`
//! or the oldest entry has waited `max_wait_time`, whichever comes first.
//! The flush thread runs independently of any caller's lifetime — a
//! disconnecting submitter never cancels a pending flush. Shutdown drains
//! whatever is queued so nothing is left uncommitted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::config::BatchConfig;
use crate::models::Correction;

/// Sleep granularity for shutdown/flush responsiveness.
const SLEEP_GRANULARITY: Duration = Duration::from_millis(25);

/// Where drained batches go to be committed.
pub trait BatchSink: Send + Sync {
    fn commit_batch(&self, corrections: Vec<Correction>);
}

struct Queued {
    correction: Correction,
    enqueued_at: Instant,
}

/// Shared accumulation queue for batched-tier corrections.
pub struct BatchQueue {
    config: BatchConfig,
    entries: Mutex<Vec<Queued>>,
}

impl BatchQueue {
    pub fn new(config: BatchConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Queue a correction. Returns the queue length afterwards.
    pub fn enqueue(&self, correction: Correction) -> usize {
        let mut entries = match self.entries.lock() {
            Ok(e) => e,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.push(Queued {
            correction,
            enqueued_at: Instant::now(),
        });
        entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain the queue if a flush condition holds (size or age).
    pub fn drain_if_due(&self) -> Option<Vec<Correction>> {
        let mut entries = match self.entries.lock() {
            Ok(e) => e,
            Err(poisoned) => poisoned.into_inner(),
        };
        if entries.is_empty() {
            return None;
        }

        let full = entries.len() >= self.config.max_batch_size;
        let aged = entries
            .first()
            .map(|q| q.enqueued_at.elapsed() >= self.config.max_wait())
            .unwrap_or(false);

        if full || aged {
            Some(entries.drain(..).map(|q| q.correction).collect())
        } else {
            None
        }
    }

    /// Drain unconditionally (shutdown path).
    pub fn drain_all(&self) -> Vec<Correction> {
        let mut entries = match self.entries.lock() {
            Ok(e) => e,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.drain(..).map(|q| q.correction).collect()
    }
}

/// Handle for the background flush thread.
///
/// Supports graceful shutdown via `shutdown()` or automatic cleanup on
/// `Drop`; shutdown flushes anything still queued.
pub struct BatchFlusher {
    shutdown: Arc<AtomicBool>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl BatchFlusher {
    /// Start the flush thread over a shared queue and sink.
    pub fn start(queue: Arc<BatchQueue>, sink: Arc<dyn BatchSink>) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = shutdown.clone();

        let handle = std::thread::spawn(move || {
            tracing::debug!("Batch flusher started");
            flusher_loop(&queue, &*sink, &flag);
        });

        Self {
            shutdown,
            handle: Some(handle),
        }
    }

    /// Request graceful shutdown. Queued corrections are flushed first.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

impl Drop for BatchFlusher {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

fn flusher_loop(queue: &BatchQueue, sink: &dyn BatchSink, shutdown: &AtomicBool) {
    loop {
        if shutdown.load(Ordering::Relaxed) {
            let remaining = queue.drain_all();
            if !remaining.is_empty() {
                tracing::info!(count = remaining.len(), "Flushing batch on shutdown");
                sink.commit_batch(remaining);
            }
            tracing::debug!("Batch flusher shutting down");
            return;
        }

        if let Some(batch) = queue.drain_if_due() {
            tracing::info!(count = batch.len(), "Flushing correction batch");
            sink.commit_batch(batch);
        }

        std::thread::sleep(SLEEP_GRANULARITY);
    }
}
