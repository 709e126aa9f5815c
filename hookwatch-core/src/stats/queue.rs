//! Bounded aggregate work queue drained by a small worker pool
//!
//! Producers call [`AggregateQueue::enqueue`] from the ingestion path; it never
//! blocks. Each worker runs jobs on the blocking pool and retries failures with
//! exponential backoff before giving up with a warning.

use super::AggregateJob;
use crate::broadcast::{EventKind, Hub};
use crate::config::AggregateConfig;
use crate::db::Database;
use crate::error::{Error, Result};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::{Mutex, Notify};

/// Counters describing queue throughput since start
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Jobs accepted onto the queue
    pub enqueued: u64,
    /// Jobs that eventually succeeded (queued or inline)
    pub completed: u64,
    /// Individual retry attempts
    pub retried: u64,
    /// Queued jobs dropped after exhausting retries
    pub failed: u64,
    /// Jobs applied on the caller's thread because the queue was full
    pub inline: u64,
    /// Inline jobs that failed. These get a single attempt.
    pub inline_failed: u64,
}

#[derive(Default)]
struct Counters {
    enqueued: AtomicU64,
    completed: AtomicU64,
    retried: AtomicU64,
    failed: AtomicU64,
    inline: AtomicU64,
    inline_failed: AtomicU64,
}

struct Shared {
    db: Arc<Database>,
    hub: Option<Hub>,
    config: AggregateConfig,
    counters: Counters,
    pending: AtomicUsize,
    idle: Notify,
}

impl Shared {
    fn finish(&self) {
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }

    fn succeeded(&self, job: &AggregateJob) {
        self.counters.completed.fetch_add(1, Ordering::Relaxed);
        if let Some(hub) = &self.hub {
            hub.publish(EventKind::StatsUpdated, &job.updated_key());
        }
    }
}

/// Handle to the aggregate worker pool. Cheap to clone.
#[derive(Clone)]
pub struct AggregateQueue {
    tx: mpsc::Sender<AggregateJob>,
    shared: Arc<Shared>,
}

impl AggregateQueue {
    /// Spawn the worker pool on the current tokio runtime.
    ///
    /// `hub` receives a `stats_updated` event after every successful job.
    pub fn start(db: Arc<Database>, hub: Option<Hub>, config: &AggregateConfig) -> Result<Self> {
        let handle = Handle::try_current()
            .map_err(|_| Error::Config("aggregate queue needs a running tokio runtime".into()))?;

        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let shared = Arc::new(Shared {
            db,
            hub,
            config: config.clone(),
            counters: Counters::default(),
            pending: AtomicUsize::new(0),
            idle: Notify::new(),
        });

        let workers = config.workers.max(1);
        for worker in 0..workers {
            handle.spawn(run_worker(worker, Arc::clone(&rx), Arc::clone(&shared)));
        }

        tracing::info!(
            workers,
            capacity = config.queue_capacity,
            "Aggregate queue started"
        );

        Ok(Self { tx, shared })
    }

    /// Schedule a job without blocking.
    ///
    /// When the queue is full (or already shut down) the job is applied right
    /// here instead, so counters are never silently lost. The caller waits for
    /// that write and an inline failure is not retried.
    pub fn enqueue(&self, job: AggregateJob) {
        self.shared.pending.fetch_add(1, Ordering::AcqRel);

        let job = match self.tx.try_send(job) {
            Ok(()) => {
                self.shared.counters.enqueued.fetch_add(1, Ordering::Relaxed);
                return;
            }
            Err(TrySendError::Full(job)) => {
                tracing::warn!(kind = job.kind(), "Aggregate queue full, applying inline");
                job
            }
            Err(TrySendError::Closed(job)) => {
                tracing::warn!(kind = job.kind(), "Aggregate queue closed, applying inline");
                job
            }
        };

        self.shared.counters.inline.fetch_add(1, Ordering::Relaxed);
        match job.apply(&self.shared.db) {
            Ok(()) => self.shared.succeeded(&job),
            Err(e) => {
                self.shared.counters.inline_failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(kind = job.kind(), error = %e, "Inline aggregate update failed");
            }
        }
        self.shared.finish();
    }

    /// Wait until every job accepted so far has finished.
    pub async fn settle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.shared.pending.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Jobs accepted but not yet finished
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> QueueStats {
        let c = &self.shared.counters;
        QueueStats {
            enqueued: c.enqueued.load(Ordering::Relaxed),
            completed: c.completed.load(Ordering::Relaxed),
            retried: c.retried.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            inline: c.inline.load(Ordering::Relaxed),
            inline_failed: c.inline_failed.load(Ordering::Relaxed),
        }
    }
}

async fn run_worker(
    worker: usize,
    rx: Arc<Mutex<mpsc::Receiver<AggregateJob>>>,
    shared: Arc<Shared>,
) {
    loop {
        let job = { rx.lock().await.recv().await };
        let Some(job) = job else { break };

        process(&shared, &job).await;
        shared.finish();
    }
    tracing::debug!(worker, "Aggregate worker stopped");
}

async fn process(shared: &Arc<Shared>, job: &AggregateJob) {
    let mut attempt = 0u32;
    loop {
        let task_shared = Arc::clone(shared);
        let task_job = job.clone();
        let result = tokio::task::spawn_blocking(move || task_job.apply(&task_shared.db)).await;

        let err = match result {
            Ok(Ok(())) => {
                shared.succeeded(job);
                return;
            }
            Ok(Err(e)) => e,
            Err(join_err) => {
                shared.counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(kind = job.kind(), error = %join_err, "Aggregate task panicked");
                return;
            }
        };

        if attempt >= shared.config.max_retries {
            shared.counters.failed.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                kind = job.kind(),
                attempts = attempt + 1,
                error = %err,
                "Aggregate update failed, giving up"
            );
            return;
        }

        attempt += 1;
        shared.counters.retried.fetch_add(1, Ordering::Relaxed);
        let delay = shared.config.backoff(attempt);
        tracing::debug!(
            kind = job.kind(),
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Retrying aggregate update"
        );
        tokio::time::sleep(delay).await;
    }
}
