use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use {
    reqwest::Client,
    serde::Serialize,
    tokio::{
        sync::{Mutex, mpsc},
        task::JoinHandle,
    },
    tracing::{debug, warn},
};

use crate::delivery::{Delivery, DispatchError, deliver};

struct Job {
    client: Client,
    delivery: Delivery,
}

/// Delivery counters, shared between the queue handle and its workers.
#[derive(Debug, Default)]
pub struct DispatchStats {
    enqueued: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub enqueued: u64,
    pub delivered: u64,
    pub failed: u64,
    pub dropped: u64,
}

impl DispatchStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Bounded webhook queue drained by a fixed pool of workers.
///
/// Cloning shares the same queue. Workers exit once every handle is dropped
/// and the backlog is drained.
#[derive(Clone)]
pub struct DispatchQueue {
    tx: mpsc::Sender<Job>,
    stats: Arc<DispatchStats>,
}

impl DispatchQueue {
    pub fn start(capacity: usize, workers: usize) -> (Self, Vec<JoinHandle<()>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let stats = Arc::new(DispatchStats::default());
        let handles = (0..workers.max(1))
            .map(|worker| {
                tokio::spawn(worker_loop(
                    worker,
                    Arc::clone(&rx),
                    Arc::clone(&stats),
                ))
            })
            .collect();
        debug!(capacity, workers, "webhook dispatch queue started");
        (Self { tx, stats }, handles)
    }

    /// Queue a delivery without waiting. A full queue drops it.
    pub fn enqueue(&self, client: Client, delivery: Delivery) -> Result<(), DispatchError> {
        match self.tx.try_send(Job { client, delivery }) {
            Ok(()) => {
                self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
                Ok(())
            },
            Err(mpsc::error::TrySendError::Full(job)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    tenant = %job.delivery.tenant,
                    url = %job.delivery.url,
                    "webhook queue full, delivery dropped"
                );
                Err(DispatchError::QueueFull)
            },
            Err(mpsc::error::TrySendError::Closed(_)) => Err(DispatchError::Closed),
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

async fn worker_loop(
    worker: usize,
    rx: Arc<Mutex<mpsc::Receiver<Job>>>,
    stats: Arc<DispatchStats>,
) {
    loop {
        let job = rx.lock().await.recv().await;
        let Some(job) = job else { break };
        match deliver(&job.client, &job.delivery).await {
            Ok(()) => {
                stats.delivered.fetch_add(1, Ordering::Relaxed);
            },
            Err(e) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    worker,
                    tenant = %job.delivery.tenant,
                    url = %job.delivery.url,
                    error = %e,
                    "webhook delivery failed"
                );
            },
        }
    }
    debug!(worker, "webhook worker stopped");
}
