use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use color_eyre::eyre::Result;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, instrument, trace, warn};

use crate::source::Source;
use crate::types::Batch;

/// Runs one fetch per work unit of a source, at most `concurrency` at a time
///
/// Results are streamed through a channel sized to the whole range, so workers never wait on a
/// slow consumer. Failed units are logged and dropped. The stream closes once every unit has
/// been dispatched and every fetch has completed.
pub struct FetchPool {
    source: Arc<dyn Source>,
    concurrency: usize,
}

/// Outcome counters of a single pool run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub dispatched: usize,
    pub delivered: usize,
    pub empty: usize,
    pub failed: usize,
}

#[derive(Debug, Default)]
struct Counters {
    dispatched: AtomicUsize,
    delivered: AtomicUsize,
    empty: AtomicUsize,
    failed: AtomicUsize,
}

impl Counters {
    fn snapshot(&self) -> PoolStats {
        PoolStats {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            empty: self.empty.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

impl FetchPool {
    pub fn new(source: Arc<dyn Source>) -> Self {
        let concurrency = source.concurrency();
        Self {
            source,
            concurrency,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Starts the walk in the background
    ///
    /// Returns the batch stream and a handle resolving to the run's counters once the stream
    /// has been closed.
    pub fn spawn(self) -> (Receiver<Batch>, JoinHandle<Result<PoolStats>>) {
        let (tx, rx) = mpsc::channel(self.source.range().len().max(1));
        let handle = tokio::spawn(self.run(tx));

        (rx, handle)
    }

    #[instrument(
        name = "pool",
        skip_all,
        fields(units = self.source.range().len(), concurrency = self.concurrency)
    )]
    async fn run(self, tx: Sender<Batch>) -> Result<PoolStats> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency.max(1)));
        let counters = Arc::new(Counters::default());
        let tracker = TaskTracker::new();
        let range = self.source.range();

        debug!(start = range.start, end = range.end, "dispatching");

        for unit in range.units() {
            // admission happens before spawning, so at most `concurrency` tasks ever exist
            let permit = semaphore.clone().acquire_owned().await?;
            let source = self.source.clone();
            let counters = counters.clone();
            let tx = tx.clone();

            counters.dispatched.fetch_add(1, Ordering::Relaxed);
            trace!(unit, "unit dispatched");

            tracker.spawn(async move {
                let _permit = permit;

                match source.fetch(unit).await {
                    Ok(batch) if batch.is_empty() => {
                        counters.empty.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(batch) => {
                        if tx.send(batch).await.is_err() {
                            warn!(unit, "batch stream closed early, dropping batch");
                        } else {
                            counters.delivered.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    Err(e) => {
                        warn!(unit, "fetch failed: {}", e);
                        counters.failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            });
        }

        // barrier: every dispatched fetch is awaited before the stream closes
        tracker.close();
        tracker.wait().await;
        drop(tx);

        let stats = counters.snapshot();
        info!(
            dispatched = stats.dispatched,
            delivered = stats.delivered,
            empty = stats.empty,
            failed = stats.failed,
            "pool finished"
        );

        Ok(stats)
    }
}
