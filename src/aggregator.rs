use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{mpsc::Receiver, Mutex};
use tracing::{debug, instrument, trace};

use crate::types::{Batch, TransactionRecord};

/// Deduplicates every address seen as sender or recipient
///
/// Owns the wallet set for the duration of a single run. Addresses are lower-cased before
/// comparison, so checksummed and plain hex variants of the same address count once.
#[derive(Debug, Default)]
pub struct WalletAggregator {
    wallets: Mutex<HashSet<String>>,

    /// Number of batches ingested so far
    batches: AtomicUsize,
}

impl WalletAggregator {
    pub fn new() -> Self {
        Default::default()
    }

    /// Inserts a single address. Returns `true` if it was not yet known
    pub async fn insert(&self, address: &str) -> bool {
        if address.is_empty() {
            return false;
        }

        let address = address.to_lowercase();
        self.wallets.lock().await.insert(address)
    }

    pub async fn ingest_record(&self, record: &TransactionRecord) -> usize {
        let addresses: Vec<String> = record.addresses().map(str::to_lowercase).collect();

        let mut wallets = self.wallets.lock().await;
        addresses
            .into_iter()
            .filter(|address| wallets.insert(address.clone()))
            .count()
    }

    /// Returns how many new wallets the batch introduced
    pub async fn ingest(&self, batch: &Batch) -> usize {
        let mut new = 0;
        for record in batch.iter() {
            new += self.ingest_record(record).await;
        }

        self.batches.fetch_add(1, Ordering::Relaxed);
        new
    }

    /// Consumes the stream until its producer side is closed and drained
    #[instrument(name = "aggregate", skip_all)]
    pub async fn drain(&self, mut rx: Receiver<Batch>) -> usize {
        while let Some(batch) = rx.recv().await {
            let new = self.ingest(&batch).await;
            if new > 0 {
                trace!(new, total = self.count().await, "wallets found");
            }
        }

        let count = self.count().await;
        debug!(
            batches = self.batches.load(Ordering::Relaxed),
            wallets = count,
            "stream drained"
        );
        count
    }

    pub async fn count(&self) -> usize {
        self.wallets.lock().await.len()
    }

    pub fn batches(&self) -> usize {
        self.batches.load(Ordering::Relaxed)
    }
}
