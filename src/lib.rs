pub mod aggregator;
pub mod cache;
pub mod config;
pub mod pool;
pub mod source;
pub mod types;

use std::sync::Arc;

use color_eyre::eyre::Result;
use tracing::{instrument, warn};

use self::aggregator::WalletAggregator;
use self::pool::FetchPool;
use self::source::Source;

/// Walks every unit of `source` and returns the number of distinct wallets seen
///
/// Units that fail to fetch are logged and skipped, so the result is a lower bound whenever
/// the source was flaky.
#[instrument(skip_all, fields(units = source.range().len()))]
pub async fn count_wallets(source: Arc<dyn Source>) -> Result<usize> {
    let (batches, pool) = FetchPool::new(source).spawn();

    let aggregator = WalletAggregator::new();
    let count = aggregator.drain(batches).await;
    let stats = pool.await??;

    if stats.failed > 0 {
        warn!(failed = stats.failed, "some units were skipped, count may be short");
    }

    Ok(count)
}
