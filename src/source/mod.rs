mod index;
mod node;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use color_eyre::eyre::Result;
use thiserror::Error;

use crate::cache::{Cache, CachedIndex, RedisCache};
use crate::config::{IndexConfig, PageSource, SourceConfig};
use crate::types::{Batch, WorkRange, WorkUnit};

pub use index::{IndexClient, IndexWalker, IndexedTransaction, RestIndexer, TransactionsPage};
pub use node::{EthersNode, NodeClient, NodeWalker};

/// Something that can turn a work unit into a batch of transactions
///
/// Implementations resolve their unit range once, at construction. `fetch` is called exactly
/// once per unit, possibly concurrently with other units.
#[async_trait]
pub trait Source: Send + Sync {
    /// Closed range of units to walk
    fn range(&self) -> WorkRange;

    /// Maximum number of concurrent `fetch` calls this source should be subjected to
    fn concurrency(&self) -> usize;

    async fn fetch(&self, unit: WorkUnit) -> Result<Batch, FetchError>;
}

/// Connects to the configured source and resolves its range
///
/// Any failure here is fatal: nothing has been fetched yet.
pub async fn connect(config: &SourceConfig) -> Result<Arc<dyn Source>> {
    match config {
        SourceConfig::Node(config) => Ok(Arc::new(NodeWalker::connect(config).await?)),
        SourceConfig::Index(config) => connect_index(config).await,
    }
}

async fn connect_index(config: &IndexConfig) -> Result<Arc<dyn Source>> {
    let Some(cache_config) = &config.cache else {
        let indexer = RestIndexer::new(&config.base_url, config.timeout())?;
        return Ok(Arc::new(
            IndexWalker::new(indexer, None, config.concurrency).await?,
        ));
    };

    let cache = RedisCache::connect(cache_config, config.timeout()).await?;
    let cursor: Option<&dyn Cache> = Some(&cache);

    let source: Arc<dyn Source> = match cache_config.pages {
        PageSource::Rest => {
            let indexer = RestIndexer::new(&config.base_url, config.timeout())?;
            Arc::new(IndexWalker::new(indexer, cursor, config.concurrency).await?)
        }
        PageSource::Cache => {
            let index = CachedIndex(cache.clone());
            Arc::new(IndexWalker::new(index, cursor, config.concurrency).await?)
        }
    };

    Ok(source)
}

/// Per-unit failures
///
/// None of these abort a run. A unit that fails simply contributes no transactions.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("block {0} not found")]
    BlockNotFound(WorkUnit),
    #[error("transaction {0} not found")]
    TransactionNotFound(String),
    #[error("page {0} has no transactions")]
    EmptyPage(WorkUnit),
    #[error("indexer error: {0}")]
    Indexer(String),
    #[error("rpc error: {0}")]
    Rpc(#[from] ethers_providers::ProviderError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("cache error: {0}")]
    Cache(#[from] redis::RedisError),
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("url error: {0}")]
    Url(#[from] url::ParseError),
    #[error("call timed out after {0:?}")]
    Timeout(Duration),
}

/// Runs `fut`, failing with [`FetchError::Timeout`] if it takes longer than `duration`
pub(crate) async fn with_timeout<T, E, F>(duration: Duration, fut: F) -> Result<T, FetchError>
where
    F: std::future::Future<Output = Result<T, E>>,
    E: Into<FetchError>,
{
    match tokio::time::timeout(duration, fut).await {
        Ok(res) => res.map_err(Into::into),
        Err(_) => Err(FetchError::Timeout(duration)),
    }
}
