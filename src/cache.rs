use std::time::Duration;

use async_trait::async_trait;
use color_eyre::eyre::{eyre, Result};
use redis::{aio::MultiplexedConnection, AsyncCommands};
use tracing::info;

use crate::config::CacheConfig;
use crate::source::{with_timeout, FetchError, IndexClient, IndexedTransaction, TransactionsPage};

/// Read-only view of a page cache populated by some external process
#[async_trait]
pub trait Cache: Send + Sync {
    /// Every page number held by the cache, in insertion order
    async fn cached_pages(&self) -> Result<Vec<u64>, FetchError>;

    /// Transactions of a single cached page
    async fn cached_page(&self, page: u64) -> Result<Vec<IndexedTransaction>, FetchError>;

    /// Last cached page, used as the starting point of an index walk
    async fn cursor(&self) -> Result<Option<u64>, FetchError> {
        Ok(self.cached_pages().await?.last().copied())
    }
}

/// Redis-backed cache
///
/// The list of cached pages lives under a single key as a JSON array of integers. Each page is
/// stored under `transaction:{page}` as a JSON array of transactions.
#[derive(Clone)]
pub struct RedisCache {
    conn: MultiplexedConnection,
    cursor_key: String,
    timeout: Duration,
}

impl RedisCache {
    pub async fn connect(config: &CacheConfig, timeout: Duration) -> Result<Self> {
        let client = redis::Client::open(config.url.as_str())?;
        let mut conn = with_timeout(timeout, client.get_multiplexed_async_connection())
            .await
            .map_err(|e| eyre!("could not reach cache at {}: {}", config.url, e))?;

        with_timeout(
            timeout,
            redis::cmd("PING").query_async::<_, String>(&mut conn),
        )
        .await
        .map_err(|e| eyre!("cache at {} did not answer: {}", config.url, e))?;
        info!("connected to cache");

        Ok(Self {
            conn,
            cursor_key: config.cursor_key.clone(),
            timeout,
        })
    }

    async fn read(&self, key: &str) -> Result<Option<String>, FetchError> {
        let mut conn = self.conn.clone();
        with_timeout(self.timeout, conn.get::<_, Option<String>>(key)).await
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn cached_pages(&self) -> Result<Vec<u64>, FetchError> {
        match self.read(&self.cursor_key).await? {
            Some(value) => decode_pages(&value),
            None => Ok(vec![]),
        }
    }

    async fn cached_page(&self, page: u64) -> Result<Vec<IndexedTransaction>, FetchError> {
        match self.read(&page_key(page)).await? {
            Some(value) => Ok(serde_json::from_str(&value)?),
            None => Err(FetchError::EmptyPage(page)),
        }
    }
}

/// Serves index pages straight from a cache, without touching the indexer
#[derive(Clone)]
pub struct CachedIndex<T>(pub T);

#[async_trait]
impl<T: Cache> IndexClient for CachedIndex<T> {
    async fn current_page(&self) -> Result<u64, FetchError> {
        Ok(self.0.cursor().await?.unwrap_or_default())
    }

    async fn page(&self, page: u64) -> Result<TransactionsPage, FetchError> {
        let transactions = self.0.cached_page(page).await?;

        Ok(TransactionsPage {
            success: true,
            error_message: None,
            quantity: transactions.len() as u64,
            transactions,
            page,
        })
    }
}

fn page_key(page: u64) -> String {
    format!("transaction:{}", page)
}

fn decode_pages(value: &str) -> Result<Vec<u64>, FetchError> {
    Ok(serde_json::from_str(value)?)
}
