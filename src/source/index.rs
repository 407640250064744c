use std::time::Duration;

use async_trait::async_trait;
use color_eyre::eyre::{eyre, Result};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, instrument};
use url::Url;

use super::{FetchError, Source};
use crate::cache::Cache;
use crate::types::{Batch, TransactionRecord, WorkRange, WorkUnit};

/// Response of the indexer's `transactions` endpoints
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionsPage {
    #[serde(default)]
    pub success: bool,

    #[serde(default)]
    pub error_message: Option<String>,

    #[serde(default)]
    pub transactions: Vec<IndexedTransaction>,

    #[serde(default)]
    pub quantity: u64,

    #[serde(default)]
    pub page: u64,
}

/// A transaction as already decoded by the indexer
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IndexedTransaction {
    #[serde(default)]
    pub transaction: IndexedReceipt,

    #[serde(default)]
    pub sender: String,

    #[serde(default)]
    pub success: bool,

    #[serde(default)]
    pub timestamp: u64,

    #[serde(default, rename = "BlockNumber", alias = "blockNumber")]
    pub block_number: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IndexedReceipt {
    #[serde(default, rename = "ChainId", alias = "chainId")]
    pub chain_id: String,

    #[serde(default, rename = "To", alias = "to")]
    pub to: String,

    #[serde(default, rename = "Gas", alias = "gas")]
    pub gas: String,

    #[serde(default, rename = "GasPrice", alias = "gasPrice")]
    pub gas_price: String,

    #[serde(default, rename = "Hash", alias = "hash")]
    pub hash: String,
}

impl From<IndexedTransaction> for TransactionRecord {
    fn from(tx: IndexedTransaction) -> Self {
        Self {
            sender: tx.sender,
            recipient: tx.transaction.to,
            timestamp: tx.timestamp,
            block_number: tx.block_number,
            success: tx.success,
        }
    }
}

/// Paginated transaction index
#[async_trait]
pub trait IndexClient: Send + Sync {
    /// Most recent page known to the index
    async fn current_page(&self) -> Result<u64, FetchError>;

    async fn page(&self, page: u64) -> Result<TransactionsPage, FetchError>;
}

/// REST indexer, serving `GET {base}/transactions` and `GET {base}/transactions/{page}`
#[derive(Debug, Clone)]
pub struct RestIndexer {
    client: Client,
    base_url: Url,
}

impl RestIndexer {
    pub fn new(base_url: &Url, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        // ensure a trailing slash, so joins append rather than replace the last segment
        let mut base_url = base_url.clone();
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self { client, base_url })
    }

    fn endpoint(&self, path: &str) -> Result<Url, FetchError> {
        Ok(self.base_url.join(path)?)
    }

    async fn get(&self, url: Url) -> Result<TransactionsPage, FetchError> {
        let page = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json::<TransactionsPage>()
            .await?;

        if !page.success {
            return Err(FetchError::Indexer(
                page.error_message
                    .unwrap_or_else(|| "unsuccessful response".to_owned()),
            ));
        }

        Ok(page)
    }
}

#[async_trait]
impl IndexClient for RestIndexer {
    async fn current_page(&self) -> Result<u64, FetchError> {
        let url = self.endpoint("transactions")?;
        Ok(self.get(url).await?.page)
    }

    async fn page(&self, page: u64) -> Result<TransactionsPage, FetchError> {
        let url = self.endpoint(&format!("transactions/{}", page))?;
        self.get(url).await
    }
}

/// Walks an index backwards, from the most recent page down to page 1
///
/// The starting cursor is resolved once, at construction, either from a cache or from the
/// index itself. Pages written after that point are not picked up.
#[derive(Debug)]
pub struct IndexWalker<C> {
    client: C,
    cursor: u64,
    concurrency: usize,
}

impl<C: IndexClient> IndexWalker<C> {
    pub async fn new(client: C, cache: Option<&dyn Cache>, concurrency: usize) -> Result<Self> {
        let cursor = match cache {
            Some(cache) => cache
                .cursor()
                .await?
                .ok_or_else(|| eyre!("cache holds no pages"))?,
            None => client.current_page().await?,
        };
        info!(cursor, "resolved index cursor");

        Ok(Self {
            client,
            cursor,
            concurrency,
        })
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }
}

#[async_trait]
impl<C: IndexClient> Source for IndexWalker<C> {
    fn range(&self) -> WorkRange {
        if self.cursor == 0 {
            WorkRange::empty()
        } else {
            WorkRange::new(self.cursor, 1)
        }
    }

    fn concurrency(&self) -> usize {
        self.concurrency
    }

    #[instrument(name = "page", skip(self))]
    async fn fetch(&self, unit: WorkUnit) -> Result<Batch, FetchError> {
        debug!("page requested");
        let page = self.client.page(unit).await?;

        // an empty page still occupied a worker slot, so it's reported rather than skipped
        if page.quantity == 0 || page.transactions.is_empty() {
            return Err(FetchError::EmptyPage(unit));
        }

        Ok(page.transactions.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[derive(Debug, Default)]
    struct MockIndex {
        current: u64,
        pages: HashMap<u64, TransactionsPage>,
        unreachable: bool,
    }

    #[async_trait]
    impl IndexClient for MockIndex {
        async fn current_page(&self) -> Result<u64, FetchError> {
            if self.unreachable {
                return Err(FetchError::Timeout(Duration::from_secs(30)));
            }
            Ok(self.current)
        }

        async fn page(&self, page: u64) -> Result<TransactionsPage, FetchError> {
            self.pages
                .get(&page)
                .cloned()
                .ok_or(FetchError::Indexer("not found".into()))
        }
    }

    struct MockCache(Vec<u64>);

    #[async_trait]
    impl Cache for MockCache {
        async fn cached_pages(&self) -> Result<Vec<u64>, FetchError> {
            Ok(self.0.clone())
        }

        async fn cached_page(&self, page: u64) -> Result<Vec<IndexedTransaction>, FetchError> {
            Err(FetchError::EmptyPage(page))
        }
    }

    fn tx(sender: &str, to: &str) -> IndexedTransaction {
        IndexedTransaction {
            transaction: IndexedReceipt {
                to: to.into(),
                ..Default::default()
            },
            sender: sender.into(),
            success: true,
            timestamp: 1_700_000_000_000,
            block_number: 42,
        }
    }

    fn page(number: u64, transactions: Vec<IndexedTransaction>) -> TransactionsPage {
        TransactionsPage {
            success: true,
            error_message: None,
            quantity: transactions.len() as u64,
            transactions,
            page: number,
        }
    }

    #[tokio::test]
    async fn walks_backwards_from_index_cursor() -> Result<()> {
        let index = MockIndex {
            current: 7,
            ..Default::default()
        };
        let walker = IndexWalker::new(index, None, 5).await?;

        assert_eq!(walker.range(), WorkRange::new(7, 1));
        assert_eq!(walker.range().units().next(), Some(7));

        Ok(())
    }

    #[tokio::test]
    async fn cache_cursor_takes_precedence() -> Result<()> {
        let index = MockIndex {
            current: 7,
            ..Default::default()
        };
        let cache = MockCache(vec![1, 2, 12]);
        let walker = IndexWalker::new(index, Some(&cache), 5).await?;

        assert_eq!(walker.cursor(), 12);

        Ok(())
    }

    #[tokio::test]
    async fn empty_cache_is_fatal() {
        let cache = MockCache(vec![]);
        let res = IndexWalker::new(MockIndex::default(), Some(&cache), 5).await;

        assert!(res.is_err());
    }

    #[tokio::test]
    async fn unreachable_index_is_fatal() {
        let index = MockIndex {
            unreachable: true,
            ..Default::default()
        };

        assert!(IndexWalker::new(index, None, 5).await.is_err());
    }

    #[tokio::test]
    async fn empty_index_has_nothing_to_walk() -> Result<()> {
        let walker = IndexWalker::new(MockIndex::default(), None, 5).await?;

        assert!(walker.range().is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn zero_quantity_is_an_error() -> Result<()> {
        let mut index = MockIndex {
            current: 1,
            ..Default::default()
        };
        index.pages.insert(1, page(1, vec![]));
        let walker = IndexWalker::new(index, None, 5).await?;

        assert!(matches!(walker.fetch(1).await, Err(FetchError::EmptyPage(1))));

        Ok(())
    }

    #[tokio::test]
    async fn records_are_normalized() -> Result<()> {
        let mut index = MockIndex {
            current: 1,
            ..Default::default()
        };
        index
            .pages
            .insert(1, page(1, vec![tx("0xA", "0xB"), tx("0xC", "")]));
        let walker = IndexWalker::new(index, None, 5).await?;

        let batch = walker.fetch(1).await?;

        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].sender, "0xA");
        assert_eq!(batch[0].recipient, "0xB");
        assert_eq!(batch[0].timestamp, 1_700_000_000_000);
        assert_eq!(batch[0].block_number, 42);
        assert!(batch[1].recipient.is_empty());

        Ok(())
    }

    #[test]
    fn decodes_indexer_payload() -> Result<()> {
        let json = r#"{
            "success": true,
            "errorMessage": "",
            "quantity": 1,
            "page": 3,
            "transactions": [{
                "transaction": {
                    "ChainId": "0x539",
                    "To": "0x00000000000000000000000000000000000000bb",
                    "Gas": "21000",
                    "GasPrice": "1000000000",
                    "Hash": "0x01"
                },
                "sender": "0x00000000000000000000000000000000000000AA",
                "success": true,
                "timestamp": 1700000000000,
                "BlockNumber": 99
            }]
        }"#;

        let page: TransactionsPage = serde_json::from_str(json)?;

        assert_eq!(page.page, 3);
        assert_eq!(page.quantity, 1);
        let tx = &page.transactions[0];
        assert_eq!(tx.transaction.to, "0x00000000000000000000000000000000000000bb");
        assert_eq!(tx.block_number, 99);

        Ok(())
    }

    #[test]
    fn decodes_camel_case_receipt() -> Result<()> {
        let json = r#"{"transaction": {"to": "0xbb"}, "sender": "0xaa", "blockNumber": 5}"#;

        let tx: IndexedTransaction = serde_json::from_str(json)?;

        assert_eq!(tx.transaction.to, "0xbb");
        assert_eq!(tx.block_number, 5);
        assert!(!tx.success);

        Ok(())
    }

    #[test]
    fn endpoints_extend_base_path() -> Result<()> {
        let base: Url = "http://localhost:8080/api".parse()?;
        let indexer = RestIndexer::new(&base, Duration::from_secs(1))?;

        assert_eq!(
            indexer.endpoint("transactions")?.as_str(),
            "http://localhost:8080/api/transactions"
        );
        assert_eq!(
            indexer.endpoint("transactions/4")?.as_str(),
            "http://localhost:8080/api/transactions/4"
        );

        Ok(())
    }
}
