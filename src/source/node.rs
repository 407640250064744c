use std::{ops::RangeInclusive, time::Duration};

use async_trait::async_trait;
use color_eyre::eyre::{eyre, Result};
use ethers_core::types::{Address, Block, SignatureError, Transaction, H256};
use ethers_providers::{Http, Middleware, Provider};
use futures::stream::{self, StreamExt};
use tracing::{info, instrument, trace, warn};

use super::{with_timeout, FetchError, Source};
use crate::config::NodeConfig;
use crate::types::{Batch, TransactionRecord, WorkRange, WorkUnit};

/// Block timestamps come in whole seconds. Records carry milliseconds
const MILLIS_PER_SEC: u64 = 1000;

/// Chain node access needed by the node walker
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Block header plus the hashes of its transactions
    async fn block_by_number(&self, number: u64) -> Result<Option<Block<H256>>, FetchError>;

    async fn transaction_by_hash(&self, hash: H256) -> Result<Option<Transaction>, FetchError>;

    /// Recovers the signer of `tx`, using the chain id embedded in its signature
    fn recover_sender(&self, tx: &Transaction) -> Result<Address, SignatureError> {
        tx.recover_from()
    }
}

/// JSON-RPC node over HTTP
#[derive(Debug)]
pub struct EthersNode {
    provider: Provider<Http>,
    timeout: Duration,
}

impl EthersNode {
    /// Connects to the node, failing if it can't be reached
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self> {
        let provider = Provider::<Http>::try_from(url)?;
        let node = Self { provider, timeout };

        let chain_id = with_timeout(node.timeout, node.provider.get_chainid())
            .await
            .map_err(|e| eyre!("could not reach node at {}: {}", url, e))?;
        info!(%chain_id, "connected to node");

        Ok(node)
    }
}

#[async_trait]
impl NodeClient for EthersNode {
    async fn block_by_number(&self, number: u64) -> Result<Option<Block<H256>>, FetchError> {
        with_timeout(self.timeout, self.provider.get_block(number)).await
    }

    async fn transaction_by_hash(&self, hash: H256) -> Result<Option<Transaction>, FetchError> {
        with_timeout(self.timeout, self.provider.get_transaction(hash)).await
    }
}

/// Walks a literal block range forward, one block per unit
///
/// Each block is fetched with its transaction hashes only, and every transaction is then
/// looked up by hash to recover its sender. These lookups fan out again, up to
/// `tx_concurrency` at a time within a single block.
#[derive(Debug)]
pub struct NodeWalker<C> {
    client: C,
    range: WorkRange,
    concurrency: usize,
    tx_concurrency: usize,
}

impl NodeWalker<EthersNode> {
    pub async fn connect(config: &NodeConfig) -> Result<Self> {
        let client = EthersNode::connect(config.rpc_url.as_str(), config.timeout()).await?;

        Self::new(
            client,
            config.from_block..=config.to_block,
            config.concurrency,
            config.tx_concurrency,
        )
    }
}

impl<C: NodeClient> NodeWalker<C> {
    pub fn new(
        client: C,
        blocks: RangeInclusive<u64>,
        concurrency: usize,
        tx_concurrency: usize,
    ) -> Result<Self> {
        if blocks.is_empty() {
            return Err(eyre!(
                "invalid block range {}..={}",
                blocks.start(),
                blocks.end()
            ));
        }

        Ok(Self {
            client,
            range: blocks.into(),
            concurrency,
            tx_concurrency: tx_concurrency.max(1),
        })
    }

    /// Looks up a single transaction and recovers its sender
    ///
    /// Recovery failures keep the transaction, flagged as unsuccessful and without a sender.
    async fn record(
        &self,
        hash: H256,
        timestamp: u64,
        block_number: i64,
    ) -> Result<TransactionRecord, FetchError> {
        let tx = self
            .client
            .transaction_by_hash(hash)
            .await?
            .ok_or_else(|| FetchError::TransactionNotFound(format!("{:#x}", hash)))?;

        let (sender, success) = match self.client.recover_sender(&tx) {
            Ok(sender) => (format!("{:#x}", sender), true),
            Err(e) => {
                warn!(%hash, "failed to recover sender: {}", e);
                (String::new(), false)
            }
        };

        Ok(TransactionRecord {
            sender,
            recipient: tx.to.map(|to| format!("{:#x}", to)).unwrap_or_default(),
            timestamp,
            block_number,
            success,
        })
    }
}

#[async_trait]
impl<C: NodeClient> Source for NodeWalker<C> {
    fn range(&self) -> WorkRange {
        self.range
    }

    fn concurrency(&self) -> usize {
        self.concurrency
    }

    #[instrument(name = "block", skip(self))]
    async fn fetch(&self, unit: WorkUnit) -> Result<Batch, FetchError> {
        let block = self
            .client
            .block_by_number(unit)
            .await?
            .ok_or(FetchError::BlockNotFound(unit))?;

        let timestamp = seconds_to_millis(block.timestamp.low_u64());
        let block_number = block.number.map_or(unit, |n| n.as_u64()) as i64;
        trace!(txs = block.transactions.len(), "block received");

        // lookup failures drop the transaction, not the block
        let batch: Batch = stream::iter(block.transactions)
            .map(|hash| async move {
                self.record(hash, timestamp, block_number)
                    .await
                    .map_err(|e| warn!(%hash, "skipping transaction: {}", e))
                    .ok()
            })
            .buffer_unordered(self.tx_concurrency)
            .filter_map(|record| async move { record })
            .collect()
            .await;

        Ok(batch)
    }
}

pub(crate) fn seconds_to_millis(seconds: u64) -> u64 {
    seconds.saturating_mul(MILLIS_PER_SEC)
}
