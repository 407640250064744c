use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use color_eyre::eyre::{eyre, Result};
use serde::Deserialize;
use url::Url;

#[derive(Debug, clap::Parser)]
struct Args {
    #[clap(
        long,
        default_value = "wallet-census.toml",
        env = "WALLET_CENSUS_CONFIG"
    )]
    config: PathBuf,
}

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    pub source: SourceConfig,
}

/// Where transactions are read from
#[derive(Deserialize, Clone, Debug)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceConfig {
    Node(NodeConfig),
    Index(IndexConfig),
}

/// Walks blocks straight from a chain node
#[derive(Deserialize, Clone, Debug)]
pub struct NodeConfig {
    pub rpc_url: Url,

    #[serde(default = "default_from_block")]
    pub from_block: u64,

    pub to_block: u64,

    #[serde(default = "default_node_concurrency")]
    pub concurrency: usize,

    /// Concurrent transaction lookups within a single block
    #[serde(default = "default_tx_concurrency")]
    pub tx_concurrency: usize,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Walks pages of a REST indexer, newest first
#[derive(Deserialize, Clone, Debug)]
pub struct IndexConfig {
    pub base_url: Url,

    #[serde(default = "default_index_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub cache: Option<CacheConfig>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct CacheConfig {
    pub url: String,

    #[serde(default = "default_cursor_key")]
    pub cursor_key: String,

    #[serde(default)]
    pub pages: PageSource,
}

/// Where an index walk reads page contents from
#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PageSource {
    #[default]
    Rest,
    Cache,
}

impl Config {
    pub fn read() -> Result<Self> {
        let args = Args::parse();

        Self::read_from(args.config.as_path())
    }

    pub fn read_from(path: &Path) -> Result<Self> {
        let config: Self = toml::from_str(&std::fs::read_to_string(path)?)?;
        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        match &self.source {
            SourceConfig::Node(node) => {
                if node.from_block > node.to_block {
                    return Err(eyre!(
                        "from_block ({}) is past to_block ({})",
                        node.from_block,
                        node.to_block
                    ));
                }
                if node.concurrency == 0 || node.tx_concurrency == 0 {
                    return Err(eyre!("concurrency must be at least 1"));
                }
            }
            SourceConfig::Index(index) => {
                if index.concurrency == 0 {
                    return Err(eyre!("concurrency must be at least 1"));
                }
            }
        }

        Ok(())
    }
}

impl NodeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl IndexConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_from_block() -> u64 {
    1
}

fn default_node_concurrency() -> usize {
    10
}

fn default_tx_concurrency() -> usize {
    5
}

fn default_index_concurrency() -> usize {
    50
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_cursor_key() -> String {
    "cachedPages".to_owned()
}
