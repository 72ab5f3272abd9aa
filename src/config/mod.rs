mod pinned;

use std::path::{Path, PathBuf};
use std::time::Duration;

use alloy_primitives::{utils::parse_ether, U256};
use clap::Parser;
use color_eyre::eyre::Result;
use serde::{Deserialize, Deserializer};

pub use self::pinned::PinnedEndpoints;

#[derive(Debug, clap::Parser)]
struct Args {
    #[clap(
        long,
        default_value = "contract-sniffer.toml",
        env = "CONTRACT_SNIFFER_CONFIG"
    )]
    config: PathBuf,
}

#[derive(Deserialize, Clone, Debug, Default)]
pub struct Config {
    #[serde(default)]
    pub nodes: NodesConfig,

    #[serde(default)]
    pub watch: WatchConfig,

    /// Verification and static analysis of reported contracts. Events are only logged without it
    #[serde(default)]
    pub analysis: Option<AnalysisConfig>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct NodesConfig {
    #[serde(default = "default_directory_url")]
    pub directory_url: String,

    #[serde(default = "default_directory_timeout_ms")]
    pub directory_timeout_ms: u64,

    /// Fixed endpoints. When set, the directory isn't scraped
    #[serde(default)]
    pub pinned: PinnedEndpoints,

    #[serde(default = "default_burst")]
    pub burst: usize,

    #[serde(default = "default_top_n")]
    pub top_n: usize,

    #[serde(default = "default_probe_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_latency_concurrency")]
    pub latency_concurrency: usize,
}

#[derive(Deserialize, Clone, Debug)]
pub struct WatchConfig {
    /// Block to resume from. Defaults to the chain head at startup
    pub from_block: Option<u64>,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,

    /// Concurrent transaction inspections per block. Defaults to twice the endpoint count
    pub max_workers: Option<usize>,

    /// Reporting threshold, in ether. Contracts must hold strictly more than this
    #[serde(
        default = "default_min_balance",
        deserialize_with = "deserialize_ether"
    )]
    pub min_balance: U256,

    /// Events buffered ahead of the consumer
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

#[derive(Deserialize, Clone, Debug)]
pub struct AnalysisConfig {
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,

    /// Chain prefix understood by slither, e.g. `mainnet`
    #[serde(default = "default_chain_slug")]
    pub chain_slug: String,

    #[serde(default = "default_etherscan_url")]
    pub etherscan_url: String,

    /// Name of the env var holding the etherscan API key
    #[serde(default = "default_etherscan_api_key_env")]
    pub etherscan_api_key_env: String,

    #[serde(default = "default_slither_bin")]
    pub slither_bin: PathBuf,

    #[serde(default = "default_reports_dir")]
    pub reports_dir: PathBuf,

    /// Where slither's etherscan export leaves the flattened sources
    #[serde(default = "default_sources_dir")]
    pub sources_dir: PathBuf,
}

impl Config {
    pub fn read() -> Result<Self> {
        let args = Args::parse();

        Self::read_from(args.config.as_path())
    }

    pub fn read_from(path: &Path) -> Result<Self> {
        let mut config: Self = toml::from_str(&std::fs::read_to_string(path)?)?;
        config.nodes.pinned.preload()?;

        Ok(config)
    }
}

impl NodesConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn directory_timeout(&self) -> Duration {
        Duration::from_millis(self.directory_timeout_ms)
    }
}

impl WatchConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }
}

impl AnalysisConfig {
    /// An unset key is sent as empty, which etherscan answers with a rate-limited anonymous quota
    pub fn etherscan_api_key(&self) -> String {
        std::env::var(&self.etherscan_api_key_env).unwrap_or_default()
    }
}

impl Default for NodesConfig {
    fn default() -> Self {
        Self {
            directory_url: default_directory_url(),
            directory_timeout_ms: default_directory_timeout_ms(),
            pinned: Default::default(),
            burst: default_burst(),
            top_n: default_top_n(),
            timeout_ms: default_probe_timeout_ms(),
            latency_concurrency: default_latency_concurrency(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            from_block: None,
            poll_interval_ms: default_poll_interval_ms(),
            rpc_timeout_ms: default_rpc_timeout_ms(),
            max_workers: None,
            min_balance: default_min_balance(),
            buffer_size: default_buffer_size(),
        }
    }
}

fn deserialize_ether<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
    let value = String::deserialize(deserializer)?;
    parse_ether(&value).map_err(serde::de::Error::custom)
}

fn default_directory_url() -> String {
    "https://ethereumnodes.com/".to_owned()
}

fn default_directory_timeout_ms() -> u64 {
    5_000
}

fn default_burst() -> usize {
    50
}

fn default_top_n() -> usize {
    5
}

fn default_probe_timeout_ms() -> u64 {
    1_000
}

fn default_latency_concurrency() -> usize {
    10
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_rpc_timeout_ms() -> u64 {
    10_000
}

fn default_min_balance() -> U256 {
    // 0.1 ether
    U256::from(100_000_000_000_000_000u64)
}

fn default_buffer_size() -> usize {
    64
}

fn default_chain_id() -> u64 {
    1
}

fn default_chain_slug() -> String {
    "mainnet".to_owned()
}

fn default_etherscan_url() -> String {
    "https://api.etherscan.io/v2/api".to_owned()
}

fn default_etherscan_api_key_env() -> String {
    "ETHERSCAN_API_KEY".to_owned()
}

fn default_slither_bin() -> PathBuf {
    PathBuf::from("slither")
}

fn default_reports_dir() -> PathBuf {
    PathBuf::from("slither-reports")
}

fn default_sources_dir() -> PathBuf {
    PathBuf::from("crytic-export/etherscan-contracts")
}
