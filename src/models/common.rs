use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::datasets::records::CategoryRecords;
use crate::models::datasets::transactions::Transaction;
use crate::models::errors::{FetchError, NormalizationError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_address")]
    pub address: String,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    pub api_key: Option<String>,
    #[serde(default = "default_request_interval_ms")]
    pub request_interval_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub http_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizerConfig {
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_path")]
    pub path: String,
    #[serde(default)]
    pub streaming: bool,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub address: String,
    #[serde(default = "default_page")]
    pub start_page: u32,
    #[serde(default = "default_page")]
    pub end_page: u32,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
    #[serde(default)]
    pub normalizer: NormalizerConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: default_metrics_address(),
            port: default_metrics_port(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            request_interval_ms: default_request_interval_ms(),
            http_timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            buffer_size: default_buffer_size(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: default_output_path(),
            streaming: false,
            batch_size: default_batch_size(),
            flush_interval_secs: default_flush_interval_secs(),
        }
    }
}

fn default_metrics_address() -> String {
    "0.0.0.0".to_string()
}

fn default_metrics_port() -> u16 {
    9100
}

fn default_base_url() -> String {
    "https://api.etherscan.io/api".to_string()
}

fn default_request_interval_ms() -> u64 {
    200 // Etherscan free tier allows ~5 req/s
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_concurrent() -> usize {
    3
}

fn default_worker_count() -> usize {
    4
}

fn default_buffer_size() -> usize {
    1000
}

fn default_output_path() -> String {
    "transactions.csv".to_string()
}

fn default_batch_size() -> usize {
    100
}

fn default_flush_interval_secs() -> u64 {
    5
}

fn default_page() -> u32 {
    1
}

/// One of the five record kinds an account's history is split into upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    Native,
    Internal,
    Erc20,
    Erc721,
    Erc1155,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Native,
        Category::Internal,
        Category::Erc20,
        Category::Erc721,
        Category::Erc1155,
    ];

    /// Label used in the exported "Transaction Type" column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Native => "ETH",
            Category::Internal => "Internal",
            Category::Erc20 => "ERC-20",
            Category::Erc721 => "ERC-721",
            Category::Erc1155 => "ERC-1155",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::Native => "Normal",
            other => other.as_str(),
        };
        f.write_str(name)
    }
}

/// Inclusive page range passed through to the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    pub start: u32,
    pub end: u32,
}

impl PageRange {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// Number of records requested per page.
    pub fn offset(&self) -> u32 {
        self.end.saturating_sub(self.start).saturating_add(1)
    }
}

impl Default for PageRange {
    fn default() -> Self {
        Self { start: 1, end: 1 }
    }
}

/// Result of fetching one category: the whole list or a failure, never partial.
pub type FetchOutcome = Result<CategoryRecords, FetchError>;

/// Either a normalized transaction or the reason the record was rejected.
pub type NormalizationOutcome = Result<Transaction, NormalizationError>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryStats {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

impl CategoryStats {
    pub fn record_success(&mut self) {
        self.processed += 1;
        self.succeeded += 1;
    }

    pub fn record_failure(&mut self, reason: String) {
        self.processed += 1;
        self.failed += 1;
        self.errors.push(reason);
    }

    pub fn merge(&mut self, other: CategoryStats) {
        self.processed += other.processed;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.errors.extend(other.errors);
    }
}

/// Per-category normalization counters for one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizationStats {
    pub categories: BTreeMap<Category, CategoryStats>,
}

impl NormalizationStats {
    pub fn record(&mut self, category: Category, stats: CategoryStats) {
        self.categories.entry(category).or_default().merge(stats);
    }

    pub fn get(&self, category: Category) -> Option<&CategoryStats> {
        self.categories.get(&category)
    }

    pub fn totals(&self) -> CategoryStats {
        let mut totals = CategoryStats::default();
        for stats in self.categories.values() {
            totals.merge(stats.clone());
        }
        totals
    }
}

#[derive(Debug, Default)]
pub struct NormalizationResult {
    pub transactions: Vec<Transaction>,
    pub stats: NormalizationStats,
}
