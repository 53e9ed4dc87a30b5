use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::models::common::Category;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizationError {
    #[error("Malformed integer in field {field}: {value:?}")]
    MalformedInteger { field: &'static str, value: String },
    #[error("Integer overflow while computing {field}")]
    IntegerOverflow { field: &'static str },
    #[error("Invalid token decimal count: {value:?}")]
    InvalidDecimals { value: String },
    #[error("Missing required field: {field}")]
    MissingField { field: &'static str },
    #[error("Invalid timestamp: {value:?}")]
    InvalidTimestamp { value: String },
}

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Unexpected HTTP status: {status}")]
    Status { status: u16 },
    #[error("API error: {message}")]
    Api { message: String },
    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Invalid provider URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("fetch timed out after {timeout:?}")]
    Timeout { timeout: Duration },
    #[error("fetch cancelled")]
    Cancelled,
}

/// A fetch failure attributed to the category it happened in.
#[derive(Debug)]
pub struct CategoryFailure {
    pub category: Category,
    pub error: FetchError,
}

impl fmt::Display for CategoryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} fetch failed: {}", self.category, self.error)
    }
}

#[derive(Debug, Default)]
pub struct FetchFailures(pub Vec<CategoryFailure>);

impl FetchFailures {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn categories(&self) -> impl Iterator<Item = Category> + '_ {
        self.0.iter().map(|failure| failure.category)
    }
}

impl fmt::Display for FetchFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "[{}]", messages.join("; "))
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("all transaction fetches failed: {0}")]
    AllFetchesFailed(FetchFailures),
    #[error("partial fetch failures occurred: {0}")]
    PartialFetch(FetchFailures),
    #[error("pipeline cancelled")]
    Cancelled,
    #[error("worker task failed: {0}")]
    WorkerPanicked(String),
}

impl From<tokio::task::JoinError> for PipelineError {
    fn from(e: tokio::task::JoinError) -> Self {
        PipelineError::WorkerPanicked(e.to_string())
    }
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}
