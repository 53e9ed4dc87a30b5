pub mod fetcher;
pub mod merge;
pub mod normalizer;
pub mod worker_pool;

use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::metrics::Metrics;
use crate::models::common::{Config, NormalizationStats, PageRange};
use crate::models::datasets::transactions::Transaction;
use crate::models::errors::PipelineError;
use crate::providers::Provider;
use crate::transformations::Normalizer;

pub use fetcher::{FetchReport, ParallelFetcher};
pub use normalizer::ParallelNormalizer;

pub(crate) const DEFAULT_MAX_CONCURRENT: usize = 3;
pub(crate) const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);
pub(crate) const DEFAULT_WORKER_COUNT: usize = 4;
pub(crate) const DEFAULT_BUFFER_SIZE: usize = 1000;

pub(crate) fn within_range(name: &str, value: usize, range: RangeInclusive<usize>) -> bool {
    if range.contains(&value) {
        return true;
    }
    warn!(
        "Ignoring {} = {}: must be between {} and {}",
        name,
        value,
        range.start(),
        range.end()
    );
    false
}

/// Sorted transactions from one run.
///
/// `fetch_error` is set when some categories failed to fetch. The transactions then
/// cover only the categories that succeeded, and the caller decides whether that is
/// acceptable.
#[derive(Debug)]
pub struct PipelineOutput {
    pub transactions: Vec<Transaction>,
    pub stats: NormalizationStats,
    pub fetch_error: Option<PipelineError>,
}

/// Unsorted transaction stream, plus the partial-fetch error if any.
pub struct StreamingOutput {
    pub transactions: BoxStream<'static, Transaction>,
    pub fetch_error: Option<PipelineError>,
}

/// Fetch, normalize and order the full history of one account.
#[derive(Clone)]
pub struct TransactionPipeline {
    fetcher: ParallelFetcher,
    normalizer: ParallelNormalizer,
}

impl TransactionPipeline {
    pub fn new(provider: Arc<dyn Provider>, normalizer: Arc<dyn Normalizer>) -> Self {
        Self {
            fetcher: ParallelFetcher::new(provider),
            normalizer: ParallelNormalizer::new(normalizer),
        }
    }

    pub fn from_config(
        provider: Arc<dyn Provider>,
        normalizer: Arc<dyn Normalizer>,
        config: &Config,
        metrics: Option<Metrics>,
    ) -> Self {
        Self {
            fetcher: ParallelFetcher::from_config(provider, &config.fetcher)
                .with_metrics(metrics.clone()),
            normalizer: ParallelNormalizer::from_config(normalizer, &config.normalizer)
                .with_metrics(metrics),
        }
    }

    pub async fn run(
        &self,
        cancel: CancellationToken,
        address: &str,
        pages: PageRange,
    ) -> Result<PipelineOutput, PipelineError> {
        let start = Instant::now();

        let (records, fetch_error) = self
            .fetcher
            .fetch_all(&cancel, address, pages)
            .await?
            .into_parts();
        info!("Fetched {} raw records in {:?}", records.len(), start.elapsed());

        let result = self.normalizer.normalize(cancel, records).await?;
        let transactions = merge::sort_transactions(result.transactions);

        info!(
            "Pipeline produced {} transactions in {:?}",
            transactions.len(),
            start.elapsed()
        );

        Ok(PipelineOutput {
            transactions,
            stats: result.stats,
            fetch_error,
        })
    }

    /// Like [`run`](Self::run), but hands transactions over as soon as they are normalized.
    /// The stream is not ordered.
    pub async fn run_streaming(
        &self,
        cancel: CancellationToken,
        address: &str,
        pages: PageRange,
    ) -> Result<StreamingOutput, PipelineError> {
        let (records, fetch_error) = self
            .fetcher
            .fetch_all(&cancel, address, pages)
            .await?
            .into_parts();
        info!("Fetched {} raw records, streaming normalization", records.len());

        Ok(StreamingOutput {
            transactions: self.normalizer.stream(cancel, records).boxed(),
            fetch_error,
        })
    }
}
