use std::sync::Arc;

use futures::stream::{self, Stream};
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::metrics::Metrics;
use crate::models::common::{
    Category, CategoryStats, NormalizationOutcome, NormalizationResult, NormalizationStats,
    NormalizerConfig,
};
use crate::models::datasets::records::{
    InternalCallRecord, NativeTransferRecord, RawRecords, TokenTransferRecord,
};
use crate::models::datasets::transactions::Transaction;
use crate::models::errors::PipelineError;
use crate::pipeline::worker_pool::run_worker_pool;
use crate::pipeline::{DEFAULT_BUFFER_SIZE, DEFAULT_WORKER_COUNT, within_range};
use crate::transformations::Normalizer;

type PoolHandle = Result<(Category, CategoryStats), PipelineError>;

/// Runs one worker pool per non-empty category and gathers the results.
#[derive(Clone)]
pub struct ParallelNormalizer {
    normalizer: Arc<dyn Normalizer>,
    worker_count: usize,
    buffer_size: usize,
    metrics: Option<Metrics>,
}

impl ParallelNormalizer {
    pub fn new(normalizer: Arc<dyn Normalizer>) -> Self {
        Self {
            normalizer,
            worker_count: DEFAULT_WORKER_COUNT,
            buffer_size: DEFAULT_BUFFER_SIZE,
            metrics: None,
        }
    }

    pub fn from_config(normalizer: Arc<dyn Normalizer>, config: &NormalizerConfig) -> Self {
        let mut parallel = Self::new(normalizer);
        parallel.set_worker_count(config.worker_count);
        parallel.set_buffer_size(config.buffer_size);
        parallel
    }

    pub fn with_metrics(mut self, metrics: Option<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Workers per category, 1 to 16. Other values keep the current setting.
    pub fn set_worker_count(&mut self, count: usize) {
        if within_range("worker_count", count, 1..=16) {
            self.worker_count = count;
        }
    }

    /// Result channel capacity, 1 to 10000. Other values keep the current setting.
    pub fn set_buffer_size(&mut self, size: usize) {
        if within_range("buffer_size", size, 1..=10_000) {
            self.buffer_size = size;
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Normalize every category concurrently and collect the results in one batch.
    pub async fn normalize(
        &self,
        cancel: CancellationToken,
        records: RawRecords,
    ) -> Result<NormalizationResult, PipelineError> {
        let (results_tx, mut results_rx) = mpsc::channel(self.buffer_size);
        let pools = self.spawn_pools(&cancel, records, results_tx);

        let mut transactions = Vec::new();
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                received = results_rx.recv() => match received {
                    Some(transaction) => transactions.push(transaction),
                    None => break,
                },
            }
        }
        // Closing the receiver releases any worker still waiting on a send
        drop(results_rx);

        let stats = join_pools(pools, self.metrics.as_ref()).await?;

        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let totals = stats.totals();
        info!(
            "Normalized {} transactions ({} records processed, {} failed)",
            transactions.len(),
            totals.processed,
            totals.failed
        );

        Ok(NormalizationResult {
            transactions,
            stats,
        })
    }

    /// Normalize every category concurrently, yielding transactions as they are produced.
    ///
    /// The stream is finite and single-pass. It ends once all pools have drained or the
    /// token is cancelled. Per-record failures are only logged and counted in metrics.
    pub fn stream(
        &self,
        cancel: CancellationToken,
        records: RawRecords,
    ) -> impl Stream<Item = Transaction> + Send + 'static {
        let (results_tx, results_rx) = mpsc::channel(self.buffer_size);
        let pools = self.spawn_pools(&cancel, records, results_tx);

        let state = StreamState {
            results: results_rx,
            pools,
            cancel,
            metrics: self.metrics.clone(),
        };

        stream::unfold(state, |mut state| async move {
            let next = tokio::select! {
                biased;
                _ = state.cancel.cancelled() => None,
                received = state.results.recv() => received,
            };

            match next {
                Some(transaction) => Some((transaction, state)),
                None => {
                    state.finish().await;
                    None
                }
            }
        })
    }

    fn spawn_pools(
        &self,
        cancel: &CancellationToken,
        records: RawRecords,
        results: Sender<Transaction>,
    ) -> JoinSet<PoolHandle> {
        let mut pools = JoinSet::new();
        let RawRecords {
            native,
            internal,
            erc20,
            erc721,
            erc1155,
        } = records;

        self.spawn_pool(
            &mut pools,
            cancel,
            Category::Native,
            native,
            &results,
            |n: &dyn Normalizer, r: &NativeTransferRecord| n.normalize_native(r),
        );
        self.spawn_pool(
            &mut pools,
            cancel,
            Category::Internal,
            internal,
            &results,
            |n: &dyn Normalizer, r: &InternalCallRecord| n.normalize_internal(r),
        );
        self.spawn_pool(
            &mut pools,
            cancel,
            Category::Erc20,
            erc20,
            &results,
            |n: &dyn Normalizer, r: &TokenTransferRecord| n.normalize_erc20(r),
        );
        self.spawn_pool(
            &mut pools,
            cancel,
            Category::Erc721,
            erc721,
            &results,
            |n: &dyn Normalizer, r: &TokenTransferRecord| n.normalize_erc721(r),
        );
        self.spawn_pool(
            &mut pools,
            cancel,
            Category::Erc1155,
            erc1155,
            &results,
            |n: &dyn Normalizer, r: &TokenTransferRecord| n.normalize_erc1155(r),
        );

        pools
    }

    fn spawn_pool<R, F>(
        &self,
        pools: &mut JoinSet<PoolHandle>,
        cancel: &CancellationToken,
        category: Category,
        records: Vec<R>,
        results: &Sender<Transaction>,
        normalize: F,
    ) where
        R: Send + 'static,
        F: Fn(&dyn Normalizer, &R) -> NormalizationOutcome + Send + Sync + 'static,
    {
        if records.is_empty() {
            debug!("No {} records to normalize", category);
            return;
        }

        debug!("Normalizing {} {} records", records.len(), category);

        let normalizer = Arc::clone(&self.normalizer);
        let cancel = cancel.clone();
        let results = results.clone();
        let worker_count = self.worker_count;

        pools.spawn(async move {
            let stats = run_worker_pool(
                cancel,
                category,
                records,
                worker_count,
                move |record: &R| normalize(normalizer.as_ref(), record),
                results,
            )
            .await?;
            Ok((category, stats))
        });
    }
}

struct StreamState {
    results: Receiver<Transaction>,
    pools: JoinSet<PoolHandle>,
    cancel: CancellationToken,
    metrics: Option<Metrics>,
}

impl StreamState {
    async fn finish(self) {
        drop(self.results);
        match join_pools(self.pools, self.metrics.as_ref()).await {
            Ok(stats) => {
                let totals = stats.totals();
                info!(
                    "Streamed {} transactions ({} records processed, {} failed)",
                    totals.succeeded, totals.processed, totals.failed
                );
            }
            Err(e) => error!("Normalization stream ended with error: {}", e),
        }
    }
}

async fn join_pools(
    mut pools: JoinSet<PoolHandle>,
    metrics: Option<&Metrics>,
) -> Result<NormalizationStats, PipelineError> {
    let mut stats = NormalizationStats::default();

    while let Some(joined) = pools.join_next().await {
        let (category, category_stats) = joined??;

        if let Some(metrics) = metrics {
            let labels = Metrics::category_labels(category);
            metrics
                .records_normalized
                .add(category_stats.succeeded as u64, &labels);
            metrics
                .normalization_failures
                .add(category_stats.failed as u64, &labels);
        }

        info!(
            "{}: {} processed, {} succeeded, {} failed",
            category, category_stats.processed, category_stats.succeeded, category_stats.failed
        );
        stats.record(category, category_stats);
    }

    Ok(stats)
}
