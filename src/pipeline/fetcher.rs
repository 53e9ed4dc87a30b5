use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::metrics::Metrics;
use crate::models::common::{Category, FetchOutcome, FetcherConfig, PageRange};
use crate::models::datasets::records::RawRecords;
use crate::models::errors::{CategoryFailure, FetchError, FetchFailures, PipelineError};
use crate::pipeline::{DEFAULT_FETCH_TIMEOUT, DEFAULT_MAX_CONCURRENT, within_range};
use crate::providers::{Provider, fetch_category};

/// Records from every category that fetched, plus the categories that did not.
#[derive(Debug, Default)]
pub struct FetchReport {
    pub records: RawRecords,
    pub failures: FetchFailures,
}

impl FetchReport {
    /// Split into the fetched data and the partial-failure error, if any category failed.
    pub fn into_parts(self) -> (RawRecords, Option<PipelineError>) {
        let error = if self.failures.is_empty() {
            None
        } else {
            Some(PipelineError::PartialFetch(self.failures))
        };
        (self.records, error)
    }
}

/// Fans the five category fetches out to the provider.
#[derive(Clone)]
pub struct ParallelFetcher {
    provider: Arc<dyn Provider>,
    max_concurrent: usize,
    timeout: Duration,
    metrics: Option<Metrics>,
}

impl ParallelFetcher {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            timeout: DEFAULT_FETCH_TIMEOUT,
            metrics: None,
        }
    }

    pub fn from_config(provider: Arc<dyn Provider>, config: &FetcherConfig) -> Self {
        let mut fetcher = Self::new(provider);
        fetcher.set_max_concurrent(config.max_concurrent);
        fetcher.set_timeout(Duration::from_secs(config.timeout_secs));
        fetcher
    }

    pub fn with_metrics(mut self, metrics: Option<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// In-flight provider calls, 1 to 10. Other values keep the current setting.
    pub fn set_max_concurrent(&mut self, max_concurrent: usize) {
        if within_range("max_concurrent", max_concurrent, 1..=10) {
            self.max_concurrent = max_concurrent;
        }
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        if timeout.is_zero() {
            warn!("Ignoring zero fetch timeout, keeping {:?}", self.timeout);
            return;
        }
        self.timeout = timeout;
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Fetch all five categories concurrently.
    ///
    /// Fails only when every category fails or the token is cancelled. Otherwise the
    /// report carries whatever was fetched together with the per-category failures.
    pub async fn fetch_all(
        &self,
        cancel: &CancellationToken,
        address: &str,
        pages: PageRange,
    ) -> Result<FetchReport, PipelineError> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = JoinSet::new();

        for category in Category::ALL {
            let fetcher = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            let address = address.to_string();

            tasks.spawn(async move {
                let outcome = fetcher
                    .fetch_one(&semaphore, &cancel, category, &address, pages)
                    .await;
                (category, outcome)
            });
        }

        let mut report = FetchReport::default();
        let mut failures = Vec::new();

        while let Some(joined) = tasks.join_next().await {
            let (category, outcome) = joined?;
            match outcome {
                Ok(records) => {
                    info!("Fetched {} {} records", records.len(), category);
                    report.records.insert(records);
                }
                Err(error) => {
                    warn!("{} fetch failed: {}", category, error);
                    failures.push(CategoryFailure { category, error });
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        // Completion order is arbitrary; report failures in category order
        failures.sort_by_key(|failure| failure.category);

        if failures.len() == Category::ALL.len() {
            return Err(PipelineError::AllFetchesFailed(FetchFailures(failures)));
        }

        report.failures = FetchFailures(failures);
        Ok(report)
    }

    async fn fetch_one(
        &self,
        semaphore: &Semaphore,
        cancel: &CancellationToken,
        category: Category,
        address: &str,
        pages: PageRange,
    ) -> FetchOutcome {
        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            permit = semaphore.acquire() => permit.map_err(|_| FetchError::Cancelled)?,
        };

        debug!("Fetching {} records for {}", category, address);

        let labels = Metrics::category_labels(category);
        if let Some(metrics) = &self.metrics {
            metrics.provider_requests.add(1, &labels);
        }

        let start = Instant::now();
        let call = fetch_category(self.provider.as_ref(), category, address, pages);

        // Dropping the provider future on cancel or timeout aborts the request
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            result = tokio::time::timeout(self.timeout, call) => match result {
                Ok(records) => records.map_err(FetchError::from),
                Err(_) => Err(FetchError::Timeout { timeout: self.timeout }),
            },
        };

        if let Some(metrics) = &self.metrics {
            metrics
                .provider_latency
                .record(start.elapsed().as_secs_f64(), &labels);
            if outcome.is_err() {
                metrics.provider_errors.add(1, &labels);
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::models::datasets::records::{
        InternalCallRecord, NativeTransferRecord, TokenTransferRecord,
    };
    use crate::models::errors::ProviderError;

    /// Sleeps `delay` per call (a minute for `stalled` categories), fails the listed
    /// categories and tracks peak concurrency.
    #[derive(Default)]
    struct StubProvider {
        delay: Duration,
        stalled: HashSet<Category>,
        failing: HashSet<Category>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl StubProvider {
        async fn call<T: Default>(&self, category: Category) -> Result<Vec<T>, ProviderError> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.stalled.contains(&category) {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.failing.contains(&category) {
                return Err(ProviderError::Api {
                    message: format!("{category} unavailable"),
                });
            }
            Ok(vec![T::default()])
        }
    }

    #[async_trait]
    impl Provider for StubProvider {
        async fn fetch_native_transfers(
            &self,
            _address: &str,
            _pages: PageRange,
        ) -> Result<Vec<NativeTransferRecord>, ProviderError> {
            self.call(Category::Native).await
        }

        async fn fetch_internal_calls(
            &self,
            _address: &str,
            _pages: PageRange,
        ) -> Result<Vec<InternalCallRecord>, ProviderError> {
            self.call(Category::Internal).await
        }

        async fn fetch_erc20_transfers(
            &self,
            _address: &str,
            _pages: PageRange,
        ) -> Result<Vec<TokenTransferRecord>, ProviderError> {
            self.call(Category::Erc20).await
        }

        async fn fetch_erc721_transfers(
            &self,
            _address: &str,
            _pages: PageRange,
        ) -> Result<Vec<TokenTransferRecord>, ProviderError> {
            self.call(Category::Erc721).await
        }

        async fn fetch_erc1155_transfers(
            &self,
            _address: &str,
            _pages: PageRange,
        ) -> Result<Vec<TokenTransferRecord>, ProviderError> {
            self.call(Category::Erc1155).await
        }
    }

    fn fetcher(provider: Arc<StubProvider>) -> ParallelFetcher {
        ParallelFetcher::new(provider)
    }

    #[tokio::test]
    async fn test_fetches_every_category() {
        let report = fetcher(Arc::new(StubProvider::default()))
            .fetch_all(&CancellationToken::new(), "0xabc", PageRange::default())
            .await
            .unwrap();

        assert!(report.failures.is_empty());
        for category in Category::ALL {
            assert_eq!(report.records.count(category), 1);
        }
        let (records, error) = report.into_parts();
        assert_eq!(records.len(), 5);
        assert!(error.is_none());
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let provider = Arc::new(StubProvider {
            delay: Duration::from_millis(50),
            ..Default::default()
        });

        let mut fetcher = fetcher(provider.clone());
        fetcher.set_max_concurrent(2);
        fetcher
            .fetch_all(&CancellationToken::new(), "0xabc", PageRange::default())
            .await
            .unwrap();

        assert!(provider.peak.load(Ordering::SeqCst) <= 2);
        assert!(provider.peak.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_successful_data() {
        let provider = Arc::new(StubProvider {
            failing: HashSet::from([Category::Erc721, Category::Internal]),
            ..Default::default()
        });

        let report = fetcher(provider)
            .fetch_all(&CancellationToken::new(), "0xabc", PageRange::default())
            .await
            .unwrap();

        assert_eq!(
            report.failures.categories().collect::<Vec<_>>(),
            vec![Category::Internal, Category::Erc721]
        );
        assert_eq!(report.records.len(), 3);
        assert_eq!(report.records.count(Category::Erc721), 0);

        let (_, error) = report.into_parts();
        let message = error.unwrap().to_string();
        assert!(message.starts_with("partial fetch failures occurred"));
        assert!(message.contains("Internal fetch failed: API error: Internal unavailable"));
        assert!(message.contains("ERC-721 fetch failed"));
    }

    #[tokio::test]
    async fn test_all_failures_is_total_failure() {
        let provider = Arc::new(StubProvider {
            failing: Category::ALL.into_iter().collect(),
            ..Default::default()
        });

        let err = fetcher(provider)
            .fetch_all(&CancellationToken::new(), "0xabc", PageRange::default())
            .await
            .unwrap_err();

        match err {
            PipelineError::AllFetchesFailed(failures) => assert_eq!(failures.len(), 5),
            other => panic!("expected total failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_slow_category_times_out() {
        let provider = Arc::new(StubProvider {
            delay: Duration::from_secs(5),
            ..Default::default()
        });

        let mut fetcher = fetcher(provider);
        fetcher.set_max_concurrent(5);
        fetcher.set_timeout(Duration::from_millis(20));

        let started = Instant::now();
        let err = fetcher
            .fetch_all(&CancellationToken::new(), "0xabc", PageRange::default())
            .await
            .unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(2));
        let PipelineError::AllFetchesFailed(failures) = err else {
            panic!("expected total failure");
        };
        assert!(
            failures
                .0
                .iter()
                .all(|f| matches!(f.error, FetchError::Timeout { .. }))
        );
    }

    #[tokio::test]
    async fn test_timeout_only_fails_the_slow_category() {
        let provider = Arc::new(StubProvider {
            stalled: HashSet::from([Category::Internal]),
            ..Default::default()
        });

        // One permit, so the stalled call also holds up the queue until it times out
        let mut fetcher = fetcher(provider);
        fetcher.set_max_concurrent(1);
        fetcher.set_timeout(Duration::from_millis(50));

        let report = tokio::time::timeout(
            Duration::from_secs(5),
            fetcher.fetch_all(&CancellationToken::new(), "0xabc", PageRange::default()),
        )
        .await
        .expect("fetch did not finish")
        .unwrap();

        assert_eq!(report.failures.len(), 1);
        let failure = &report.failures.0[0];
        assert_eq!(failure.category, Category::Internal);
        assert!(matches!(failure.error, FetchError::Timeout { timeout } if timeout == Duration::from_millis(50)));

        assert_eq!(report.records.len(), 4);
        assert_eq!(report.records.count(Category::Internal), 0);
        for category in [Category::Native, Category::Erc20, Category::Erc721, Category::Erc1155] {
            assert_eq!(report.records.count(category), 1);
        }

        let (_, error) = report.into_parts();
        assert!(matches!(error, Some(PipelineError::PartialFetch(_))));
    }

    #[tokio::test]
    async fn test_cancel_aborts_in_flight_calls() {
        let provider = Arc::new(StubProvider {
            delay: Duration::from_secs(30),
            ..Default::default()
        });
        let fetcher = fetcher(provider);
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            fetcher.fetch_all(&cancel, "0xabc", PageRange::default()),
        )
        .await
        .expect("fetch did not return after cancellation");

        assert!(matches!(result, Err(PipelineError::Cancelled)));
    }

    #[test]
    fn test_out_of_range_concurrency_is_ignored() {
        let mut fetcher = fetcher(Arc::new(StubProvider::default()));
        fetcher.set_max_concurrent(0);
        fetcher.set_max_concurrent(11);
        assert_eq!(fetcher.max_concurrent(), 3);
        fetcher.set_timeout(Duration::ZERO);
        assert_eq!(fetcher.timeout(), Duration::from_secs(30));
    }
}
