use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::models::common::{Category, CategoryStats, NormalizationOutcome};
use crate::models::datasets::transactions::Transaction;
use crate::models::errors::PipelineError;

/// Normalize `records` of one category across `worker_count` concurrent workers.
///
/// Successful transactions are sent on `results`; the returned stats cover every
/// record a worker took off the queue. Emission order within the category is not
/// preserved. On cancellation workers stop dequeuing, any transaction still waiting
/// for buffer space is discarded, and the pool returns once every worker has exited.
pub async fn run_worker_pool<R, F>(
    cancel: CancellationToken,
    category: Category,
    records: Vec<R>,
    worker_count: usize,
    normalize: F,
    results: Sender<Transaction>,
) -> Result<CategoryStats, PipelineError>
where
    R: Send + 'static,
    F: Fn(&R) -> NormalizationOutcome + Send + Sync + 'static,
{
    if records.is_empty() {
        return Ok(CategoryStats::default());
    }

    let total = records.len();

    // Work queue holds the whole slice, so filling it never waits
    let (queue_tx, queue_rx) = mpsc::channel(total);
    for record in records {
        if cancel.is_cancelled() {
            debug!("{} pool cancelled while queueing records", category);
            return Ok(CategoryStats::default());
        }
        if queue_tx.send(record).await.is_err() {
            break;
        }
    }
    drop(queue_tx);

    let queue = Arc::new(Mutex::new(queue_rx));
    let normalize = Arc::new(normalize);
    let worker_count = worker_count.clamp(1, total);

    let mut workers = JoinSet::new();
    for id in 0..worker_count {
        workers.spawn(worker(
            id,
            category,
            Arc::clone(&queue),
            Arc::clone(&normalize),
            results.clone(),
            cancel.clone(),
        ));
    }
    drop(results);

    let mut stats = CategoryStats::default();
    while let Some(joined) = workers.join_next().await {
        stats.merge(joined?);
    }

    debug!(
        "{} pool finished: {} processed, {} succeeded, {} failed",
        category, stats.processed, stats.succeeded, stats.failed
    );
    Ok(stats)
}

async fn worker<R, F>(
    id: usize,
    category: Category,
    queue: Arc<Mutex<Receiver<R>>>,
    normalize: Arc<F>,
    results: Sender<Transaction>,
    cancel: CancellationToken,
) -> CategoryStats
where
    F: Fn(&R) -> NormalizationOutcome,
{
    let mut stats = CategoryStats::default();

    loop {
        let record = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            record = async { queue.lock().await.recv().await } => match record {
                Some(record) => record,
                None => break,
            },
        };

        match normalize(&record) {
            Ok(transaction) => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    sent = results.send(transaction) => {
                        if sent.is_err() {
                            debug!("{} worker {}: result receiver dropped", category, id);
                            break;
                        }
                        stats.record_success();
                    }
                }
            }
            Err(e) => {
                warn!("{} worker {}: skipping record: {}", category, id, e);
                stats.record_failure(e.to_string());
            }
        }
    }

    stats
}
