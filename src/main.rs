use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{self, EnvFilter};

use wallet_history::metrics::Metrics;
use wallet_history::models::common::{Category, Config, NormalizationStats, PageRange};
use wallet_history::models::errors::PipelineError;
use wallet_history::output::{CsvExporter, StreamingCsvWriter};
use wallet_history::pipeline::TransactionPipeline;
use wallet_history::providers::EtherscanClient;
use wallet_history::transformations::EtherscanNormalizer;
use wallet_history::utils::{is_valid_address, load_config};

const CONFIG_PATH_ENV: &str = "WALLET_HISTORY_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config.yml";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    println!();
    info!("=========================== INITIALIZING ===========================");

    // Load config
    let config_path =
        std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = match load_config(&config_path) {
        Ok(config) => {
            info!("Config loaded successfully");
            config
        }
        Err(e) => {
            error!("Failed to load config: {:#}", e);
            return Err(e);
        }
    };

    if !is_valid_address(&config.address) {
        return Err(anyhow!(
            "invalid address {:?}: expected 0x followed by 40 hex digits",
            config.address
        ));
    }
    if config.provider.api_key.is_none() {
        warn!("No Etherscan API key configured, requests will be heavily rate limited");
    }

    // Initialize optional metrics
    let metrics = if config.metrics.enabled {
        let metrics = Metrics::new().context("failed to initialize metrics")?;
        metrics
            .start_metrics_server(&config.metrics.address, config.metrics.port)
            .await?;
        Some(metrics)
    } else {
        info!("Metrics are disabled");
        None
    };

    // Cancel the whole run on Ctrl+C
    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if let Ok(()) = signal::ctrl_c().await {
            info!("Received Ctrl+C signal, initiating shutdown...");
            shutdown.cancel();
        }
    });

    let provider = Arc::new(EtherscanClient::new(&config.provider)?);
    let pipeline = TransactionPipeline::from_config(
        provider,
        Arc::new(EtherscanNormalizer::new()),
        &config,
        metrics.clone(),
    );
    let pages = PageRange::new(config.start_page, config.end_page);

    println!();
    info!("========================= FETCHING HISTORY =========================");
    info!("Address: {}", config.address);
    info!("Pages: {} to {}", pages.start, pages.end);

    if config.output.streaming {
        run_streaming(&pipeline, &config, cancel, pages, metrics).await
    } else {
        run_batch(&pipeline, &config, cancel, pages, metrics).await
    }
}

async fn run_batch(
    pipeline: &TransactionPipeline,
    config: &Config,
    cancel: CancellationToken,
    pages: PageRange,
    metrics: Option<Metrics>,
) -> Result<()> {
    let output = pipeline.run(cancel, &config.address, pages).await?;
    report_fetch_error(output.fetch_error.as_ref());

    let mut exporter = CsvExporter::create(&config.output.path)
        .context("failed to create output file")?
        .with_metrics(metrics);
    exporter.write_all(&output.transactions)?;
    exporter.finish().context("failed to flush output file")?;

    print_summary(&output.stats);
    info!(
        "Exported {} transactions to {}",
        output.transactions.len(),
        config.output.path
    );
    Ok(())
}

async fn run_streaming(
    pipeline: &TransactionPipeline,
    config: &Config,
    cancel: CancellationToken,
    pages: PageRange,
    metrics: Option<Metrics>,
) -> Result<()> {
    let output = pipeline
        .run_streaming(cancel.clone(), &config.address, pages)
        .await?;
    report_fetch_error(output.fetch_error.as_ref());

    let mut writer = StreamingCsvWriter::create(&config.output.path)
        .context("failed to create output file")?
        .with_metrics(metrics);
    writer.set_batch_size(config.output.batch_size);
    writer.set_flush_interval(Duration::from_secs(config.output.flush_interval_secs));
    let written = writer.write_stream(&cancel, output.transactions).await?;
    writer.into_inner().context("failed to flush output file")?;

    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled.into());
    }

    info!(
        "Streamed {} transactions to {} (unsorted)",
        written, config.output.path
    );
    Ok(())
}

fn report_fetch_error(error: Option<&PipelineError>) {
    if let Some(e) = error {
        warn!("Continuing with partial data: {}", e);
    }
}

fn print_summary(stats: &NormalizationStats) {
    println!();
    info!("============================= SUMMARY ==============================");
    for category in Category::ALL {
        match stats.get(category) {
            Some(s) => info!(
                "{:<10} processed {:>6}  succeeded {:>6}  failed {:>6}",
                category.to_string(),
                s.processed,
                s.succeeded,
                s.failed
            ),
            None => info!("{:<10} no records", category.to_string()),
        }
    }
    let totals = stats.totals();
    if totals.failed > 0 {
        warn!("{} records failed normalization and were skipped", totals.failed);
    }
}
