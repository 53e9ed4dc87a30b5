use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{Router, routing::get};
use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Histogram, MeterProvider};
use opentelemetry_sdk::metrics::{MetricError, SdkMeterProvider};
use prometheus::{Encoder, TextEncoder};
use tracing::{error, info};

use crate::models::common::Category;

#[derive(Clone)]
pub struct Metrics {
    registry: Arc<prometheus::Registry>,
    _provider: SdkMeterProvider,

    // Provider metrics
    pub provider_requests: Counter<u64>,
    pub provider_errors: Counter<u64>,
    pub provider_latency: Histogram<f64>,

    // Normalization metrics
    pub records_normalized: Counter<u64>,
    pub normalization_failures: Counter<u64>,

    // Export metrics
    pub transactions_exported: Counter<u64>,
}

impl Metrics {
    pub fn new() -> Result<Self, MetricError> {
        // Create a new prometheus registry
        let registry = prometheus::Registry::new();

        // Configure OpenTelemetry to use this registry
        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()?;

        // Set up a meter to create instruments
        let provider = SdkMeterProvider::builder().with_reader(exporter).build();
        let meter = provider.meter("wallet_history_metrics");

        let provider_requests = meter
            .u64_counter("wallet_history_provider_requests")
            .with_description("Number of provider fetch calls made")
            .build();

        let provider_errors = meter
            .u64_counter("wallet_history_provider_errors")
            .with_description("Number of provider fetch calls that failed or timed out")
            .build();

        let provider_latency = meter
            .f64_histogram("wallet_history_provider_latency")
            .with_description("Provider fetch latency")
            .with_boundaries(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0])
            .with_unit("s")
            .build();

        let records_normalized = meter
            .u64_counter("wallet_history_records_normalized")
            .with_description("Number of records normalized successfully")
            .build();

        let normalization_failures = meter
            .u64_counter("wallet_history_normalization_failures")
            .with_description("Number of records rejected by the normalizer")
            .build();

        let transactions_exported = meter
            .u64_counter("wallet_history_transactions_exported")
            .with_description("Number of transactions written to the output")
            .build();

        Ok(Self {
            registry: Arc::new(registry),
            _provider: provider,
            provider_requests,
            provider_errors,
            provider_latency,
            records_normalized,
            normalization_failures,
            transactions_exported,
        })
    }

    pub fn category_labels(category: Category) -> [KeyValue; 1] {
        [KeyValue::new("category", category.as_str())]
    }

    pub async fn start_metrics_server(&self, addr: &str, port: u16) -> Result<()> {
        let addr = format!("{addr}:{port}")
            .parse::<SocketAddr>()
            .context("invalid metrics address")?;
        let registry = self.registry.clone();

        let app = Router::new().route("/metrics", get(move || metrics_handler(registry.clone())));

        // Determine the access URL based on the binding address. Only used for logging.
        let access_url = if addr.ip().is_unspecified() {
            format!("http://localhost:{port}/metrics")
        } else {
            format!("http://{}:{port}/metrics", addr.ip())
        };

        info!(
            "Starting metrics server - binding to {} (accessible at {})",
            addr, access_url
        );

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .context("failed to bind metrics listener")?;

        // Spawn the server in a separate task
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!("Metrics server error: {}", e);
            }
        });

        Ok(())
    }
}

async fn metrics_handler(registry: Arc<prometheus::Registry>) -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
