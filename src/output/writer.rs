use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use chrono::SecondsFormat;
use futures::{Stream, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::metrics::Metrics;
use crate::models::datasets::transactions::Transaction;
use crate::models::errors::ExportError;

const HEADERS: [&str; 10] = [
    "Transaction Hash",
    "Date & Time",
    "From Address",
    "To Address",
    "Transaction Type",
    "Asset Contract Address",
    "Asset Symbol / Name",
    "Token ID",
    "Value / Amount",
    "Gas Fee (ETH)",
];

const DEFAULT_BATCH_SIZE: usize = 100;
const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Serialize)]
struct CsvRow<'a> {
    hash: &'a str,
    date_time: String,
    from: &'a str,
    to: &'a str,
    transaction_type: &'static str,
    asset_contract_address: &'a str,
    asset_symbol: &'a str,
    token_id: &'a str,
    amount: &'a str,
    gas_fee: &'a str,
}

impl<'a> From<&'a Transaction> for CsvRow<'a> {
    fn from(tx: &'a Transaction) -> Self {
        Self {
            hash: &tx.hash,
            date_time: tx.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            from: &tx.from,
            to: &tx.to,
            transaction_type: tx.category.as_str(),
            asset_contract_address: tx.asset_contract_address.as_deref().unwrap_or_default(),
            asset_symbol: tx.asset_symbol.as_deref().unwrap_or_default(),
            token_id: tx.token_id.as_deref().unwrap_or_default(),
            amount: &tx.amount,
            gas_fee: &tx.gas_fee,
        }
    }
}

fn csv_writer<W: Write>(inner: W) -> Result<csv::Writer<W>, ExportError> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(inner);
    writer.write_record(HEADERS)?;
    Ok(writer)
}

/// Writes an already ordered batch of transactions as CSV.
pub struct CsvExporter<W: Write> {
    writer: csv::Writer<W>,
    written: usize,
    metrics: Option<Metrics>,
}

impl CsvExporter<BufWriter<File>> {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, ExportError> {
        let file = File::create(path.as_ref())?;
        info!("Writing CSV to {}", path.as_ref().display());
        Self::new(BufWriter::new(file))
    }
}

impl<W: Write> CsvExporter<W> {
    pub fn new(inner: W) -> Result<Self, ExportError> {
        Ok(Self {
            writer: csv_writer(inner)?,
            written: 0,
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: Option<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn write_transaction(&mut self, tx: &Transaction) -> Result<(), ExportError> {
        self.writer.serialize(CsvRow::from(tx))?;
        self.written += 1;
        Ok(())
    }

    pub fn write_all(&mut self, transactions: &[Transaction]) -> Result<usize, ExportError> {
        for tx in transactions {
            self.write_transaction(tx)?;
        }
        if let Some(metrics) = &self.metrics {
            metrics
                .transactions_exported
                .add(transactions.len() as u64, &[]);
        }
        Ok(transactions.len())
    }

    pub fn written(&self) -> usize {
        self.written
    }

    /// Flush buffered rows and hand back the underlying writer.
    pub fn finish(mut self) -> Result<W, ExportError> {
        self.writer.flush()?;
        self.writer
            .into_inner()
            .map_err(|e| ExportError::Io(e.into_error()))
    }
}

/// Writes transactions as they arrive, flushing every `batch_size` rows or
/// every flush interval, whichever comes first.
pub struct StreamingCsvWriter<W: Write> {
    writer: csv::Writer<W>,
    batch_size: usize,
    flush_interval: Duration,
    metrics: Option<Metrics>,
}

impl StreamingCsvWriter<BufWriter<File>> {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, ExportError> {
        let file = File::create(path.as_ref())?;
        info!("Streaming CSV to {}", path.as_ref().display());
        Self::new(BufWriter::new(file))
    }
}

impl<W: Write> StreamingCsvWriter<W> {
    pub fn new(inner: W) -> Result<Self, ExportError> {
        let mut writer = csv_writer(inner)?;
        writer.flush()?;
        Ok(Self {
            writer,
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: Option<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Rows per flush, 1 to 10000. Other values keep the current setting.
    pub fn set_batch_size(&mut self, size: usize) {
        if (1..=10_000).contains(&size) {
            self.batch_size = size;
        } else {
            warn!("Ignoring batch size {}, keeping {}", size, self.batch_size);
        }
    }

    pub fn set_flush_interval(&mut self, interval: Duration) {
        if !interval.is_zero() {
            self.flush_interval = interval;
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Drain `transactions` into the CSV output and return the number of rows written.
    ///
    /// On cancellation, rows already received are flushed and the count so far is
    /// returned.
    pub async fn write_stream<S>(
        &mut self,
        cancel: &CancellationToken,
        transactions: S,
    ) -> Result<usize, ExportError>
    where
        S: Stream<Item = Transaction>,
    {
        let mut transactions = std::pin::pin!(transactions);
        let mut ticker = tokio::time::interval(self.flush_interval);
        ticker.tick().await;

        let mut written = 0;
        let mut pending = 0;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!("Export cancelled after {} rows", written);
                    break;
                }
                next = transactions.next() => match next {
                    Some(tx) => {
                        self.writer.serialize(CsvRow::from(&tx))?;
                        written += 1;
                        pending += 1;
                        if pending >= self.batch_size {
                            self.flush_batch(&mut pending)?;
                        }
                    }
                    None => break,
                },
                _ = ticker.tick() => {
                    if pending > 0 {
                        self.flush_batch(&mut pending)?;
                    }
                }
            }
        }

        self.flush_batch(&mut pending)?;
        Ok(written)
    }

    fn flush_batch(&mut self, pending: &mut usize) -> Result<(), ExportError> {
        self.writer.flush()?;
        if *pending > 0 {
            debug!("Flushed {} rows", pending);
            if let Some(metrics) = &self.metrics {
                metrics.transactions_exported.add(*pending as u64, &[]);
            }
        }
        *pending = 0;
        Ok(())
    }

    pub fn into_inner(self) -> Result<W, ExportError> {
        self.writer
            .into_inner()
            .map_err(|e| ExportError::Io(e.into_error()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use futures::stream;

    use crate::models::common::Category;

    const HEADER_LINE: &str = "Transaction Hash,Date & Time,From Address,To Address,Transaction Type,Asset Contract Address,Asset Symbol / Name,Token ID,Value / Amount,Gas Fee (ETH)\n";

    fn transaction(block_number: u64, category: Category) -> Transaction {
        Transaction {
            hash: format!("0x{block_number:x}"),
            timestamp: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            from: "0xfrom".to_string(),
            to: "0xto".to_string(),
            category,
            asset_contract_address: None,
            asset_symbol: Some("ETH".to_string()),
            token_id: None,
            amount: "0.5".to_string(),
            gas_fee: "0.00105".to_string(),
            block_number,
            gas_used: 21000,
            gas_price: Some("50000000000".to_string()),
            nonce: Some(1),
            is_error: false,
            input: None,
            method_id: None,
            function_name: None,
            decimals: None,
        }
    }

    fn output(bytes: Vec<u8>) -> String {
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_export_writes_header_and_rows() {
        let mut nft = transaction(101, Category::Erc721);
        nft.asset_contract_address = Some("0xnft".to_string());
        nft.asset_symbol = Some("PUNK".to_string());
        nft.token_id = Some("42".to_string());
        nft.amount = "1".to_string();

        let mut exporter = CsvExporter::new(Vec::new()).unwrap();
        let count = exporter
            .write_all(&[transaction(100, Category::Native), nft])
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(exporter.written(), 2);

        let text = output(exporter.finish().unwrap());
        let lines: Vec<&str> = text.lines().collect();
        assert!(text.starts_with(HEADER_LINE));
        assert_eq!(
            lines[1],
            "0x64,2023-11-14T22:13:20Z,0xfrom,0xto,ETH,,ETH,,0.5,0.00105"
        );
        assert_eq!(
            lines[2],
            "0x65,2023-11-14T22:13:20Z,0xfrom,0xto,ERC-721,0xnft,PUNK,42,1,0.00105"
        );
    }

    #[test]
    fn test_empty_export_still_has_header() {
        let exporter = CsvExporter::new(Vec::new()).unwrap();
        assert_eq!(output(exporter.finish().unwrap()), HEADER_LINE);
    }

    #[test]
    fn test_fields_with_commas_are_quoted() {
        let mut tx = transaction(1, Category::Erc20);
        tx.asset_symbol = Some("Foo, Inc".to_string());

        let mut exporter = CsvExporter::new(Vec::new()).unwrap();
        exporter.write_transaction(&tx).unwrap();
        let text = output(exporter.finish().unwrap());
        assert!(text.contains(",\"Foo, Inc\","));
    }

    #[tokio::test]
    async fn test_stream_writes_every_row() {
        let mut writer = StreamingCsvWriter::new(Vec::new()).unwrap();
        writer.set_batch_size(7);

        let source = stream::iter((0..25).map(|n| transaction(n, Category::Native)));
        let written = writer
            .write_stream(&CancellationToken::new(), source)
            .await
            .unwrap();
        assert_eq!(written, 25);

        let text = output(writer.into_inner().unwrap());
        assert!(text.starts_with(HEADER_LINE));
        assert_eq!(text.lines().count(), 26);
    }

    #[tokio::test]
    async fn test_stream_stops_on_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut writer = StreamingCsvWriter::new(Vec::new()).unwrap();
        let written = writer
            .write_stream(&cancel, stream::pending::<Transaction>())
            .await
            .unwrap();
        assert_eq!(written, 0);
        assert_eq!(output(writer.into_inner().unwrap()), HEADER_LINE);
    }

    #[test]
    fn test_batch_size_bounds() {
        let mut writer = StreamingCsvWriter::new(Vec::new()).unwrap();
        writer.set_batch_size(0);
        assert_eq!(writer.batch_size(), 100);
        writer.set_batch_size(500);
        assert_eq!(writer.batch_size(), 500);
    }
}
