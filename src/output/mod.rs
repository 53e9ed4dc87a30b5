pub mod writer;

pub use writer::{CsvExporter, StreamingCsvWriter};
