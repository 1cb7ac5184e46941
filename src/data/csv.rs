//! Local CSV data source.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::info;

use super::{Cell, DataRepository, Table};
use crate::AutoembedError;

/// Reads training and prediction rows from CSV files on the local filesystem.
///
/// Every non-empty field is kept as text; numerical columns are parsed when
/// the preprocessor reads them. Empty fields are nulls.
pub struct CsvDataRepository {
    base_dir: Option<PathBuf>,
    delimiter: u8,
}

impl Default for CsvDataRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl CsvDataRepository {
    pub fn new() -> Self {
        Self {
            base_dir: None,
            delimiter: b',',
        }
    }

    /// Resolve relative paths against `dir`.
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    fn resolve(&self, path: &str) -> PathBuf {
        match &self.base_dir {
            Some(dir) => dir.join(path),
            None => PathBuf::from(path),
        }
    }

    async fn read(&self, path: &str) -> Result<Table, AutoembedError> {
        let full_path = self.resolve(path);
        let contents = tokio::fs::read_to_string(&full_path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AutoembedError::not_found("dataset", full_path.display().to_string())
            } else {
                AutoembedError::from(e)
            }
        })?;
        parse_csv(&contents, self.delimiter)
    }
}

/// Parse CSV text with a header row into a [`Table`].
pub fn parse_csv(data: &str, delimiter: u8) -> Result<Table, AutoembedError> {
    let mut reader = ::csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .from_reader(data.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
    let mut table = Table::new(headers)?;

    for (i, result) in reader.records().enumerate() {
        let record = result.map_err(|e| {
            AutoembedError::Serialization(format!("CSV row {} error: {}", i, e))
        })?;
        let row = record
            .iter()
            .map(|field| {
                if field.is_empty() {
                    Cell::Null
                } else {
                    Cell::Text(field.to_string())
                }
            })
            .collect();
        table.push_row(row)?;
    }

    Ok(table)
}

#[async_trait]
impl DataRepository for CsvDataRepository {
    async fn get_training_data(&self, path: &str) -> Result<Table, AutoembedError> {
        info!("Getting training data from {}", path);
        self.read(path).await
    }

    async fn get_prediction_data(&self, path: &str) -> Result<Table, AutoembedError> {
        info!("Getting prediction data from {}", path);
        self.read(path).await
    }
}
