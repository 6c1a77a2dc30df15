//! Offline provider backed by a directory of CSV exports.
//!
//! Layout: `{import_dir}/{CODE.SUFFIX}/{dataset}.csv`, headers in the first
//! row. Serves as the price fallback when the HTTP provider is unavailable,
//! and as the only provider on air-gapped hosts.

use super::provider::{MarketDataProvider, TableRequest};
use crate::domain::Record;
use crate::error::ProviderError;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct CsvImportProvider {
    dir: PathBuf,
}

impl CsvImportProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn dataset_path(&self, symbol: &str, dataset: &str) -> PathBuf {
        self.dir.join(symbol).join(format!("{dataset}.csv"))
    }
}

impl MarketDataProvider for CsvImportProvider {
    fn name(&self) -> &str {
        "csv_import"
    }

    fn fetch_table(&self, request: &TableRequest<'_>) -> Result<Vec<Record>, ProviderError> {
        let symbol = request.entity.symbol();
        let path = self.dataset_path(&symbol, request.dataset);
        if !path.is_file() {
            return Err(ProviderError::EntityNotFound {
                symbol,
                dataset: request.dataset.to_string(),
            });
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(&path)
            .map_err(|e| ProviderError::Other(format!("{}: {e}", path.display())))?;
        let headers = reader
            .headers()
            .map_err(|e| ProviderError::ResponseFormatChanged(format!("{}: {e}", path.display())))?
            .clone();

        let mut records = Vec::new();
        for result in reader.records() {
            let row = result
                .map_err(|e| ProviderError::ResponseFormatChanged(format!("{}: {e}", path.display())))?;
            let record: Record = headers
                .iter()
                .zip(row.iter())
                .filter(|(_, v)| !v.is_empty())
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            records.push(record);
        }
        tracing::debug!(path = %path.display(), rows = records.len(), "loaded CSV import");
        Ok(records)
    }
}
