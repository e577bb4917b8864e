//! Streaming composite-key extraction

use crate::combination::Combination;
use crate::data::{ScanOptions, SourceReader};
use crate::error::Result;
use crate::job::CancellationToken;
use crate::key::{CompositeKey, KeySet};
use std::path::Path;

/// Options for one extraction pass
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub batch_rows: usize,
    /// Stop after this many rows
    pub limit: Option<u64>,
    pub cancel: Option<CancellationToken>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            batch_rows: 50_000,
            limit: None,
            cancel: None,
        }
    }
}

impl From<&ExtractOptions> for ScanOptions {
    fn from(options: &ExtractOptions) -> Self {
        ScanOptions {
            batch_rows: options.batch_rows,
            limit: options.limit,
            cancel: options.cancel.clone(),
        }
    }
}

/// Builds the distinct key set of a file in bounded row batches
pub struct ChunkedKeyExtractor<'a> {
    options: &'a ExtractOptions,
    progress: Option<&'a (dyn Fn(u64) + Sync)>,
}

impl<'a> ChunkedKeyExtractor<'a> {
    pub fn new(options: &'a ExtractOptions) -> Self {
        Self {
            options,
            progress: None,
        }
    }

    /// Called with the rows processed so far after every batch
    pub fn with_progress(mut self, progress: &'a (dyn Fn(u64) + Sync)) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Open `path` and extract the keys of `combination`
    pub fn extract_file(
        &self,
        path: &Path,
        delimiter: Option<char>,
        combination: &Combination,
    ) -> Result<KeySet> {
        let reader = SourceReader::open(path, delimiter)?;
        self.extract(&reader, combination)
    }

    /// Extract from an open reader.
    ///
    /// Columns are resolved before the first row is read, so a missing
    /// column fails with `ColumnNotFound` without scanning.
    pub fn extract(&self, reader: &SourceReader, combination: &Combination) -> Result<KeySet> {
        let indices = reader.resolve_columns(combination)?;
        let mut keys = KeySet::new();

        let scanned = reader.scan(&ScanOptions::from(self.options), |batch| {
            for row in batch {
                keys.insert(CompositeKey::from_row(row, &indices));
            }
            if let Some(progress) = self.progress {
                progress(keys.total_rows());
            }
            Ok(())
        })?;

        log::info!(
            "Extracted {} distinct keys on {} from {} rows of {}",
            keys.len(),
            combination,
            scanned,
            reader.path().display()
        );
        Ok(keys)
    }
}
