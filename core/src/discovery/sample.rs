//! Bounded, reproducible row samples for discovery

use crate::cache::RowCountCache;
use crate::combination::Combination;
use crate::config::DiscoveryConfig;
use crate::data::{ScanOptions, SourceReader};
use crate::error::Result;
use crate::key::Row;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// In-memory rows drawn from a source, never more than the configured cap
#[derive(Debug, Clone)]
pub struct Sample {
    columns: Vec<String>,
    rows: Vec<Row>,
    source_rows: u64,
}

impl Sample {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        let source_rows = rows.len() as u64;
        Self {
            columns,
            rows,
            source_rows,
        }
    }

    /// Draw a sample sized by [`DiscoveryConfig::sample_size_for`].
    ///
    /// One pass fills a seeded reservoir of at most `sample_cap` rows and
    /// learns the row count on the way; the reservoir is then thinned to the
    /// size the count calls for. Small files are taken whole, and the same
    /// file always yields the same sample.
    pub fn draw(
        reader: &SourceReader,
        config: &DiscoveryConfig,
        cache: &RowCountCache,
        scan: &ScanOptions,
    ) -> Result<Self> {
        let columns = reader.columns().to_vec();
        let capacity = config.sample_size_for(u64::MAX);
        if capacity == 0 {
            let total = cache.row_count(reader)?;
            return Ok(Self {
                columns,
                rows: Vec::new(),
                source_rows: total,
            });
        }

        let mut reservoir: Vec<Row> = Vec::with_capacity(capacity.min(1 << 16));
        let mut rng = StdRng::seed_from_u64(config.sample_seed);
        let mut seen = 0u64;

        let scanned = reader.scan(scan, |batch| {
            for row in batch {
                if reservoir.len() < capacity {
                    reservoir.push(row.clone());
                } else {
                    let slot = rng.gen_range(0..=seen);
                    if (slot as usize) < capacity {
                        reservoir[slot as usize] = row.clone();
                    }
                }
                seen += 1;
            }
            Ok(())
        })?;
        if scan.limit.is_none() {
            cache.record(reader, scanned)?;
        }

        let target = config.sample_size_for(scanned);
        if reservoir.len() > target {
            // uniform subset of a uniform sample is still uniform
            for i in 0..target {
                let j = rng.gen_range(i..reservoir.len());
                reservoir.swap(i, j);
            }
            reservoir.truncate(target);
        }

        log::info!(
            "Sampled {} of {} rows from {}",
            reservoir.len(),
            scanned,
            reader.path().display()
        );

        Ok(Self {
            columns,
            rows: reservoir,
            source_rows: scanned,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows in the source the sample was drawn from
    pub fn source_rows(&self) -> u64 {
        self.source_rows
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Column positions for a combination, `None` if any column is unknown
    pub fn indices_for(&self, combination: &Combination) -> Option<Vec<usize>> {
        combination
            .columns()
            .iter()
            .map(|c| self.column_index(c))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn numbered_file(dir: &TempDir, rows: usize) -> std::path::PathBuf {
        let path = dir.path().join("numbers.csv");
        let mut content = String::from("n\n");
        for i in 0..rows {
            content.push_str(&format!("{i}\n"));
        }
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_sample_never_exceeds_cap() {
        let dir = TempDir::new().unwrap();
        let path = numbered_file(&dir, 500);
        let reader = SourceReader::open(&path, Some(',')).unwrap();
        let config = DiscoveryConfig {
            sample_cap: 50,
            sample_floor: 20,
            sample_fraction: 0.5,
            ..DiscoveryConfig::default()
        };
        let cache = RowCountCache::new();
        let sample = Sample::draw(&reader, &config, &cache, &ScanOptions::with_batch_rows(64)).unwrap();
        assert_eq!(sample.len(), 50);
        assert_eq!(sample.source_rows(), 500);
    }

    #[test]
    fn test_sample_is_reproducible() {
        let dir = TempDir::new().unwrap();
        let path = numbered_file(&dir, 300);
        let reader = SourceReader::open(&path, Some(',')).unwrap();
        let config = DiscoveryConfig {
            sample_cap: 40,
            sample_floor: 10,
            ..DiscoveryConfig::default()
        };
        let cache = RowCountCache::new();
        let scan = ScanOptions::with_batch_rows(32);
        let first = Sample::draw(&reader, &config, &cache, &scan).unwrap();
        let second = Sample::draw(&reader, &config, &cache, &scan).unwrap();
        assert_eq!(first.rows(), second.rows());
    }

    #[test]
    fn test_single_pass_learns_row_count() {
        let dir = TempDir::new().unwrap();
        let path = numbered_file(&dir, 400);
        let reader = SourceReader::open(&path, Some(',')).unwrap();
        let config = DiscoveryConfig {
            sample_cap: 100,
            sample_floor: 10,
            sample_fraction: 0.1,
            ..DiscoveryConfig::default()
        };
        let cache = RowCountCache::new();
        assert!(cache.is_empty());
        let sample = Sample::draw(&reader, &config, &cache, &ScanOptions::with_batch_rows(50)).unwrap();

        // 10% of 400, thinned from the cap-sized reservoir
        assert_eq!(sample.len(), 40);
        assert_eq!(sample.source_rows(), 400);
        let distinct: std::collections::HashSet<&Row> = sample.rows().iter().collect();
        assert_eq!(distinct.len(), 40);
        // the count came from the sampling scan itself
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.row_count(&reader).unwrap(), 400);
    }

    #[test]
    fn test_small_file_taken_whole() {
        let dir = TempDir::new().unwrap();
        let path = numbered_file(&dir, 12);
        let reader = SourceReader::open(&path, Some(',')).unwrap();
        let cache = RowCountCache::new();
        let sample = Sample::draw(
            &reader,
            &DiscoveryConfig::default(),
            &cache,
            &ScanOptions::default(),
        )
        .unwrap();
        assert_eq!(sample.len(), 12);
        assert_eq!(sample.rows()[0], vec![Some("0".to_string())]);
    }
}
