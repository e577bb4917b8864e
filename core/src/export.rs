//! Chunked export of categorized records and the chunk registry

use crate::cache::RowCountCache;
use crate::combination::Combination;
use crate::data::{ScanOptions, SourceReader};
use crate::error::{KeyscopeError, Result};
use crate::job::CancellationToken;
use crate::key::{CompositeKey, Row};
pub use crate::naming::ExportCategory;
use crate::naming::{chunk_file_name, parse_chunk_file_name};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;

pub const MANIFEST_FILE: &str = "manifest.json";

/// One flushed chunk file, immutable once registered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportChunk {
    pub category: ExportCategory,
    /// One-based, increasing per category within a run
    pub chunk_index: u32,
    pub file_path: PathBuf,
    pub row_count: u64,
    pub file_size: u64,
}

/// Where flushed chunks are recorded for later paging
pub trait ChunkRegistry {
    fn register(&mut self, chunk: &ExportChunk) -> Result<()>;

    /// Registered chunks of `category` in index order
    fn chunks(&self, category: ExportCategory) -> Vec<ExportChunk>;

    fn all_chunks(&self) -> Vec<ExportChunk> {
        ExportCategory::ALL
            .iter()
            .flat_map(|c| self.chunks(*c))
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct MemoryChunkRegistry {
    chunks: Vec<ExportChunk>,
}

impl MemoryChunkRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChunkRegistry for MemoryChunkRegistry {
    fn register(&mut self, chunk: &ExportChunk) -> Result<()> {
        self.chunks.push(chunk.clone());
        Ok(())
    }

    fn chunks(&self, category: ExportCategory) -> Vec<ExportChunk> {
        sorted_for(&self.chunks, category)
    }
}

/// `manifest.json` contents of one run directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub run_id: String,
    pub combination: Combination,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub chunks: Vec<ExportChunk>,
}

/// Registry persisted as `manifest.json` in the run directory.
///
/// The manifest is rewritten through a temporary sibling on every
/// registration, so readers see either the previous or the new version.
#[derive(Debug)]
pub struct ManifestRegistry {
    dir: PathBuf,
    manifest: Manifest,
}

impl ManifestRegistry {
    pub fn create(dir: &Path, run_id: &str, combination: &Combination) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let now = Utc::now();
        let registry = Self {
            dir: dir.to_path_buf(),
            manifest: Manifest {
                run_id: run_id.to_string(),
                combination: combination.clone(),
                created_at: now,
                updated_at: now,
                chunks: Vec::new(),
            },
        };
        registry.save()?;
        Ok(registry)
    }

    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        if !path.is_file() {
            return Err(KeyscopeError::FileNotFound(path));
        }
        let content = fs::read_to_string(&path)?;
        let manifest: Manifest = serde_json::from_str(&content)?;
        for chunk in &manifest.chunks {
            let named = chunk
                .file_path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(parse_chunk_file_name);
            if named != Some((chunk.category, chunk.chunk_index)) {
                return Err(KeyscopeError::data_processing(format!(
                    "manifest entry {} does not match {} chunk {}",
                    chunk.file_path.display(),
                    chunk.category,
                    chunk.chunk_index
                )));
            }
        }
        Ok(Self {
            dir: dir.to_path_buf(),
            manifest,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    fn save(&self) -> Result<()> {
        let json = serde_json::to_vec_pretty(&self.manifest)?;
        write_atomically(&self.dir, &self.dir.join(MANIFEST_FILE), |file| {
            file.write_all(&json)?;
            Ok(())
        })
    }
}

impl ChunkRegistry for ManifestRegistry {
    fn register(&mut self, chunk: &ExportChunk) -> Result<()> {
        self.manifest.chunks.push(chunk.clone());
        self.manifest.updated_at = Utc::now();
        self.save()
    }

    fn chunks(&self, category: ExportCategory) -> Vec<ExportChunk> {
        sorted_for(&self.manifest.chunks, category)
    }
}

fn sorted_for(chunks: &[ExportChunk], category: ExportCategory) -> Vec<ExportChunk> {
    let mut selected: Vec<ExportChunk> = chunks
        .iter()
        .filter(|c| c.category == category)
        .cloned()
        .collect();
    selected.sort_by_key(|c| c.chunk_index);
    selected
}

/// Write `target` via a temporary file in `dir` renamed into place
fn write_atomically<F>(dir: &Path, target: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut NamedTempFile) -> Result<()>,
{
    let mut temp = NamedTempFile::new_in(dir)?;
    write(&mut temp)?;
    temp.as_file().sync_all()?;
    temp.persist(target)?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub rows_per_file: usize,
    pub batch_rows: usize,
    /// Only the first `limit` source rows are considered, matching extraction
    pub limit: Option<u64>,
    /// Steps over sources with more rows are skipped
    pub skip_above_rows: Option<u64>,
    /// Wall-clock budget for the step
    pub step_timeout: Option<Duration>,
    pub cancel: Option<CancellationToken>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            rows_per_file: 100_000,
            batch_rows: 50_000,
            limit: None,
            skip_above_rows: None,
            step_timeout: None,
            cancel: None,
        }
    }
}

/// Rows and chunks written for each category by one step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportSummary {
    pub chunks: Vec<ExportChunk>,
    pub rows: BTreeMap<ExportCategory, u64>,
}

impl ExportSummary {
    /// Summary of chunks already registered, e.g. by an abandoned step
    pub fn from_chunks(chunks: Vec<ExportChunk>) -> Self {
        let mut rows = BTreeMap::new();
        for chunk in &chunks {
            *rows.entry(chunk.category).or_insert(0) += chunk.row_count;
        }
        Self { chunks, rows }
    }

    pub fn rows_for(&self, category: ExportCategory) -> u64 {
        self.rows.get(&category).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExportOutcome {
    Exported(ExportSummary),
    /// The source exceeded `skip_above_rows`; nothing was written
    Skipped { source_rows: u64, limit: u64 },
}

/// Target keys of one category
pub struct ExportTarget<'a> {
    pub category: ExportCategory,
    pub keys: &'a HashSet<CompositeKey>,
}

struct CategoryBuffer<'a> {
    target: ExportTarget<'a>,
    rows: Vec<Row>,
    next_index: u32,
    exported: u64,
}

/// Streams a source again and writes the full rows of each category to
/// bounded chunk files
pub struct ChunkedRecordExporter<'a> {
    options: &'a ExportOptions,
    out_dir: &'a Path,
}

impl<'a> ChunkedRecordExporter<'a> {
    pub fn new(options: &'a ExportOptions, out_dir: &'a Path) -> Self {
        Self { options, out_dir }
    }

    /// Export every target category from one pass over `reader`.
    ///
    /// Chunks are registered as soon as they are flushed. On timeout or
    /// cancellation the error is returned and flushed chunks stay valid.
    pub fn export(
        &self,
        reader: &SourceReader,
        combination: &Combination,
        targets: Vec<ExportTarget<'_>>,
        registry: &mut dyn ChunkRegistry,
        cache: &RowCountCache,
    ) -> Result<ExportOutcome> {
        let step = format!("export {}", reader.path().display());
        let indices = reader.resolve_columns(combination)?;

        if let Some(limit) = self.options.skip_above_rows {
            let source_rows = cache.row_count(reader)?;
            if source_rows > limit {
                log::warn!("Skipping {step}: {source_rows} rows exceeds limit of {limit}");
                return Ok(ExportOutcome::Skipped { source_rows, limit });
            }
        }

        if targets.iter().all(|t| t.keys.is_empty()) {
            log::debug!("Nothing to export from {}", reader.path().display());
            return Ok(ExportOutcome::Exported(ExportSummary {
                chunks: Vec::new(),
                rows: targets.iter().map(|t| (t.category, 0)).collect(),
            }));
        }

        fs::create_dir_all(self.out_dir)?;
        let rows_per_file = self.options.rows_per_file.max(1);
        let header = reader.columns();
        let started = Instant::now();

        let mut buffers: Vec<CategoryBuffer> = targets
            .into_iter()
            .map(|target| CategoryBuffer {
                target,
                rows: Vec::new(),
                next_index: 1,
                exported: 0,
            })
            .collect();
        let mut chunks = Vec::new();

        let scan = ScanOptions {
            batch_rows: self.options.batch_rows,
            limit: self.options.limit,
            cancel: self.options.cancel.clone(),
        };

        reader.scan(&scan, |batch| {
            for row in batch {
                let key = CompositeKey::from_row(row, &indices);
                for buffer in buffers.iter_mut() {
                    if buffer.target.keys.contains(&key) {
                        buffer.rows.push(row.clone());
                        if buffer.rows.len() >= rows_per_file {
                            chunks.push(self.flush(buffer, header, registry)?);
                        }
                    }
                }
            }

            if let Some(budget) = self.options.step_timeout {
                let elapsed = started.elapsed();
                if elapsed > budget {
                    return Err(KeyscopeError::Timeout {
                        step: step.clone(),
                        elapsed,
                    });
                }
            }
            Ok(())
        })?;

        for buffer in buffers.iter_mut() {
            if !buffer.rows.is_empty() {
                chunks.push(self.flush(buffer, header, registry)?);
            }
        }

        let rows = buffers
            .iter()
            .map(|b| (b.target.category, b.exported))
            .collect();
        log::info!(
            "Exported {} chunk(s) from {} in {:?}",
            chunks.len(),
            reader.path().display(),
            started.elapsed()
        );
        Ok(ExportOutcome::Exported(ExportSummary { chunks, rows }))
    }

    fn flush(
        &self,
        buffer: &mut CategoryBuffer,
        header: &[String],
        registry: &mut dyn ChunkRegistry,
    ) -> Result<ExportChunk> {
        let category = buffer.target.category;
        let path = self
            .out_dir
            .join(chunk_file_name(category, buffer.next_index));

        write_atomically(self.out_dir, &path, |file| {
            let mut writer = csv::Writer::from_writer(file);
            writer.write_record(header)?;
            for row in &buffer.rows {
                writer.write_record(row.iter().map(|v| v.as_deref().unwrap_or("")))?;
            }
            writer.flush()?;
            Ok(())
        })?;

        let chunk = ExportChunk {
            category,
            chunk_index: buffer.next_index,
            file_size: fs::metadata(&path)?.len(),
            file_path: path,
            row_count: buffer.rows.len() as u64,
        };
        registry.register(&chunk)?;
        log::debug!(
            "Flushed {} rows to {}",
            chunk.row_count,
            chunk.file_path.display()
        );

        buffer.exported += chunk.row_count;
        buffer.next_index += 1;
        buffer.rows.clear();
        Ok(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::SetComparator;
    use crate::extract::{ChunkedKeyExtractor, ExtractOptions};
    use tempfile::TempDir;

    fn write_source(dir: &TempDir, name: &str, ids: impl Iterator<Item = usize>) -> PathBuf {
        let path = dir.path().join(name);
        let mut content = String::from("id,payload\n");
        for id in ids {
            content.push_str(&format!("{id},p{id}\n"));
        }
        fs::write(&path, content).unwrap();
        path
    }

    fn options(rows_per_file: usize) -> ExportOptions {
        ExportOptions {
            rows_per_file,
            batch_rows: 1_000,
            ..ExportOptions::default()
        }
    }

    #[test]
    fn test_chunks_split_by_rows_per_file() {
        let dir = TempDir::new().unwrap();
        let a = write_source(&dir, "a.csv", 0..10_000);
        let b = write_source(&dir, "b.csv", 2_500..12_000);
        let combo = Combination::new(["id"]).unwrap();
        let extract = ExtractOptions::default();
        let extractor = ChunkedKeyExtractor::new(&extract);
        let keys_a = extractor.extract_file(&a, None, &combo).unwrap();
        let keys_b = extractor.extract_file(&b, None, &combo).unwrap();
        let result = SetComparator::compare(&keys_a, &keys_b);
        assert_eq!(result.matched_count(), 7_500);

        let out = dir.path().join("out");
        let opts = options(3_000);
        let mut registry = MemoryChunkRegistry::new();
        let reader = SourceReader::open(&a, None).unwrap();
        let outcome = ChunkedRecordExporter::new(&opts, &out)
            .export(
                &reader,
                &combo,
                vec![
                    ExportTarget {
                        category: ExportCategory::Matched,
                        keys: &result.matched,
                    },
                    ExportTarget {
                        category: ExportCategory::OnlyA,
                        keys: &result.only_a,
                    },
                ],
                &mut registry,
                &RowCountCache::new(),
            )
            .unwrap();

        let ExportOutcome::Exported(summary) = outcome else {
            panic!("expected export");
        };
        let matched: Vec<u64> = registry
            .chunks(ExportCategory::Matched)
            .iter()
            .map(|c| c.row_count)
            .collect();
        assert_eq!(matched, vec![3_000, 3_000, 1_500]);
        assert_eq!(summary.rows_for(ExportCategory::Matched), 7_500);
        assert_eq!(summary.rows_for(ExportCategory::OnlyA), 2_500);
        let only_a: u64 = registry
            .chunks(ExportCategory::OnlyA)
            .iter()
            .map(|c| c.row_count)
            .sum();
        assert_eq!(only_a, 2_500);

        let first = &registry.chunks(ExportCategory::Matched)[0];
        assert_eq!(first.chunk_index, 1);
        assert!(first.file_path.ends_with("matched_chunk_0001.csv"));
        assert!(first.file_size > 0);
        let content = fs::read_to_string(&first.file_path).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next(), Some("id,payload"));
        // source order: first matching id in A is 2500
        assert_eq!(lines.next(), Some("2500,p2500"));

        // no temporary files left behind
        let leftovers = fs::read_dir(&out)
            .unwrap()
            .filter(|e| {
                let name = e.as_ref().unwrap().file_name();
                !name.to_string_lossy().ends_with(".csv")
            })
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_skip_above_rows() {
        let dir = TempDir::new().unwrap();
        let a = write_source(&dir, "a.csv", 0..50);
        let reader = SourceReader::open(&a, None).unwrap();
        let keys: HashSet<CompositeKey> = [CompositeKey::from_values([Some("1")])].into();
        let opts = ExportOptions {
            skip_above_rows: Some(10),
            ..options(5)
        };
        let out = dir.path().join("out");
        let mut registry = MemoryChunkRegistry::new();
        let outcome = ChunkedRecordExporter::new(&opts, &out)
            .export(
                &reader,
                &Combination::new(["id"]).unwrap(),
                vec![ExportTarget {
                    category: ExportCategory::OnlyA,
                    keys: &keys,
                }],
                &mut registry,
                &RowCountCache::new(),
            )
            .unwrap();
        assert_eq!(
            outcome,
            ExportOutcome::Skipped {
                source_rows: 50,
                limit: 10
            }
        );
        assert!(registry.all_chunks().is_empty());
        assert!(!out.exists());
    }

    #[test]
    fn test_timeout_keeps_flushed_chunks() {
        let dir = TempDir::new().unwrap();
        let a = write_source(&dir, "a.csv", 0..100);
        let reader = SourceReader::open(&a, None).unwrap();
        let keys: HashSet<CompositeKey> = (0..100)
            .map(|i| CompositeKey::from_values([Some(i.to_string().as_str())]))
            .collect();
        let opts = ExportOptions {
            rows_per_file: 10,
            batch_rows: 25,
            step_timeout: Some(Duration::ZERO),
            ..ExportOptions::default()
        };
        let out = dir.path().join("out");
        let mut registry = MemoryChunkRegistry::new();
        let err = ChunkedRecordExporter::new(&opts, &out)
            .export(
                &reader,
                &Combination::new(["id"]).unwrap(),
                vec![ExportTarget {
                    category: ExportCategory::Matched,
                    keys: &keys,
                }],
                &mut registry,
                &RowCountCache::new(),
            )
            .unwrap_err();
        assert!(matches!(err, KeyscopeError::Timeout { .. }));

        // the first batch flushed two full chunks before the budget check
        let chunks = registry.chunks(ExportCategory::Matched);
        assert_eq!(chunks.len(), 2);
        for chunk in chunks {
            let rows = fs::read_to_string(&chunk.file_path).unwrap().lines().count();
            assert_eq!(rows, 11);
        }
    }

    #[test]
    fn test_manifest_registry_persists() {
        let dir = TempDir::new().unwrap();
        let run = dir.path().join("run");
        let combo = Combination::new(["id", "region"]).unwrap();
        let mut registry = ManifestRegistry::create(&run, "run-1", &combo).unwrap();
        let chunk = ExportChunk {
            category: ExportCategory::OnlyB,
            chunk_index: 1,
            file_path: run.join("only_b_chunk_0001.csv"),
            row_count: 4,
            file_size: 40,
        };
        registry.register(&chunk).unwrap();

        let loaded = ManifestRegistry::load(&run).unwrap();
        assert_eq!(loaded.manifest().run_id, "run-1");
        assert_eq!(loaded.manifest().combination, combo);
        assert_eq!(loaded.chunks(ExportCategory::OnlyB), vec![chunk]);
        assert!(loaded.chunks(ExportCategory::Matched).is_empty());
    }

    #[test]
    fn test_manifest_with_mislabelled_chunk_is_rejected() {
        let dir = TempDir::new().unwrap();
        let run = dir.path().join("run");
        let combo = Combination::new(["id"]).unwrap();
        let mut registry = ManifestRegistry::create(&run, "run-2", &combo).unwrap();
        registry
            .register(&ExportChunk {
                category: ExportCategory::Matched,
                chunk_index: 2,
                file_path: run.join("matched_chunk_0001.csv"),
                row_count: 1,
                file_size: 10,
            })
            .unwrap();

        let err = ManifestRegistry::load(&run).unwrap_err();
        assert!(matches!(err, KeyscopeError::DataProcessing(_)));
    }
}
