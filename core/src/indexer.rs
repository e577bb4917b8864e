//! Parallel hash indexing of row chunks already held in memory

use crate::combination::Combination;
use crate::data::{ScanOptions, SourceReader};
use crate::error::{KeyscopeError, Result};
use crate::key::{CompositeKey, Row};
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::mpsc;

/// Owned batch of rows handed to one worker
#[derive(Debug, Clone)]
pub struct RowChunk {
    pub chunk_index: usize,
    pub rows: Vec<Row>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub chunk_index: usize,
    pub row_index: usize,
    pub key: CompositeKey,
}

/// Rows sharing one composite key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    /// Display rendering of the key
    pub key: String,
    /// (chunk_index, row_index) of every occurrence, in source order
    pub locations: Vec<(usize, usize)>,
}

type PartialIndex = HashMap<u64, Vec<IndexEntry>>;

/// Merged index: 64-bit key digest → occurrences ordered by location
#[derive(Debug, Default)]
pub struct HashIndex {
    entries: PartialIndex,
    total_rows: u64,
}

impl HashIndex {
    pub fn total_rows(&self) -> u64 {
        self.total_rows
    }

    pub fn digests(&self) -> usize {
        self.entries.len()
    }

    /// Occurrences of `key` in source order
    pub fn lookup(&self, key: &CompositeKey) -> Vec<(usize, usize)> {
        self.entries
            .get(&key.digest())
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| &e.key == key)
                    .map(|e| (e.chunk_index, e.row_index))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Keys occurring more than once.
    ///
    /// Entries sharing a digest are split by their original key first, so a
    /// digest collision between different keys is never reported.
    pub fn duplicate_groups(&self) -> Vec<DuplicateGroup> {
        let mut groups = Vec::new();
        for entries in self.entries.values().filter(|e| e.len() > 1) {
            let mut by_key: Vec<(&CompositeKey, Vec<(usize, usize)>)> = Vec::new();
            for entry in entries {
                match by_key.iter_mut().find(|(k, _)| *k == &entry.key) {
                    Some((_, locations)) => locations.push((entry.chunk_index, entry.row_index)),
                    None => by_key.push((&entry.key, vec![(entry.chunk_index, entry.row_index)])),
                }
            }
            groups.extend(
                by_key
                    .into_iter()
                    .filter(|(_, locations)| locations.len() > 1)
                    .map(|(key, locations)| DuplicateGroup {
                        key: key.display(),
                        locations,
                    }),
            );
        }
        groups.sort_by(|a, b| a.locations[0].cmp(&b.locations[0]));
        groups
    }

    fn merge(&mut self, partial: PartialIndex) {
        for (digest, mut entries) in partial {
            self.total_rows += entries.len() as u64;
            self.entries.entry(digest).or_default().append(&mut entries);
        }
    }

    fn finish(&mut self) {
        for entries in self.entries.values_mut() {
            entries.sort_by_key(|e| (e.chunk_index, e.row_index));
        }
    }
}

/// Builds a [`HashIndex`] on a fixed-size worker pool.
///
/// Workers own their chunk and their partial map; only the coordinator
/// merges.
pub struct ParallelHashIndexer {
    pool: ThreadPool,
}

impl ParallelHashIndexer {
    /// Pool sized to the available cores minus one, at least one worker
    pub fn new() -> Result<Self> {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::with_threads(cores.saturating_sub(1).max(1))
    }

    pub fn with_threads(threads: usize) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|i| format!("keyscope-index-{i}"))
            .build()
            .map_err(|e| KeyscopeError::data_processing(format!("failed to build worker pool: {e}")))?;
        Ok(Self { pool })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Index `chunks` on the key columns at `indices`
    pub fn build(&self, chunks: Vec<RowChunk>, indices: &[usize]) -> HashIndex {
        let (tx, rx) = mpsc::channel::<PartialIndex>();
        let chunk_count = chunks.len();

        self.pool.scope(|scope| {
            for chunk in chunks {
                let tx = tx.clone();
                scope.spawn(move |_| {
                    // the receiver outlives the scope
                    let _ = tx.send(index_chunk(chunk, indices));
                });
            }
        });
        drop(tx);

        let mut index = HashIndex::default();
        for partial in rx {
            index.merge(partial);
        }
        index.finish();

        log::debug!(
            "Indexed {} rows from {chunk_count} chunks on {} workers",
            index.total_rows,
            self.threads()
        );
        index
    }
}

fn index_chunk(chunk: RowChunk, indices: &[usize]) -> PartialIndex {
    let mut partial: PartialIndex = HashMap::new();
    for (row_index, row) in chunk.rows.iter().enumerate() {
        let key = CompositeKey::from_row(row, indices);
        partial.entry(key.digest()).or_default().push(IndexEntry {
            chunk_index: chunk.chunk_index,
            row_index,
            key,
        });
    }
    partial
}

/// Read a source into owned chunks of `chunk_rows` rows for indexing
pub fn load_chunks(
    reader: &SourceReader,
    combination: &Combination,
    chunk_rows: usize,
    limit: Option<u64>,
) -> Result<(Vec<usize>, Vec<RowChunk>)> {
    let indices = reader.resolve_columns(combination)?;
    let mut chunks = Vec::new();
    let scan = ScanOptions {
        batch_rows: chunk_rows,
        limit,
        cancel: None,
    };
    reader.scan(&scan, |batch| {
        chunks.push(RowChunk {
            chunk_index: chunks.len(),
            rows: batch.to_vec(),
        });
        Ok(())
    })?;
    Ok((indices, chunks))
}
