//! Offset/limit reads over exported chunk files

use crate::error::{KeyscopeError, Result};
use crate::export::ExportChunk;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One window of records, columns in file order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub records: Vec<IndexMap<String, String>>,
    pub total: u64,
    pub has_more: bool,
}

/// Read rows `[offset, offset + limit)` of one chunk file.
///
/// Records come back in written order; `total` counts every data row of the
/// file.
pub fn read_page(path: &Path, offset: u64, limit: usize) -> Result<Page> {
    if !path.is_file() {
        return Err(KeyscopeError::FileNotFound(path.to_path_buf()));
    }
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();

    let end = offset.saturating_add(limit as u64);
    let mut records = Vec::with_capacity(limit.min(10_000));
    let mut total = 0u64;
    for result in reader.records() {
        let record = result?;
        if total >= offset && total < end {
            records.push(
                headers
                    .iter()
                    .zip(record.iter())
                    .map(|(h, v)| (h.to_string(), v.to_string()))
                    .collect(),
            );
        }
        total += 1;
    }

    Ok(Page {
        records,
        has_more: end < total,
        total,
    })
}

/// Read a window spanning a category's chunk sequence with a global offset.
///
/// Chunks must be in index order; row counts from the registry are used to
/// skip whole chunks without opening them.
pub fn read_category_page(chunks: &[ExportChunk], offset: u64, limit: usize) -> Result<Page> {
    let total: u64 = chunks.iter().map(|c| c.row_count).sum();
    let end = offset.saturating_add(limit as u64).min(total);
    let mut records = Vec::new();
    let mut chunk_start = 0u64;

    for chunk in chunks {
        let chunk_end = chunk_start + chunk.row_count;
        if chunk_end > offset && chunk_start < end {
            let local_offset = offset.saturating_sub(chunk_start);
            let wanted = (end.min(chunk_end) - chunk_start - local_offset) as usize;
            let page = read_page(&chunk.file_path, local_offset, wanted)?;
            records.extend(page.records);
        }
        if chunk_end >= end {
            break;
        }
        chunk_start = chunk_end;
    }

    Ok(Page {
        records,
        total,
        has_more: end < total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::ExportCategory;
    use std::fs;
    use tempfile::TempDir;

    fn chunk_file(dir: &TempDir, index: u32, ids: std::ops::Range<u32>) -> ExportChunk {
        let path = dir.path().join(format!("matched_chunk_{index:04}.csv"));
        let mut content = String::from("id,name\n");
        for id in ids.clone() {
            content.push_str(&format!("{id},\"n, {id}\"\n"));
        }
        fs::write(&path, &content).unwrap();
        ExportChunk {
            category: ExportCategory::Matched,
            chunk_index: index,
            file_size: content.len() as u64,
            file_path: path,
            row_count: ids.len() as u64,
        }
    }

    #[test]
    fn test_page_window() {
        let dir = TempDir::new().unwrap();
        let chunk = chunk_file(&dir, 1, 0..7);
        let page = read_page(&chunk.file_path, 2, 3).unwrap();
        assert_eq!(page.total, 7);
        assert!(page.has_more);
        assert_eq!(page.records.len(), 3);
        assert_eq!(page.records[0]["id"], "2");
        assert_eq!(page.records[0]["name"], "n, 2");
        assert_eq!(page.records[0].keys().collect::<Vec<_>>(), vec!["id", "name"]);

        let tail = read_page(&chunk.file_path, 5, 10).unwrap();
        assert_eq!(tail.records.len(), 2);
        assert!(!tail.has_more);

        let beyond = read_page(&chunk.file_path, 50, 10).unwrap();
        assert!(beyond.records.is_empty());
        assert!(!beyond.has_more);
    }

    #[test]
    fn test_windows_tile_every_row_once() {
        let dir = TempDir::new().unwrap();
        let chunks = vec![
            chunk_file(&dir, 1, 0..4),
            chunk_file(&dir, 2, 4..8),
            chunk_file(&dir, 3, 8..10),
        ];

        for limit in 1..=11usize {
            let mut seen = Vec::new();
            let mut offset = 0u64;
            loop {
                let page = read_category_page(&chunks, offset, limit).unwrap();
                assert_eq!(page.total, 10);
                seen.extend(page.records.iter().map(|r| r["id"].parse::<u32>().unwrap()));
                offset += limit as u64;
                if !page.has_more {
                    break;
                }
            }
            assert_eq!(seen, (0..10).collect::<Vec<_>>(), "limit {limit}");
        }
    }

    #[test]
    fn test_repeated_reads_are_identical() {
        let dir = TempDir::new().unwrap();
        let chunk = chunk_file(&dir, 1, 0..5);
        let first = read_page(&chunk.file_path, 1, 2).unwrap();
        let second = read_page(&chunk.file_path, 1, 2).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_chunk_file() {
        let err = read_page(Path::new("/no/such/chunk.csv"), 0, 1).unwrap_err();
        assert!(matches!(err, KeyscopeError::FileNotFound(_)));
    }
}
