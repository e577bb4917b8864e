//! End-to-end comparison and export tests

use keyscope_core::export::{ChunkRegistry, ExportTarget};
use keyscope_core::{
    read_category_page, ChunkedKeyExtractor, ChunkedRecordExporter, Combination, ComparisonRequest,
    Config, ExportCategory, ExportOptions, ExportOutcome, ExtractOptions, KeyComparison,
    KeyscopeError, ManifestRegistry, MemoryChunkRegistry, RowCountCache, SetComparator,
    SourceReader,
};

mod common;
use common::{id_region_rows, TestWorkspace};

fn config_for(workspace: &TestWorkspace) -> Config {
    let mut config = Config::default();
    config.export.output_dir = workspace.output_dir();
    config
}

fn id_region_pair(workspace: &TestWorkspace) -> (std::path::PathBuf, std::path::PathBuf) {
    let a = workspace.write("a.csv", "id,region\n1,n\n2,s\n3,e\n4,w\n5,n\n");
    let b = workspace.write("b.csv", "id,region\n1,n\n2,s\n3,e\n4,x\n5,y\n");
    (a, b)
}

#[test]
fn test_id_alone_matches_every_row() {
    let workspace = TestWorkspace::new();
    let (a, b) = id_region_pair(&workspace);
    let config = config_for(&workspace);
    let cache = RowCountCache::new();

    let request = ComparisonRequest {
        export: false,
        ..ComparisonRequest::new(&a, &b, Combination::new(["id"]).unwrap())
    };
    let report = KeyComparison::new(&config, &cache).run(&request).unwrap();
    assert_eq!(report.summary.matched_count, 5);
    assert_eq!(report.summary.only_a_count, 0);
    assert_eq!(report.summary.only_b_count, 0);
    assert_eq!(report.summary.match_rate, 100.0);
}

#[test]
fn test_id_and_region_split_differences() {
    let workspace = TestWorkspace::new();
    let (a, b) = id_region_pair(&workspace);
    let config = config_for(&workspace);
    let cache = RowCountCache::new();

    let request = ComparisonRequest::new(&a, &b, Combination::new(["id", "region"]).unwrap());
    let report = KeyComparison::new(&config, &cache).run(&request).unwrap();
    assert_eq!(report.summary.matched_count, 3);
    assert_eq!(report.summary.only_a_count, 2);
    assert_eq!(report.summary.only_b_count, 2);

    let run_dir = report.run_dir.unwrap();
    let side_b = ManifestRegistry::load(&run_dir.join("b")).unwrap();
    let page = read_category_page(&side_b.chunks(ExportCategory::OnlyB), 0, 10).unwrap();
    let regions: Vec<&str> = page.records.iter().map(|r| r["region"].as_str()).collect();
    assert_eq!(regions, vec!["x", "y"]);
}

#[test]
fn test_only_a_export_chunk_sizes() {
    let workspace = TestWorkspace::new();
    let header = ["id", "region", "amount"];
    let a = workspace.write_csv("a.csv", ',', &header, &id_region_rows(0..10_000));
    let b = workspace.write_csv("b.csv", ',', &header, &id_region_rows(7_500..12_000));
    let combo = Combination::new(["id"]).unwrap();

    let extract = ExtractOptions::default();
    let extractor = ChunkedKeyExtractor::new(&extract);
    let keys_a = extractor.extract_file(&a, None, &combo).unwrap();
    let keys_b = extractor.extract_file(&b, None, &combo).unwrap();
    let result = SetComparator::compare(&keys_a, &keys_b);
    assert_eq!(result.only_a_count(), 7_500);

    let options = ExportOptions {
        rows_per_file: 3_000,
        ..ExportOptions::default()
    };
    let out = workspace.output_dir();
    let mut registry = MemoryChunkRegistry::new();
    let reader = SourceReader::open(&a, None).unwrap();
    let outcome = ChunkedRecordExporter::new(&options, &out)
        .export(
            &reader,
            &combo,
            vec![ExportTarget {
                category: ExportCategory::OnlyA,
                keys: &result.only_a,
            }],
            &mut registry,
            &RowCountCache::new(),
        )
        .unwrap();

    let chunks = registry.chunks(ExportCategory::OnlyA);
    let counts: Vec<u64> = chunks.iter().map(|c| c.row_count).collect();
    assert_eq!(counts, vec![3_000, 3_000, 1_500]);
    let names: Vec<String> = chunks
        .iter()
        .map(|c| c.file_path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(
        names,
        vec![
            "only_a_chunk_0001.csv",
            "only_a_chunk_0002.csv",
            "only_a_chunk_0003.csv"
        ]
    );
    match outcome {
        ExportOutcome::Exported(summary) => {
            assert_eq!(summary.rows_for(ExportCategory::OnlyA), 7_500)
        }
        other => panic!("unexpected outcome {other:?}"),
    }

    // windows of 1,234 rows tile the category exactly once
    let mut ids = Vec::new();
    let mut offset = 0u64;
    loop {
        let page = read_category_page(&chunks, offset, 1_234).unwrap();
        ids.extend(page.records.iter().map(|r| r["id"].parse::<usize>().unwrap()));
        offset += 1_234;
        if !page.has_more {
            break;
        }
    }
    assert_eq!(ids, (0..7_500).collect::<Vec<_>>());
}

#[test]
fn test_chunk_totals_match_summary() {
    let workspace = TestWorkspace::new();
    let header = ["id", "region", "amount"];
    let a = workspace.write_csv("a.csv", ',', &header, &id_region_rows(0..900));
    let b = workspace.write_csv("b.csv", '|', &header, &id_region_rows(300..1_000));
    let mut config = config_for(&workspace);
    config.export.rows_per_file = 128;
    config.extraction.batch_rows = 100;
    let cache = RowCountCache::new();

    let request = ComparisonRequest::new(&a, &b, Combination::new(["id"]).unwrap());
    let report = KeyComparison::new(&config, &cache).run(&request).unwrap();
    let run_dir = report.run_dir.clone().unwrap();

    for (side, own, expected_own) in [
        ("a", ExportCategory::OnlyA, report.summary.only_a_count),
        ("b", ExportCategory::OnlyB, report.summary.only_b_count),
    ] {
        let registry = ManifestRegistry::load(&run_dir.join(side)).unwrap();
        let sum = |category| -> u64 { registry.chunks(category).iter().map(|c| c.row_count).sum() };
        assert_eq!(sum(ExportCategory::Matched), report.summary.matched_count);
        assert_eq!(sum(own), expected_own);
        for chunk in registry.all_chunks() {
            assert!(chunk.row_count <= 128);
        }
    }
}

#[test]
fn test_nonexistent_column_fails_before_reading() {
    let workspace = TestWorkspace::new();
    let (a, _) = id_region_pair(&workspace);
    let calls = std::sync::atomic::AtomicU64::new(0);
    let progress = |_: u64| {
        calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    };
    let options = ExtractOptions::default();
    let err = ChunkedKeyExtractor::new(&options)
        .with_progress(&progress)
        .extract_file(&a, None, &Combination::new(["nonexistent_col"]).unwrap())
        .unwrap_err();

    match err {
        KeyscopeError::ColumnNotFound { missing, available } => {
            assert_eq!(missing, vec!["nonexistent_col".to_string()]);
            assert_eq!(available, vec!["id".to_string(), "region".to_string()]);
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[test]
fn test_malformed_rows_are_skipped() {
    let workspace = TestWorkspace::new();
    let path = workspace.write("ragged.csv", "id,region\n1,n\n2,s,extra,fields\n3,e\n4\n5,w\n");
    let options = ExtractOptions::default();
    let keys = ChunkedKeyExtractor::new(&options)
        .extract_file(&path, Some(','), &Combination::new(["id"]).unwrap())
        .unwrap();
    // rows that do not fit the header's shape never reach the key set
    assert_eq!(keys.total_rows(), 3);
    assert_eq!(keys.len(), 3);
    for kept in ["1", "3", "5"] {
        assert!(keys.contains(&keyscope_core::CompositeKey::from_values([Some(kept)])));
    }
    for dropped in ["2", "4"] {
        assert!(!keys.contains(&keyscope_core::CompositeKey::from_values([Some(dropped)])));
    }
}

#[test]
fn test_missing_file_is_fatal() {
    let workspace = TestWorkspace::new();
    let (a, _) = id_region_pair(&workspace);
    let config = config_for(&workspace);
    let cache = RowCountCache::new();
    let request = ComparisonRequest::new(
        &a,
        workspace.path().join("absent.csv"),
        Combination::new(["id"]).unwrap(),
    );
    let err = KeyComparison::new(&config, &cache).run(&request).unwrap_err();
    assert!(matches!(err, KeyscopeError::FileNotFound(_)));
    assert!(err.is_fatal());
}
