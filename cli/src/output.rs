//! Output formatting utilities

use keyscope_core::discovery::DiscoveryReport;
use keyscope_core::indexer::{DuplicateGroup, HashIndex};
use keyscope_core::paging::Page;
use keyscope_core::pipeline::ComparisonReport;
use keyscope_core::ExportOutcome;
use serde::Serialize;

/// Pretty printer for keyscope output
pub struct PrettyPrinter;

impl PrettyPrinter {
    pub fn print_discovery(report: &DiscoveryReport) {
        println!("🔑 Key discovery: {}", report.source.display());
        println!("├─ Rows: {}", report.total_rows);
        println!("├─ Sample: {} rows", report.sample_size);
        println!("├─ Columns profiled: {}", report.columns_profiled);
        println!("├─ Candidates generated: {}", report.candidates_generated);

        if report.candidates.is_empty() {
            println!("└─ No candidates verified");
            return;
        }

        println!("└─ Verified candidates:");
        for (i, candidate) in report.candidates.iter().enumerate() {
            let prefix = if i == report.candidates.len() - 1 {
                "   └─"
            } else {
                "   ├─"
            };
            if let Some(error) = &candidate.error {
                println!("{prefix} ⚠️  {}: {error}", candidate.combination);
                continue;
            }
            let mark = if candidate.is_unique_key { "✅" } else { "❌" };
            println!(
                "{prefix} {mark} {} {:.2}% unique (sample {:.2}%), {} duplicate rows in {} groups",
                candidate.combination,
                candidate.uniqueness_score,
                candidate.sample_score,
                candidate.duplicate_rows,
                candidate.duplicate_groups
            );
        }
    }

    pub fn print_comparison(report: &ComparisonReport) {
        let summary = &report.summary;
        println!("🔍 Comparison on {}", report.combination);
        println!("├─ Run: {}", report.run_id);
        println!("├─ Rows: A {} / B {}", summary.total_a, summary.total_b);
        println!("├─ Matched: {}", summary.matched_count);
        println!("├─ Only in A: {}", summary.only_a_count);
        println!("├─ Only in B: {}", summary.only_b_count);
        println!("├─ Match rate: {:.2}%", summary.match_rate);

        let Some(run_dir) = &report.run_dir else {
            println!("└─ Time: {:.2?}", summary.processing_time);
            return;
        };
        println!("├─ Time: {:.2?}", summary.processing_time);
        println!("└─ Output: {}", run_dir.display());
        for (i, step) in report.exports.iter().enumerate() {
            let prefix = if i == report.exports.len() - 1 {
                "   └─"
            } else {
                "   ├─"
            };
            match (&step.outcome, &step.error) {
                (Some(ExportOutcome::Exported(summary)), error) => {
                    let bytes: u64 = summary.chunks.iter().map(|c| c.file_size).sum();
                    let rows: Vec<String> = summary
                        .rows
                        .iter()
                        .map(|(category, rows)| format!("{category} {rows}"))
                        .collect();
                    println!(
                        "{prefix} {}: {} chunk(s), {} ({})",
                        step.side,
                        summary.chunks.len(),
                        rows.join(", "),
                        format_bytes(bytes)
                    );
                    if let Some(error) = error {
                        println!("{prefix} {}: ⚠️  stopped early: {error}", step.side);
                    }
                }
                (Some(ExportOutcome::Skipped { source_rows, limit }), _) => {
                    println!(
                        "{prefix} {}: skipped ({source_rows} rows above limit {limit})",
                        step.side
                    );
                }
                (None, Some(error)) => println!("{prefix} {}: ⚠️  {error}", step.side),
                (None, None) => println!("{prefix} {}: nothing exported", step.side),
            }
        }
    }

    pub fn print_page(page: &Page, offset: u64) {
        if page.records.is_empty() {
            println!("No records at offset {offset} (total {})", page.total);
            return;
        }
        if let Some(first) = page.records.first() {
            let header: Vec<&str> = first.keys().map(String::as_str).collect();
            println!("{}", header.join("\t"));
        }
        for record in &page.records {
            let values: Vec<&str> = record.values().map(String::as_str).collect();
            println!("{}", values.join("\t"));
        }
        let end = offset + page.records.len() as u64;
        println!(
            "-- rows {}..{} of {}{}",
            offset,
            end,
            page.total,
            if page.has_more { " (more)" } else { "" }
        );
    }

    pub fn print_index(index: &HashIndex, groups: &[DuplicateGroup], show: usize) {
        println!("🧮 Hash index");
        println!("├─ Rows: {}", index.total_rows());
        println!("├─ Distinct digests: {}", index.digests());
        if groups.is_empty() {
            println!("└─ ✅ No duplicate keys");
            return;
        }
        println!("└─ ❌ Duplicate keys: {}", groups.len());
        let shown = groups.len().min(show);
        for (i, group) in groups.iter().take(shown).enumerate() {
            let prefix = if i == shown - 1 { "   └─" } else { "   ├─" };
            let locations: Vec<String> = group
                .locations
                .iter()
                .map(|(chunk, row)| format!("{chunk}:{row}"))
                .collect();
            println!("{prefix} {} × {} at {}", group.key, group.locations.len(), locations.join(", "));
        }
    }
}

/// JSON formatter for machine-readable output
pub struct JsonFormatter;

impl JsonFormatter {
    pub fn format<T: Serialize>(value: &T) -> serde_json::Result<String> {
        serde_json::to_string_pretty(value)
    }

    pub fn format_index(index: &HashIndex, groups: &[DuplicateGroup]) -> serde_json::Result<String> {
        let json = serde_json::json!({
            "total_rows": index.total_rows(),
            "distinct_digests": index.digests(),
            "duplicate_groups": groups,
        });
        serde_json::to_string_pretty(&json)
    }
}

/// Format bytes in human-readable format
fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}
