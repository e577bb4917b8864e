//! End-to-end comparison run: extract both sides, compare, export

use crate::cache::RowCountCache;
use crate::combination::Combination;
use crate::compare::{ComparisonSummary, SetComparator};
use crate::config::Config;
use crate::data::SourceReader;
use crate::error::{KeyscopeError, Result};
use crate::export::{
    ChunkRegistry, ChunkedRecordExporter, ExportCategory, ExportChunk, ExportOptions,
    ExportOutcome, ExportSummary, ExportTarget, ManifestRegistry,
};
use crate::extract::{ChunkedKeyExtractor, ExtractOptions};
use crate::job::CancellationToken;
use crate::key::KeySet;
use crate::naming::{new_run_id, run_dir};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    A,
    B,
}

impl Side {
    /// Subdirectory of the run directory holding this side's chunks
    pub fn dir_name(&self) -> &'static str {
        match self {
            Side::A => "a",
            Side::B => "b",
        }
    }

    fn own_category(&self) -> ExportCategory {
        match self {
            Side::A => ExportCategory::OnlyA,
            Side::B => ExportCategory::OnlyB,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Stage reported to progress observers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonStage {
    Extracting(Side),
    Exporting(Side),
}

#[derive(Debug, Clone)]
pub struct ComparisonRequest {
    pub file_a: PathBuf,
    pub file_b: PathBuf,
    pub delimiter_a: Option<char>,
    pub delimiter_b: Option<char>,
    pub combination: Combination,
    /// Row limit applied to each extraction and export pass
    pub limit: Option<u64>,
    /// Write chunk files for every category
    pub export: bool,
    pub run_id: Option<String>,
    pub cancel: Option<CancellationToken>,
}

impl ComparisonRequest {
    pub fn new(file_a: impl Into<PathBuf>, file_b: impl Into<PathBuf>, combination: Combination) -> Self {
        Self {
            file_a: file_a.into(),
            file_b: file_b.into(),
            delimiter_a: None,
            delimiter_b: None,
            combination,
            limit: None,
            export: true,
            run_id: None,
            cancel: None,
        }
    }
}

/// Result of one side's export step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportStepReport {
    pub side: Side,
    pub dir: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ExportOutcome>,
    /// Set when the step was abandoned (timeout). `outcome` then lists the
    /// chunks flushed before the step stopped, which stay valid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub run_id: String,
    pub combination: Combination,
    pub summary: ComparisonSummary,
    pub run_dir: Option<PathBuf>,
    pub exports: Vec<ExportStepReport>,
}

impl ComparisonReport {
    /// Every chunk written by this run
    pub fn chunks(&self) -> Vec<&ExportChunk> {
        self.exports
            .iter()
            .filter_map(|step| match &step.outcome {
                Some(ExportOutcome::Exported(summary)) => Some(summary.chunks.iter()),
                _ => None,
            })
            .flatten()
            .collect()
    }
}

type StageCallback<'a> = &'a (dyn Fn(ComparisonStage, u64) + Sync);

/// Comparison driver
pub struct KeyComparison<'a> {
    config: &'a Config,
    cache: &'a RowCountCache,
    progress: Option<StageCallback<'a>>,
}

impl<'a> KeyComparison<'a> {
    pub fn new(config: &'a Config, cache: &'a RowCountCache) -> Self {
        Self {
            config,
            cache,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: StageCallback<'a>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn run(&self, request: &ComparisonRequest) -> Result<ComparisonReport> {
        let started = Instant::now();
        let run_id = request.run_id.clone().unwrap_or_else(new_run_id);

        let reader_a = SourceReader::open(&request.file_a, request.delimiter_a)?;
        let reader_b = SourceReader::open(&request.file_b, request.delimiter_b)?;
        // both sides must carry the key before either is scanned
        reader_a.resolve_columns(&request.combination)?;
        reader_b.resolve_columns(&request.combination)?;

        let extract = ExtractOptions {
            batch_rows: self.config.extraction.batch_rows,
            limit: request.limit,
            cancel: request.cancel.clone(),
        };
        let keys_a = self.extract(&extract, &reader_a, &request.combination, Side::A)?;
        let keys_b = self.extract(&extract, &reader_b, &request.combination, Side::B)?;

        let result = SetComparator::compare(&keys_a, &keys_b);
        drop(keys_a);
        drop(keys_b);
        log::info!(
            "{}: matched {}, only in A {}, only in B {} ({:.2}% match)",
            request.combination,
            result.matched_count(),
            result.only_a_count(),
            result.only_b_count(),
            result.match_rate()
        );

        let mut exports = Vec::new();
        let mut dir = None;
        if request.export {
            let base = run_dir(&self.config.export.output_dir, &run_id, &request.combination);
            let options = ExportOptions {
                rows_per_file: self.config.export.rows_per_file,
                batch_rows: self.config.extraction.batch_rows,
                limit: request.limit,
                skip_above_rows: self.config.export.skip_above_rows,
                step_timeout: self.config.export.step_timeout(),
                cancel: request.cancel.clone(),
            };
            for (side, reader) in [(Side::A, &reader_a), (Side::B, &reader_b)] {
                let own = match side {
                    Side::A => &result.only_a,
                    Side::B => &result.only_b,
                };
                let targets = vec![
                    ExportTarget {
                        category: ExportCategory::Matched,
                        keys: &result.matched,
                    },
                    ExportTarget {
                        category: side.own_category(),
                        keys: own,
                    },
                ];
                exports.push(self.export_side(
                    &options,
                    &base,
                    &run_id,
                    side,
                    reader,
                    &request.combination,
                    targets,
                )?);
            }
            dir = Some(base);
        }

        Ok(ComparisonReport {
            run_id,
            combination: request.combination.clone(),
            summary: result.summary(started.elapsed()),
            run_dir: dir,
            exports,
        })
    }

    fn extract(
        &self,
        options: &ExtractOptions,
        reader: &SourceReader,
        combination: &Combination,
        side: Side,
    ) -> Result<KeySet> {
        let report = |rows: u64| {
            if let Some(progress) = self.progress {
                progress(ComparisonStage::Extracting(side), rows);
            }
        };
        let keys = ChunkedKeyExtractor::new(options)
            .with_progress(&report)
            .extract(reader, combination)?;
        if options.limit.is_none() {
            self.cache.record(reader, keys.total_rows())?;
        }
        Ok(keys)
    }

    #[allow(clippy::too_many_arguments)]
    fn export_side(
        &self,
        options: &ExportOptions,
        base: &Path,
        run_id: &str,
        side: Side,
        reader: &SourceReader,
        combination: &Combination,
        targets: Vec<ExportTarget<'_>>,
    ) -> Result<ExportStepReport> {
        let dir = base.join(side.dir_name());
        let mut registry = ManifestRegistry::create(&dir, run_id, combination)?;
        if let Some(progress) = self.progress {
            progress(ComparisonStage::Exporting(side), 0);
        }

        let outcome = ChunkedRecordExporter::new(options, &dir).export(
            reader,
            combination,
            targets,
            &mut registry,
            self.cache,
        );

        if let Some(progress) = self.progress {
            let written: u64 = registry.all_chunks().iter().map(|c| c.row_count).sum();
            progress(ComparisonStage::Exporting(side), written);
        }

        match outcome {
            Ok(outcome) => Ok(ExportStepReport {
                side,
                dir,
                outcome: Some(outcome),
                error: None,
            }),
            Err(e @ KeyscopeError::Timeout { .. }) => {
                log::warn!("Export of side {side} abandoned: {e}");
                let partial = ExportSummary::from_chunks(registry.all_chunks());
                Ok(ExportStepReport {
                    side,
                    dir,
                    outcome: Some(ExportOutcome::Exported(partial)),
                    error: Some(e.to_string()),
                })
            }
            Err(e) => Err(e),
        }
    }
}
