//! Unique-key discovery: sample, profile, generate, validate, verify

pub mod candidates;
pub mod profiler;
pub mod sample;
pub mod validator;
pub mod verifier;

pub use candidates::{CandidateGenerator, GeneratedCandidates, GenerationRequest};
pub use profiler::{ColumnProfile, ColumnProfiler};
pub use sample::Sample;
pub use validator::{CandidateScore, SampleValidator};
pub use verifier::{FullDatasetVerifier, VerifiedCandidate};

use crate::cache::RowCountCache;
use crate::combination::Combination;
use crate::config::{Config, DiscoveryConfig};
use crate::data::{ScanOptions, SourceReader};
use crate::error::{KeyscopeError, Result};
use crate::job::CancellationToken;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Instant;

/// Parameters of one discovery call
#[derive(Debug, Clone, Default)]
pub struct DiscoveryRequest {
    pub path: PathBuf,
    pub delimiter: Option<char>,
    /// Overrides `DiscoveryConfig::min_size` / `max_size`
    pub min_size: Option<usize>,
    pub max_size: Option<usize>,
    pub excluded_columns: Vec<String>,
    pub excluded_combinations: Vec<Combination>,
    pub base: Option<Combination>,
    /// Overrides `DiscoveryConfig::verify_top`
    pub verify_top: Option<usize>,
    pub cancel: Option<CancellationToken>,
}

impl DiscoveryRequest {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }
}

/// Ranked, verified key candidates for one file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryReport {
    pub source: PathBuf,
    pub delimiter: char,
    pub total_rows: u64,
    pub sample_size: usize,
    pub columns_profiled: usize,
    pub candidates_generated: usize,
    /// Verified candidates, unique keys first, then by full uniqueness
    pub candidates: Vec<VerifiedCandidate>,
    /// Sample-only scores of every generated candidate, best first
    pub sample_ranking: Vec<CandidateScore>,
    pub elapsed_ms: u64,
}

impl DiscoveryReport {
    /// Smallest verified unique key, if any
    pub fn best_key(&self) -> Option<&VerifiedCandidate> {
        self.candidates
            .iter()
            .filter(|c| c.is_unique_key)
            .min_by(|a, b| a.combination.cmp(&b.combination))
    }
}

/// Discovery driver owning its configuration and row-count cache
pub struct KeyDiscovery<'a> {
    config: DiscoveryConfig,
    batch_rows: usize,
    cache: &'a RowCountCache,
}

impl<'a> KeyDiscovery<'a> {
    pub fn new(config: &Config, cache: &'a RowCountCache) -> Self {
        Self {
            config: config.discovery.clone(),
            batch_rows: config.extraction.batch_rows,
            cache,
        }
    }

    pub fn discover(&self, request: &DiscoveryRequest) -> Result<DiscoveryReport> {
        let started = Instant::now();
        let min_size = request.min_size.unwrap_or(self.config.min_size);
        let max_size = request.max_size.unwrap_or(self.config.max_size);
        if min_size == 0 || min_size > max_size {
            return Err(KeyscopeError::invalid_input(format!(
                "invalid combination size range {min_size}..={max_size}"
            )));
        }

        let reader = SourceReader::open(&request.path, request.delimiter)?;
        let scan = ScanOptions {
            batch_rows: self.batch_rows,
            limit: None,
            cancel: request.cancel.clone(),
        };

        if let Some(base) = &request.base {
            // surfaces ColumnNotFound before any sampling work
            reader.resolve_columns(base)?;
        }

        let sample = Sample::draw(&reader, &self.config, self.cache, &scan)?;
        let profiles = ColumnProfiler::profile(&sample);

        let generation = GenerationRequest {
            min_size,
            max_size,
            excluded_columns: request.excluded_columns.clone(),
            excluded_combinations: request.excluded_combinations.clone(),
            base: request.base.as_ref().map(|b| canonical_names(&reader, b)).transpose()?,
        };
        let generated = CandidateGenerator::new(&self.config).generate(&profiles, &sample, &generation);
        log::info!(
            "Generated {} candidates for {}",
            generated.combinations.len(),
            request.path.display()
        );

        let ranking = rank_generated(&sample, &generated);
        let verify_top = request.verify_top.unwrap_or(self.config.verify_top);
        let top = top_distinct(&ranking, verify_top);
        let mut candidates = FullDatasetVerifier::verify(&reader, &top, &scan)?;
        candidates.sort_by(|a, b| {
            b.is_unique_key
                .cmp(&a.is_unique_key)
                .then_with(|| b.uniqueness_score.total_cmp(&a.uniqueness_score))
                .then_with(|| a.combination.cmp(&b.combination))
        });

        let total_rows = candidates
            .iter()
            .find(|c| c.error.is_none())
            .map(|c| c.total_rows)
            .unwrap_or_else(|| sample.source_rows());
        if total_rows != sample.source_rows() {
            self.cache.record(&reader, total_rows)?;
        }

        Ok(DiscoveryReport {
            source: request.path.clone(),
            delimiter: reader.delimiter(),
            total_rows,
            sample_size: sample.len(),
            columns_profiled: profiles.len(),
            candidates_generated: generated.combinations.len(),
            candidates,
            sample_ranking: ranking,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }
}

/// Rewrite a user-supplied combination with the file's own column spelling
fn canonical_names(reader: &SourceReader, combination: &Combination) -> Result<Combination> {
    let indices = reader.resolve_columns(combination)?;
    Combination::new(indices.iter().map(|&i| reader.columns()[i].as_str()))
}

/// Sample ranking of every generated combination, reusing scores already
/// computed by the incremental build
fn rank_generated(sample: &Sample, generated: &GeneratedCandidates) -> Vec<CandidateScore> {
    let known: HashMap<&Combination, f64> = generated
        .validated
        .iter()
        .map(|score| (&score.combination, score.sample_score))
        .collect();
    let unscored: Vec<Combination> = generated
        .combinations
        .iter()
        .filter(|c| !known.contains_key(c))
        .cloned()
        .collect();
    log::debug!(
        "Ranking {} candidates ({} scored during generation)",
        generated.combinations.len(),
        generated.combinations.len() - unscored.len()
    );

    let mut ranking = SampleValidator::score(sample, &unscored);
    ranking.extend(generated.combinations.iter().filter_map(|combination| {
        known.get(combination).map(|&sample_score| CandidateScore {
            combination: combination.clone(),
            sample_score,
        })
    }));
    SampleValidator::rank(&mut ranking);
    ranking
}

fn top_distinct(ranking: &[CandidateScore], limit: usize) -> Vec<CandidateScore> {
    let mut seen = HashSet::new();
    ranking
        .iter()
        .filter(|s| seen.insert(s.combination.clone()))
        .take(limit)
        .cloned()
        .collect()
}
