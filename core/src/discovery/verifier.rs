//! Full-dataset verification of sampled candidates

use super::validator::CandidateScore;
use crate::combination::Combination;
use crate::data::{ScanOptions, SourceReader};
use crate::error::{KeyscopeError, Result};
use crate::key::CompositeKey;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Candidate re-checked against every row of the source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiedCandidate {
    pub combination: Combination,
    /// Score on the discovery sample
    pub sample_score: f64,
    /// Distinct keys / total rows × 100 over the full file
    pub uniqueness_score: f64,
    pub total_rows: u64,
    pub distinct_keys: u64,
    /// Rows whose key occurs exactly once
    pub unique_rows: u64,
    /// Rows whose key occurs more than once
    pub duplicate_rows: u64,
    /// Keys occurring more than once
    pub duplicate_groups: u64,
    pub is_unique_key: bool,
    /// Set when the candidate could not be evaluated (e.g. unknown column)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VerifiedCandidate {
    fn failed(score: &CandidateScore, error: String) -> Self {
        Self {
            combination: score.combination.clone(),
            sample_score: score.sample_score,
            uniqueness_score: 0.0,
            total_rows: 0,
            distinct_keys: 0,
            unique_rows: 0,
            duplicate_rows: 0,
            duplicate_groups: 0,
            is_unique_key: false,
            error: Some(error),
        }
    }

    fn from_counts(score: &CandidateScore, counts: &HashMap<CompositeKey, u64>, total_rows: u64) -> Self {
        let mut unique_rows = 0u64;
        let mut duplicate_rows = 0u64;
        let mut duplicate_groups = 0u64;
        for &count in counts.values() {
            if count == 1 {
                unique_rows += 1;
            } else {
                duplicate_rows += count;
                duplicate_groups += 1;
            }
        }
        let distinct_keys = counts.len() as u64;
        let uniqueness_score = if total_rows == 0 {
            0.0
        } else {
            distinct_keys as f64 / total_rows as f64 * 100.0
        };

        Self {
            combination: score.combination.clone(),
            sample_score: score.sample_score,
            uniqueness_score,
            total_rows,
            distinct_keys,
            unique_rows,
            duplicate_rows,
            duplicate_groups,
            is_unique_key: total_rows > 0 && unique_rows == total_rows,
            error: None,
        }
    }
}

struct Tally<'a> {
    score: &'a CandidateScore,
    indices: Vec<usize>,
    counts: HashMap<CompositeKey, u64>,
}

pub struct FullDatasetVerifier;

impl FullDatasetVerifier {
    /// Stream `reader` once and count every candidate's keys together.
    ///
    /// Candidates naming unknown columns are reported with an error and do not
    /// stop the others. Results keep the input order.
    pub fn verify(
        reader: &SourceReader,
        candidates: &[CandidateScore],
        scan: &ScanOptions,
    ) -> Result<Vec<VerifiedCandidate>> {
        let mut results: Vec<Option<VerifiedCandidate>> = vec![None; candidates.len()];
        let mut tallies: Vec<(usize, Tally)> = Vec::new();

        for (position, score) in candidates.iter().enumerate() {
            match reader.resolve_columns(&score.combination) {
                Ok(indices) => tallies.push((
                    position,
                    Tally {
                        score,
                        indices,
                        counts: HashMap::new(),
                    },
                )),
                Err(e @ KeyscopeError::ColumnNotFound { .. }) => {
                    log::warn!("Skipping verification of {}: {e}", score.combination);
                    results[position] = Some(VerifiedCandidate::failed(score, e.to_string()));
                }
                Err(e) => return Err(e),
            }
        }

        if !tallies.is_empty() {
            log::info!(
                "Verifying {} candidates against {}",
                tallies.len(),
                reader.path().display()
            );
        }

        let total_rows = if tallies.is_empty() {
            0
        } else {
            reader.scan(scan, |batch| {
                for row in batch {
                    for (_, tally) in tallies.iter_mut() {
                        *tally
                            .counts
                            .entry(CompositeKey::from_row(row, &tally.indices))
                            .or_insert(0) += 1;
                    }
                }
                Ok(())
            })?
        };

        for (position, tally) in &tallies {
            results[*position] = Some(VerifiedCandidate::from_counts(
                tally.score,
                &tally.counts,
                total_rows,
            ));
        }

        Ok(results.into_iter().flatten().collect())
    }
}
