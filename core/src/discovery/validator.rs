//! Sample-based uniqueness scoring

use super::sample::Sample;
use crate::combination::Combination;
use crate::key::CompositeKey;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Uniqueness of a combination measured on the discovery sample.
///
/// Directional only: a sample score of 100 does not make a unique key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub combination: Combination,
    /// Distinct composite keys / sample rows × 100
    pub sample_score: f64,
}

pub struct SampleValidator;

impl SampleValidator {
    /// Uniqueness of one combination on the sample, `None` if a column is unknown
    pub fn score_one(sample: &Sample, combination: &Combination) -> Option<f64> {
        let indices = sample.indices_for(combination)?;
        if sample.is_empty() {
            return Some(0.0);
        }
        let distinct: HashSet<CompositeKey> = sample
            .rows()
            .iter()
            .map(|row| CompositeKey::from_row(row, &indices))
            .collect();
        Some(distinct.len() as f64 / sample.len() as f64 * 100.0)
    }

    /// Score every candidate, best first.
    ///
    /// Ties go to smaller combinations, then canonical column order, so the
    /// ranking is reproducible.
    pub fn score(sample: &Sample, candidates: &[Combination]) -> Vec<CandidateScore> {
        let mut scored: Vec<CandidateScore> = candidates
            .iter()
            .filter_map(|combination| {
                Self::score_one(sample, combination).map(|sample_score| CandidateScore {
                    combination: combination.clone(),
                    sample_score,
                })
            })
            .collect();
        Self::rank(&mut scored);
        scored
    }

    /// Best first; ties go to smaller combinations, then canonical order
    pub fn rank(scores: &mut [CandidateScore]) {
        scores.sort_by(|a, b| {
            b.sample_score
                .total_cmp(&a.sample_score)
                .then_with(|| a.combination.cmp(&b.combination))
        });
    }
}
