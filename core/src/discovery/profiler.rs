//! Per-column statistics computed on a discovery sample

use super::sample::Sample;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

const ID_HINTS: [&str; 5] = ["id", "code", "number", "key", "identifier"];
const DATE_HINTS: [&str; 4] = ["date", "time", "timestamp", "datetime"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub name: String,
    /// Distinct non-null values / sample size
    pub cardinality_ratio: f64,
    /// Null or blank values / sample size
    pub null_ratio: f64,
    pub is_id_like: bool,
    pub is_date_like: bool,
    pub distinct_count: usize,
    pub null_count: usize,
}

impl ColumnProfile {
    /// Heuristic used to pick seed columns
    pub fn seed_score(&self) -> f64 {
        let id_bonus = if self.is_id_like { 50.0 } else { 0.0 };
        let date_bonus = if self.is_date_like { 30.0 } else { 0.0 };
        100.0 * self.cardinality_ratio + id_bonus + date_bonus - 50.0 * self.null_ratio
    }
}

pub fn is_id_like(name: &str) -> bool {
    let lower = name.to_lowercase();
    ID_HINTS.iter().any(|hint| lower.contains(hint))
}

pub fn is_date_like(name: &str) -> bool {
    let lower = name.to_lowercase();
    DATE_HINTS.iter().any(|hint| lower.contains(hint))
}

pub struct ColumnProfiler;

impl ColumnProfiler {
    /// Profile every sample column in source order
    pub fn profile(sample: &Sample) -> Vec<ColumnProfile> {
        let sample_size = sample.len();
        sample
            .columns()
            .iter()
            .enumerate()
            .map(|(idx, name)| {
                let mut distinct: HashSet<&str> = HashSet::new();
                let mut nulls = 0usize;
                for row in sample.rows() {
                    match row.get(idx).and_then(|v| v.as_deref()) {
                        Some(value) if !value.trim().is_empty() => {
                            distinct.insert(value);
                        }
                        _ => nulls += 1,
                    }
                }

                let (cardinality_ratio, null_ratio) = if sample_size == 0 {
                    (0.0, 0.0)
                } else {
                    (
                        distinct.len() as f64 / sample_size as f64,
                        nulls as f64 / sample_size as f64,
                    )
                };

                ColumnProfile {
                    name: name.clone(),
                    cardinality_ratio,
                    null_ratio,
                    is_id_like: is_id_like(name),
                    is_date_like: is_date_like(name),
                    distinct_count: distinct.len(),
                    null_count: nulls,
                }
            })
            .collect()
    }
}
