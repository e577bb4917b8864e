//! Set comparison of two key sets

use crate::key::{CompositeKey, KeySet};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Keys of A and B classified into matched / only-in-A / only-in-B
#[derive(Debug, Clone, Default)]
pub struct ComparisonResult {
    pub matched: HashSet<CompositeKey>,
    pub only_a: HashSet<CompositeKey>,
    pub only_b: HashSet<CompositeKey>,
    /// Rows scanned in A
    pub total_a: u64,
    /// Rows scanned in B
    pub total_b: u64,
}

impl ComparisonResult {
    pub fn matched_count(&self) -> usize {
        self.matched.len()
    }

    pub fn only_a_count(&self) -> usize {
        self.only_a.len()
    }

    pub fn only_b_count(&self) -> usize {
        self.only_b.len()
    }

    /// |matched| / |A ∪ B| × 100, 0 when both sides are empty
    pub fn match_rate(&self) -> f64 {
        let union = self.matched.len() + self.only_a.len() + self.only_b.len();
        if union == 0 {
            0.0
        } else {
            self.matched.len() as f64 / union as f64 * 100.0
        }
    }

    pub fn summary(&self, processing_time: Duration) -> ComparisonSummary {
        ComparisonSummary {
            matched_count: self.matched_count() as u64,
            only_a_count: self.only_a_count() as u64,
            only_b_count: self.only_b_count() as u64,
            total_a: self.total_a,
            total_b: self.total_b,
            match_rate: self.match_rate(),
            processing_time,
        }
    }
}

/// Serializable outcome of a comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonSummary {
    pub matched_count: u64,
    pub only_a_count: u64,
    pub only_b_count: u64,
    pub total_a: u64,
    pub total_b: u64,
    pub match_rate: f64,
    pub processing_time: Duration,
}

pub struct SetComparator;

impl SetComparator {
    pub fn compare(a: &KeySet, b: &KeySet) -> ComparisonResult {
        let matched = a.keys().intersection(b.keys()).cloned().collect();
        let only_a = a.keys().difference(b.keys()).cloned().collect();
        let only_b = b.keys().difference(a.keys()).cloned().collect();

        ComparisonResult {
            matched,
            only_a,
            only_b,
            total_a: a.total_rows(),
            total_b: b.total_rows(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(values: &[&str]) -> KeySet {
        let mut set = KeySet::new();
        for v in values {
            set.insert(CompositeKey::from_values([Some(*v)]));
        }
        set
    }

    #[test]
    fn test_partition_counts() {
        let a = keys(&["1", "2", "3", "3"]);
        let b = keys(&["3", "4"]);
        let result = SetComparator::compare(&a, &b);

        assert_eq!(result.matched_count(), 1);
        assert_eq!(result.only_a_count(), 2);
        assert_eq!(result.only_b_count(), 1);
        assert_eq!(result.matched_count() + result.only_a_count(), a.len());
        assert_eq!(result.matched_count() + result.only_b_count(), b.len());
        assert_eq!(result.total_a, 4);
        assert_eq!(result.match_rate(), 25.0);
    }

    #[test]
    fn test_match_rate_edges() {
        let empty = SetComparator::compare(&KeySet::new(), &KeySet::new());
        assert_eq!(empty.match_rate(), 0.0);

        let disjoint = SetComparator::compare(&keys(&["a"]), &keys(&["b"]));
        assert_eq!(disjoint.match_rate(), 0.0);

        let same = SetComparator::compare(&keys(&["a", "b"]), &keys(&["b", "a"]));
        assert_eq!(same.match_rate(), 100.0);
    }

    #[test]
    fn test_summary_serializes() {
        let result = SetComparator::compare(&keys(&["a"]), &keys(&["a", "b"]));
        let summary = result.summary(Duration::from_millis(12));
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["matched_count"], 1);
        assert_eq!(json["only_b_count"], 1);
        assert_eq!(json["match_rate"], 50.0);
    }
}
