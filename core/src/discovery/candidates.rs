//! Heuristic, non-exhaustive search for promising column combinations
//!
//! Columns are scored from their profiles and only the best become seeds.
//! Single columns and pairs come from a handful of pairing strategies; larger
//! combinations are grown one seed at a time from the best validated pairs
//! (or from a caller-supplied base combination), keeping only growths whose
//! sample uniqueness clears a size-dependent threshold. Nothing here
//! enumerates C(n, k).

use super::profiler::ColumnProfile;
use super::sample::Sample;
use super::validator::{CandidateScore, SampleValidator};
use crate::combination::Combination;
use crate::config::DiscoveryConfig;
use std::collections::HashSet;

/// What the caller wants generated
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub min_size: usize,
    pub max_size: usize,
    pub excluded_columns: Vec<String>,
    pub excluded_combinations: Vec<Combination>,
    /// Known useful key to extend instead of the generic top pairs
    pub base: Option<Combination>,
}

impl GenerationRequest {
    pub fn sizes(min_size: usize, max_size: usize) -> Self {
        Self {
            min_size,
            max_size,
            ..Self::default()
        }
    }

    fn wants(&self, size: usize) -> bool {
        size >= self.min_size.max(1) && size <= self.max_size
    }
}

fn normalize(column: &str) -> String {
    column.trim().to_lowercase()
}

/// Exclusion rules applied to every generated list.
///
/// Column names are compared trimmed and case-insensitively, for single
/// columns and excluded combinations alike.
struct Exclusions {
    columns: HashSet<String>,
    combinations: Vec<HashSet<String>>,
}

impl Exclusions {
    fn new(request: &GenerationRequest) -> Self {
        Self {
            columns: request.excluded_columns.iter().map(|c| normalize(c)).collect(),
            combinations: request
                .excluded_combinations
                .iter()
                .map(|combination| combination.columns().iter().map(|c| normalize(c)).collect())
                .collect(),
        }
    }

    fn excludes_column(&self, column: &str) -> bool {
        self.columns.contains(&normalize(column))
    }

    /// Excluded when it uses an excluded column, equals an excluded
    /// combination, or contains every column of one
    fn excludes(&self, combination: &Combination) -> bool {
        let names: HashSet<String> = combination.columns().iter().map(|c| normalize(c)).collect();
        names.iter().any(|c| self.columns.contains(c))
            || self
                .combinations
                .iter()
                .any(|excluded| excluded.is_subset(&names))
    }
}

/// Ordered candidate list plus the sample scores computed along the way
#[derive(Debug, Clone, Default)]
pub struct GeneratedCandidates {
    pub combinations: Vec<Combination>,
    /// Scores of every combination validated during the incremental build
    pub validated: Vec<CandidateScore>,
}

pub struct CandidateGenerator<'a> {
    config: &'a DiscoveryConfig,
}

impl<'a> CandidateGenerator<'a> {
    pub fn new(config: &'a DiscoveryConfig) -> Self {
        Self { config }
    }

    /// Seed columns, best first (ties keep source order)
    pub fn select_seeds<'p>(
        &self,
        profiles: &'p [ColumnProfile],
        request: &GenerationRequest,
    ) -> Vec<&'p ColumnProfile> {
        let exclusions = Exclusions::new(request);
        let mut seeds: Vec<&ColumnProfile> = profiles
            .iter()
            .filter(|p| !exclusions.excludes_column(&p.name))
            .collect();
        seeds.sort_by(|a, b| b.seed_score().total_cmp(&a.seed_score()));
        seeds.truncate(self.config.seed_columns);
        seeds
    }

    pub fn generate(
        &self,
        profiles: &[ColumnProfile],
        sample: &Sample,
        request: &GenerationRequest,
    ) -> GeneratedCandidates {
        let exclusions = Exclusions::new(request);
        let seeds = self.select_seeds(profiles, request);
        let mut seen: HashSet<Combination> = HashSet::new();
        let mut output = GeneratedCandidates::default();

        log::debug!(
            "Generating sizes {}..={} from {} seeds ({} columns)",
            request.min_size,
            request.max_size,
            seeds.len(),
            profiles.len()
        );

        if request.max_size == 0 || (seeds.is_empty() && request.base.is_none()) {
            return output;
        }

        if request.wants(1) {
            for combination in self.single_columns(&seeds) {
                if !exclusions.excludes(&combination) && seen.insert(combination.clone()) {
                    output.combinations.push(combination);
                }
            }
        }

        let pairs: Vec<Combination> = self
            .pairs(&seeds)
            .into_iter()
            .filter(|c| !exclusions.excludes(c))
            .collect();
        if request.wants(2) {
            for combination in &pairs {
                if seen.insert(combination.clone()) {
                    output.combinations.push(combination.clone());
                }
            }
        }

        let mut parents: Vec<Combination> = match &request.base {
            Some(base) => {
                if exclusions.excludes(base) {
                    log::warn!("Base combination {base} is excluded; every extension would be too");
                }
                if request.wants(base.len()) && !exclusions.excludes(base) && seen.insert(base.clone()) {
                    output.combinations.push(base.clone());
                }
                vec![base.clone()]
            }
            None => {
                let scored = SampleValidator::score(sample, &pairs);
                scored
                    .into_iter()
                    .take(self.config.expansion_parents)
                    .map(|s| s.combination)
                    .collect()
            }
        };

        let seed_names: Vec<&str> = seeds.iter().map(|p| p.name.as_str()).collect();
        let mut size = request.base.as_ref().map_or(3, |base| base.len() + 1);

        while size <= request.max_size && !parents.is_empty() {
            let expansions = self.expand(&parents, &seed_names, &exclusions, &mut seen);
            if expansions.is_empty() {
                break;
            }

            let scored = SampleValidator::score(sample, &expansions);
            let threshold = self.config.threshold_for(size);
            let retained: Vec<CandidateScore> = scored
                .iter()
                .filter(|s| s.sample_score >= threshold)
                .cloned()
                .collect();

            log::debug!(
                "Size {size}: {} expansions, {} above {threshold:.1}%",
                expansions.len(),
                retained.len()
            );

            if request.wants(size) {
                output
                    .combinations
                    .extend(retained.iter().map(|s| s.combination.clone()));
            }

            // keep growing from the best attempts even when none cleared the bar,
            // since larger sizes face a lower threshold
            let next_from = if retained.is_empty() { &scored } else { &retained };
            parents = next_from
                .iter()
                .take(self.config.expansion_parents)
                .map(|s| s.combination.clone())
                .collect();
            output.validated.extend(scored);
            size += 1;
        }

        output
    }

    fn single_columns(&self, seeds: &[&ColumnProfile]) -> Vec<Combination> {
        seeds
            .iter()
            .filter(|p| {
                p.cardinality_ratio >= self.config.single_min_cardinality
                    || (p.is_id_like
                        && p.cardinality_ratio >= self.config.single_id_min_cardinality)
            })
            .filter_map(|p| Combination::new([p.name.as_str()]).ok())
            .collect()
    }

    fn pairs(&self, seeds: &[&ColumnProfile]) -> Vec<Combination> {
        let cap = self.config.pair_cap;
        let mut seen = HashSet::new();
        let mut pairs = Vec::new();

        let id_like: Vec<&ColumnProfile> = seeds.iter().copied().filter(|p| p.is_id_like).collect();
        let date_like: Vec<&ColumnProfile> =
            seeds.iter().copied().filter(|p| p.is_date_like).collect();
        let high_card: Vec<&ColumnProfile> = seeds
            .iter()
            .copied()
            .filter(|p| p.cardinality_ratio >= self.config.high_cardinality)
            .collect();
        let mut by_cardinality: Vec<&ColumnProfile> = seeds.to_vec();
        by_cardinality.sort_by(|a, b| b.cardinality_ratio.total_cmp(&a.cardinality_ratio));

        let mut strategy = |left: &[&ColumnProfile], right: &[&ColumnProfile], upper_only: bool| {
            let mut produced = 0;
            'outer: for (i, l) in left.iter().enumerate() {
                for (j, r) in right.iter().enumerate() {
                    if produced >= cap {
                        break 'outer;
                    }
                    if upper_only && j <= i {
                        continue;
                    }
                    if l.name == r.name {
                        continue;
                    }
                    if let Ok(pair) = Combination::new([l.name.as_str(), r.name.as_str()]) {
                        if seen.insert(pair.clone()) {
                            pairs.push(pair);
                            produced += 1;
                        }
                    }
                }
            }
        };

        strategy(&id_like, &high_card, false);
        strategy(&date_like, &id_like, false);
        strategy(&by_cardinality, &by_cardinality, true);

        pairs
    }

    fn expand(
        &self,
        parents: &[Combination],
        seed_names: &[&str],
        exclusions: &Exclusions,
        seen: &mut HashSet<Combination>,
    ) -> Vec<Combination> {
        let mut expansions = Vec::new();
        for parent in parents {
            let mut produced = 0;
            for seed in seed_names {
                if produced >= self.config.expansions_per_parent {
                    break;
                }
                let Some(candidate) = parent.extended_with(seed) else {
                    continue;
                };
                if exclusions.excludes(&candidate) || !seen.insert(candidate.clone()) {
                    continue;
                }
                expansions.push(candidate);
                produced += 1;
            }
        }
        expansions
    }
}
