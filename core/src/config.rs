//! Configuration for discovery, extraction and export

use crate::error::{KeyscopeError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

/// Tunables for the heuristic combination search.
///
/// None of the defaults is claimed to be optimal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Hard upper bound on discovery sample rows
    pub sample_cap: usize,
    /// Files with at most this many rows are sampled entirely
    pub sample_floor: usize,
    /// Fraction of the file sampled between floor and cap
    pub sample_fraction: f64,
    /// Seed for the reservoir sampler
    pub sample_seed: u64,
    /// Number of seed columns kept after scoring
    pub seed_columns: usize,
    /// Single-column candidates need at least this cardinality ratio
    pub single_min_cardinality: f64,
    /// Id-like single-column candidates need at least this cardinality ratio
    pub single_id_min_cardinality: f64,
    /// Seeds at or above this ratio count as high-cardinality when pairing
    pub high_cardinality: f64,
    /// Cap on pairs produced by each size-2 strategy
    pub pair_cap: usize,
    /// Number of validated pairs the incremental build starts from
    pub expansion_parents: usize,
    /// Cap on expansions generated per parent
    pub expansions_per_parent: usize,
    /// Size-dependent threshold is `max(threshold_floor, threshold_base - threshold_step * size)`
    pub threshold_base: f64,
    pub threshold_step: f64,
    pub threshold_floor: f64,
    /// Candidates re-checked against the full file
    pub verify_top: usize,
    pub min_size: usize,
    pub max_size: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            sample_cap: 1_000_000,
            sample_floor: 100_000,
            sample_fraction: 0.1,
            sample_seed: 42,
            seed_columns: 40,
            single_min_cardinality: 0.8,
            single_id_min_cardinality: 0.5,
            high_cardinality: 0.5,
            pair_cap: 25,
            expansion_parents: 10,
            expansions_per_parent: 15,
            threshold_base: 70.0,
            threshold_step: 5.0,
            threshold_floor: 30.0,
            verify_top: 10,
            min_size: 1,
            max_size: 4,
        }
    }
}

impl DiscoveryConfig {
    /// Uniqueness a combination of `size` columns must reach to be retained
    pub fn threshold_for(&self, size: usize) -> f64 {
        (self.threshold_base - self.threshold_step * size as f64).max(self.threshold_floor)
    }

    /// Sample size for a file of `total_rows`: grows with the file, never above the cap
    pub fn sample_size_for(&self, total_rows: u64) -> usize {
        let total = usize::try_from(total_rows).unwrap_or(usize::MAX);
        if total <= self.sample_floor {
            return total.min(self.sample_cap);
        }
        let proportional = (total as f64 * self.sample_fraction).ceil() as usize;
        proportional.max(self.sample_floor).min(self.sample_cap)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Rows per streamed batch
    pub batch_rows: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self { batch_rows: 50_000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Rows written to each chunk file
    pub rows_per_file: usize,
    /// Export steps over sources larger than this are skipped
    pub skip_above_rows: Option<u64>,
    /// Wall-clock budget for one export step
    pub step_timeout_secs: Option<u64>,
    pub output_dir: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            rows_per_file: 100_000,
            skip_above_rows: None,
            step_timeout_secs: None,
            output_dir: PathBuf::from("keyscope_output"),
        }
    }
}

impl ExportConfig {
    pub fn step_timeout(&self) -> Option<Duration> {
        self.step_timeout_secs.map(Duration::from_secs)
    }
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| KeyscopeError::Config(e.to_string()))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| KeyscopeError::Config(e.to_string()))
    }
}

fn try_load(path: &Path) -> Option<Config> {
    if !path.exists() {
        return None;
    }
    match Config::load_from(path) {
        Ok(config) => {
            log::debug!("Loaded configuration from {}", path.display());
            Some(config)
        }
        Err(e) => {
            log::warn!("Ignoring unreadable config {}: {e}", path.display());
            None
        }
    }
}

pub fn global_config_path() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".keyscope"))
        .unwrap_or_else(|| PathBuf::from(".keyscope"))
        .join("global.toml")
}

pub fn get_config() -> Result<Config> {
    // Priority order (highest to lowest):
    // 1. Explicit config file via KEYSCOPE_CONFIG env var
    // 2. Local config file (keyscope.toml)
    // 3. Global config file (~/.keyscope/global.toml)
    // 4. Defaults

    if let Ok(config_path) = env::var("KEYSCOPE_CONFIG") {
        if let Some(config) = try_load(Path::new(&config_path)) {
            return Ok(config);
        }
    }

    if let Ok(current_dir) = env::current_dir() {
        if let Some(config) = try_load(&current_dir.join("keyscope.toml")) {
            return Ok(config);
        }
    }

    if let Some(config) = try_load(&global_config_path()) {
        return Ok(config);
    }

    Ok(Config::default())
}

pub fn save_config(config: &Config, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, config.to_toml_string()?)?;
    Ok(())
}
