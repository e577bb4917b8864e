use crate::combination::Combination;
use crate::error::{KeyscopeError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;

/// Record category an export chunk belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportCategory {
    Matched,
    OnlyA,
    OnlyB,
}

impl ExportCategory {
    pub const ALL: [ExportCategory; 3] = [
        ExportCategory::Matched,
        ExportCategory::OnlyA,
        ExportCategory::OnlyB,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExportCategory::Matched => "matched",
            ExportCategory::OnlyA => "only_a",
            ExportCategory::OnlyB => "only_b",
        }
    }
}

impl fmt::Display for ExportCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportCategory {
    type Err = KeyscopeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "matched" => Ok(ExportCategory::Matched),
            "only_a" | "a" => Ok(ExportCategory::OnlyA),
            "only_b" | "b" => Ok(ExportCategory::OnlyB),
            other => Err(KeyscopeError::invalid_input(format!(
                "unknown category '{other}' (expected matched, only_a or only_b)"
            ))),
        }
    }
}

/// `{category}_chunk_{index:04}.csv`
pub fn chunk_file_name(category: ExportCategory, index: u32) -> String {
    format!("{category}_chunk_{index:04}.csv")
}

fn chunk_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(matched|only_a|only_b)_chunk_(\d{4,})\.csv$").expect("valid chunk pattern")
    })
}

fn slug_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("valid slug pattern"))
}

/// Inverse of [`chunk_file_name`]
pub fn parse_chunk_file_name(name: &str) -> Option<(ExportCategory, u32)> {
    let captures = chunk_name_pattern().captures(name)?;
    let category = captures.get(1)?.as_str().parse().ok()?;
    let index = captures.get(2)?.as_str().parse().ok()?;
    Some((category, index))
}

/// Directory-safe name for a combination, stable across column order
pub fn combination_slug(combination: &Combination) -> String {
    let mut parts: Vec<String> = combination
        .canonical()
        .iter()
        .map(|column| {
            let lower = column.to_lowercase();
            let slug = slug_pattern().replace_all(&lower, "_");
            let trimmed = slug.trim_matches('_');
            if trimmed.is_empty() {
                "col".to_string()
            } else {
                trimmed.to_string()
            }
        })
        .collect();
    parts.sort();
    parts.join("__")
}

/// Fresh run identifier
pub fn new_run_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// `{output_dir}/{run_id}/{combination_slug}/`
pub fn run_dir(output_dir: &Path, run_id: &str, combination: &Combination) -> PathBuf {
    output_dir.join(run_id).join(combination_slug(combination))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_file_name_round_trip() {
        assert_eq!(chunk_file_name(ExportCategory::OnlyA, 3), "only_a_chunk_0003.csv");
        assert_eq!(
            parse_chunk_file_name("matched_chunk_0012.csv"),
            Some((ExportCategory::Matched, 12))
        );
        assert_eq!(
            parse_chunk_file_name("only_b_chunk_12345.csv"),
            Some((ExportCategory::OnlyB, 12345))
        );
        assert_eq!(parse_chunk_file_name("matched_chunk_0001.csv.tmp"), None);
        assert_eq!(parse_chunk_file_name("other_chunk_0001.csv"), None);
    }

    #[test]
    fn test_combination_slug() {
        let combo = Combination::new(["Region Code", "customer-id"]).unwrap();
        assert_eq!(combination_slug(&combo), "customer_id__region_code");
        let reordered = Combination::new(["customer-id", "Region Code"]).unwrap();
        assert_eq!(combination_slug(&reordered), combination_slug(&combo));
        // case differences must not decide the order
        let mixed = Combination::new(["b", "A"]).unwrap();
        assert_eq!(combination_slug(&mixed), "a__b");
        let symbols = Combination::new(["%%"]).unwrap();
        assert_eq!(combination_slug(&symbols), "col");
    }

    #[test]
    fn test_run_dir_layout() {
        let combo = Combination::new(["id"]).unwrap();
        let dir = run_dir(Path::new("out"), "run-1", &combo);
        assert_eq!(dir, PathBuf::from("out").join("run-1").join("id"));
        assert_ne!(new_run_id(), new_run_id());
    }

    #[test]
    fn test_category_parse() {
        assert_eq!("Only_A".parse::<ExportCategory>().unwrap(), ExportCategory::OnlyA);
        assert!("both".parse::<ExportCategory>().is_err());
    }
}
