//! Column combinations used as composite keys

use crate::error::{KeyscopeError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An ordered, de-duplicated set of column names.
///
/// Two combinations holding the same columns are equal and hash equal no matter
/// the order the columns were supplied in: equality, hashing and ordering all go
/// through the canonical (sorted) form. The supplied order is kept for key
/// construction and display.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct Combination {
    columns: Vec<String>,
    canonical: Vec<String>,
}

impl Combination {
    /// Build a combination, rejecting empty lists and blank names.
    /// Duplicate names are dropped, keeping the first occurrence.
    pub fn new<I, S>(columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut ordered: Vec<String> = Vec::new();
        for column in columns {
            let name = column.as_ref();
            if name.trim().is_empty() {
                return Err(KeyscopeError::invalid_combination(
                    "column names must not be blank",
                ));
            }
            if !ordered.iter().any(|existing| existing == name) {
                ordered.push(name.to_string());
            }
        }

        if ordered.is_empty() {
            return Err(KeyscopeError::invalid_combination(
                "a combination needs at least one column",
            ));
        }

        let mut canonical = ordered.clone();
        canonical.sort();

        Ok(Self {
            columns: ordered,
            canonical,
        })
    }

    /// Parse a comma separated column list such as `"id, region"`
    pub fn parse(spec: &str) -> Result<Self> {
        Self::new(spec.split(',').map(str::trim).filter(|c| !c.is_empty()))
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn canonical(&self) -> &[String] {
        &self.canonical
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn contains_column(&self, column: &str) -> bool {
        self.canonical.binary_search_by(|c| c.as_str().cmp(column)).is_ok()
    }

    /// True when every column of `other` is also part of `self`
    pub fn contains(&self, other: &Combination) -> bool {
        other.canonical.iter().all(|c| self.contains_column(c))
    }

    /// A new combination with `column` appended, or `None` if already present
    pub fn extended_with(&self, column: &str) -> Option<Combination> {
        if self.contains_column(column) {
            return None;
        }
        let mut columns = self.columns.clone();
        columns.push(column.to_string());
        Combination::new(columns).ok()
    }
}

impl PartialEq for Combination {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for Combination {}

impl std::hash::Hash for Combination {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl PartialOrd for Combination {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Combination {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.canonical
            .len()
            .cmp(&other.canonical.len())
            .then_with(|| self.canonical.cmp(&other.canonical))
    }
}

impl fmt::Display for Combination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.columns.join(", "))
    }
}

impl TryFrom<Vec<String>> for Combination {
    type Error = KeyscopeError;

    fn try_from(columns: Vec<String>) -> Result<Self> {
        Combination::new(columns)
    }
}

impl From<Combination> for Vec<String> {
    fn from(combination: Combination) -> Self {
        combination.columns
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_equal_regardless_of_order() {
        let a = Combination::new(["region", "id"]).unwrap();
        let b = Combination::new(["id", "region"]).unwrap();
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a.clone());
        assert!(set.contains(&b));

        // supplied order is still what keys are built from
        assert_eq!(a.columns(), &["region".to_string(), "id".to_string()]);
        assert_eq!(a.canonical(), b.canonical());
    }

    #[test]
    fn test_duplicates_dropped() {
        let c = Combination::new(["id", "id", "date"]).unwrap();
        assert_eq!(c.len(), 2);
    }

    #[test]
    fn test_rejects_empty_and_blank() {
        assert!(Combination::new(Vec::<String>::new()).is_err());
        assert!(Combination::new(["id", "  "]).is_err());
        assert!(Combination::parse(" , ").is_err());
    }

    #[test]
    fn test_containment() {
        let big = Combination::new(["a", "b", "c"]).unwrap();
        let small = Combination::new(["c", "a"]).unwrap();
        assert!(big.contains(&small));
        assert!(!small.contains(&big));
        assert!(big.extended_with("a").is_none());
        assert_eq!(big.extended_with("d").unwrap().len(), 4);
    }

    #[test]
    fn test_serde_as_plain_list() {
        let c = Combination::parse("id, region").unwrap();
        let json = serde_json::to_string(&c).unwrap();
        assert_eq!(json, r#"["id","region"]"#);
        let back: Combination = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
        assert!(serde_json::from_str::<Combination>("[]").is_err());
    }
}
