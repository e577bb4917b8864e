//! Composite key construction and key sets

use std::collections::HashSet;

/// A row value as read from a source file; `None` is a null / empty field
pub type Value = Option<String>;

/// One row of values in source column order
pub type Row = Vec<Value>;

const NULL_TAG: u8 = 0;
const VALUE_TAG: u8 = 1;

/// Structured composite key for one row.
///
/// Each value is encoded as a tag byte followed, for non-null values, by a
/// little-endian `u32` length and the UTF-8 bytes. Distinct value tuples can
/// never produce the same encoding, whatever characters the values contain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompositeKey(Box<[u8]>);

impl CompositeKey {
    /// Build the key for `row` from the values at `indices`
    pub fn from_row(row: &[Value], indices: &[usize]) -> Self {
        let mut buf = Vec::with_capacity(indices.len() * 12);
        for &idx in indices {
            encode_value(&mut buf, row.get(idx).and_then(|v| v.as_deref()));
        }
        Self(buf.into_boxed_slice())
    }

    /// Build a key directly from values in key order
    pub fn from_values<'a, I>(values: I) -> Self
    where
        I: IntoIterator<Item = Option<&'a str>>,
    {
        let mut buf = Vec::new();
        for value in values {
            encode_value(&mut buf, value);
        }
        Self(buf.into_boxed_slice())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Decoded values in key order
    pub fn values(&self) -> Vec<Option<String>> {
        let mut out = Vec::new();
        let bytes = &self.0;
        let mut pos = 0;
        while pos < bytes.len() {
            let tag = bytes[pos];
            pos += 1;
            if tag == NULL_TAG {
                out.push(None);
                continue;
            }
            let mut len_bytes = [0u8; 4];
            len_bytes.copy_from_slice(&bytes[pos..pos + 4]);
            let len = u32::from_le_bytes(len_bytes) as usize;
            pos += 4;
            out.push(Some(String::from_utf8_lossy(&bytes[pos..pos + len]).into_owned()));
            pos += len;
        }
        out
    }

    /// Human-readable rendering (`a|b|<null>`), for display only
    pub fn display(&self) -> String {
        self.values()
            .into_iter()
            .map(|v| v.unwrap_or_else(|| "<null>".to_string()))
            .collect::<Vec<_>>()
            .join("|")
    }

    /// 64-bit digest of the key, used by the hash indexer
    pub fn digest(&self) -> u64 {
        let hash = blake3::hash(&self.0);
        let mut first = [0u8; 8];
        first.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_le_bytes(first)
    }
}

fn encode_value(buf: &mut Vec<u8>, value: Option<&str>) {
    match value {
        None => buf.push(NULL_TAG),
        Some(v) => {
            buf.push(VALUE_TAG);
            buf.extend_from_slice(&(v.len() as u32).to_le_bytes());
            buf.extend_from_slice(v.as_bytes());
        }
    }
}

/// Distinct composite keys of one file plus the number of rows scanned
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySet {
    keys: HashSet<CompositeKey>,
    total_rows: u64,
}

impl KeySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one scanned row's key
    pub fn insert(&mut self, key: CompositeKey) {
        self.keys.insert(key);
        self.total_rows += 1;
    }

    pub fn contains(&self, key: &CompositeKey) -> bool {
        self.keys.contains(key)
    }

    pub fn keys(&self) -> &HashSet<CompositeKey> {
        &self.keys
    }

    /// Number of distinct keys
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn total_rows(&self) -> u64 {
        self.total_rows
    }

    /// Distinct keys / rows scanned, as a percentage
    pub fn uniqueness(&self) -> f64 {
        if self.total_rows == 0 {
            0.0
        } else {
            self.keys.len() as f64 / self.total_rows as f64 * 100.0
        }
    }
}
