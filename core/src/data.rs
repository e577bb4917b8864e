//! Streaming access to delimited source files using DuckDB

use crate::combination::Combination;
use crate::error::{KeyscopeError, Result};
use crate::job::CancellationToken;
use crate::key::{Row, Value};
use duckdb::arrow::array::{Array, StringArray};
use duckdb::arrow::datatypes::{DataType, Field, Schema};
use duckdb::arrow::record_batch::RecordBatch;
use duckdb::Connection;
use encoding_rs::{UTF_16BE, UTF_16LE, UTF_8};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Bytes inspected when sniffing encoding
const SNIFF_BYTES: usize = 64 * 1024;

/// Delimiters considered by auto-detection, in preference order
const DELIMITER_CANDIDATES: [char; 4] = [',', ';', '\t', '|'];

/// Text encodings DuckDB can decode while scanning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceEncoding {
    Utf8,
    Utf16,
    Latin1,
}

impl SourceEncoding {
    pub fn duckdb_name(&self) -> &'static str {
        match self {
            SourceEncoding::Utf8 => "utf-8",
            SourceEncoding::Utf16 => "utf-16",
            SourceEncoding::Latin1 => "latin-1",
        }
    }

    /// Sniffed encoding first, then the remaining fallbacks
    fn attempt_order(primary: SourceEncoding) -> Vec<SourceEncoding> {
        let mut order = vec![primary];
        for enc in [SourceEncoding::Utf8, SourceEncoding::Latin1, SourceEncoding::Utf16] {
            if !order.contains(&enc) {
                order.push(enc);
            }
        }
        order
    }
}

/// Guess the encoding from a BOM, else by validating the leading bytes as UTF-8
pub fn detect_encoding(path: &Path) -> Result<SourceEncoding> {
    let mut file = open_file(path)?;
    let mut buf = Vec::with_capacity(SNIFF_BYTES);
    file.by_ref().take(SNIFF_BYTES as u64).read_to_end(&mut buf)?;

    if let Some((encoding, _)) = encoding_rs::Encoding::for_bom(&buf) {
        if encoding == UTF_8 {
            return Ok(SourceEncoding::Utf8);
        }
        if encoding == UTF_16LE || encoding == UTF_16BE {
            return Ok(SourceEncoding::Utf16);
        }
    }

    let valid = encoding_rs::Encoding::utf8_valid_up_to(&buf);
    // a multi-byte character cut by the sniff window is still valid UTF-8
    let truncated_tail = buf.len() == SNIFF_BYTES && buf.len() - valid < 4;
    if valid == buf.len() || truncated_tail {
        Ok(SourceEncoding::Utf8)
    } else {
        log::debug!(
            "{} is not valid UTF-8 at byte {valid}, falling back to latin-1",
            path.display()
        );
        Ok(SourceEncoding::Latin1)
    }
}

/// Pick the candidate delimiter occurring most often (outside quotes) in the header line
pub fn detect_delimiter(path: &Path) -> Result<char> {
    let file = open_file(path)?;
    let mut reader = BufReader::new(file);
    let mut raw = Vec::new();
    reader.read_until(b'\n', &mut raw)?;
    let header = String::from_utf8_lossy(&raw);

    let mut best = (',', 0usize);
    for candidate in DELIMITER_CANDIDATES {
        let mut in_quotes = false;
        let mut count = 0;
        for ch in header.chars() {
            if ch == '"' {
                in_quotes = !in_quotes;
            } else if ch == candidate && !in_quotes {
                count += 1;
            }
        }
        if count > best.1 {
            best = (candidate, count);
        }
    }
    Ok(best.0)
}

fn open_file(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            KeyscopeError::FileNotFound(path.to_path_buf())
        } else {
            KeyscopeError::Io(e)
        }
    })
}

/// Normalised form used for tolerant column matching
fn normalize_column(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Options for one streaming pass
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Rows handed to the callback per batch
    pub batch_rows: usize,
    /// Stop after this many rows
    pub limit: Option<u64>,
    /// Checked between batches
    pub cancel: Option<CancellationToken>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            batch_rows: 50_000,
            limit: None,
            cancel: None,
        }
    }
}

impl ScanOptions {
    pub fn with_batch_rows(batch_rows: usize) -> Self {
        Self {
            batch_rows,
            ..Self::default()
        }
    }
}

/// A delimited file opened for repeated streaming passes.
///
/// Rows are read as text (`all_varchar`), empty fields surface as `None`, and
/// rows that do not fit the header's shape are skipped by the scanner rather
/// than failing the pass.
pub struct SourceReader {
    connection: Connection,
    path: PathBuf,
    delimiter: char,
    encoding: SourceEncoding,
    columns: Vec<String>,
}

impl std::fmt::Debug for SourceReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceReader")
            .field("path", &self.path)
            .field("delimiter", &self.delimiter)
            .field("encoding", &self.encoding)
            .field("columns", &self.columns.len())
            .finish()
    }
}

impl SourceReader {
    /// Open `path`, auto-detecting the delimiter when none is given
    pub fn open(path: &Path, delimiter: Option<char>) -> Result<Self> {
        if !path.is_file() {
            return Err(KeyscopeError::FileNotFound(path.to_path_buf()));
        }

        let delimiter = match delimiter {
            Some(d) => d,
            None => detect_delimiter(path)?,
        };
        let primary = detect_encoding(path)?;

        let connection = Connection::open_in_memory()?;
        connection.execute("SET enable_progress_bar=false", [])?;
        // pagination relies on chunk rows following source order
        connection.execute("SET preserve_insertion_order=true", [])?;

        let mut last_error = String::new();
        for encoding in SourceEncoding::attempt_order(primary) {
            let view_sql = format!(
                "CREATE OR REPLACE VIEW source_view AS SELECT * FROM {}",
                read_csv_expr(path, delimiter, encoding)
            );
            let attempt = connection
                .execute(&view_sql, [])
                .map_err(KeyscopeError::from)
                .and_then(|_| describe_columns(&connection));
            match attempt {
                Ok(columns) => {
                    log::debug!(
                        "Opened {} ({} columns, delimiter {:?}, {})",
                        path.display(),
                        columns.len(),
                        delimiter,
                        encoding.duckdb_name()
                    );
                    return Ok(Self {
                        connection,
                        path: path.to_path_buf(),
                        delimiter,
                        encoding,
                        columns,
                    });
                }
                Err(e) => {
                    log::debug!(
                        "Reading {} as {} failed: {e}",
                        path.display(),
                        encoding.duckdb_name()
                    );
                    last_error = e.to_string();
                }
            }
        }

        Err(KeyscopeError::Encoding {
            path: path.to_path_buf(),
            message: last_error,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    pub fn encoding(&self) -> SourceEncoding {
        self.encoding
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Count readable rows (malformed rows excluded)
    pub fn count_rows(&self) -> Result<u64> {
        let count: u64 = self
            .connection
            .prepare("SELECT COUNT(*) FROM source_view")?
            .query_row([], |row| row.get(0))?;
        Ok(count)
    }

    /// Map the combination's columns to source positions.
    ///
    /// Exact names win; otherwise names are compared trimmed and
    /// case-insensitively. Fails before any row is read.
    pub fn resolve_columns(&self, combination: &Combination) -> Result<Vec<usize>> {
        let mut indices = Vec::with_capacity(combination.len());
        let mut missing = Vec::new();

        for wanted in combination.columns() {
            let exact = self.columns.iter().position(|c| c == wanted);
            let found = exact.or_else(|| {
                let normalized = normalize_column(wanted);
                self.columns
                    .iter()
                    .position(|c| normalize_column(c) == normalized)
            });
            match found {
                Some(idx) => indices.push(idx),
                None => missing.push(wanted.clone()),
            }
        }

        if !missing.is_empty() {
            return Err(KeyscopeError::ColumnNotFound {
                missing,
                available: self.columns.clone(),
            });
        }
        Ok(indices)
    }

    /// Stream the file in batches of at most `options.batch_rows` rows.
    ///
    /// Returns the number of rows handed to `on_batch`.
    pub fn scan<F>(&self, options: &ScanOptions, mut on_batch: F) -> Result<u64>
    where
        F: FnMut(&[Row]) -> Result<()>,
    {
        if options.limit == Some(0) || self.columns.is_empty() {
            return Ok(0);
        }

        let batch_rows = options.batch_rows.max(1);
        let query = match options.limit {
            Some(limit) => format!("SELECT * FROM source_view LIMIT {limit}"),
            None => "SELECT * FROM source_view".to_string(),
        };

        let mut stmt = self.connection.prepare(&query)?;
        let stream = stmt.stream_arrow([], self.arrow_schema())?;

        let mut batch: Vec<Row> = Vec::with_capacity(batch_rows.min(65_536));
        let mut scanned = 0u64;
        let limit = options.limit.unwrap_or(u64::MAX);

        'outer: for record_batch in stream {
            for row_idx in 0..record_batch.num_rows() {
                if scanned + batch.len() as u64 >= limit {
                    break 'outer;
                }
                batch.push(self.row_at(&record_batch, row_idx)?);

                if batch.len() == batch_rows {
                    if let Some(token) = &options.cancel {
                        if token.is_cancelled() {
                            return Err(KeyscopeError::Cancelled);
                        }
                    }
                    on_batch(&batch)?;
                    scanned += batch.len() as u64;
                    batch.clear();
                }
            }
        }

        if !batch.is_empty() {
            if let Some(token) = &options.cancel {
                if token.is_cancelled() {
                    return Err(KeyscopeError::Cancelled);
                }
            }
            on_batch(&batch)?;
            scanned += batch.len() as u64;
        }

        log::debug!("Scanned {scanned} rows from {}", self.path.display());
        Ok(scanned)
    }

    fn arrow_schema(&self) -> Arc<Schema> {
        let fields: Vec<Field> = self
            .columns
            .iter()
            .map(|name| Field::new(name.as_str(), DataType::Utf8, true))
            .collect();
        Arc::new(Schema::new(fields))
    }

    fn row_at(&self, batch: &RecordBatch, row_idx: usize) -> Result<Row> {
        let mut row = Vec::with_capacity(batch.num_columns());
        for column in batch.columns() {
            row.push(array_value(column.as_ref(), row_idx)?);
        }
        Ok(row)
    }
}

fn array_value(array: &dyn Array, row_idx: usize) -> Result<Value> {
    if array.is_null(row_idx) {
        return Ok(None);
    }
    if let Some(strings) = array.as_any().downcast_ref::<StringArray>() {
        return Ok(Some(strings.value(row_idx).to_string()));
    }
    duckdb::arrow::util::display::array_value_to_string(array, row_idx)
        .map(Some)
        .map_err(|e| KeyscopeError::data_processing(format!("failed to read value: {e}")))
}

fn sql_quote(text: &str) -> String {
    text.replace('\'', "''")
}

fn read_csv_expr(path: &Path, delimiter: char, encoding: SourceEncoding) -> String {
    format!(
        "read_csv('{}', delim='{}', header=true, all_varchar=true, ignore_errors=true, encoding='{}')",
        sql_quote(&path.to_string_lossy()),
        sql_quote(&delimiter.to_string()),
        encoding.duckdb_name()
    )
}

fn describe_columns(connection: &Connection) -> Result<Vec<String>> {
    let mut stmt = connection.prepare("DESCRIBE source_view")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    let mut columns = Vec::new();
    for row in rows {
        columns.push(row?);
    }
    Ok(columns)
}
