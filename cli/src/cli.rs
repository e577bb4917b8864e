//! Command-line interface for keyscope

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "keyscope")]
#[command(about = "Unique-key discovery and key-based comparison of large delimited files")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file to use instead of the default lookup
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Discover column combinations that behave as a unique key
    Discover {
        /// Input file path
        input: PathBuf,

        /// Field delimiter (auto-detected when omitted)
        #[arg(short, long)]
        delimiter: Option<String>,

        /// Smallest combination size to propose
        #[arg(long)]
        min_size: Option<usize>,

        /// Largest combination size to propose
        #[arg(long)]
        max_size: Option<usize>,

        /// Columns never used in a candidate (repeatable)
        #[arg(long = "exclude-column")]
        exclude_columns: Vec<String>,

        /// Comma-separated combination to exclude, with every superset (repeatable)
        #[arg(long = "exclude-combination")]
        exclude_combinations: Vec<String>,

        /// Comma-separated known-good combination to extend
        #[arg(long)]
        base: Option<String>,

        /// Number of candidates verified against the full file
        #[arg(long)]
        top: Option<usize>,

        /// Output results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Compare two files on a key and export each category to chunk files
    Compare {
        /// File A
        file_a: PathBuf,

        /// File B
        file_b: PathBuf,

        /// Comma-separated key columns
        #[arg(short, long)]
        key: String,

        /// Delimiter for file A (auto-detected when omitted)
        #[arg(long)]
        delimiter_a: Option<String>,

        /// Delimiter for file B (auto-detected when omitted)
        #[arg(long)]
        delimiter_b: Option<String>,

        /// Stop each extraction after this many rows
        #[arg(long)]
        limit: Option<u64>,

        /// Rows per chunk file (overrides config)
        #[arg(long)]
        rows_per_file: Option<usize>,

        /// Output directory for chunk files (overrides config)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Only print the summary, write no chunk files
        #[arg(long)]
        no_export: bool,

        /// Output results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Read one page of exported records
    Page {
        /// A chunk file, or a run side directory containing manifest.json
        path: PathBuf,

        /// Category to page through when PATH is a directory
        #[arg(long, value_enum, default_value_t = CategoryArg::Matched)]
        category: CategoryArg,

        /// Zero-based row offset
        #[arg(long, default_value_t = 0)]
        offset: u64,

        /// Maximum rows returned
        #[arg(long, default_value_t = 50)]
        limit: usize,

        /// Output results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Load a file in memory and report duplicate keys using the parallel indexer
    Index {
        /// Input file path
        input: PathBuf,

        /// Comma-separated key columns
        #[arg(short, long)]
        key: String,

        /// Field delimiter (auto-detected when omitted)
        #[arg(short, long)]
        delimiter: Option<String>,

        /// Rows per in-memory chunk
        #[arg(long, default_value_t = 50_000)]
        chunk_rows: usize,

        /// Worker threads (defaults to available cores minus one)
        #[arg(long)]
        threads: Option<usize>,

        /// Stop after this many rows
        #[arg(long)]
        limit: Option<u64>,

        /// Maximum duplicate groups printed
        #[arg(long, default_value_t = 20)]
        show: usize,

        /// Output results in JSON format
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum CategoryArg {
    Matched,
    OnlyA,
    OnlyB,
}

impl From<CategoryArg> for keyscope_core::ExportCategory {
    fn from(arg: CategoryArg) -> Self {
        match arg {
            CategoryArg::Matched => keyscope_core::ExportCategory::Matched,
            CategoryArg::OnlyA => keyscope_core::ExportCategory::OnlyA,
            CategoryArg::OnlyB => keyscope_core::ExportCategory::OnlyB,
        }
    }
}
