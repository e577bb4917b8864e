//! # keyscope-core
//!
//! Core library for keyscope - out-of-core unique-key discovery and key-based
//! comparison of large delimited files.
//!
//! Discovery profiles a bounded sample, proposes column combinations without
//! enumerating every subset, and verifies the best ones against the full
//! file. Comparison streams both files in bounded batches, classifies keys as
//! matched / only in A / only in B, and exports the full rows of each
//! category to size-bounded chunk files that can be paged.

pub mod cache;
pub mod combination;
pub mod compare;
pub mod config;
pub mod data;
pub mod discovery;
pub mod error;
pub mod export;
pub mod extract;
pub mod indexer;
pub mod job;
pub mod key;
pub mod naming;
pub mod paging;
pub mod pipeline;

// Re-export the most commonly used types for convenience
pub use cache::RowCountCache;
pub use combination::Combination;
pub use compare::{ComparisonResult, ComparisonSummary, SetComparator};
pub use config::Config;
pub use data::{ScanOptions, SourceReader};
pub use discovery::{DiscoveryReport, DiscoveryRequest, KeyDiscovery, VerifiedCandidate};
pub use error::{KeyscopeError, Result};
pub use export::{
    ChunkRegistry, ChunkedRecordExporter, ExportCategory, ExportChunk, ExportOptions,
    ExportOutcome, ManifestRegistry, MemoryChunkRegistry,
};
pub use extract::{ChunkedKeyExtractor, ExtractOptions};
pub use indexer::{DuplicateGroup, HashIndex, ParallelHashIndexer};
pub use job::{CancellationToken, Job, JobStatus};
pub use key::{CompositeKey, KeySet};
pub use paging::{read_category_page, read_page, Page};
pub use pipeline::{ComparisonReport, ComparisonRequest, KeyComparison};
