//! Command implementations for keyscope CLI

use crate::cli::{CategoryArg, Commands};
use crate::output::{JsonFormatter, PrettyPrinter};
use crate::progress::{create_spinner, ProgressReporter};
use anyhow::{bail, Context, Result};
use keyscope_core::config::{get_config, Config};
use keyscope_core::discovery::{DiscoveryRequest, KeyDiscovery};
use keyscope_core::indexer::{load_chunks, ParallelHashIndexer};
use keyscope_core::paging::{read_category_page, read_page};
use keyscope_core::pipeline::{ComparisonRequest, ComparisonStage, KeyComparison};
use keyscope_core::{ChunkRegistry, Combination, ManifestRegistry, RowCountCache, SourceReader};
use std::path::Path;

/// Execute a command
pub fn execute_command(command: Commands, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    match command {
        Commands::Discover {
            input,
            delimiter,
            min_size,
            max_size,
            exclude_columns,
            exclude_combinations,
            base,
            top,
            json,
        } => {
            let request = DiscoveryRequest {
                path: input,
                delimiter: parse_delimiter(delimiter.as_deref())?,
                min_size,
                max_size,
                excluded_columns: exclude_columns,
                excluded_combinations: exclude_combinations
                    .iter()
                    .map(|c| Combination::parse(c))
                    .collect::<keyscope_core::Result<_>>()?,
                base: base.as_deref().map(Combination::parse).transpose()?,
                verify_top: top,
                cancel: None,
            };
            discover_command(&config, &request, json)
        }
        Commands::Compare {
            file_a,
            file_b,
            key,
            delimiter_a,
            delimiter_b,
            limit,
            rows_per_file,
            output,
            no_export,
            json,
        } => {
            let mut config = config;
            if let Some(rows) = rows_per_file {
                config.export.rows_per_file = rows;
            }
            if let Some(dir) = output {
                config.export.output_dir = dir;
            }
            let request = ComparisonRequest {
                delimiter_a: parse_delimiter(delimiter_a.as_deref())?,
                delimiter_b: parse_delimiter(delimiter_b.as_deref())?,
                limit,
                export: !no_export,
                ..ComparisonRequest::new(file_a, file_b, Combination::parse(&key)?)
            };
            compare_command(&config, &request, json)
        }
        Commands::Page {
            path,
            category,
            offset,
            limit,
            json,
        } => page_command(&path, category, offset, limit, json),
        Commands::Index {
            input,
            key,
            delimiter,
            chunk_rows,
            threads,
            limit,
            show,
            json,
        } => index_command(
            &input,
            &Combination::parse(&key)?,
            parse_delimiter(delimiter.as_deref())?,
            chunk_rows,
            threads,
            limit,
            show,
            json,
        ),
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(get_config()?),
    }
}

/// Accept a single character or the names `tab` / `\t`
fn parse_delimiter(value: Option<&str>) -> Result<Option<char>> {
    let Some(value) = value else {
        return Ok(None);
    };
    match value {
        "tab" | "\\t" | "\t" => Ok(Some('\t')),
        other => {
            let mut chars = other.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(Some(c)),
                _ => bail!("Delimiter must be a single character, got '{other}'"),
            }
        }
    }
}

fn discover_command(config: &Config, request: &DiscoveryRequest, json: bool) -> Result<()> {
    let cache = RowCountCache::new();
    let spinner = (!json).then(|| create_spinner("Discovering key candidates..."));
    let report = KeyDiscovery::new(config, &cache).discover(request);
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }
    let report = report?;

    if json {
        println!("{}", JsonFormatter::format(&report)?);
    } else {
        PrettyPrinter::print_discovery(&report);
    }
    Ok(())
}

fn compare_command(config: &Config, request: &ComparisonRequest, json: bool) -> Result<()> {
    let cache = RowCountCache::new();
    let reporter = ProgressReporter::new(!json);
    let progress = |stage: ComparisonStage, rows: u64| reporter.update(stage, rows);
    let report = KeyComparison::new(config, &cache)
        .with_progress(&progress)
        .run(request);
    reporter.finish();
    let report = report?;

    if json {
        println!("{}", JsonFormatter::format(&report)?);
    } else {
        PrettyPrinter::print_comparison(&report);
    }
    Ok(())
}

fn page_command(path: &Path, category: CategoryArg, offset: u64, limit: usize, json: bool) -> Result<()> {
    let page = if path.is_dir() {
        let registry = ManifestRegistry::load(path)
            .with_context(|| format!("No readable manifest in {}", path.display()))?;
        read_category_page(&registry.chunks(category.into()), offset, limit)?
    } else {
        read_page(path, offset, limit)?
    };

    if json {
        println!("{}", JsonFormatter::format(&page)?);
    } else {
        PrettyPrinter::print_page(&page, offset);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn index_command(
    input: &Path,
    combination: &Combination,
    delimiter: Option<char>,
    chunk_rows: usize,
    threads: Option<usize>,
    limit: Option<u64>,
    show: usize,
    json: bool,
) -> Result<()> {
    let reader = SourceReader::open(input, delimiter)?;
    let (indices, chunks) = load_chunks(&reader, combination, chunk_rows, limit)?;
    let indexer = match threads {
        Some(n) => ParallelHashIndexer::with_threads(n)?,
        None => ParallelHashIndexer::new()?,
    };
    log::info!(
        "Indexing {} chunks of {} on {} workers",
        chunks.len(),
        input.display(),
        indexer.threads()
    );
    let index = indexer.build(chunks, &indices);
    let groups = index.duplicate_groups();

    if json {
        println!("{}", JsonFormatter::format_index(&index, &groups)?);
    } else {
        PrettyPrinter::print_index(&index, &groups, show);
    }
    Ok(())
}
