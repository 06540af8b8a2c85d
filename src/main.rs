//! Modharvest main entry point
//!
//! Three subcommands mirror the pipeline stages: `crawl` produces per-catalog
//! partition files, `merge` combines overlapping partitions, and `import`
//! loads merged output into the SQLite store.

use anyhow::{bail, Context};
use clap::{ArgAction, Parser, Subcommand};
use modharvest::config::{load_config_with_hash, validate, Config};
use modharvest::crawler::run_harvest;
use modharvest::import::{run_import, ImportOptions};
use modharvest::output::{find_partitions, merge_partitions, slugify};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Session-scoped mod catalog harvester
#[derive(Parser, Debug)]
#[command(name = "modharvest")]
#[command(version)]
#[command(about = "Session-scoped mod catalog harvester", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl configured catalogs into per-catalog partition files
    Crawl {
        /// Path to TOML configuration file
        #[arg(value_name = "CONFIG")]
        config: PathBuf,

        /// Override catalog ids, comma-separated ("181,182,183")
        #[arg(long, value_name = "IDS")]
        catalog_ids: Option<String>,

        /// Override the inclusive catalog id range ("180-185")
        #[arg(long, value_name = "RANGE")]
        catalog_range: Option<String>,

        /// Crawl only these list pages ("1-5"); partition files carry the
        /// page segment so overlapping runs can be merged later
        #[arg(long, value_name = "RANGE")]
        pages: Option<String>,
    },

    /// Merge overlapping partition files, deduplicating by resource id
    Merge {
        /// Partition files to merge (alternative to --catalog)
        #[arg(value_name = "FILES")]
        files: Vec<PathBuf>,

        /// Merge all partition files of this catalog id
        #[arg(long, value_name = "ID")]
        catalog: Option<u32>,

        /// Directory scanned when using --catalog
        #[arg(long, default_value = "per_catalog_output")]
        directory: PathBuf,

        /// File name prefix used when scanning
        #[arg(long, default_value = "catalog")]
        prefix: String,

        /// Output file path
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// Import merged partitions into the SQLite store
    Import {
        /// File pattern ("out/catalog_182_*.jsonl") or a literal path
        #[arg(value_name = "PATTERN")]
        pattern: String,

        /// SQLite database path
        #[arg(long, env = "HARVEST_DB", value_name = "PATH")]
        database: PathBuf,

        /// Records per transaction commit
        #[arg(long, env = "IMPORT_BATCH_SIZE", default_value_t = 200)]
        batch_size: usize,

        /// Delete all existing rows before importing (destructive)
        #[arg(long, env = "FULL_REPLACE", action = ArgAction::SetTrue)]
        full_replace: bool,

        /// Remove source files after a successful import
        #[arg(long, env = "CLEANUP", default_value_t = true, action = ArgAction::Set, value_name = "BOOL")]
        cleanup: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    match cli.command {
        Command::Crawl {
            config,
            catalog_ids,
            catalog_range,
            pages,
        } => handle_crawl(config, catalog_ids, catalog_range, pages).await,
        Command::Merge {
            files,
            catalog,
            directory,
            prefix,
            output,
        } => handle_merge(files, catalog, directory, prefix, output),
        Command::Import {
            pattern,
            database,
            batch_size,
            full_replace,
            cleanup,
        } => handle_import(pattern, database, batch_size, full_replace, cleanup),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("modharvest=info,warn"),
            1 => EnvFilter::new("modharvest=debug,info"),
            2 => EnvFilter::new("modharvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Applies CLI overrides on top of the loaded configuration
fn apply_overrides(
    config: &mut Config,
    catalog_ids: Option<String>,
    catalog_range: Option<String>,
    pages: Option<String>,
) -> anyhow::Result<()> {
    if let Some(ids) = catalog_ids {
        let parsed: Vec<u32> = ids
            .split(',')
            .map(|part| {
                part.trim()
                    .parse()
                    .with_context(|| format!("Invalid catalog id: {}", part))
            })
            .collect::<anyhow::Result<_>>()?;
        config.harvest.catalog_ids = parsed;
        config.harvest.catalog_range = None;
    }

    if let Some(range) = catalog_range {
        config.harvest.catalog_range = Some(range);
    }

    if let Some(range) = pages {
        config.harvest.page_range = Some(range);
    }

    validate(config).context("Configuration invalid after applying overrides")?;
    Ok(())
}

/// Handles the crawl subcommand
async fn handle_crawl(
    config_path: PathBuf,
    catalog_ids: Option<String>,
    catalog_range: Option<String>,
    pages: Option<String>,
) -> anyhow::Result<()> {
    tracing::info!("Loading configuration from: {}", config_path.display());
    let (mut config, config_hash) = load_config_with_hash(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    tracing::info!("Configuration loaded (hash: {})", config_hash);

    apply_overrides(&mut config, catalog_ids, catalog_range, pages)?;

    let targets = config.harvest.targets()?;
    tracing::info!(
        "Target catalogs: {:?}",
        targets.iter().map(|t| t.catalog_id).collect::<Vec<_>>()
    );

    let (report, summaries) = run_harvest(config).await?;

    println!("Harvest complete:");
    println!("  records emitted:  {}", report.emitted);
    println!("  degraded records: {}", report.degraded);
    if report.abandoned > 0 {
        println!("  abandoned:        {}", report.abandoned);
    }
    for summary in &summaries {
        println!(
            "  catalog {} ({}): {} records, {} bytes -> {}",
            summary.catalog_id,
            summary.catalog_name,
            summary.records,
            summary.bytes,
            summary.path.display()
        );
    }

    Ok(())
}

/// Handles the merge subcommand
fn handle_merge(
    files: Vec<PathBuf>,
    catalog: Option<u32>,
    directory: PathBuf,
    prefix: String,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let inputs = if !files.is_empty() {
        files
    } else if let Some(catalog_id) = catalog {
        find_partitions(&directory, &prefix, catalog_id)?
    } else {
        bail!("Provide partition files or --catalog <ID>");
    };

    let output = output.unwrap_or_else(|| {
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let stem = match catalog {
            Some(id) => format!("{}_{}_merged_{}", slugify(&prefix), id, timestamp),
            None => format!("{}_merged_{}", slugify(&prefix), timestamp),
        };
        directory.join(format!("{}.jsonl", stem))
    });

    let report = merge_partitions(&inputs, &output)?;

    println!("Merge complete:");
    println!("  files:      {}", report.files);
    println!("  records:    {}", report.written);
    println!("  duplicates: {}", report.duplicates);
    println!("  malformed:  {}", report.malformed);
    println!("  output:     {}", output.display());

    Ok(())
}

/// Handles the import subcommand
fn handle_import(
    pattern: String,
    database: PathBuf,
    batch_size: usize,
    full_replace: bool,
    cleanup: bool,
) -> anyhow::Result<()> {
    if full_replace {
        tracing::warn!("Full-replace mode: all existing rows will be deleted before import");
    }

    let options = ImportOptions {
        batch_size,
        full_replace,
        cleanup,
    };

    let report = run_import(&database, &pattern, &options)
        .with_context(|| format!("Import into {} failed", database.display()))?;

    println!("Import complete:");
    println!("  files:    {}", report.files);
    println!("  imported: {}", report.imported);
    println!("  skipped:  {}", report.skipped);
    println!("  failed:   {}", report.failed);

    Ok(())
}
