//! CNES CLI: build curated and aggregated tables from raw CNES extracts.
//!
//! Commands:
//! - `list`: registered tables, their tier and dependencies
//! - `build`: build every curated table for one period
//! - `build-range`: `build` for each period of an inclusive range
//! - `aggregate`: rebuild aggregated tables from all curated periods
//! - `partitions`: discovered objects of a table
//! - `sources`: raw extracts present for a period, and which are missing

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cnes_core::tables::default_registry;
use cnes_core::{list_partitions, LocalStorage, Period, TableKind, TableRegistry, Tier};
use cnes_runner::{
    build_aggregated, build_period, build_period_range, check_sources, FullLoadOptions,
    FullLoadReport, IncrementalOptions, IncrementalReport, PipelineConfig, RunReport,
};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "cnes",
    about = "CNES table builder: raw extracts to curated and aggregated tiers"
)]
struct Cli {
    /// Path to a TOML config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Storage root (one directory per tier). Overrides the config file.
    #[arg(long, global = true)]
    storage_root: Option<PathBuf>,

    /// Write the JSON run report to this file.
    #[arg(long, global = true)]
    report: Option<PathBuf>,

    /// Raise log verbosity (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered tables.
    List,
    /// Build curated tables for one period.
    Build {
        /// Period (YYYYMM). Defaults to `months_back` months before today.
        #[arg(long)]
        period: Option<Period>,

        /// Tables to build, comma separated (dependencies are added).
        #[arg(long, value_delimiter = ',')]
        tables: Vec<String>,

        /// Build and report without writing.
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Build curated tables for every period from --from to --to.
    BuildRange {
        /// First period (YYYYMM).
        #[arg(long)]
        from: Period,

        /// Last period (YYYYMM), inclusive.
        #[arg(long)]
        to: Period,

        /// Tables to build, comma separated (dependencies are added).
        #[arg(long, value_delimiter = ',')]
        tables: Vec<String>,

        /// Build and report without writing.
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Rebuild aggregated tables from every curated period.
    Aggregate {
        /// Tables to rebuild, comma separated. Defaults to all.
        #[arg(long, value_delimiter = ',')]
        tables: Vec<String>,

        /// Build and report without writing.
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Show the objects discovered for a table.
    Partitions {
        /// Table name.
        table: String,

        /// Tier to inspect: curated or aggregated.
        #[arg(long, default_value = "curated")]
        tier: Tier,
    },
    /// Check the raw extracts of one period against what the tables read.
    Sources {
        /// Period (YYYYMM). Defaults to `months_back` months before today.
        #[arg(long)]
        period: Option<Period>,

        /// Only check the sources of these tables (and their dependencies).
        #[arg(long, value_delimiter = ',')]
        tables: Vec<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(root) = &cli.storage_root {
        config.storage_root = root.clone();
    }

    let registry =
        default_registry(config.reference.clone()).context("table registry is misconfigured")?;
    let storage = LocalStorage::new(&config.storage_root);
    info!(root = %config.storage_root.display(), tables = registry.len(), "storage ready");
    let mut report = RunReport::default();

    match cli.command {
        Commands::List => run_list(&registry),
        Commands::Build {
            period,
            tables,
            dry_run,
        } => {
            let period =
                period.unwrap_or_else(|| config.default_period(chrono::Local::now().date_naive()));
            let options = IncrementalOptions {
                tables: targets(tables, &config.curated_tables),
                dry_run,
            };
            let result = build_period(&registry, &storage, period, options)
                .with_context(|| format!("building period {period}"))?;
            print_incremental(&result);
            report.incremental.push(result);
        }
        Commands::BuildRange {
            from,
            to,
            tables,
            dry_run,
        } => {
            let options = IncrementalOptions {
                tables: targets(tables, &config.curated_tables),
                dry_run,
            };
            let results = build_period_range(&registry, &storage, from, to, options)
                .with_context(|| format!("building periods {from}..={to}"))?;
            for result in &results {
                print_incremental(result);
            }
            report.incremental = results;
        }
        Commands::Aggregate { tables, dry_run } => {
            let options = FullLoadOptions {
                tables: targets(tables, &config.aggregated_tables),
                dry_run,
            };
            let result = build_aggregated(&registry, &storage, options)
                .context("building aggregated tables")?;
            print_full_load(&result);
            report.full_load = Some(result);
        }
        Commands::Partitions { table, tier } => {
            registry.get(&table)?;
            let parts = list_partitions(&storage, tier, &table)
                .with_context(|| format!("listing {tier} objects of {table}"))?;
            if parts.is_empty() {
                println!("no {tier} objects for '{table}'");
            }
            for part in parts {
                match part.period {
                    Some(period) => println!("{period}  {}", part.path),
                    None => println!("-       {}", part.path),
                }
            }
        }
        Commands::Sources { period, tables } => {
            let period =
                period.unwrap_or_else(|| config.default_period(chrono::Local::now().date_naive()));
            let options = IncrementalOptions {
                tables: targets(tables, &config.curated_tables),
                dry_run: true,
            };
            let check = check_sources(&registry, &storage, period, options)
                .with_context(|| format!("checking raw extracts of {period}"))?;
            println!("period {period}: {} extract(s) present", check.available.len());
            for name in &check.available {
                println!("  {name}");
            }
            if !check.is_complete() {
                println!("missing: {}", check.missing.join(", "));
                anyhow::bail!("{} raw extract(s) missing for {period}", check.missing.len());
            }
        }
    }

    if let Some(path) = &cli.report {
        report
            .write_json(path)
            .with_context(|| format!("writing report {}", path.display()))?;
        println!("report written to {}", path.display());
    }
    Ok(())
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();
}

/// Command-line tables win over the config file; neither means "all".
fn targets(cli: Vec<String>, configured: &Option<Vec<String>>) -> Option<Vec<String>> {
    if cli.is_empty() {
        configured.clone()
    } else {
        Some(cli)
    }
}

fn run_list(registry: &TableRegistry) {
    println!("{:<32} {:<11} {:<12} DEPENDENCIES", "TABLE", "TIER", "KIND");
    for def in registry.iter() {
        let kind = match def.kind() {
            TableKind::Incremental(_) => "incremental",
            TableKind::FullLoad(_) => "full-load",
        };
        let deps = if def.dependencies().is_empty() {
            "-".to_string()
        } else {
            def.dependencies().join(", ")
        };
        println!(
            "{:<32} {:<11} {:<12} {}",
            def.name(),
            def.tier().to_string(),
            kind,
            deps
        );
    }
}

fn print_incremental(report: &IncrementalReport) {
    let mode = if report.dry_run { " (dry run)" } else { "" };
    println!("period {}{mode}", report.period);
    for t in &report.tables {
        print!("  {:<32} {:>9} rows", t.table, t.rows);
        if t.duplicates_dropped > 0 {
            print!("  {} duplicate(s) dropped", t.duplicates_dropped);
        }
        match &t.object {
            Some(obj) => println!("  -> {} [{}]", obj.path, &obj.content_hash[..12]),
            None => println!(),
        }
    }
    println!("  {} row(s) in {} table(s)", report.rows_written(), report.tables.len());
}

fn print_full_load(report: &FullLoadReport) {
    let mode = if report.dry_run { " (dry run)" } else { "" };
    println!("aggregated tables{mode}");
    for t in &report.tables {
        print!(
            "  {:<32} {:>9} rows  {} partition(s)",
            t.table, t.rows, t.partitions_read
        );
        if !t.skipped_partitions.is_empty() {
            print!("  {} skipped", t.skipped_partitions.len());
        }
        if t.reference_misses > 0 {
            print!("  {} without population", t.reference_misses);
        }
        match &t.object {
            Some(obj) => println!("  -> {} [{}]", obj.path, &obj.content_hash[..12]),
            None => println!(),
        }
    }
}
