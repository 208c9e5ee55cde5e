//! Sumi-Fetch main entry point
//!
//! This is the command-line interface for the Sumi-Fetch polite fetcher.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use sumi_fetch::config::{load_config_with_hash, partition_range, validate, Config};
use sumi_fetch::partition::{equal_weights, HashRange};
use tracing_subscriber::EnvFilter;

/// Sumi-Fetch: polite, partitionable fetching
///
/// Sumi-Fetch reads work items (one per line), fetches them at high
/// concurrency while keeping every single host at a polite request rate,
/// and writes the responses to an XML envelope. Items it has to give up on
/// are appended to a requeue file for a later run.
#[derive(Parser, Debug)]
#[command(name = "sumi-fetch")]
#[command(version)]
#[command(about = "A polite, partitionable fetcher", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (defaults apply when omitted)
    #[arg(value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Read work items from this file instead of stdin
    #[arg(short, long, value_name = "PATH")]
    input: Option<String>,

    /// Write the output envelope to this file instead of stdout
    #[arg(short, long, value_name = "PATH")]
    output: Option<String>,

    /// Append rejected and out-of-partition items to this file
    #[arg(short, long, value_name = "PATH")]
    requeue: Option<String>,

    /// Input holds one bare URI per line
    #[arg(long)]
    raw: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and print the effective settings without fetching
    #[arg(long, conflicts_with_all = ["split", "parts"])]
    dry_run: bool,

    /// Split the partition by comma-separated weights (e.g. 0.5,0.25,0.25) and exit
    #[arg(long, value_name = "WEIGHTS", value_delimiter = ',', conflicts_with = "parts")]
    split: Option<Vec<f64>>,

    /// Split the partition into N equal parts and exit
    #[arg(long, value_name = "N")]
    parts: Option<usize>,
}

impl Cli {
    /// Applies command-line overrides on top of the file configuration
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(input) = &self.input {
            config.io.input_path = Some(input.clone());
        }
        if let Some(output) = &self.output {
            config.io.output_path = Some(output.clone());
        }
        if let Some(requeue) = &self.requeue {
            config.io.requeue_path = Some(requeue.clone());
        }
        if self.raw {
            config.io.raw_input = true;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            config
        }
        None => {
            tracing::info!("No configuration file given, using defaults");
            Config::default()
        }
    };
    cli.apply_overrides(&mut config);
    validate(&config).context("Invalid configuration")?;

    if let Some(weights) = &cli.split {
        handle_split(&config, weights)
    } else if let Some(parts) = cli.parts {
        handle_split(&config, &equal_weights(parts))
    } else if cli.dry_run {
        handle_dry_run(&config)
    } else {
        handle_fetch(&config).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// Logs go to stderr; stdout may carry the output envelope.
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_fetch=info,warn"),
            1 => EnvFilter::new("sumi_fetch=debug,info"),
            2 => EnvFilter::new("sumi_fetch=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn configured_range(config: &Config) -> anyhow::Result<HashRange> {
    Ok(match &config.partition {
        Some(partition) => partition_range(partition)?,
        None => HashRange::full(),
    })
}

/// Handles --split/--parts: prints the sub-ranges for node assignment
fn handle_split(config: &Config, weights: &[f64]) -> anyhow::Result<()> {
    let range = configured_range(config)?;
    let parts = range
        .split(weights)
        .with_context(|| format!("Cannot split {} by {:?}", range, weights))?;

    println!("# Splitting {} ({} parts)", range, parts.len());
    for (i, (part, weight)) in parts.iter().zip(weights).enumerate() {
        println!("[partition]  # node {} ({:.2}%)", i, weight * 100.0);
        println!("min = \"{}\"", part.min());
        println!("max = \"{}\"", part.max());
        println!();
    }
    Ok(())
}

/// Handles the --dry-run mode: prints the effective configuration
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== Sumi-Fetch Dry Run ===\n");

    println!("Fetcher Configuration:");
    println!(
        "  Max concurrent fetches: {}",
        config.fetcher.max_concurrent_fetches
    );
    println!("  Pressure threshold: {}", config.fetcher.pressure_threshold);
    println!("  Valve wait: {}ms", config.fetcher.valve_wait_ms);

    println!("\nPoliteness:");
    println!(
        "  Minimum fetch interval: {}ms",
        config.politeness.min_fetch_interval_ms
    );
    println!(
        "  Host cache capacity: {}",
        config.politeness.host_cache_capacity
    );
    println!(
        "  Max crawl delay: {}ms",
        config.politeness.max_crawl_delay_ms
    );

    println!("\nUser Agent:");
    println!("  {}", config.user_agent.header_value());

    println!("\nStreams:");
    println!(
        "  Input: {} ({})",
        config.io.input_path.as_deref().unwrap_or("<stdin>"),
        if config.io.raw_input { "raw" } else { "structured" }
    );
    println!(
        "  Output: {}",
        config.io.output_path.as_deref().unwrap_or("<stdout>")
    );
    println!(
        "  Requeue: {}",
        config.io.requeue_path.as_deref().unwrap_or("<disabled>")
    );

    let range = configured_range(config)?;
    println!("\nPartition:");
    println!("  {} ({:.4}% of keyspace)", range, range.coverage_ratio() * 100.0);

    println!("\n✓ Configuration is valid");
    Ok(())
}

/// Handles the main fetch operation
async fn handle_fetch(config: &Config) -> anyhow::Result<()> {
    tracing::info!("Starting fetch loop as {}", config.user_agent.header_value());

    let summary = sumi_fetch::crawler::run(config)
        .await
        .context("Fetch run failed")?;

    tracing::info!(
        "Done: {} read, {} skipped, {} out of partition, {} robots denied, {} requeued",
        summary.read,
        summary.skipped,
        summary.out_of_partition,
        summary.robots_denied,
        summary.requeued
    );
    Ok(())
}
