//! Command-line entry point.
//!
//! ```bash
//! halo-analyzer run                       # analysis loop until Ctrl-C
//! halo-analyzer summary --channel 3       # archive statistics
//! halo-analyzer check-config --config config/halo.toml
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};

use halo_core::config::DEFAULT_CONFIG_PATH;
use halo_core::{HaloConfig, ResponseType};
use halo_pipeline::{AnalysisPipeline, LoopbackProcessor};
use halo_storage::{latest_for_channel, scan_archive, DetectionSummary, PartitionReader};

#[derive(Parser)]
#[command(name = "halo-analyzer")]
#[command(about = "Neural response analysis and archive review", long_about = None)]
struct Cli {
    /// Configuration file (TOML), overridden by HALO_* variables
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the analysis loop with the loopback processor until Ctrl-C
    Run,

    /// Summarise every partition in the archive
    Summary {
        /// Archive root, defaults to storage.root_dir
        #[arg(long)]
        root: Option<PathBuf>,

        /// List the latest detections on this channel
        #[arg(long)]
        channel: Option<usize>,

        /// How many detections to list
        #[arg(long, default_value_t = 10)]
        latest: usize,
    },

    /// Validate and print the effective configuration
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = HaloConfig::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    config.validate()?;
    halo_core::logging::init_from_config(&config)?;

    match cli.command {
        Commands::Run => run(&config).await,
        Commands::Summary {
            root,
            channel,
            latest,
        } => summary(&config, root, channel, latest),
        Commands::CheckConfig => {
            println!("{config:#?}");
            Ok(())
        }
    }
}

async fn run(config: &HaloConfig) -> Result<()> {
    let pipeline = AnalysisPipeline::from_config(config, LoopbackProcessor::new())
        .context("starting analysis pipeline")?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut task = tokio::spawn(pipeline.run(shutdown_rx));

    let stats = tokio::select! {
        joined = &mut task => joined??,
        _ = signal::ctrl_c() => {
            info!("Shutdown requested");
            shutdown_tx.send_replace(true);
            task.await??
        }
    };

    println!(
        "blocks={} rows={} processor_errors={} storage_errors={} dropped_blocks={}",
        stats.blocks,
        stats.rows_logged,
        stats.processor_errors,
        stats.storage_errors,
        stats.poller.dropped
    );
    Ok(())
}

fn summary(
    config: &HaloConfig,
    root: Option<PathBuf>,
    channel: Option<usize>,
    latest: usize,
) -> Result<()> {
    let root = root.unwrap_or_else(|| config.storage.root_dir.clone());
    let entries = scan_archive(&root)?;
    let thresholds = config.classifier.thresholds();

    let mut rows = Vec::new();
    for entry in &entries {
        match PartitionReader::open(&entry.path) {
            Ok(reader) => rows.extend(reader.with_thresholds(thresholds).read_all_rows()),
            Err(e) => warn!(path = %entry.path.display(), error = %e, "Skipping unreadable partition"),
        }
    }
    let summary = DetectionSummary::from_rows(&rows, &Local);

    println!(
        "{}: {} partitions, {} rows",
        root.display(),
        entries.len(),
        summary.total_rows
    );
    for response_type in ResponseType::ALL {
        println!("  {:<20} {}", response_type.label(), summary.count(response_type));
    }
    for (date, count) in &summary.seizures_per_day {
        println!("  seizures {date}: {count}");
    }

    if let Some(channel) = channel {
        println!("Latest detections on channel {channel}:");
        for row in latest_for_channel(&rows, channel, latest) {
            println!(
                "  {} {:<20} {}",
                row.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
                row.response_type.label(),
                row.description
            );
        }
    }
    Ok(())
}
