//! Updater - Main entry point
//!
//! Verifies a deployment directory against the remote catalog and replaces
//! stale files.

use anyhow::{bail, Context, Result};
use clap::Parser;
use file_updater::{utils, Config, UpdateOutcome, Updater};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Deployment directory to verify and update
    #[arg(value_name = "BASE_DIR", value_parser = clap::builder::NonEmptyStringValueParser::new())]
    base_dir: String,

    /// Report what would change without touching any file
    #[arg(long)]
    dry: bool,

    /// Skip the catalog version check and evaluate every file
    #[arg(long, conflicts_with = "dry")]
    force: bool,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::from_env()?,
    };

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    let base_dir = PathBuf::from(&args.base_dir);
    if !base_dir.is_dir() {
        bail!("Base directory {} does not exist", base_dir.display());
    }

    tracing::info!(
        "Starting updater v{} for {}",
        env!("CARGO_PKG_VERSION"),
        base_dir.display()
    );

    let updater = Updater::new(&base_dir, &config)?;

    if args.dry {
        let summary = updater.dry_run().await?;
        println!("{} file(s) would be updated ({})", summary.files_would_update, summary);
        return Ok(());
    }

    if args.force {
        let summary = updater.check_and_update_files().await?;
        println!("{}", summary);
        return Ok(());
    }

    match updater.update_if_needed().await? {
        UpdateOutcome::UpToDate { version } => {
            println!("No update needed (version {})", version);
        }
        UpdateOutcome::Updated { from, to, summary } => {
            println!(
                "Updated {} -> {}: {}",
                from.as_deref().unwrap_or("unknown"),
                to.as_deref().unwrap_or("unknown"),
                summary
            );
        }
    }

    Ok(())
}
