//! `dota` command-line entry point.
//!
//! - `download`: fetch a DOTA split from Google Drive and lay it out on disk
//! - `inspect`: import a dataset directory and print a summary

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dota_importer::{
    download_dota_dataset, DotaDetectionDatasetImporter, ImportExecutor, ImporterOptions, Split,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "dota")]
#[command(about = "Download and inspect DOTA aerial object-detection datasets")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download a split into a dataset directory
    Download {
        /// Directory in which to construct the split
        #[arg(long, env = "DOTA_DATASET_DIR")]
        dataset_dir: PathBuf,

        /// Split to download (train, val)
        #[arg(long, default_value = "train")]
        split: Split,

        /// Where to keep downloaded archives (default: <dataset_dir>/scratch)
        #[arg(long, env = "DOTA_SCRATCH_DIR")]
        scratch_dir: Option<PathBuf>,

        /// Delete archives once extracted
        #[arg(long)]
        cleanup: bool,
    },

    /// Import a dataset directory and summarize it
    Inspect(InspectArgs),
}

#[derive(Args, Debug)]
struct InspectArgs {
    #[arg(long, env = "DOTA_DATASET_DIR")]
    dataset_dir: Option<PathBuf>,

    /// Media folder, absolute directory or JSON manifest
    #[arg(long)]
    data_path: Option<PathBuf>,

    /// Label folder
    #[arg(long)]
    labels_path: Option<PathBuf>,

    /// Also emit images without a label file
    #[arg(long)]
    include_all_data: bool,

    #[arg(long)]
    shuffle: bool,

    #[arg(long)]
    seed: Option<u64>,

    #[arg(long)]
    max_samples: Option<usize>,

    /// Print every sample as a JSON line instead of a summary
    #[arg(long)]
    json: bool,
}

impl From<&InspectArgs> for ImporterOptions {
    fn from(args: &InspectArgs) -> Self {
        ImporterOptions {
            dataset_dir: args.dataset_dir.clone(),
            data_path: args.data_path.clone(),
            labels_path: args.labels_path.clone(),
            data_map: None,
            include_all_data: args.include_all_data,
            shuffle: args.shuffle,
            seed: args.seed,
            max_samples: args.max_samples,
        }
    }
}

async fn inspect(args: InspectArgs) -> Result<()> {
    let importer = DotaDetectionDatasetImporter::new(ImporterOptions::from(&args))?;
    let batch = ImportExecutor::new()
        .execute(importer)
        .await
        .context("Failed to import dataset")?;

    if args.json {
        for sample in &batch.samples {
            println!("{}", serde_json::to_string(sample)?);
        }
        return Ok(());
    }

    println!("{}", serde_json::to_string_pretty(&batch.stats)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Download {
            dataset_dir,
            split,
            scratch_dir,
            cleanup,
        } => {
            info!("Downloading DOTA {} split to {}", split, dataset_dir.display());
            let info = download_dota_dataset(&dataset_dir, split, scratch_dir.as_deref(), cleanup)
                .await
                .with_context(|| format!("Failed to download {} split", split))?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Command::Inspect(args) => inspect(args).await?,
    }

    Ok(())
}
