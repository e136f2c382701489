//! Keepsake binary entry point
//!
//! Removes and inspects experiments and checkpoints by id prefix.

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Manage tracked experiments and checkpoints
#[derive(Parser)]
#[command(name = "keepsake", version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Where to find records
#[derive(Args, Debug, Clone)]
pub struct StorageArgs {
    /// Storage URL (e.g. 's3://my-bucket'); if omitted, uses the storage from keepsake.yaml
    #[arg(short = 'S', long = "storage-url", env = "KEEPSAKE_STORAGE_URL")]
    pub storage_url: Option<String>,

    /// Project directory to search for keepsake.yaml (default: current directory)
    #[arg(short = 'D', long = "source-dir")]
    pub source_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Remove experiments or checkpoints
    ///
    /// Pass any number of IDs or ID prefixes. Removing an experiment also
    /// removes its checkpoints.
    #[command(visible_alias = "delete")]
    Rm {
        /// Experiment or checkpoint IDs (or prefixes)
        #[arg(required = true)]
        ids: Vec<String>,

        #[command(flatten)]
        storage: StorageArgs,
    },

    /// Show an experiment or checkpoint as JSON
    Show {
        /// Experiment or checkpoint ID (or prefix)
        id: String,

        #[command(flatten)]
        storage: StorageArgs,
    },
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "keepsake=debug,project=debug,storage=debug"
    } else {
        "keepsake=info,project=info,storage=warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Rm { ids, storage } => commands::remove(&ids, &storage).await,
        Commands::Show { id, storage } => commands::show(&id, &storage).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
