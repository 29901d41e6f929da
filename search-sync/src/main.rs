//! Search Sync Main Entry Point
//!
//! Operator commands for the search indices and the background job worker.

use std::env;
use std::io;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use dotenv::dotenv;
use search_sync::commands::{delete_all_es_indices, migrate_search, sync_search, SyncReport};
use search_sync::tasks::{Worker, WorkerConfig};
use search_sync::{Dependencies, SearchSyncError, Settings};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "search-sync", version, about = "Manage search indices and run sync jobs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create missing indices and migrate apps whose mapping changed.
    #[command(name = "migrate_search")]
    MigrateSearch {
        /// App to migrate. Repeat for several; all apps when omitted.
        #[arg(long = "model")]
        models: Vec<String>,
    },
    /// Resync apps from the database.
    #[command(name = "sync_search")]
    SyncSearch {
        /// App to sync. Repeat for several; all apps when omitted.
        #[arg(long = "model")]
        models: Vec<String>,
        /// Sync in this process instead of scheduling jobs.
        #[arg(long)]
        foreground: bool,
        /// Rows per bulk request.
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Delete every index under the configured prefix.
    #[command(name = "delete_all_es_indices")]
    DeleteAllEsIndices {
        /// Do not ask for confirmation.
        #[arg(long)]
        noinput: bool,
    },
    /// Run the background job worker.
    Worker {
        /// Queue to take jobs from. Repeat for several; all queues when omitted.
        #[arg(long = "queue")]
        queues: Vec<String>,
    },
}

/// Initialize tracing/logging.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("search_sync=info,search_sync_repository=info"));

    let json = env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(true).pretty())
            .init();
    }

    info!(
        service_name = "search-sync",
        service_version = env!("CARGO_PKG_VERSION"),
        json,
        "Tracing initialized"
    );
}

async fn run(command: Command) -> Result<(), SearchSyncError> {
    let deps = Dependencies::new(Settings::from_env()).await?;
    let ctx = &deps.context;

    match command {
        Command::MigrateSearch { models } => {
            migrate_search(ctx, &models).await?;
        }
        Command::SyncSearch {
            models,
            foreground,
            batch_size,
        } => match sync_search(ctx, &models, foreground, batch_size).await? {
            SyncReport::Scheduled(ids) => info!(job_ids = ?ids, "Sync scheduled"),
            SyncReport::Synced(summaries) => {
                for (app, summary) in summaries {
                    info!(
                        app = %app,
                        rows_processed = summary.rows_processed,
                        objects_synced = summary.objects_synced,
                        "Sync finished"
                    );
                }
            }
        },
        Command::DeleteAllEsIndices { noinput } => {
            let stdin = io::stdin();
            delete_all_es_indices(ctx, noinput, &mut stdin.lock(), &mut io::stdout()).await?;
        }
        Command::Worker { queues } => {
            let mut config = WorkerConfig {
                poll_interval: deps.settings.worker_poll_interval,
                ..WorkerConfig::default()
            };
            if !queues.is_empty() {
                config.queues = queues;
            }
            Worker::new(ctx.clone(), deps.job_store.clone(), config)
                .run()
                .await?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    let cli = Cli::parse();
    init_tracing();

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
