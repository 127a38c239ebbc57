use std::sync::Arc;

use anyhow::Result;
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use nekretnine_storage::{ListingStore, MemoryListingStore};
use nekretnine_sync::{
    build_ingestion_job, build_notification_job, connect_store, page_index_for, preview_unvisited,
    run_scheduler_from_env, SyncConfig,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "nekretnine-cli")]
#[command(about = "Nekretnine listing scraper and notifier")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Scrape one listings page and store today's listings.
    Ingest {
        /// Page index to fetch; defaults to the current minute modulo the page count.
        #[arg(long)]
        page: Option<u32>,
        /// Posting date to keep (YYYY-MM-DD); defaults to today.
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Use an in-memory store instead of the database.
        #[arg(long)]
        dry_run: bool,
    },
    /// Deliver unvisited listings and mark them visited.
    Notify {
        /// Print the pending messages without sending or marking anything.
        #[arg(long)]
        dry_run: bool,
    },
    Migrate,
    Schedule,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Ingest {
        page: None,
        date: None,
        dry_run: false,
    });

    match command {
        Commands::Ingest {
            page,
            date,
            dry_run,
        } => {
            let config = SyncConfig::from_env();
            let store: Arc<dyn ListingStore> = if dry_run {
                Arc::new(MemoryListingStore::new())
            } else {
                Arc::new(connect_store(&config).await?)
            };
            let job = build_ingestion_job(&config, store)?;
            let now = Local::now();
            let page_index = page.unwrap_or_else(|| page_index_for(&now, config.page_count));
            let summary = job
                .run(page_index, date.unwrap_or_else(|| now.date_naive()))
                .await?;
            if dry_run {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!(
                    "ingest complete: run_id={} page={} extracted={} excluded={} inserted={}",
                    summary.run_id,
                    summary.page_index,
                    summary.cards_extracted,
                    summary.excluded_by_location,
                    summary.inserted
                );
            }
        }
        Commands::Notify { dry_run } => {
            let config = SyncConfig::from_env();
            let store: Arc<dyn ListingStore> = Arc::new(connect_store(&config).await?);
            if dry_run {
                let messages = preview_unvisited(store.as_ref(), &config.unvisited_query()).await?;
                for message in &messages {
                    print!("{message}");
                }
                println!("{} listing(s) pending", messages.len());
            } else {
                let summary = build_notification_job(&config, store)?.run().await?;
                println!(
                    "notify complete: run_id={} pending={} delivered={}",
                    summary.run_id, summary.pending, summary.delivered
                );
            }
        }
        Commands::Migrate => {
            let config = SyncConfig::from_env();
            connect_store(&config).await?.migrate().await?;
            println!("migrations applied");
        }
        Commands::Schedule => {
            run_scheduler_from_env().await?;
        }
    }

    Ok(())
}
