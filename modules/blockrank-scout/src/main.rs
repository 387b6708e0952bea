use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use blockrank_common::{Actor, Config, RecordFilter};
use blockrank_scout::store::PgRecordStore;
use blockrank_scout::{BatchSummary, BatchUpdater};

#[derive(Parser)]
#[command(name = "scout", about = "Refresh smart-block ranks for tracked keywords")]
struct Cli {
    /// Only refresh records with this id
    #[arg(long)]
    id: Option<String>,

    /// Only refresh records for this keyword
    #[arg(long)]
    keyword: Option<String>,

    /// Refresh at most this many records
    #[arg(long)]
    limit: Option<u32>,

    /// Print the outcome list as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("blockrank=info".parse()?))
        .init();

    let cli = Cli::parse();
    info!("Block rank scout starting...");

    let config = Config::from_env()?;
    config.log_redacted();

    let store = PgRecordStore::connect(&config.database_url).await?;
    store.migrate().await?;

    let updater = BatchUpdater::from_config(&config, Arc::new(store))?;
    let filter = RecordFilter {
        id: cli.id,
        keyword: cli.keyword,
        limit: cli.limit,
    };

    // A fatal session error propagates and exits non-zero.
    let outcomes = updater.refresh(&filter, &Actor::system()).await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&outcomes)?);
        return Ok(());
    }

    for o in &outcomes {
        let status = match (&o.error, o.rank) {
            (Some(e), _) => format!("failed: {e}"),
            (None, Some(rank)) => format!("rank {rank}"),
            (None, None) => "not exposed".to_string(),
        };
        let volume = o
            .search_volume
            .map(|v| v.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("{}\t{}\t{}\tvolume {}", o.id, o.keyword, status, volume);
    }

    let summary = BatchSummary::from_outcomes(&outcomes);
    println!(
        "{} records, {} succeeded, {} ranked",
        summary.total, summary.succeeded, summary.ranked
    );
    Ok(())
}
