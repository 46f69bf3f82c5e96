use std::sync::Arc;

use anyhow::Context;
use bank::{
    seed::seed_catalog,
    store::{Database, RedisStore},
};
use clap::Parser;
use process::{progress_bar, seed_surveys};
use rand::thread_rng;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Store to seed.
    #[arg(long, default_value = "redis://localhost:6379")]
    redis_url: String,

    /// Seed a throwaway in-memory store instead, to check the catalog loads.
    #[arg(long)]
    memory: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let db = if args.memory {
        Database::memory()
    } else {
        let store = RedisStore::connect(&args.redis_url)
            .await
            .with_context(|| format!("Failed to connect to {}", args.redis_url))?;
        Database::new(Arc::new(store))
    };

    let surveys = seed_catalog(&mut thread_rng()).context("Bundled catalog is malformed")?;
    println!("Loaded Surveys: {}\n", surveys.len());

    let pb = progress_bar(surveys.len());
    let report = seed_surveys(&db, surveys, &pb).await?;

    println!("\nAdded: {}", report.added);
    println!("Updated: {}", report.updated);

    Ok(())
}
