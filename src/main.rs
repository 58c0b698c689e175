//! # Crypto News Scraper
//!
//! Scrapes recent articles from CoinTelegraph, CoinDesk and CryptoSlate,
//! writes them as a JSON snapshot, and ranks authors and topics.
//!
//! ## Usage
//!
//! ```sh
//! crypto_news_scraper scrape -c config.yaml -o data/latest.json
//! crypto_news_scraper rank --hours 24
//! ```
//!
//! A run that cannot persist its snapshot exits non-zero; failures of
//! individual sources are logged and leave the other sources untouched.

use clap::Parser;
use crypto_news_scraper::merge::filter_window;
use crypto_news_scraper::outputs::json::read_snapshot;
use crypto_news_scraper::rank::Rankings;
use crypto_news_scraper::utils::ensure_writable_dir;
use crypto_news_scraper::{Pipeline, Settings};
use chrono::Utc;
use std::error::Error;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;

use cli::{Cli, Command, RankArgs, ScrapeArgs};

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    let start_time = std::time::Instant::now();
    info!("crypto_news_scraper starting up");

    let command = Cli::parse().into_command();
    debug!(?command, "Parsed CLI arguments");

    match command {
        Command::Scrape(args) => scrape(args).await?,
        Command::Rank(args) => rank(args).await?,
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    Ok(())
}

async fn scrape(args: ScrapeArgs) -> Result<(), Box<dyn Error>> {
    let mut settings = Settings::load(args.config.as_deref()).await?;
    if let Some(path) = args.snapshot {
        settings.snapshot_path = path;
    }
    if let Some(hours) = args.hours_back {
        settings.set_hours_back(hours);
    }
    if let Some(pages) = args.max_pages {
        settings.set_max_pages(pages);
    }
    settings.validate()?;

    // Early check: ensure the snapshot directory is writable
    if let Some(dir) = settings
        .snapshot_path
        .parent()
        .filter(|d| !d.as_os_str().is_empty())
    {
        if let Err(e) = ensure_writable_dir(dir).await {
            error!(
                path = %dir.display(),
                error = %e,
                "Snapshot directory is not writable (fix perms or choose a different path)"
            );
            return Err(e);
        }
    }

    let pipeline = Pipeline::new(&settings)?;
    info!(sources = ?pipeline.source_ids(), path = %pipeline.snapshot_path().display(), "Pipeline ready");

    let report = match settings.run_timeout {
        Some(limit) => match tokio::time::timeout(limit, pipeline.run()).await {
            Ok(res) => res?,
            Err(_) => {
                error!(?limit, "Run exceeded its time limit; snapshot not updated");
                return Err(format!("run timed out after {limit:?}").into());
            }
        },
        None => pipeline.run().await?,
    };

    for source in &report.sources {
        if let Some(err) = &source.listing_error {
            warn!(source = %source.source, error = %err, "Source listing ended early");
        }
        info!(
            source = %source.source,
            pages = source.pages_fetched,
            listed = source.listed,
            parse_failures = source.parse_failures,
            retries = source.retries,
            stop = ?source.stop,
            enriched = source.enriched,
            enrich_failed = source.enrich_failed,
            kept = source.kept,
            "Source summary"
        );
    }

    let rankings = Rankings::compute(&report.articles, &settings.topic_keywords, false);
    for item in rankings.authors.iter().take(5) {
        info!(author = %item.name, count = item.count, "Top author");
    }
    for item in rankings.topics.iter().take(5) {
        info!(topic = %item.name, count = item.count, "Top topic");
    }

    if args.print_rankings {
        println!("{}", serde_json::to_string_pretty(&rankings)?);
    }
    Ok(())
}

async fn rank(args: RankArgs) -> Result<(), Box<dyn Error>> {
    let settings = Settings::load(args.config.as_deref()).await?;
    let articles = read_snapshot(&args.snapshot).await?;
    let recent = filter_window(&articles, args.hours, Utc::now());
    info!(
        total = articles.len(),
        recent = recent.len(),
        hours = args.hours,
        "Ranking snapshot"
    );

    let rankings = Rankings::compute(&recent, &settings.topic_keywords, args.sorted_names);
    println!("{}", serde_json::to_string_pretty(&rankings)?);
    Ok(())
}
