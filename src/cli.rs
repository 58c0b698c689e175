//! Command-line interface definitions.
//!
//! Running without a subcommand is the same as `scrape`. Flags given on the
//! command line override the YAML configuration file.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments for the crypto news scraper.
///
/// # Examples
///
/// ```sh
/// # Scrape all sources with defaults, writing data/latest.json
/// crypto_news_scraper
///
/// # Narrow the window and print rankings when done
/// crypto_news_scraper scrape --hours-back 12 --print-rankings
///
/// # Rank an existing snapshot
/// crypto_news_scraper rank --snapshot data/latest.json --hours 24
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about, args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub scrape: ScrapeArgs,
}

impl Cli {
    /// The subcommand to run, defaulting to `scrape` with top-level flags.
    pub fn into_command(self) -> Command {
        self.command.unwrap_or(Command::Scrape(self.scrape))
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scrape all enabled sources and write the snapshot
    Scrape(ScrapeArgs),
    /// Print author and topic rankings for an existing snapshot
    Rank(RankArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct ScrapeArgs {
    /// Optional path to config.yaml file
    #[arg(short, long, env = "NEWS_SCRAPER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Where to write the JSON snapshot (overrides the config file)
    #[arg(short = 'o', long)]
    pub snapshot: Option<PathBuf>,

    /// Recency window in hours, applied to every source
    #[arg(long)]
    pub hours_back: Option<u32>,

    /// Maximum listing pages per paginated source
    #[arg(long)]
    pub max_pages: Option<u32>,

    /// Print rankings as JSON to stdout after the run
    #[arg(long)]
    pub print_rankings: bool,
}

#[derive(Args, Debug, Clone)]
pub struct RankArgs {
    /// Snapshot to rank
    #[arg(short, long, default_value = crypto_news_scraper::config::DEFAULT_SNAPSHOT_PATH)]
    pub snapshot: PathBuf,

    /// Only count articles published within this many hours
    #[arg(long, default_value_t = 48)]
    pub hours: u32,

    /// Order equal counts by name instead of first appearance
    #[arg(long)]
    pub sorted_names: bool,

    /// Optional path to config.yaml file (for topic keywords)
    #[arg(short, long, env = "NEWS_SCRAPER_CONFIG")]
    pub config: Option<PathBuf>,
}
