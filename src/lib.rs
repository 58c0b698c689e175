//! # Crypto News Scraper
//!
//! Collects recent articles from crypto news sites, normalizes them into one
//! record shape, deduplicates by URL, keeps only what falls inside a recency
//! window, and ranks authors and topics by frequency.
//!
//! ## Sources
//!
//! - CoinTelegraph (RSS feed, HTML enrichment)
//! - CoinDesk (paginated HTML listing)
//! - CryptoSlate (paginated HTML listing, relative ages)
//!
//! ## Architecture
//!
//! 1. **Listing**: each source's feed or listing pages are fetched through its
//!    own rate-limited [`fetcher::Fetcher`]
//! 2. **Enriching**: articles missing an author are refined from their page
//! 3. **Merging**: results are merged by URL and re-filtered by the window
//! 4. **Output**: the article set is written atomically as a JSON snapshot
//!
//! Rankings ([`rank`]) are computed on demand from an article set.

pub mod config;
pub mod dates;
pub mod error;
pub mod fetcher;
pub mod merge;
pub mod models;
pub mod outputs;
pub mod pipeline;
pub mod rank;
pub mod scrapers;
pub mod utils;

pub use config::{Settings, SourceSettings};
pub use error::{ConfigError, FetchError, PipelineError};
pub use models::{Article, RankingItem, SourceId};
pub use pipeline::{Pipeline, RunReport, RunState, SourceReport};
