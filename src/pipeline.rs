//! Orchestration of one scraping run.
//!
//! A run moves through
//! `Listing → Enriching → Merging → Done`, or ends in `Failed` when the
//! snapshot cannot be written:
//!
//! 1. **Listing**: every enabled source runs list mode concurrently. A source
//!    whose listing fails contributes whatever it collected and never
//!    aborts the others.
//! 2. **Enriching**: articles still missing a required field are refined
//!    from their own page, at most `concurrency_limit` at a time per source.
//!    A failed enrichment leaves the article as listed.
//! 3. **Merging**: enrichment results are merged back by URL, each article
//!    is re-checked against its source's window (a refined timestamp can
//!    push it out), and the set is ordered newest first.
//! 4. **Done**: the snapshot is written. Failing to write it is the only
//!    fatal error of a run.
//!
//! The only mutable collection is owned by [`Pipeline::collect`]; enrichment
//! tasks hand back owned articles, each keyed by a distinct URL.

use crate::config::{Settings, SourceSettings};
use crate::error::PipelineError;
use crate::fetcher::{Fetcher, Limiter};
use crate::merge::{dedupe, merge, within_window};
use crate::models::{Article, SourceId};
use crate::outputs::json::write_snapshot;
use crate::scrapers::{Adapter, ListingLimits, ListingStop, SourceAdapter, collect_listing};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use rand::{Rng, rng};
use reqwest::Client;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

/// Phase of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Listing,
    Enriching,
    Merging,
    Done,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Listing => "listing",
            RunState::Enriching => "enriching",
            RunState::Merging => "merging",
            RunState::Done => "done",
            RunState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Per-source statistics for one run.
#[derive(Debug, Clone)]
pub struct SourceReport {
    pub source: SourceId,
    pub pages_fetched: u32,
    pub listed: usize,
    pub parse_failures: usize,
    pub retries: u32,
    pub stop: ListingStop,
    pub listing_error: Option<String>,
    pub enrich_attempted: usize,
    pub enriched: usize,
    pub enrich_failed: usize,
    pub kept: usize,
}

impl SourceReport {
    fn new(source: SourceId) -> Self {
        Self {
            source,
            pages_fetched: 0,
            listed: 0,
            parse_failures: 0,
            retries: 0,
            stop: ListingStop::default(),
            listing_error: None,
            enrich_attempted: 0,
            enriched: 0,
            enrich_failed: 0,
            kept: 0,
        }
    }
}

/// Result of a completed run. A failed run returns an error instead.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    /// Final article set, newest first, as written to the snapshot.
    pub articles: Vec<Article>,
    pub sources: Vec<SourceReport>,
    pub snapshot_path: PathBuf,
    pub elapsed: Duration,
}

/// One configured source: its adapter, its own limiter-bearing fetcher, and settings.
#[derive(Debug, Clone)]
struct SourceRuntime {
    adapter: Adapter,
    fetcher: Fetcher,
    settings: SourceSettings,
}

impl SourceRuntime {
    fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - ChronoDuration::hours(i64::from(self.settings.hours_back))
    }
}

#[derive(Debug)]
pub struct Pipeline {
    sources: Vec<SourceRuntime>,
    snapshot_path: PathBuf,
}

#[derive(Debug, Default)]
struct EnrichStats {
    attempted: usize,
    enriched: usize,
    failed: usize,
}

impl Pipeline {
    /// Build a pipeline for the enabled sources in `settings`.
    ///
    /// Each source gets its own [`Limiter`] sized by `concurrency_limit`; all
    /// sources share one HTTP connection pool.
    pub fn new(settings: &Settings) -> Result<Self, PipelineError> {
        let client = Client::builder().build().map_err(PipelineError::Client)?;
        let mut sources = Vec::new();
        for (id, s) in settings.sources.iter().filter(|(_, s)| s.enabled) {
            let adapter =
                Adapter::for_source(*id, &s.base_url).map_err(|e| PipelineError::BaseUrl {
                    source_id: id.to_string(),
                    reason: e.to_string(),
                })?;
            let fetcher = Fetcher::new(
                client.clone(),
                s.retry_policy(),
                Limiter::new(s.concurrency_limit),
            )
            .with_timeouts(s.page_timeout, s.slow_timeout);
            sources.push(SourceRuntime {
                adapter,
                fetcher,
                settings: s.clone(),
            });
        }
        Ok(Self {
            sources,
            snapshot_path: settings.snapshot_path.clone(),
        })
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    pub fn source_ids(&self) -> Vec<SourceId> {
        self.sources.iter().map(|s| s.adapter.source()).collect()
    }

    /// Run all phases and persist the snapshot.
    ///
    /// # Errors
    ///
    /// Only snapshot persistence can fail a run; every network or parse
    /// problem is absorbed and reflected in the per-source reports.
    #[instrument(level = "info", skip_all, fields(path = %self.snapshot_path.display()))]
    pub async fn run(&self) -> Result<RunReport, PipelineError> {
        let t0 = Instant::now();
        let started_at = Utc::now();
        let (articles, sources) = self.collect(started_at).await;

        if let Err(e) = write_snapshot(&articles, &self.snapshot_path).await {
            transition(RunState::Merging, RunState::Failed);
            error!(error = %e, "Run failed: snapshot not persisted");
            return Err(e);
        }

        transition(RunState::Merging, RunState::Done);
        let elapsed = t0.elapsed();
        info!(
            count = articles.len(),
            secs = elapsed.as_secs(),
            millis = elapsed.subsec_millis(),
            "Run complete"
        );
        Ok(RunReport {
            started_at,
            articles,
            sources,
            snapshot_path: self.snapshot_path.clone(),
            elapsed,
        })
    }

    /// Listing, enrichment and merging without persistence. Ends in
    /// [`RunState::Merging`]; [`Pipeline::run`] takes it from there.
    ///
    /// `now` is the run's reference instant: cutoffs and the final window
    /// check are computed from it.
    pub async fn collect(&self, now: DateTime<Utc>) -> (Vec<Article>, Vec<SourceReport>) {
        let mut reports: Vec<SourceReport> = self
            .sources
            .iter()
            .map(|s| SourceReport::new(s.adapter.source()))
            .collect();

        // ---- Listing ----
        info!(sources = self.sources.len(), state = %RunState::Listing, "Run state");
        let listings = join_all(self.sources.iter().map(|s| {
            let limits = ListingLimits {
                cutoff: s.cutoff(now),
                max_pages: s.settings.max_pages,
                page_delay: s.settings.page_delay,
            };
            collect_listing(&s.adapter, &s.fetcher, limits)
        }))
        .await;

        let mut listed = Vec::new();
        for (report, listing) in reports.iter_mut().zip(listings) {
            report.pages_fetched = listing.pages_fetched;
            report.listed = listing.articles.len();
            report.parse_failures = listing.parse_failures;
            report.retries = listing.retries;
            report.stop = listing.stop;
            report.listing_error = listing.error;
            listed.extend(listing.articles);
        }
        let mut articles = dedupe(listed);
        info!(count = articles.len(), "Listing complete");

        // ---- Enriching ----
        transition(RunState::Listing, RunState::Enriching);
        let mut needed: Vec<Vec<Article>> = vec![Vec::new(); self.sources.len()];
        for article in &articles {
            if let Some(idx) = self.runtime_index(article.source) {
                let s = &self.sources[idx];
                if s.settings.enrich && s.adapter.needs_enrichment(article) {
                    needed[idx].push(article.clone());
                }
            }
        }
        let enriched = join_all(
            self.sources
                .iter()
                .zip(needed)
                .map(|(s, batch)| enrich_batch(s, batch)),
        )
        .await;

        // ---- Merging ----
        transition(RunState::Enriching, RunState::Merging);
        for (report, (batch, stats)) in reports.iter_mut().zip(enriched) {
            report.enrich_attempted = stats.attempted;
            report.enriched = stats.enriched;
            report.enrich_failed = stats.failed;
            articles = merge(articles, batch);
        }

        let before = articles.len();
        articles.retain(|a| match self.runtime_index(a.source) {
            Some(idx) => within_window(a, self.sources[idx].settings.hours_back, now),
            None => true,
        });
        if articles.len() < before {
            debug!(dropped = before - articles.len(), "Refined timestamps fell outside window");
        }
        articles.sort_by(|a, b| b.published_at.cmp(&a.published_at));

        for report in reports.iter_mut() {
            report.kept = articles
                .iter()
                .filter(|a| a.source == Some(report.source))
                .count();
        }
        (articles, reports)
    }

    fn runtime_index(&self, source: Option<SourceId>) -> Option<usize> {
        let source = source?;
        self.sources.iter().position(|s| s.adapter.source() == source)
    }
}

fn transition(from: RunState, to: RunState) {
    info!(%from, %to, "Run state");
}

/// Enrich `batch` for one source, up to its concurrency limit at a time.
#[instrument(level = "info", skip_all, fields(source = %runtime.adapter.source(), count = batch.len()))]
async fn enrich_batch(runtime: &SourceRuntime, batch: Vec<Article>) -> (Vec<Article>, EnrichStats) {
    let mut stats = EnrichStats {
        attempted: batch.len(),
        ..EnrichStats::default()
    };
    if batch.is_empty() {
        return (Vec::new(), stats);
    }

    let results: Vec<(Article, bool)> = stream::iter(batch)
        .map(|mut article| async move {
            let ok = match runtime.adapter.enrich(&runtime.fetcher, &article).await {
                Ok(result) => {
                    debug!(url = %article.url, retries = result.retry_count, "Enriched article");
                    article.apply(result.value);
                    true
                }
                Err(e) => {
                    warn!(url = %article.url, error = %e, "Enrichment failed; keeping listing data");
                    false
                }
            };
            cool_down(runtime.settings.cooldown).await;
            (article, ok)
        })
        .buffer_unordered(runtime.settings.concurrency_limit.max(1))
        .collect()
        .await;

    let mut articles = Vec::with_capacity(results.len());
    for (article, ok) in results {
        if ok {
            stats.enriched += 1;
        } else {
            stats.failed += 1;
        }
        articles.push(article);
    }
    info!(
        enriched = stats.enriched,
        failed = stats.failed,
        "Enrichment complete"
    );
    (articles, stats)
}

/// Sleep a random duration within `range`; no-op when the range is zero.
async fn cool_down(range: (Duration, Duration)) {
    let (min, max) = range;
    if max.is_zero() {
        return;
    }
    let hi = max.as_millis() as u64;
    let lo = (min.as_millis() as u64).min(hi);
    let ms = rng().random_range(lo..=hi);
    sleep(Duration::from_millis(ms)).await;
}
