//! News source adapters and the list-mode driver.
//!
//! Every source implements [`SourceAdapter`]; there is no shared base type,
//! only the contract. Each adapter works in two modes:
//!
//! 1. **List mode**: [`SourceAdapter::list_page`] turns one feed or listing
//!    page into candidate articles. [`collect_listing`] drives it.
//! 2. **Enrich mode**: [`SourceAdapter::enrich`] fetches an article's own page
//!    to recover fields the listing does not show (mostly the author).
//!
//! # Supported Sources
//!
//! | Source | Module | Method | Notes |
//! |--------|--------|--------|-------|
//! | CoinTelegraph | [`cointelegraph`] | RSS feed | Single request; enrichment is rate-limited hard |
//! | CoinDesk | [`coindesk`] | Paginated HTML | `/latest/?page=N`, ISO timestamps on cards |
//! | CryptoSlate | [`cryptoslate`] | Paginated HTML | `/news/page/N/`, relative ages on cards |
//!
//! # Pagination
//!
//! Listings are newest-first, so pages are fetched one at a time and the
//! first card older than the cutoff ends the listing: cards before it are
//! kept, it and the rest of that page are dropped, and no further page is
//! requested. A listing that interleaves dates would lose newer cards that
//! follow a stale one; that is a known limitation.
//!
//! HTML documents are parsed in synchronous helpers so that no `scraper::Html`
//! is held across an await point.

use crate::dates::try_normalize;
use crate::error::FetchError;
use crate::fetcher::Fetcher;
use crate::merge::dedupe;
use crate::models::{Article, Candidate, Enrichment, FetchResult, SourceId};
use crate::utils::{doc_attr, doc_text};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::{error, info, instrument, warn};

pub mod coindesk;
pub mod cointelegraph;
pub mod cryptoslate;

pub use coindesk::CoinDesk;
pub use cointelegraph::CoinTelegraph;
pub use cryptoslate::CryptoSlate;

/// The capability set every news source provides.
#[allow(async_fn_in_trait)]
pub trait SourceAdapter {
    fn source(&self) -> SourceId;

    /// Whether list mode walks numbered pages (`true`) or reads a single feed.
    fn paginated(&self) -> bool;

    /// Fetch and parse listing page `page` (1-based). Feed sources ignore `page`.
    async fn list_page(
        &self,
        fetcher: &Fetcher,
        page: u32,
    ) -> Result<FetchResult<Vec<Candidate>>, FetchError>;

    /// Whether `candidate` falls before the recency cutoff.
    fn hit_cutoff(&self, candidate: &Article, cutoff: DateTime<Utc>) -> bool {
        candidate.published_at < cutoff
    }

    /// Whether `article` still lacks a required field.
    fn needs_enrichment(&self, article: &Article) -> bool {
        article.author.as_deref().is_none_or(|a| a.trim().is_empty())
    }

    /// Fetch the article page and extract author, category and timestamp.
    async fn enrich(
        &self,
        fetcher: &Fetcher,
        article: &Article,
    ) -> Result<FetchResult<Enrichment>, FetchError>;
}

/// One of the built-in adapters, chosen by [`SourceId`].
#[derive(Debug, Clone)]
pub enum Adapter {
    CoinTelegraph(CoinTelegraph),
    CoinDesk(CoinDesk),
    CryptoSlate(CryptoSlate),
}

impl Adapter {
    pub fn for_source(source: SourceId, base_url: &str) -> Result<Self, url::ParseError> {
        Ok(match source {
            SourceId::CoinTelegraph => Adapter::CoinTelegraph(CoinTelegraph::new(base_url)?),
            SourceId::CoinDesk => Adapter::CoinDesk(CoinDesk::new(base_url)?),
            SourceId::CryptoSlate => Adapter::CryptoSlate(CryptoSlate::new(base_url)?),
        })
    }
}

impl SourceAdapter for Adapter {
    fn source(&self) -> SourceId {
        match self {
            Adapter::CoinTelegraph(a) => a.source(),
            Adapter::CoinDesk(a) => a.source(),
            Adapter::CryptoSlate(a) => a.source(),
        }
    }

    fn paginated(&self) -> bool {
        match self {
            Adapter::CoinTelegraph(a) => a.paginated(),
            Adapter::CoinDesk(a) => a.paginated(),
            Adapter::CryptoSlate(a) => a.paginated(),
        }
    }

    async fn list_page(
        &self,
        fetcher: &Fetcher,
        page: u32,
    ) -> Result<FetchResult<Vec<Candidate>>, FetchError> {
        match self {
            Adapter::CoinTelegraph(a) => a.list_page(fetcher, page).await,
            Adapter::CoinDesk(a) => a.list_page(fetcher, page).await,
            Adapter::CryptoSlate(a) => a.list_page(fetcher, page).await,
        }
    }

    async fn enrich(
        &self,
        fetcher: &Fetcher,
        article: &Article,
    ) -> Result<FetchResult<Enrichment>, FetchError> {
        match self {
            Adapter::CoinTelegraph(a) => a.enrich(fetcher, article).await,
            Adapter::CoinDesk(a) => a.enrich(fetcher, article).await,
            Adapter::CryptoSlate(a) => a.enrich(fetcher, article).await,
        }
    }
}

/// Why list mode stopped for a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListingStop {
    /// Feed read in one request.
    #[default]
    FeedComplete,
    /// A card on `page` was older than the cutoff.
    Cutoff { page: u32 },
    /// `page` had no cards at all.
    EmptyPage { page: u32 },
    /// The configured page cap was reached.
    MaxPages,
    /// Fetching `page` failed after retries; the listing is truncated there.
    FetchFailed { page: u32 },
}

/// Outcome of list mode for one source.
#[derive(Debug, Default)]
pub struct Listing {
    pub articles: Vec<Article>,
    pub pages_fetched: u32,
    pub parse_failures: usize,
    pub retries: u32,
    pub stop: ListingStop,
    pub error: Option<String>,
}

/// Pagination and cutoff limits for one listing run.
#[derive(Debug, Clone, Copy)]
pub struct ListingLimits {
    pub cutoff: DateTime<Utc>,
    pub max_pages: u32,
    pub page_delay: Duration,
}

/// Run list mode for one source.
///
/// Feed sources are fetched once and filtered by the cutoff. Paginated
/// sources are walked page by page under the stopping rule described in the
/// module docs. Fetch failures truncate the listing and are recorded in
/// [`Listing::error`]; they never propagate.
#[instrument(level = "info", skip_all, fields(source = %adapter.source()))]
pub async fn collect_listing<A: SourceAdapter>(
    adapter: &A,
    fetcher: &Fetcher,
    limits: ListingLimits,
) -> Listing {
    let mut listing = Listing::default();
    let mut articles = Vec::new();

    if adapter.paginated() {
        listing.stop = ListingStop::MaxPages;
        for page in 1..=limits.max_pages {
            if page > 1 && !limits.page_delay.is_zero() {
                tokio::time::sleep(limits.page_delay).await;
            }
            let result = match adapter.list_page(fetcher, page).await {
                Ok(result) => result,
                Err(e) => {
                    error!(page, error = %e, "listing page fetch failed; truncating source");
                    listing.error = Some(e.to_string());
                    listing.stop = ListingStop::FetchFailed { page };
                    break;
                }
            };
            listing.pages_fetched += 1;
            listing.retries += result.retry_count;

            if result.value.is_empty() {
                info!(page, "listing page has no cards; end of listing");
                listing.stop = ListingStop::EmptyPage { page };
                break;
            }

            let mut hit_old = false;
            for candidate in result.value {
                match candidate {
                    Err(failure) => {
                        warn!(page, reason = %failure, "skipping unparseable card");
                        listing.parse_failures += 1;
                    }
                    Ok(article) if adapter.hit_cutoff(&article, limits.cutoff) => {
                        info!(page, url = %article.url, published_at = %article.published_at, "reached cutoff");
                        hit_old = true;
                        break;
                    }
                    Ok(article) => articles.push(article),
                }
            }
            if hit_old {
                listing.stop = ListingStop::Cutoff { page };
                break;
            }
        }
    } else {
        match adapter.list_page(fetcher, 1).await {
            Ok(result) => {
                listing.pages_fetched = 1;
                listing.retries = result.retry_count;
                let mut stale = 0usize;
                for candidate in result.value {
                    match candidate {
                        Err(failure) => {
                            warn!(reason = %failure, "skipping unparseable feed entry");
                            listing.parse_failures += 1;
                        }
                        Ok(article) if adapter.hit_cutoff(&article, limits.cutoff) => stale += 1,
                        Ok(article) => articles.push(article),
                    }
                }
                info!(stale, "feed entries older than cutoff dropped");
            }
            Err(e) => {
                error!(error = %e, "feed fetch failed");
                listing.error = Some(e.to_string());
                listing.stop = ListingStop::FetchFailed { page: 1 };
            }
        }
    }

    listing.articles = dedupe(articles);
    if listing.articles.is_empty() && listing.error.is_none() {
        warn!(
            pages = listing.pages_fetched,
            parse_failures = listing.parse_failures,
            "source returned zero items; site layout may have changed"
        );
    } else {
        info!(
            count = listing.articles.len(),
            pages = listing.pages_fetched,
            stop = ?listing.stop,
            "listing collected"
        );
    }
    listing
}

static TIME_DATETIME: Lazy<Selector> =
    Lazy::new(|| Selector::parse("time[datetime]").expect("static selector"));
static META_PUBLISHED: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"meta[property="article:published_time"]"#).expect("static selector")
});
static META_SECTION: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[property="article:section"]"#).expect("static selector"));

/// Extract the fields every article page exposes the same way: the
/// `time[datetime]` stamp (or `article:published_time` meta) and the
/// `article:section` meta as category. The author comes from `author`,
/// which differs per site.
pub(crate) fn parse_article_page(html: &str, author: &Selector, reference: DateTime<Utc>) -> Enrichment {
    let doc = Html::parse_document(html);
    let raw_time = doc_attr(&doc, &TIME_DATETIME, "datetime")
        .or_else(|| doc_attr(&doc, &META_PUBLISHED, "content"));
    Enrichment {
        author: doc_text(&doc, author),
        category: doc_attr(&doc, &META_SECTION, "content"),
        published_at: raw_time.and_then(|raw| try_normalize(&raw, reference)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::{Limiter, RetryPolicy};
    use chrono::Duration as ChronoDuration;
    use std::sync::Mutex;

    /// In-memory paginated source: `pages[n]` holds the ages (hours) of page n+1.
    struct FakeListing {
        now: DateTime<Utc>,
        pages: Vec<Vec<i64>>,
        paginated: bool,
        fail_on: Option<u32>,
        requested: Mutex<Vec<u32>>,
    }

    impl FakeListing {
        fn new(pages: Vec<Vec<i64>>) -> Self {
            Self {
                now: Utc::now(),
                pages,
                paginated: true,
                fail_on: None,
                requested: Mutex::new(Vec::new()),
            }
        }

        fn requested(&self) -> Vec<u32> {
            self.requested.lock().unwrap().clone()
        }
    }

    impl SourceAdapter for FakeListing {
        fn source(&self) -> SourceId {
            SourceId::CryptoSlate
        }

        fn paginated(&self) -> bool {
            self.paginated
        }

        async fn list_page(
            &self,
            _fetcher: &Fetcher,
            page: u32,
        ) -> Result<FetchResult<Vec<Candidate>>, FetchError> {
            self.requested.lock().unwrap().push(page);
            if self.fail_on == Some(page) {
                return Err(FetchError::RateLimited {
                    url: format!("fake://{page}"),
                });
            }
            let ages = self.pages.get(page as usize - 1).cloned().unwrap_or_default();
            let value = ages
                .into_iter()
                .map(|h| {
                    Ok(Article {
                        title: format!("{h}h story"),
                        url: format!("https://fake.test/{h}"),
                        category: None,
                        author: None,
                        published_at: self.now - ChronoDuration::hours(h),
                        source: Some(SourceId::CryptoSlate),
                    })
                })
                .collect();
            Ok(FetchResult {
                value,
                retry_count: 0,
            })
        }

        async fn enrich(
            &self,
            _fetcher: &Fetcher,
            _article: &Article,
        ) -> Result<FetchResult<Enrichment>, FetchError> {
            Ok(FetchResult {
                value: Enrichment::default(),
                retry_count: 0,
            })
        }
    }

    fn fetcher() -> Fetcher {
        Fetcher::new(reqwest::Client::new(), RetryPolicy::default(), Limiter::new(1))
    }

    fn limits(source: &FakeListing, hours: i64, max_pages: u32) -> ListingLimits {
        ListingLimits {
            cutoff: source.now - ChronoDuration::hours(hours),
            max_pages,
            page_delay: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn cutoff_inside_page_two_of_three_skips_page_three() {
        let source = FakeListing::new(vec![vec![1, 2, 3, 4, 5], vec![6, 7, 8, 9, 10], vec![11, 12]]);
        let listing = collect_listing(&source, &fetcher(), limits(&source, 8, 5)).await;

        assert_eq!(source.requested(), vec![1, 2]);
        assert_eq!(listing.articles.len(), 8);
        assert_eq!(listing.stop, ListingStop::Cutoff { page: 2 });
        assert_eq!(listing.pages_fetched, 2);
    }

    #[tokio::test]
    async fn items_after_stale_one_on_same_page_are_dropped() {
        let source = FakeListing::new(vec![vec![1, 20, 2]]);
        let listing = collect_listing(&source, &fetcher(), limits(&source, 8, 5)).await;
        assert_eq!(listing.articles.len(), 1);
        assert_eq!(listing.articles[0].url, "https://fake.test/1");
    }

    #[tokio::test]
    async fn empty_page_ends_listing() {
        let source = FakeListing::new(vec![vec![1, 2], vec![]]);
        let listing = collect_listing(&source, &fetcher(), limits(&source, 48, 5)).await;
        assert_eq!(source.requested(), vec![1, 2]);
        assert_eq!(listing.stop, ListingStop::EmptyPage { page: 2 });
        assert_eq!(listing.articles.len(), 2);
    }

    #[tokio::test]
    async fn max_pages_caps_requests() {
        let source = FakeListing::new(vec![vec![1], vec![2], vec![3], vec![4]]);
        let listing = collect_listing(&source, &fetcher(), limits(&source, 48, 2)).await;
        assert_eq!(source.requested(), vec![1, 2]);
        assert_eq!(listing.stop, ListingStop::MaxPages);
    }

    #[tokio::test]
    async fn fetch_failure_truncates_but_keeps_earlier_pages() {
        let mut source = FakeListing::new(vec![vec![1, 2], vec![3, 4], vec![5]]);
        source.fail_on = Some(2);
        let listing = collect_listing(&source, &fetcher(), limits(&source, 48, 5)).await;
        assert_eq!(source.requested(), vec![1, 2]);
        assert_eq!(listing.articles.len(), 2);
        assert_eq!(listing.stop, ListingStop::FetchFailed { page: 2 });
        assert!(listing.error.is_some());
    }

    #[tokio::test]
    async fn feed_sources_filter_without_stopping() {
        let mut source = FakeListing::new(vec![vec![1, 50, 2, 60, 3]]);
        source.paginated = false;
        let listing = collect_listing(&source, &fetcher(), limits(&source, 48, 5)).await;
        assert_eq!(source.requested(), vec![1]);
        assert_eq!(listing.articles.len(), 3);
        assert_eq!(listing.stop, ListingStop::FeedComplete);
    }

    #[test]
    fn default_needs_enrichment_checks_author() {
        let source = FakeListing::new(vec![]);
        let mut article = Article {
            title: "t".to_string(),
            url: "u".to_string(),
            category: None,
            author: None,
            published_at: Utc::now(),
            source: None,
        };
        assert!(source.needs_enrichment(&article));
        article.author = Some(" ".to_string());
        assert!(source.needs_enrichment(&article));
        article.author = Some("Alice".to_string());
        assert!(!source.needs_enrichment(&article));
    }

    #[test]
    fn article_page_prefers_time_element() {
        let author = Selector::parse(".author-name").unwrap();
        let html = r#"<html><head>
            <meta property="article:published_time" content="2025-07-22T08:00:00Z">
            <meta property="article:section" content="Markets">
            </head><body>
            <span class="author-name"> Jane Doe </span>
            <time datetime="2025-07-23T09:15:00Z">Jul 23</time>
            </body></html>"#;
        let e = parse_article_page(html, &author, Utc::now());
        assert_eq!(e.author.as_deref(), Some("Jane Doe"));
        assert_eq!(e.category.as_deref(), Some("Markets"));
        assert_eq!(e.published_at.unwrap().to_rfc3339(), "2025-07-23T09:15:00+00:00");
    }

    #[test]
    fn article_page_without_fields_yields_nothing() {
        let author = Selector::parse(".author-name").unwrap();
        let e = parse_article_page("<html><body><p>hi</p></body></html>", &author, Utc::now());
        assert_eq!(e, Enrichment::default());
    }
}
