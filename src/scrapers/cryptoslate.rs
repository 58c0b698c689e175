//! CryptoSlate article scraper.
//!
//! Listing pages live at `{base}/news/` and `{base}/news/page/N/`. Cards only
//! show a relative age ("36 mins ago"), which is resolved against the time
//! the page was fetched; the exact timestamp and the author come from the
//! article page during enrichment.

use super::{SourceAdapter, parse_article_page};
use crate::dates::normalize;
use crate::error::FetchError;
use crate::fetcher::{FetchKind, Fetcher};
use crate::models::{Article, Candidate, Enrichment, FetchResult, ParseFailure, SourceId};
use crate::utils::{first_attr, first_text, resolve_url};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument};
use url::Url;

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

static CARD: Lazy<Selector> = Lazy::new(|| selector("section.list-feed .list-card article"));
static TITLE: Lazy<Selector> = Lazy::new(|| selector("h2"));
static LINK: Lazy<Selector> = Lazy::new(|| selector("a[href]"));
static CATEGORY: Lazy<Selector> = Lazy::new(|| selector(".post-meta > span"));
static AGE: Lazy<Selector> = Lazy::new(|| selector(".post-meta .read"));
static AUTHOR: Lazy<Selector> = Lazy::new(|| selector(".single-post__author a, .author-name"));

#[derive(Debug, Clone)]
pub struct CryptoSlate {
    base: Url,
}

impl CryptoSlate {
    pub fn new(base_url: &str) -> Result<Self, url::ParseError> {
        Ok(Self {
            base: Url::parse(base_url)?,
        })
    }

    pub fn page_url(&self, page: u32) -> Result<String, FetchError> {
        let path = if page <= 1 {
            "/news/".to_string()
        } else {
            format!("/news/page/{page}/")
        };
        self.base
            .join(&path)
            .map(|u| u.to_string())
            .map_err(|e| FetchError::InvalidUrl {
                url: path,
                reason: e.to_string(),
            })
    }
}

impl SourceAdapter for CryptoSlate {
    fn source(&self) -> SourceId {
        SourceId::CryptoSlate
    }

    fn paginated(&self) -> bool {
        true
    }

    #[instrument(level = "info", skip(self, fetcher))]
    async fn list_page(
        &self,
        fetcher: &Fetcher,
        page: u32,
    ) -> Result<FetchResult<Vec<Candidate>>, FetchError> {
        let url = self.page_url(page)?;
        let fetched = fetcher.fetch(&url, FetchKind::Html).await?;
        let candidates = parse_listing(&fetched.value, &self.base, Utc::now());
        debug!(count = candidates.len(), "parsed CryptoSlate listing page");
        Ok(FetchResult {
            value: candidates,
            retry_count: fetched.retry_count,
        })
    }

    #[instrument(level = "info", skip_all, fields(url = %article.url))]
    async fn enrich(
        &self,
        fetcher: &Fetcher,
        article: &Article,
    ) -> Result<FetchResult<Enrichment>, FetchError> {
        let fetched = fetcher.fetch(&article.url, FetchKind::Html).await?;
        Ok(FetchResult {
            value: parse_article_page(&fetched.value, &AUTHOR, Utc::now()),
            retry_count: fetched.retry_count,
        })
    }
}

/// Parse one listing page. Relative ages resolve against `fetched_at`.
pub(crate) fn parse_listing(html: &str, base: &Url, fetched_at: DateTime<Utc>) -> Vec<Candidate> {
    let doc = Html::parse_document(html);
    doc.select(&CARD)
        .map(|card| parse_card(card, base, fetched_at))
        .collect()
}

fn parse_card(card: ElementRef<'_>, base: &Url, fetched_at: DateTime<Utc>) -> Candidate {
    let title = first_text(card, &TITLE);
    let url = first_attr(card, &LINK, "href").and_then(|href| resolve_url(base, &href));
    let (Some(title), Some(url)) = (title, url) else {
        return Err(ParseFailure {
            reason: "card without title or link".to_string(),
        });
    };

    let age = first_text(card, &AGE).unwrap_or_default();
    Ok(Article {
        title,
        url,
        category: first_text(card, &CATEGORY),
        author: None,
        published_at: normalize(&age, fetched_at),
        source: Some(SourceId::CryptoSlate),
    })
}
