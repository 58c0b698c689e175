//! Data models shared by the scrapers, the merge/rank passes, and the
//! snapshot writer.
//!
//! - [`Article`]: one news item, identified by its URL
//! - [`Candidate`]: what a list page yields per card (an article or a parse failure)
//! - [`FetchResult`]: a parsed response plus the number of retries it took
//! - [`Enrichment`]: fields extracted from an article's own page
//! - [`RankingItem`]: one row of an author or topic ranking

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The sites this crate knows how to scrape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceId {
    CoinTelegraph,
    CoinDesk,
    CryptoSlate,
}

impl SourceId {
    pub const ALL: [SourceId; 3] = [
        SourceId::CoinTelegraph,
        SourceId::CoinDesk,
        SourceId::CryptoSlate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceId::CoinTelegraph => "cointelegraph",
            SourceId::CoinDesk => "coindesk",
            SourceId::CryptoSlate => "cryptoslate",
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A news article as listed by a source and optionally refined by enrichment.
///
/// The serialized form is the snapshot record:
/// `{title, url, category, author, publishedAt}`. The originating source is
/// kept in memory only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub title: String,
    /// Canonical identity key.
    pub url: String,
    pub category: Option<String>,
    pub author: Option<String>,
    /// Always a valid instant; unparseable dates fall back to fetch time.
    pub published_at: DateTime<Utc>,
    #[serde(skip)]
    pub source: Option<SourceId>,
}

impl Article {
    /// Overlay `other` onto `self`, taking only the fields that carry a value.
    ///
    /// `published_at` is always populated and therefore always taken.
    pub fn absorb(&mut self, other: Article) {
        if !other.title.trim().is_empty() {
            self.title = other.title;
        }
        if let Some(category) = non_empty(other.category) {
            self.category = Some(category);
        }
        if let Some(author) = non_empty(other.author) {
            self.author = Some(author);
        }
        self.published_at = other.published_at;
        if other.source.is_some() {
            self.source = other.source;
        }
    }

    /// Apply enrichment results. A field is replaced only when the freshly
    /// extracted value is non-empty, so a partial enrichment never erases
    /// data the listing already provided.
    pub fn apply(&mut self, enrichment: Enrichment) {
        if let Some(author) = non_empty(enrichment.author) {
            self.author = Some(author);
        }
        if let Some(category) = non_empty(enrichment.category) {
            self.category = Some(category);
        }
        if let Some(published_at) = enrichment.published_at {
            self.published_at = published_at;
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Why a listing card could not be turned into an [`Article`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFailure {
    pub reason: String,
}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

pub type Candidate = Result<Article, ParseFailure>;

/// A parsed response together with how many retries the fetch needed.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResult<T> {
    pub value: T,
    pub retry_count: u32,
}

/// Fields pulled from an article's own page. `None` means "not found".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Enrichment {
    pub author: Option<String>,
    pub category: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

/// One entry of an author or topic ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingItem {
    pub name: String,
    pub count: usize,
}
