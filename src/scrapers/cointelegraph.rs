//! CoinTelegraph scraper.
//!
//! Lists articles from the site-wide RSS feed at `{base}/rss`, which already
//! carries title, link, category, author (`dc:creator`) and `pubDate`. The
//! HTML site answers bursts with 429s, so enrichment is only worth doing for
//! entries whose feed record lacks an author, and runs with a low limit and
//! a randomized cool-down (both configured per source).

use super::{SourceAdapter, parse_article_page};
use crate::dates::normalize;
use crate::error::FetchError;
use crate::fetcher::{FetchKind, Fetcher};
use crate::models::{Article, Candidate, Enrichment, FetchResult, ParseFailure, SourceId};
use crate::utils::non_blank;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use quick_xml::Reader;
use quick_xml::events::Event;
use scraper::Selector;
use tracing::{debug, instrument};
use url::Url;

static AUTHOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"[data-test="author-name"], .post-meta__author a, .author-name"#)
        .expect("static selector")
});

#[derive(Debug, Clone)]
pub struct CoinTelegraph {
    base: Url,
}

impl CoinTelegraph {
    pub fn new(base_url: &str) -> Result<Self, url::ParseError> {
        Ok(Self {
            base: Url::parse(base_url)?,
        })
    }

    pub fn feed_url(&self) -> String {
        self.base
            .join("/rss")
            .map(|u| u.to_string())
            .unwrap_or_else(|_| format!("{}/rss", self.base.as_str().trim_end_matches('/')))
    }
}

impl SourceAdapter for CoinTelegraph {
    fn source(&self) -> SourceId {
        SourceId::CoinTelegraph
    }

    fn paginated(&self) -> bool {
        false
    }

    #[instrument(level = "info", skip_all)]
    async fn list_page(
        &self,
        fetcher: &Fetcher,
        _page: u32,
    ) -> Result<FetchResult<Vec<Candidate>>, FetchError> {
        let url = self.feed_url();
        let fetched = fetcher.fetch(&url, FetchKind::Feed).await?;
        let candidates = parse_feed(&fetched.value, Utc::now());
        debug!(count = candidates.len(), "parsed CoinTelegraph feed");
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

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Link,
    Category,
    Creator,
    PubDate,
}

#[derive(Debug, Default)]
struct RawItem {
    title: String,
    link: String,
    category: String,
    creator: String,
    pub_date: String,
}

impl RawItem {
    fn push(&mut self, field: Field, text: &str) {
        let slot = match field {
            Field::Title => &mut self.title,
            Field::Link => &mut self.link,
            Field::Category => &mut self.category,
            Field::Creator => &mut self.creator,
            Field::PubDate => &mut self.pub_date,
        };
        slot.push_str(text);
    }

    fn into_candidate(self, fetched_at: DateTime<Utc>) -> Candidate {
        let title = non_blank(&self.title);
        let link = non_blank(&self.link);
        match (title, link) {
            (Some(title), Some(url)) => Ok(Article {
                title,
                url,
                category: non_blank(&self.category),
                author: non_blank(&self.creator),
                published_at: normalize(&self.pub_date, fetched_at),
                source: Some(SourceId::CoinTelegraph),
            }),
            _ => Err(ParseFailure {
                reason: format!(
                    "feed item missing title or link (title={:?}, link={:?})",
                    self.title, self.link
                ),
            }),
        }
    }
}

/// Parse an RSS document into candidates, one per `<item>`.
///
/// Only the first `<category>` of an item is kept. Malformed XML ends the
/// parse with a [`ParseFailure`] after whatever items were already read.
pub(crate) fn parse_feed(xml: &str, fetched_at: DateTime<Utc>) -> Vec<Candidate> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut candidates = Vec::new();
    let mut item: Option<RawItem> = None;
    let mut field: Option<Field> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if e.name().as_ref() == b"item" {
                    item = Some(RawItem::default());
                    field = None;
                } else if let Some(current) = item.as_ref() {
                    field = match e.name().as_ref() {
                        b"title" => Some(Field::Title),
                        b"link" => Some(Field::Link),
                        b"category" if current.category.is_empty() => Some(Field::Category),
                        b"dc:creator" => Some(Field::Creator),
                        b"pubDate" => Some(Field::PubDate),
                        _ => None,
                    };
                }
            }
            Ok(Event::Text(e)) => {
                if let (Some(it), Some(f)) = (item.as_mut(), field) {
                    let text = e.unescape().map(|t| t.into_owned()).unwrap_or_default();
                    it.push(f, &text);
                }
            }
            Ok(Event::CData(e)) => {
                if let (Some(it), Some(f)) = (item.as_mut(), field) {
                    it.push(f, &String::from_utf8_lossy(e.as_ref()));
                }
            }
            Ok(Event::End(e)) => {
                if e.name().as_ref() == b"item" {
                    if let Some(it) = item.take() {
                        candidates.push(it.into_candidate(fetched_at));
                    }
                }
                field = None;
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                candidates.push(Err(ParseFailure {
                    reason: format!(
                        "malformed feed at byte {}: {e}",
                        reader.buffer_position()
                    ),
                }));
                break;
            }
            _ => {}
        }
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:dc="http://purl.org/dc/elements/1.1/">
  <channel>
    <title>Cointelegraph.com News</title>
    <link>https://cointelegraph.com</link>
    <item>
      <title><![CDATA[Bitcoin ETF inflows hit record]]></title>
      <link>https://cointelegraph.com/news/bitcoin-etf-inflows</link>
      <dc:creator><![CDATA[Jane Doe]]></dc:creator>
      <pubDate>Wed, 23 Jul 2025 10:15:00 +0100</pubDate>
      <category><![CDATA[Markets]]></category>
      <category><![CDATA[Bitcoin]]></category>
    </item>
    <item>
      <title>Solana &amp; DeFi rebound</title>
      <link>https://cointelegraph.com/news/solana-defi</link>
      <pubDate>not a date</pubDate>
    </item>
    <item>
      <title>No link here</title>
    </item>
  </channel>
</rss>"#;

    fn fetched_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 23, 12, 0, 0).unwrap()
    }

    #[test]
    fn parses_items_and_ignores_channel_fields() {
        let candidates = parse_feed(FEED, fetched_at());
        assert_eq!(candidates.len(), 3);

        let first = candidates[0].as_ref().unwrap();
        assert_eq!(first.title, "Bitcoin ETF inflows hit record");
        assert_eq!(first.url, "https://cointelegraph.com/news/bitcoin-etf-inflows");
        assert_eq!(first.author.as_deref(), Some("Jane Doe"));
        assert_eq!(first.category.as_deref(), Some("Markets"));
        assert_eq!(
            first.published_at,
            Utc.with_ymd_and_hms(2025, 7, 23, 9, 15, 0).unwrap()
        );
        assert_eq!(first.source, Some(SourceId::CoinTelegraph));
    }

    #[test]
    fn unescapes_entities_and_falls_back_on_bad_dates() {
        let candidates = parse_feed(FEED, fetched_at());
        let second = candidates[1].as_ref().unwrap();
        assert_eq!(second.title, "Solana & DeFi rebound");
        assert_eq!(second.author, None);
        assert_eq!(second.category, None);
        assert_eq!(second.published_at, fetched_at());
    }

    #[test]
    fn items_without_link_are_parse_failures() {
        let candidates = parse_feed(FEED, fetched_at());
        assert!(candidates[2].is_err());
    }

    #[test]
    fn malformed_xml_keeps_earlier_items() {
        let xml = r#"<rss><channel><item><title>A</title><link>https://x.test/a</link></item><item><title>B</oops></item></channel></rss>"#;
        let candidates = parse_feed(xml, fetched_at());
        assert!(candidates[0].is_ok());
        assert!(candidates.last().unwrap().is_err());
    }

    #[test]
    fn empty_channel_yields_nothing() {
        let candidates = parse_feed("<rss><channel></channel></rss>", fetched_at());
        assert!(candidates.is_empty());
    }

    #[test]
    fn feed_url_is_under_base() {
        let ct = CoinTelegraph::new("https://cointelegraph.com").unwrap();
        assert_eq!(ct.feed_url(), "https://cointelegraph.com/rss");
        let local = CoinTelegraph::new("http://127.0.0.1:9000/").unwrap();
        assert_eq!(local.feed_url(), "http://127.0.0.1:9000/rss");
    }
}
