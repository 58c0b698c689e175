//! CoinDesk article scraper.
//!
//! Walks the "latest" listing at `{base}/latest/`, then `{base}/latest/?page=N`.
//! Card markup has shifted over time, so each field is looked up through an
//! ordered list of selectors, most specific first. Cards usually carry an
//! ISO timestamp in `time[datetime]`; older layouts show a display date such
//! as `Jul 23, 2025 at 10:15 a.m. UTC`. Author names only appear on the
//! article page.

use super::{SourceAdapter, parse_article_page};
use crate::dates::normalize;
use crate::error::FetchError;
use crate::fetcher::{FetchKind, Fetcher};
use crate::models::{Article, Candidate, Enrichment, FetchResult, ParseFailure, SourceId};
use crate::utils::{first_attr, first_text, non_blank, resolve_url};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument};
use url::Url;

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

static CARD: Lazy<Selector> =
    Lazy::new(|| selector(r#"[data-qa="search-results"] article, article.card, article"#));
static LINKS: Lazy<[Selector; 3]> = Lazy::new(|| {
    [
        selector(r#"a[href][data-qa="card-headline"]"#),
        selector("a.card-title-link[href]"),
        selector("a[href]"),
    ]
});
static HEADING: Lazy<Selector> = Lazy::new(|| selector("h2, h3, h4"));
static CATEGORY: Lazy<Selector> =
    Lazy::new(|| selector(r#"[data-qa="card-category"], .category-link, .card__section"#));
static TIME_ATTR: Lazy<Selector> = Lazy::new(|| selector("time[datetime]"));
static TIME: Lazy<Selector> = Lazy::new(|| selector("time"));
static AUTHOR: Lazy<Selector> = Lazy::new(|| {
    selector(r#"[data-qa="author-name"] a, .attribution__name a, .attribution__name"#)
});

#[derive(Debug, Clone)]
pub struct CoinDesk {
    base: Url,
}

impl CoinDesk {
    pub fn new(base_url: &str) -> Result<Self, url::ParseError> {
        Ok(Self {
            base: Url::parse(base_url)?,
        })
    }

    pub fn page_url(&self, page: u32) -> Result<String, FetchError> {
        let path = if page <= 1 {
            "/latest/".to_string()
        } else {
            format!("/latest/?page={page}")
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

impl SourceAdapter for CoinDesk {
    fn source(&self) -> SourceId {
        SourceId::CoinDesk
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
        debug!(count = candidates.len(), "parsed CoinDesk listing page");
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

/// Parse one listing page into candidates, in page order.
pub(crate) fn parse_listing(html: &str, base: &Url, fetched_at: DateTime<Utc>) -> Vec<Candidate> {
    let doc = Html::parse_document(html);
    doc.select(&CARD)
        .map(|card| parse_card(card, base, fetched_at))
        .collect()
}

fn parse_card(card: ElementRef<'_>, base: &Url, fetched_at: DateTime<Utc>) -> Candidate {
    let link = LINKS.iter().find_map(|sel| card.select(sel).next());
    let href = link.and_then(|a| a.value().attr("href"));
    let title = link
        .and_then(|a| non_blank(&a.text().collect::<String>()))
        .or_else(|| first_text(card, &HEADING));

    let (Some(title), Some(url)) = (title, href.and_then(|h| resolve_url(base, h))) else {
        return Err(ParseFailure {
            reason: "card without headline link".to_string(),
        });
    };

    let raw_date = first_attr(card, &TIME_ATTR, "datetime")
        .or_else(|| first_text(card, &TIME))
        .unwrap_or_default();

    Ok(Article {
        title,
        url,
        category: first_text(card, &CATEGORY),
        author: None,
        published_at: normalize(&raw_date, fetched_at),
        source: Some(SourceId::CoinDesk),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fetched_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 23, 12, 0, 0).unwrap()
    }

    fn base() -> Url {
        Url::parse("https://www.coindesk.com").unwrap()
    }

    const LISTING: &str = r#"<html><body>
      <div data-qa="search-results">
        <article>
          <a data-qa="card-category" href="/markets/">Markets</a>
          <a data-qa="card-headline" href="/markets/2025/07/23/bitcoin-etf/">Bitcoin ETF sees inflows</a>
          <time datetime="2025-07-23T10:15:00.000Z">Jul 23</time>
        </article>
        <article class="card">
          <span class="card__section">Policy</span>
          <a class="card-title-link" href="https://www.coindesk.com/policy/sec-rules/">SEC rules</a>
          <time>Jul 22, 2025 at 3:05 p.m. UTC</time>
        </article>
        <article>
          <p>Sponsored</p>
        </article>
        <article>
          <a href="/tech/no-date/"><h3>Undated story</h3></a>
        </article>
      </div>
    </body></html>"#;

    #[test]
    fn parses_cards_in_page_order() {
        let candidates = parse_listing(LISTING, &base(), fetched_at());
        assert_eq!(candidates.len(), 4);

        let first = candidates[0].as_ref().unwrap();
        assert_eq!(first.title, "Bitcoin ETF sees inflows");
        assert_eq!(first.url, "https://www.coindesk.com/markets/2025/07/23/bitcoin-etf/");
        assert_eq!(first.category.as_deref(), Some("Markets"));
        assert_eq!(
            first.published_at,
            Utc.with_ymd_and_hms(2025, 7, 23, 10, 15, 0).unwrap()
        );
        assert_eq!(first.author, None);

        let second = candidates[1].as_ref().unwrap();
        assert_eq!(second.title, "SEC rules");
        assert_eq!(second.category.as_deref(), Some("Policy"));
        assert_eq!(
            second.published_at,
            Utc.with_ymd_and_hms(2025, 7, 22, 15, 5, 0).unwrap()
        );
    }

    #[test]
    fn card_without_link_is_a_parse_failure() {
        let candidates = parse_listing(LISTING, &base(), fetched_at());
        assert!(candidates[2].is_err());
    }

    #[test]
    fn undated_card_falls_back_to_fetch_time() {
        let candidates = parse_listing(LISTING, &base(), fetched_at());
        let undated = candidates[3].as_ref().unwrap();
        assert_eq!(undated.title, "Undated story");
        assert_eq!(undated.published_at, fetched_at());
    }

    #[test]
    fn page_without_cards_is_empty() {
        let candidates = parse_listing("<html><body><p>No results</p></body></html>", &base(), fetched_at());
        assert!(candidates.is_empty());
    }

    #[test]
    fn page_urls() {
        let cd = CoinDesk::new("https://www.coindesk.com").unwrap();
        assert_eq!(cd.page_url(1).unwrap(), "https://www.coindesk.com/latest/");
        assert_eq!(cd.page_url(3).unwrap(), "https://www.coindesk.com/latest/?page=3");
    }

    #[test]
    fn article_page_author() {
        let html = r#"<html><body>
            <div data-qa="author-name"><a href="/author/x">Sam Reynolds</a></div>
            <time datetime="2025-07-23T09:00:00Z"></time>
        </body></html>"#;
        let e = parse_article_page(html, &AUTHOR, fetched_at());
        assert_eq!(e.author.as_deref(), Some("Sam Reynolds"));
        assert_eq!(
            e.published_at,
            Some(Utc.with_ymd_and_hms(2025, 7, 23, 9, 0, 0).unwrap())
        );
    }
}
