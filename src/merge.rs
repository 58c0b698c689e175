//! URL-keyed merging and the recency window.

use crate::models::Article;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// Merge `incoming` into `existing`, keyed by URL.
///
/// The result holds exactly one article per URL, in first-seen order. On a
/// collision the incoming record overwrites only the fields it actually
/// carries (see [`Article::absorb`]).
pub fn merge(existing: Vec<Article>, incoming: Vec<Article>) -> Vec<Article> {
    let mut merged: Vec<Article> = Vec::with_capacity(existing.len() + incoming.len());
    let mut index: HashMap<String, usize> = HashMap::new();

    for article in existing.into_iter().chain(incoming) {
        match index.get(&article.url) {
            Some(&slot) => merged[slot].absorb(article),
            None => {
                index.insert(article.url.clone(), merged.len());
                merged.push(article);
            }
        }
    }
    merged
}

/// Collapse duplicate URLs within one batch.
pub fn dedupe(articles: Vec<Article>) -> Vec<Article> {
    merge(Vec::new(), articles)
}

/// Keep articles published no more than `hours` before `now`.
///
/// Pure predicate over the input; applying it twice with the same `now` is a
/// no-op the second time. Articles dated after `now` are kept.
pub fn filter_window(articles: &[Article], hours: u32, now: DateTime<Utc>) -> Vec<Article> {
    articles
        .iter()
        .filter(|a| within_window(a, hours, now))
        .cloned()
        .collect()
}

pub fn within_window(article: &Article, hours: u32, now: DateTime<Utc>) -> bool {
    now.signed_duration_since(article.published_at) <= Duration::hours(i64::from(hours))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceId;
    use chrono::TimeZone;
    use std::collections::HashSet;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 23, 12, 0, 0).unwrap()
    }

    fn aged(url: &str, hours: i64, author: Option<&str>) -> Article {
        Article {
            title: format!("Story {url}"),
            url: url.to_string(),
            category: None,
            author: author.map(str::to_string),
            published_at: now() - Duration::hours(hours),
            source: Some(SourceId::CryptoSlate),
        }
    }

    #[test]
    fn merged_urls_are_unique() {
        let existing = vec![aged("a", 1, None), aged("b", 2, None), aged("a", 3, None)];
        let incoming = vec![aged("b", 2, Some("Bob")), aged("c", 4, None), aged("c", 5, None)];
        let merged = merge(existing, incoming);

        let urls: HashSet<_> = merged.iter().map(|a| a.url.as_str()).collect();
        assert_eq!(urls.len(), merged.len());
        assert_eq!(
            merged.iter().map(|a| a.url.as_str()).collect::<Vec<_>>(),
            vec!["a", "b", "c"]
        );
    }

    #[test]
    fn collision_never_erases_known_author() {
        let existing = vec![aged("a", 1, Some("Alice"))];
        let incoming = vec![aged("a", 1, None)];
        let merged = merge(existing, incoming);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].author.as_deref(), Some("Alice"));
    }

    #[test]
    fn collision_takes_incoming_author() {
        let merged = merge(vec![aged("a", 1, None)], vec![aged("a", 2, Some("Carol"))]);
        assert_eq!(merged[0].author.as_deref(), Some("Carol"));
        assert_eq!(merged[0].published_at, now() - Duration::hours(2));
    }

    #[test]
    fn dedupe_keeps_first_position() {
        let deduped = dedupe(vec![aged("x", 1, None), aged("y", 1, None), aged("x", 1, None)]);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].url, "x");
    }

    #[test]
    fn window_keeps_boundary_and_drops_older() {
        let articles = vec![aged("a", 1, None), aged("b", 48, None), aged("c", 49, None)];
        let kept = filter_window(&articles, 48, now());
        assert_eq!(
            kept.iter().map(|a| a.url.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
    }

    #[test]
    fn window_keeps_future_dated_articles() {
        let kept = filter_window(&[aged("a", -2, None)], 1, now());
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn window_is_idempotent() {
        let articles: Vec<_> = (0..20).map(|h| aged(&format!("u{h}"), h, None)).collect();
        let once = filter_window(&articles, 8, now());
        let twice = filter_window(&once, 8, now());
        assert_eq!(once, twice);
        assert_eq!(once.len(), 9);
    }
}
