//! Author and topic frequency rankings.
//!
//! Rankings are derived on demand from an article set and never stored.
//! Ordering is by count, descending. Ties keep first-seen order, which
//! depends on the article order fed in; it is not alphabetical. Use
//! [`with_name_tiebreak`] when a fully deterministic order is needed.

use crate::models::{Article, RankingItem};
use itertools::Itertools;
use serde::Serialize;
use std::collections::HashMap;

/// Built-in topic keywords, already lower-cased.
pub const DEFAULT_TOPIC_KEYWORDS: [&str; 13] = [
    "bitcoin",
    "ethereum",
    "solana",
    "defi",
    "nft",
    "stablecoin",
    "etf",
    "layer 2",
    "arbitrum",
    "polkadot",
    "cardano",
    "ai",
    "memecoin",
];

/// Insertion-ordered counter.
#[derive(Debug, Default)]
struct Tally {
    items: Vec<RankingItem>,
    index: HashMap<String, usize>,
}

impl Tally {
    fn bump(&mut self, name: &str) {
        match self.index.get(name) {
            Some(&slot) => self.items[slot].count += 1,
            None => {
                self.index.insert(name.to_string(), self.items.len());
                self.items.push(RankingItem {
                    name: name.to_string(),
                    count: 1,
                });
            }
        }
    }

    fn into_ranking(mut self) -> Vec<RankingItem> {
        // stable: equal counts stay in first-seen order
        self.items.sort_by(|a, b| b.count.cmp(&a.count));
        self.items
    }
}

/// Count articles per author. Articles without an author are skipped.
pub fn rank_authors(articles: &[Article]) -> Vec<RankingItem> {
    let mut tally = Tally::default();
    for author in articles.iter().filter_map(|a| a.author.as_deref()) {
        let author = author.trim();
        if !author.is_empty() {
            tally.bump(author);
        }
    }
    tally.into_ranking()
}

/// Count keyword hits in lower-cased titles. One title may hit several
/// keywords; each hit counts once per article.
pub fn rank_topics<S: AsRef<str>>(articles: &[Article], keywords: &[S]) -> Vec<RankingItem> {
    let keywords: Vec<String> = keywords.iter().map(|k| k.as_ref().to_lowercase()).collect();
    let mut tally = Tally::default();
    for article in articles {
        let title = article.title.to_lowercase();
        for keyword in keywords.iter().filter(|k| !k.is_empty()) {
            if title.contains(keyword.as_str()) {
                tally.bump(keyword);
            }
        }
    }
    tally.into_ranking()
}

/// Re-sort by count descending, then name ascending.
pub fn with_name_tiebreak(items: Vec<RankingItem>) -> Vec<RankingItem> {
    items
        .into_iter()
        .sorted_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)))
        .collect()
}

/// Both rankings for one article set, as printed by the binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rankings {
    pub authors: Vec<RankingItem>,
    pub topics: Vec<RankingItem>,
}

impl Rankings {
    pub fn compute<S: AsRef<str>>(articles: &[Article], keywords: &[S], sorted_names: bool) -> Self {
        let authors = rank_authors(articles);
        let topics = rank_topics(articles, keywords);
        if sorted_names {
            Self {
                authors: with_name_tiebreak(authors),
                topics: with_name_tiebreak(topics),
            }
        } else {
            Self { authors, topics }
        }
    }
}
