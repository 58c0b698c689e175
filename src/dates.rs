//! Date normalization for the formats the sources publish.
//!
//! Listing pages and feeds disagree on how to express a timestamp:
//!
//! | Source | Typical input |
//! |--------|---------------|
//! | CoinTelegraph RSS | `Wed, 23 Jul 2025 10:15:00 +0100` |
//! | CoinDesk cards | `2025-07-23T10:15:00.000Z` or `Jul 23, 2025 at 10:15 a.m. UTC` |
//! | CryptoSlate cards | `36 mins ago`, `2 hours ago` |
//!
//! [`normalize`] tries each strategy in turn and never fails: input that
//! matches nothing resolves to the reference instant (the fetch time).

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static RELATIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d+)\s*(minutes?|mins?|hours?|hrs?|days?)\s+ago\b")
        .expect("relative time pattern is valid")
});

const NAIVE_DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Convert a raw date string into a UTC instant.
///
/// Relative phrases resolve against `reference`. Anything that fails every
/// strategy yields `reference` itself; callers must not treat that as an error.
pub fn normalize(raw: &str, reference: DateTime<Utc>) -> DateTime<Utc> {
    match try_normalize(raw, reference) {
        Some(instant) => instant,
        None => {
            debug!(raw, "unparseable date; falling back to fetch time");
            reference
        }
    }
}

/// Like [`normalize`] but reports failure instead of falling back.
pub fn try_normalize(raw: &str, reference: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|n| Utc.from_utc_datetime(&n));
    }
    parse_display(raw).or_else(|| parse_relative(raw, reference))
}

/// CoinDesk's human-readable form, e.g. `Jul 23, 2025 at 10:15 a.m. UTC`.
fn parse_display(raw: &str) -> Option<DateTime<Utc>> {
    let cleaned = raw
        .replace("a.m.", "AM")
        .replace("p.m.", "PM")
        .replace(" at ", " ")
        .trim_end_matches("UTC")
        .trim()
        .to_string();
    ["%b %d, %Y %I:%M %p", "%B %d, %Y %I:%M %p", "%b %d, %Y"]
        .iter()
        .find_map(|fmt| {
            NaiveDateTime::parse_from_str(&cleaned, fmt).ok().or_else(|| {
                NaiveDate::parse_from_str(&cleaned, fmt)
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            })
        })
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// `<n> <minute|hour|day>(s) ago`, case-insensitive, resolved as `reference - n units`.
fn parse_relative(raw: &str, reference: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let caps = RELATIVE.captures(raw)?;
    let amount: i64 = caps[1].parse().ok()?;
    let unit = caps[2].to_ascii_lowercase();
    let delta = if unit.starts_with('m') {
        Duration::try_minutes(amount)?
    } else if unit.starts_with('h') {
        Duration::try_hours(amount)?
    } else {
        Duration::try_days(amount)?
    };
    reference.checked_sub_signed(delta)
}
