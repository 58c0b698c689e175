//! Utility functions for text cleanup, URL resolution, HTML extraction, and
//! file system checks.
//!
//! - Whitespace normalization for scraped text
//! - Resolving relative links against a source's base URL
//! - First-match text/attribute lookups over `scraper` selectors
//! - String truncation for logging
//! - Output directory validation

use scraper::{ElementRef, Html, Selector};
use std::error::Error;
use std::fs as stdfs;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};
use url::Url;

/// Collapse runs of whitespace and trim.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(clean_text("  Bitcoin \n  rallies "), "Bitcoin rallies");
/// ```
pub fn clean_text(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `Some(cleaned)` when the cleaned text is non-empty.
pub fn non_blank(s: &str) -> Option<String> {
    let cleaned = clean_text(s);
    (!cleaned.is_empty()).then_some(cleaned)
}

/// Resolve `href` against `base`. Absolute links pass through unchanged.
pub fn resolve_url(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    base.join(href).ok().map(|u| u.to_string())
}

/// Text of the first element under `root` matching `selector`, if non-blank.
pub fn first_text(root: ElementRef<'_>, selector: &Selector) -> Option<String> {
    root.select(selector)
        .find_map(|el| non_blank(&el.text().collect::<String>()))
}

/// Attribute `attr` of the first element under `root` matching `selector`.
pub fn first_attr(root: ElementRef<'_>, selector: &Selector, attr: &str) -> Option<String> {
    root.select(selector)
        .find_map(|el| el.value().attr(attr).and_then(non_blank))
}

/// Same as [`first_text`] over a whole document.
pub fn doc_text(doc: &Html, selector: &Selector) -> Option<String> {
    first_text(doc.root_element(), selector)
}

/// Same as [`first_attr`] over a whole document.
pub fn doc_attr(doc: &Html, selector: &Selector, attr: &str) -> Option<String> {
    first_attr(doc.root_element(), selector, attr)
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut at `max` bytes (backing off to a char boundary) with
/// an ellipsis and byte count appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if missing, then writes and removes a probe file.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or is not writable.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    let probe_path = path.join("..__probe_write__");
    match stdfs::File::create(&probe_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&probe_path);
            info!("Output directory is writable");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}
