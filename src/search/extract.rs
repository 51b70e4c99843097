//! Candidate-URL extraction from search-result HTML.
//!
//! Three passes over the document: result-block anchors, redirect anchors
//! (`/url?q=`), and cite elements. Extracted URLs are matched against the
//! job-posting URL shapes of the supported boards; anything else is dropped.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};

/// Result-block anchor selectors, most specific first.
static RESULT_SELECTORS: &[&str] = &["div.yuRUbf a", "div.g a", "div.tF2Cxc a"];

static JOIN_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https?://join\.com/companies/[^/]+/\d+[-\w]*(?:\?[\w=&-]+)?$")
        .expect("invalid join.com pattern")
});

static GREENHOUSE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https?://job-boards\.greenhouse\.io/[^/]+/jobs/\d+(?:\?[\w=&-]+)?$")
        .expect("invalid greenhouse pattern")
});

/// Whether a URL has the shape of a job posting on a supported board.
pub fn is_posting_url(url: &str) -> bool {
    JOIN_PATTERN.is_match(url) || GREENHOUSE_PATTERN.is_match(url)
}

/// Extract job-posting URLs from one result page, deduplicated in
/// first-seen order.
pub fn extract_posting_urls(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut seen = Vec::new();

    for selector_str in RESULT_SELECTORS {
        // Selectors are static and known-valid.
        let selector = Selector::parse(selector_str).expect("invalid result selector");
        for anchor in document.select(&selector) {
            if let Some(href) = anchor.value().attr("href") {
                push_candidate(&mut seen, href);
            }
        }
    }

    let all_anchors = Selector::parse("a").expect("invalid anchor selector");
    for anchor in document.select(&all_anchors) {
        if let Some(href) = anchor.value().attr("href")
            && href.starts_with("/url?q=")
            && let Some(target) = decode_redirect(href)
        {
            push_candidate(&mut seen, &target);
        }
    }

    let cites = Selector::parse("cite").expect("invalid cite selector");
    for cite in document.select(&cites) {
        let text: String = cite.text().collect();
        push_candidate(&mut seen, text.trim());
    }

    seen
}

/// Pull the target out of a Google `/url?q=<target>&...` redirect href.
fn decode_redirect(href: &str) -> Option<String> {
    let rest = href.strip_prefix("/url?q=")?;
    let encoded = rest.split('&').next()?;
    urlencoding::decode(encoded).ok().map(|decoded| decoded.into_owned())
}

fn push_candidate(seen: &mut Vec<String>, candidate: &str) {
    if is_posting_url(candidate) && !seen.iter().any(|existing| existing == candidate) {
        seen.push(candidate.to_string());
    }
}
