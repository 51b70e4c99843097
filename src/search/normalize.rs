//! Result normalization: tracking-param removal, site filtering, dedup.

use url::Url;

/// Query parameters stripped from result URLs. Exact-match keys plus the
/// `utm_` prefix family.
static TRACKING_PARAMS: &[&str] = &[
    "gclid", "fbclid", "msclkid", "ved", "usg", "sa", "ei", "oq", "gs_lcp", "gh_src", "ref",
    "source",
];

/// Normalize a raw URL list into the final result set.
///
/// Per URL: parse, lowercase the host, strip tracking parameters. URLs that
/// fail to parse are dropped. The site filter is a case-insensitive substring
/// match over host plus path. Dedup preserves first-seen order; `max_results`
/// truncates after dedup. Idempotent.
pub fn normalize(urls: &[String], site_filter: Option<&str>, max_results: Option<usize>) -> Vec<String> {
    let filter = site_filter.map(str::to_ascii_lowercase);
    let mut seen = Vec::new();

    for raw in urls {
        let Some(parsed) = normalize_one(raw) else {
            log::debug!("dropping unparseable result url: {raw}");
            continue;
        };

        if let Some(filter) = &filter {
            let haystack = format!(
                "{}{}",
                parsed.host_str().unwrap_or_default(),
                parsed.path()
            )
            .to_ascii_lowercase();
            if !haystack.contains(filter.as_str()) {
                continue;
            }
        }

        let cleaned = parsed.to_string();
        if !seen.iter().any(|existing| existing == &cleaned) {
            seen.push(cleaned);
        }
    }

    if let Some(max) = max_results {
        seen.truncate(max);
    }
    seen
}

fn normalize_one(raw: &str) -> Option<Url> {
    let mut parsed = Url::parse(raw).ok()?;
    parsed.host_str()?;

    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    if kept.is_empty() {
        parsed.set_query(None);
    } else {
        let mut pairs = parsed.query_pairs_mut();
        pairs.clear();
        for (key, value) in &kept {
            pairs.append_pair(key, value);
        }
        drop(pairs);
    }

    Some(parsed)
}

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key.as_str())
}
