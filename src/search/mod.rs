//! Search request and attempt types shared across strategies and the
//! orchestrator.

pub mod extract;
pub mod normalize;
pub mod orchestrator;

use crate::detection::BlockSignal;

/// Immutable description of one search invocation.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub site_filter: Option<String>,
    pub pages_to_search: usize,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, site_filter: Option<String>, pages_to_search: usize) -> Self {
        Self {
            query: query.into(),
            site_filter,
            pages_to_search: pages_to_search.max(1),
        }
    }

    /// Query with the `site:` operator appended when a filter is set and the
    /// caller has not already included one.
    pub fn effective_query(&self) -> String {
        match &self.site_filter {
            Some(site) if !self.query.contains("site:") => {
                format!("{} site:{}", self.query, site)
            }
            _ => self.query.clone(),
        }
    }

    /// Result-page URL for the given zero-based page. Restricted to the past
    /// week so stale postings don't dominate.
    pub fn page_url(&self, page: usize) -> String {
        format!(
            "https://www.google.com/search?q={}&start={}&tbs=qdr:w",
            urlencoding::encode(&self.effective_query()),
            page * 10
        )
    }
}

/// What a single strategy attempt produced, from the orchestrator's point of
/// view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttemptStatus {
    Success,
    Captcha,
    RateLimited,
    Error,
}

impl From<BlockSignal> for AttemptStatus {
    fn from(signal: BlockSignal) -> Self {
        match signal {
            BlockSignal::Ok => AttemptStatus::Success,
            BlockSignal::Captcha => AttemptStatus::Captcha,
            BlockSignal::RateLimited => AttemptStatus::RateLimited,
            BlockSignal::UnknownError => AttemptStatus::Error,
        }
    }
}

/// Result of one `SearchStrategy::fetch` call. Strategies convert their own
/// transport failures into `Error` outcomes rather than returning `Err`.
#[derive(Debug, Clone)]
pub struct AttemptOutcome {
    pub strategy: &'static str,
    pub status: AttemptStatus,
    pub urls: Vec<String>,
    /// Diagnostic detail behind a non-success status.
    pub raw_signal: Option<String>,
}

impl AttemptOutcome {
    pub fn success(strategy: &'static str, urls: Vec<String>) -> Self {
        Self {
            strategy,
            status: AttemptStatus::Success,
            urls,
            raw_signal: None,
        }
    }

    pub fn blocked(strategy: &'static str, signal: BlockSignal, detail: impl Into<String>) -> Self {
        Self {
            strategy,
            status: signal.into(),
            urls: Vec::new(),
            raw_signal: Some(detail.into()),
        }
    }

    pub fn error(strategy: &'static str, detail: impl Into<String>) -> Self {
        Self {
            strategy,
            status: AttemptStatus::Error,
            urls: Vec::new(),
            raw_signal: Some(detail.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn site_filter_appends_operator() {
        let request = SearchRequest::new("rust engineer", Some("join.com".into()), 2);
        assert_eq!(request.effective_query(), "rust engineer site:join.com");
    }

    #[test]
    fn explicit_site_operator_is_kept() {
        let request = SearchRequest::new("rust site:greenhouse.io", Some("join.com".into()), 1);
        assert_eq!(request.effective_query(), "rust site:greenhouse.io");
    }

    #[test]
    fn page_url_paginates_by_ten() {
        let request = SearchRequest::new("rust engineer", None, 3);
        assert_eq!(
            request.page_url(0),
            "https://www.google.com/search?q=rust%20engineer&start=0&tbs=qdr:w"
        );
        assert!(request.page_url(2).contains("start=20"));
    }

    #[test]
    fn pages_to_search_is_at_least_one() {
        let request = SearchRequest::new("rust", None, 0);
        assert_eq!(request.pages_to_search, 1);
    }

    #[test]
    fn block_signals_map_to_statuses() {
        assert_eq!(AttemptStatus::from(BlockSignal::Ok), AttemptStatus::Success);
        assert_eq!(AttemptStatus::from(BlockSignal::Captcha), AttemptStatus::Captcha);
        assert_eq!(
            AttemptStatus::from(BlockSignal::RateLimited),
            AttemptStatus::RateLimited
        );
        assert_eq!(
            AttemptStatus::from(BlockSignal::UnknownError),
            AttemptStatus::Error
        );
    }
}
