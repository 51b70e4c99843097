//! Retrieval through an injected search backend.
//!
//! The backend is a black box supplied by the caller (a wrapper over some
//! search library or internal service). This strategy only translates its
//! results and failures into attempt outcomes.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::detection::BlockSignal;
use crate::identity::Identity;
use crate::search::{AttemptOutcome, SearchRequest};
use crate::strategies::SearchStrategy;

const NAME: &str = "library";

#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend itself was blocked by the search engine.
    #[error("backend blocked: {0:?}")]
    Blocked(BlockSignal),
    #[error("backend failure: {0}")]
    Failure(String),
}

/// Caller-supplied search backend. Implementations fetch one zero-based page
/// of result URLs for a query string.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search_page(&self, query: &str, page: usize) -> Result<Vec<String>, BackendError>;
}

pub struct LibrarySearch {
    backend: Arc<dyn SearchBackend>,
}

impl LibrarySearch {
    pub fn new(backend: Arc<dyn SearchBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl SearchStrategy for LibrarySearch {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn fetch(&self, request: &SearchRequest, page: usize, _identity: &Identity) -> AttemptOutcome {
        let query = request.effective_query();
        log::debug!("library fetch page {page}: {query}");

        match self.backend.search_page(&query, page).await {
            Ok(urls) => AttemptOutcome::success(NAME, urls),
            Err(BackendError::Blocked(signal)) => {
                AttemptOutcome::blocked(NAME, signal, "backend reported blocking")
            }
            Err(BackendError::Failure(detail)) => AttemptOutcome::error(NAME, detail),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IdentityHealth;
    use crate::search::AttemptStatus;

    struct FixedBackend(Result<Vec<String>, BackendError>);

    #[async_trait]
    impl SearchBackend for FixedBackend {
        async fn search_page(&self, _query: &str, _page: usize) -> Result<Vec<String>, BackendError> {
            match &self.0 {
                Ok(urls) => Ok(urls.clone()),
                Err(BackendError::Blocked(signal)) => Err(BackendError::Blocked(*signal)),
                Err(BackendError::Failure(detail)) => Err(BackendError::Failure(detail.clone())),
            }
        }
    }

    fn identity() -> Identity {
        Identity {
            id: 0,
            user_agent: "test-agent".into(),
            proxy: None,
            health: IdentityHealth::Untested,
        }
    }

    fn request() -> SearchRequest {
        SearchRequest::new("rust engineer", Some("join.com".into()), 1)
    }

    #[tokio::test]
    async fn backend_results_become_success() {
        let strategy = LibrarySearch::new(Arc::new(FixedBackend(Ok(vec!["u1".into()]))));
        let outcome = strategy.fetch(&request(), 0, &identity()).await;
        assert_eq!(outcome.status, AttemptStatus::Success);
        assert_eq!(outcome.urls, vec!["u1"]);
    }

    #[tokio::test]
    async fn backend_blocking_maps_to_signal() {
        let strategy = LibrarySearch::new(Arc::new(FixedBackend(Err(BackendError::Blocked(
            BlockSignal::RateLimited,
        )))));
        let outcome = strategy.fetch(&request(), 0, &identity()).await;
        assert_eq!(outcome.status, AttemptStatus::RateLimited);
    }

    #[tokio::test]
    async fn backend_failure_maps_to_error() {
        let strategy = LibrarySearch::new(Arc::new(FixedBackend(Err(BackendError::Failure(
            "socket closed".into(),
        )))));
        let outcome = strategy.fetch(&request(), 0, &identity()).await;
        assert_eq!(outcome.status, AttemptStatus::Error);
        assert_eq!(outcome.raw_signal.as_deref(), Some("socket closed"));
    }
}
