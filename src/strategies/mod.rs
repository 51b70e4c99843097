//! Retrieval strategies.
//!
//! Each strategy fetches one result page through a different channel and
//! reports an `AttemptOutcome`; transport failures never cross the trait
//! boundary as errors. The orchestrator walks strategies in priority order.

pub mod api;
pub mod browser;
pub mod direct;
pub mod library;

use async_trait::async_trait;

use crate::identity::Identity;
use crate::search::{AttemptOutcome, SearchRequest};

/// One retrieval channel. Implementations are cheap to construct and hold no
/// per-invocation state; sessions (HTTP clients, browser pages) are scoped to
/// a single `fetch` call.
#[async_trait]
pub trait SearchStrategy: Send + Sync {
    /// Stable name used in outcomes and logs.
    fn name(&self) -> &'static str;

    /// Fetch one zero-based result page under the given identity.
    async fn fetch(&self, request: &SearchRequest, page: usize, identity: &Identity) -> AttemptOutcome;
}

/// The built-in strategy kinds, in default priority order: cheapest and
/// least detectable first, the API endpoint as last resort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    Direct,
    Library,
    Browser,
    Api,
}

impl StrategyKind {
    pub const DEFAULT_PRIORITY: [StrategyKind; 4] = [
        StrategyKind::Direct,
        StrategyKind::Library,
        StrategyKind::Browser,
        StrategyKind::Api,
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_priority_ends_with_api() {
        assert_eq!(StrategyKind::DEFAULT_PRIORITY.first(), Some(&StrategyKind::Direct));
        assert_eq!(StrategyKind::DEFAULT_PRIORITY.last(), Some(&StrategyKind::Api));
    }
}
