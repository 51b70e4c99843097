//! End-to-end orchestration scenarios with scripted strategies.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use jobscout_rs::{
    AttemptOutcome, BlockSignal, CancelFlag, Identity, IdentityPool, NoopPacer, Orchestrator,
    OrchestratorConfig, PacingConfig, RunOutcome, SearchRequest, SearchStrategy, normalize,
};

/// Strategy that always succeeds with a fixed URL per page and counts its
/// fetches.
struct CountingSuccess {
    name: &'static str,
    fetches: AtomicUsize,
}

impl CountingSuccess {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            fetches: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SearchStrategy for CountingSuccess {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn fetch(&self, _request: &SearchRequest, page: usize, _identity: &Identity) -> AttemptOutcome {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        AttemptOutcome::success(
            self.name,
            vec![format!("https://join.com/companies/acme/{}", page + 1)],
        )
    }
}

/// Strategy that always reports the same blocking signal.
struct AlwaysBlocked {
    name: &'static str,
    signal: BlockSignal,
}

#[async_trait]
impl SearchStrategy for AlwaysBlocked {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn fetch(&self, _request: &SearchRequest, _page: usize, _identity: &Identity) -> AttemptOutcome {
        AttemptOutcome::blocked(self.name, self.signal, "scripted block")
    }
}

fn config(max_retries: u32) -> OrchestratorConfig {
    OrchestratorConfig {
        max_retries,
        attempt_timeout: Duration::from_secs(5),
        max_results: None,
        pacing: PacingConfig::default(),
    }
}

#[tokio::test]
async fn fetches_at_most_pages_to_search() {
    let strategy = Arc::new(CountingSuccess::new("direct"));
    let strategies: Vec<Arc<dyn SearchStrategy>> = vec![strategy.clone()];
    let mut pool = IdentityPool::with_defaults();
    let config = config(3);

    let report = Orchestrator::new(&strategies, &mut pool, &NoopPacer, &config, CancelFlag::new())
        .run(&SearchRequest::new("rust engineer", None, 3))
        .await;

    assert_eq!(report.outcome, RunOutcome::Done);
    assert_eq!(strategy.fetches.load(Ordering::SeqCst), 3);
    assert_eq!(report.urls.len(), 3);
}

#[tokio::test]
async fn captcha_cascade_falls_through_to_working_strategy() {
    let fallback = Arc::new(CountingSuccess::new("api"));
    let strategies: Vec<Arc<dyn SearchStrategy>> = vec![
        Arc::new(AlwaysBlocked {
            name: "direct",
            signal: BlockSignal::Captcha,
        }),
        Arc::new(AlwaysBlocked {
            name: "browser",
            signal: BlockSignal::Captcha,
        }),
        fallback.clone(),
    ];
    let mut pool = IdentityPool::with_defaults();
    let config = config(3);

    let report = Orchestrator::new(&strategies, &mut pool, &NoopPacer, &config, CancelFlag::new())
        .run(&SearchRequest::new("rust engineer", None, 2))
        .await;

    assert_eq!(report.outcome, RunOutcome::Done);
    // One captcha attempt per blocked strategy, then the fallback pages.
    assert_eq!(report.attempts, 2 + 2);
    assert_eq!(fallback.fetches.load(Ordering::SeqCst), 2);
    // Captcha never kills identities.
    assert_eq!(pool.report().dead, 0);
}

#[tokio::test]
async fn timed_out_attempts_count_as_errors_and_exhaust() {
    struct Stalls;

    #[async_trait]
    impl SearchStrategy for Stalls {
        fn name(&self) -> &'static str {
            "direct"
        }

        async fn fetch(&self, _r: &SearchRequest, _p: usize, _i: &Identity) -> AttemptOutcome {
            tokio::time::sleep(Duration::from_secs(60)).await;
            AttemptOutcome::success("direct", vec!["never".into()])
        }
    }

    let strategies: Vec<Arc<dyn SearchStrategy>> = vec![Arc::new(Stalls)];
    let mut pool = IdentityPool::with_defaults();
    let config = OrchestratorConfig {
        max_retries: 2,
        attempt_timeout: Duration::from_millis(20),
        max_results: None,
        pacing: PacingConfig::default(),
    };

    let report = Orchestrator::new(&strategies, &mut pool, &NoopPacer, &config, CancelFlag::new())
        .run(&SearchRequest::new("rust engineer", None, 1))
        .await;

    assert_eq!(report.outcome, RunOutcome::Exhausted);
    assert!(report.urls.is_empty());
    assert_eq!(report.attempts, 2);
    // Timeouts are errors, not rate limits; identities survive.
    assert_eq!(pool.report().dead, 0);
}

#[tokio::test]
async fn greenhouse_filter_keeps_only_matching_urls() {
    struct MixedResults;

    #[async_trait]
    impl SearchStrategy for MixedResults {
        fn name(&self) -> &'static str {
            "direct"
        }

        async fn fetch(&self, _r: &SearchRequest, _p: usize, _i: &Identity) -> AttemptOutcome {
            AttemptOutcome::success(
                "direct",
                vec![
                    "https://join.com/companies/acme/1".into(),
                    "https://boards.greenhouse.io/acme/jobs/2?gh_src=tok".into(),
                    "https://example.com/jobs/3".into(),
                ],
            )
        }
    }

    let strategies: Vec<Arc<dyn SearchStrategy>> = vec![Arc::new(MixedResults)];
    let mut pool = IdentityPool::with_defaults();
    let config = config(3);

    let report = Orchestrator::new(&strategies, &mut pool, &NoopPacer, &config, CancelFlag::new())
        .run(&SearchRequest::new("backend engineer", Some("greenhouse.io".into()), 1))
        .await;

    let urls = normalize(&report.urls, Some("greenhouse.io"), None);
    assert_eq!(urls, vec!["https://boards.greenhouse.io/acme/jobs/2"]);
}

#[tokio::test]
async fn rate_limited_strategies_burn_identities_then_exhaust() {
    let strategies: Vec<Arc<dyn SearchStrategy>> = vec![Arc::new(AlwaysBlocked {
        name: "direct",
        signal: BlockSignal::RateLimited,
    })];
    let mut pool = IdentityPool::new(["ua-a", "ua-b", "ua-c", "ua-d", "ua-e"], &[]);
    let config = config(3);

    let report = Orchestrator::new(&strategies, &mut pool, &NoopPacer, &config, CancelFlag::new())
        .run(&SearchRequest::new("rust engineer", None, 2))
        .await;

    assert_eq!(report.outcome, RunOutcome::Exhausted);
    assert!(report.urls.is_empty());
    assert_eq!(report.attempts, 3);
    assert_eq!(pool.report().dead, 3);
}
