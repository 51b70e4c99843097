//! Strategy orchestration state machine.
//!
//! Walks the enabled strategies in priority order. Within a strategy it pages
//! through results, retrying blocked attempts with fresh identities and
//! exponential backoff, and switches to the next strategy when the current
//! one keeps getting blocked. Terminal states always return whatever was
//! accumulated, never an error.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::identity::IdentityPool;
use crate::pacing::{Pacer, PacingConfig};
use crate::search::{AttemptStatus, SearchRequest};
use crate::strategies::SearchStrategy;

/// Knobs the orchestrator runs under. Resolved once at scraper construction.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Retries per page per strategy before switching strategy.
    pub max_retries: u32,
    /// Wall-clock cap on a single strategy attempt; elapse counts as Error.
    pub attempt_timeout: Duration,
    /// Stop paging once this many raw URLs have been accumulated.
    pub max_results: Option<usize>,
    pub pacing: PacingConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            attempt_timeout: Duration::from_secs(45),
            max_results: None,
            pacing: PacingConfig::default(),
        }
    }
}

/// Cooperative cancellation handle. Checked between attempts and pages; an
/// in-flight attempt is never interrupted.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Clear the flag. A cancellation only covers one invocation; the owner
    /// resets the flag before starting the next run.
    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// A strategy completed its pages (or hit end-of-results).
    Done,
    /// Every strategy was exhausted by blocking.
    Exhausted,
    /// The cancel flag was raised.
    Cancelled,
}

/// Accumulated result of one orchestrator run. `urls` is raw and ordered;
/// normalization happens in the caller.
#[derive(Debug, Clone)]
pub struct SearchReport {
    pub urls: Vec<String>,
    pub attempts: usize,
    pub outcome: RunOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

pub struct Orchestrator<'a> {
    strategies: &'a [Arc<dyn SearchStrategy>],
    pool: &'a mut IdentityPool,
    pacer: &'a dyn Pacer,
    config: &'a OrchestratorConfig,
    cancel: CancelFlag,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        strategies: &'a [Arc<dyn SearchStrategy>],
        pool: &'a mut IdentityPool,
        pacer: &'a dyn Pacer,
        config: &'a OrchestratorConfig,
        cancel: CancelFlag,
    ) -> Self {
        Self {
            strategies,
            pool,
            pacer,
            config,
            cancel,
        }
    }

    /// Run the state machine to completion for one request.
    pub async fn run(mut self, request: &SearchRequest) -> SearchReport {
        let started_at = Utc::now();
        let finish = move |urls: Vec<String>, attempts: usize, outcome: RunOutcome| SearchReport {
            urls,
            attempts,
            outcome,
            started_at,
            finished_at: Utc::now(),
        };

        let mut urls: Vec<String> = Vec::new();
        let mut attempts = 0usize;

        'strategies: for strategy in self.strategies {
            log::debug!("selecting strategy {}", strategy.name());

            'pages: for page in 0..request.pages_to_search {
                let mut retries = 0u32;

                loop {
                    if self.cancel.is_cancelled() {
                        log::debug!("cancelled after {attempts} attempts");
                        return finish(urls, attempts, RunOutcome::Cancelled);
                    }
                    if let Some(max) = self.config.max_results
                        && urls.len() >= max
                    {
                        return finish(urls, attempts, RunOutcome::Done);
                    }

                    if page > 0 && retries == 0 {
                        self.pacer.pause(self.config.pacing.page_delay()).await;
                    }

                    let identity = match self.pool.next_identity() {
                        Ok(identity) => identity,
                        Err(err) => {
                            log::warn!("{err}");
                            return finish(urls, attempts, RunOutcome::Exhausted);
                        }
                    };

                    attempts += 1;
                    let outcome = match tokio::time::timeout(
                        self.config.attempt_timeout,
                        strategy.fetch(request, page, &identity),
                    )
                    .await
                    {
                        Ok(outcome) => outcome,
                        Err(_) => {
                            log::warn!(
                                "{} page {page} timed out after {:?}",
                                strategy.name(),
                                self.config.attempt_timeout
                            );
                            crate::search::AttemptOutcome::error(strategy.name(), "attempt timed out")
                        }
                    };

                    match outcome.status {
                        AttemptStatus::Success => {
                            self.pool.mark_healthy(&identity);
                            if outcome.urls.is_empty() {
                                // End of results for this query.
                                log::debug!("{} page {page} empty, stopping pagination", strategy.name());
                                return finish(urls, attempts, RunOutcome::Done);
                            }
                            urls.extend(outcome.urls);
                            continue 'pages;
                        }
                        AttemptStatus::Captcha => {
                            log::warn!(
                                "{} page {page} hit a captcha wall: {:?}",
                                strategy.name(),
                                outcome.raw_signal
                            );
                            self.pacer.pause(self.config.pacing.captcha_cooldown()).await;
                            continue 'strategies;
                        }
                        AttemptStatus::RateLimited => {
                            self.pool.mark_dead(&identity);
                            retries += 1;
                            if retries >= self.config.max_retries {
                                log::warn!(
                                    "{} rate limited {retries} times on page {page}, switching strategy",
                                    strategy.name()
                                );
                                continue 'strategies;
                            }
                            self.pacer.pause(self.config.pacing.backoff(retries - 1)).await;
                        }
                        AttemptStatus::Error => {
                            retries += 1;
                            if retries >= self.config.max_retries {
                                log::warn!(
                                    "{} failed {retries} times on page {page}: {:?}",
                                    strategy.name(),
                                    outcome.raw_signal
                                );
                                continue 'strategies;
                            }
                            self.pacer.pause(self.config.pacing.backoff(retries - 1)).await;
                        }
                    }
                }
            }

            // All pages fetched through one strategy.
            return finish(urls, attempts, RunOutcome::Done);
        }

        log::warn!("all strategies exhausted after {attempts} attempts");
        finish(urls, attempts, RunOutcome::Exhausted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::detection::BlockSignal;
    use crate::identity::Identity;
    use crate::pacing::NoopPacer;
    use crate::search::AttemptOutcome;

    /// Strategy that replays a script of outcomes, then repeats the last one.
    struct Scripted {
        name: &'static str,
        script: Mutex<VecDeque<AttemptOutcome>>,
        fallback: AttemptOutcome,
    }

    impl Scripted {
        fn new(name: &'static str, script: Vec<AttemptOutcome>, fallback: AttemptOutcome) -> Self {
            Self {
                name,
                script: Mutex::new(script.into()),
                fallback,
            }
        }
    }

    #[async_trait]
    impl SearchStrategy for Scripted {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn fetch(&self, _request: &SearchRequest, _page: usize, _identity: &Identity) -> AttemptOutcome {
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| self.fallback.clone())
        }
    }

    fn captcha(name: &'static str) -> AttemptOutcome {
        AttemptOutcome::blocked(name, BlockSignal::Captcha, "wall")
    }

    fn rate_limited(name: &'static str) -> AttemptOutcome {
        AttemptOutcome::blocked(name, BlockSignal::RateLimited, "429")
    }

    fn request(pages: usize) -> SearchRequest {
        SearchRequest::new("rust engineer", None, pages)
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
    async fn single_strategy_always_captcha_exhausts_empty() {
        let strategies: Vec<Arc<dyn SearchStrategy>> = vec![Arc::new(Scripted::new(
            "direct",
            vec![],
            captcha("direct"),
        ))];
        let mut pool = IdentityPool::new(["ua-a", "ua-b"], &[]);
        let config = config(3);
        let report = Orchestrator::new(&strategies, &mut pool, &NoopPacer, &config, CancelFlag::new())
            .run(&request(3))
            .await;

        assert_eq!(report.outcome, RunOutcome::Exhausted);
        assert!(report.urls.is_empty());
        assert_eq!(report.attempts, 1);
        assert_eq!(pool.report().dead, 0);
    }

    #[tokio::test]
    async fn rate_limits_then_success_recovers() {
        let strategies: Vec<Arc<dyn SearchStrategy>> = vec![Arc::new(Scripted::new(
            "direct",
            vec![
                rate_limited("direct"),
                rate_limited("direct"),
                AttemptOutcome::success("direct", vec!["u1".into(), "u2".into()]),
            ],
            AttemptOutcome::success("direct", vec![]),
        ))];
        let mut pool = IdentityPool::new(["ua-a", "ua-b", "ua-c"], &[]);
        let config = config(3);
        let report = Orchestrator::new(&strategies, &mut pool, &NoopPacer, &config, CancelFlag::new())
            .run(&request(1))
            .await;

        assert_eq!(report.outcome, RunOutcome::Done);
        assert_eq!(report.urls, vec!["u1", "u2"]);
        assert_eq!(pool.report().dead, 2);
        assert_eq!(pool.report().healthy, 1);
    }

    #[tokio::test]
    async fn bounded_attempts_under_constant_rate_limiting() {
        let strategies: Vec<Arc<dyn SearchStrategy>> = vec![
            Arc::new(Scripted::new("direct", vec![], rate_limited("direct"))),
            Arc::new(Scripted::new("browser", vec![], rate_limited("browser"))),
        ];
        let mut pool = IdentityPool::new(["ua-a", "ua-b"], &[]);
        let config = config(3);
        let report = Orchestrator::new(&strategies, &mut pool, &NoopPacer, &config, CancelFlag::new())
            .run(&request(5))
            .await;

        assert_eq!(report.outcome, RunOutcome::Exhausted);
        // max_retries * strategies + strategies is the hard ceiling.
        assert!(report.attempts <= 3 * 2 + 2);
    }

    #[tokio::test]
    async fn empty_successful_page_stops_pagination() {
        let strategies: Vec<Arc<dyn SearchStrategy>> = vec![Arc::new(Scripted::new(
            "direct",
            vec![
                AttemptOutcome::success("direct", vec!["u1".into()]),
                AttemptOutcome::success("direct", vec![]),
            ],
            rate_limited("direct"),
        ))];
        let mut pool = IdentityPool::with_defaults();
        let config = config(3);
        let report = Orchestrator::new(&strategies, &mut pool, &NoopPacer, &config, CancelFlag::new())
            .run(&request(10))
            .await;

        assert_eq!(report.outcome, RunOutcome::Done);
        assert_eq!(report.urls, vec!["u1"]);
        assert_eq!(report.attempts, 2);
    }

    #[tokio::test]
    async fn captcha_switches_to_next_strategy() {
        let strategies: Vec<Arc<dyn SearchStrategy>> = vec![
            Arc::new(Scripted::new("direct", vec![], captcha("direct"))),
            Arc::new(Scripted::new(
                "browser",
                vec![AttemptOutcome::success("browser", vec!["u9".into()])],
                AttemptOutcome::success("browser", vec![]),
            )),
        ];
        let mut pool = IdentityPool::new(["ua-a"], &[]);
        let config = config(3);
        let report = Orchestrator::new(&strategies, &mut pool, &NoopPacer, &config, CancelFlag::new())
            .run(&request(1))
            .await;

        assert_eq!(report.outcome, RunOutcome::Done);
        assert_eq!(report.urls, vec!["u9"]);
        // Captcha leaves the identity untouched.
        assert_eq!(pool.report().dead, 0);
    }

    #[tokio::test]
    async fn cancellation_returns_partial_results() {
        let cancel = CancelFlag::new();
        let cancel_inner = cancel.clone();

        struct CancelAfterFirst {
            flag: CancelFlag,
        }

        #[async_trait]
        impl SearchStrategy for CancelAfterFirst {
            fn name(&self) -> &'static str {
                "direct"
            }

            async fn fetch(&self, _r: &SearchRequest, _p: usize, _i: &Identity) -> AttemptOutcome {
                self.flag.cancel();
                AttemptOutcome::success("direct", vec!["u1".into()])
            }
        }

        let strategies: Vec<Arc<dyn SearchStrategy>> =
            vec![Arc::new(CancelAfterFirst { flag: cancel_inner })];
        let mut pool = IdentityPool::new(["ua-a"], &[]);
        let config = config(3);
        let report = Orchestrator::new(&strategies, &mut pool, &NoopPacer, &config, cancel)
            .run(&request(5))
            .await;

        assert_eq!(report.outcome, RunOutcome::Cancelled);
        assert_eq!(report.urls, vec!["u1"]);
        assert_eq!(report.attempts, 1);
    }

    #[test]
    fn cancel_flag_resets() {
        let flag = CancelFlag::new();
        flag.cancel();
        assert!(flag.is_cancelled());
        flag.reset();
        assert!(!flag.is_cancelled());
    }

    #[tokio::test]
    async fn empty_pool_exhausts_immediately() {
        let strategies: Vec<Arc<dyn SearchStrategy>> = vec![Arc::new(Scripted::new(
            "direct",
            vec![],
            AttemptOutcome::success("direct", vec!["u1".into()]),
        ))];
        let mut pool = IdentityPool::new(Vec::<String>::new(), &[]);
        let config = config(3);
        let report = Orchestrator::new(&strategies, &mut pool, &NoopPacer, &config, CancelFlag::new())
            .run(&request(1))
            .await;

        assert_eq!(report.outcome, RunOutcome::Exhausted);
        assert_eq!(report.attempts, 0);
    }
}
