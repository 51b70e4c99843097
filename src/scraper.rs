//! High level scraper orchestration.
//!
//! Wires the identity pool, blocking detector, retrieval strategies, and the
//! orchestrator into an ergonomic `JobScraper` built through a fluent
//! builder. One invocation lock serializes `search_jobs` calls so identity
//! health mutates without interleaving.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use url::Url;

use crate::detection::BlockingDetector;
use crate::external_deps::captcha::CaptchaProvider;
use crate::identity::{DEFAULT_USER_AGENTS, IdentityPool};
use crate::pacing::{Pacer, PacingConfig, TokioPacer};
use crate::search::normalize::normalize;
use crate::search::orchestrator::{CancelFlag, Orchestrator, OrchestratorConfig};
use crate::search::SearchRequest;
use crate::stealth::{StealthConfig, StealthError, cookie_header, load_cookie_file};
use crate::strategies::api::ApiEndpoint;
use crate::strategies::browser::BrowserStealth;
use crate::strategies::direct::DirectRequest;
use crate::strategies::library::{LibrarySearch, SearchBackend};
use crate::strategies::{SearchStrategy, StrategyKind};

/// Result alias for construction-time failures.
pub type JobScraperResult<T> = Result<T, JobScraperError>;

/// Errors surfaced while building a scraper. Searching itself never fails;
/// an empty result set is a valid outcome.
#[derive(Debug, Error)]
pub enum JobScraperError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("invalid proxy url {0}: {1}")]
    InvalidProxy(String, url::ParseError),
    #[error("invalid captcha marker: {0}")]
    InvalidMarker(#[from] regex::Error),
    #[error(transparent)]
    Stealth(#[from] StealthError),
    #[error("invalid api endpoint: {0}")]
    InvalidApiEndpoint(url::ParseError),
}

/// Scraper configuration used by the builder. Immutable once built.
#[derive(Clone)]
pub struct JobScraperConfig {
    pub use_direct: bool,
    pub use_library: bool,
    pub use_browser: bool,
    pub use_api: bool,
    pub use_stealth: bool,
    pub headless: bool,
    pub max_retries: u32,
    pub attempt_timeout: Duration,
    pub max_results: Option<usize>,
    pub proxies: Vec<String>,
    pub user_agents: Vec<String>,
    pub cookies_file: Option<PathBuf>,
    pub captcha_markers: Option<Vec<String>>,
    pub pacing: PacingConfig,
    pub strategy_priority: Option<Vec<StrategyKind>>,
    pub api_endpoint: Option<String>,
    pub api_key: Option<String>,
    pub captcha_provider: Option<Arc<dyn CaptchaProvider>>,
    pub library_backend: Option<Arc<dyn SearchBackend>>,
}

impl Default for JobScraperConfig {
    fn default() -> Self {
        Self {
            use_direct: true,
            use_library: true,
            use_browser: true,
            use_api: true,
            use_stealth: true,
            headless: true,
            max_retries: 3,
            attempt_timeout: Duration::from_secs(45),
            max_results: None,
            proxies: Vec::new(),
            user_agents: DEFAULT_USER_AGENTS.iter().map(|ua| ua.to_string()).collect(),
            cookies_file: None,
            captcha_markers: None,
            pacing: PacingConfig::default(),
            strategy_priority: None,
            api_endpoint: None,
            api_key: None,
            captcha_provider: None,
            library_backend: None,
        }
    }
}

/// Fluent builder for [`JobScraper`].
pub struct JobScraperBuilder {
    config: JobScraperConfig,
}

impl JobScraperBuilder {
    pub fn new() -> Self {
        Self {
            config: JobScraperConfig::default(),
        }
    }

    pub fn use_direct(mut self, enabled: bool) -> Self {
        self.config.use_direct = enabled;
        self
    }

    pub fn use_library(mut self, enabled: bool) -> Self {
        self.config.use_library = enabled;
        self
    }

    pub fn use_browser(mut self, enabled: bool) -> Self {
        self.config.use_browser = enabled;
        self
    }

    pub fn use_api(mut self, enabled: bool) -> Self {
        self.config.use_api = enabled;
        self
    }

    pub fn use_stealth(mut self, enabled: bool) -> Self {
        self.config.use_stealth = enabled;
        self
    }

    pub fn headless(mut self, enabled: bool) -> Self {
        self.config.headless = enabled;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries.max(1);
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.config.attempt_timeout = timeout;
        self
    }

    pub fn with_max_results(mut self, max: usize) -> Self {
        self.config.max_results = Some(max);
        self
    }

    pub fn with_proxies<I, S>(mut self, proxies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.proxies = proxies.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_user_agents<I, S>(mut self, agents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.user_agents = agents.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_cookies_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.cookies_file = Some(path.into());
        self
    }

    pub fn with_captcha_markers<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.captcha_markers = Some(markers.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_pacing(mut self, pacing: PacingConfig) -> Self {
        self.config.pacing = pacing;
        self
    }

    pub fn with_strategy_priority(mut self, priority: Vec<StrategyKind>) -> Self {
        self.config.strategy_priority = Some(priority);
        self
    }

    pub fn with_api_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.api_endpoint = Some(endpoint.into());
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn with_captcha_provider(mut self, provider: Arc<dyn CaptchaProvider>) -> Self {
        self.config.captcha_provider = Some(provider);
        self
    }

    pub fn with_library_backend(mut self, backend: Arc<dyn SearchBackend>) -> Self {
        self.config.library_backend = Some(backend);
        self
    }

    pub fn build(self) -> JobScraperResult<JobScraper> {
        JobScraper::with_config(self.config)
    }
}

impl Default for JobScraperBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Main scraper orchestrator.
pub struct JobScraper {
    strategies: Vec<Arc<dyn SearchStrategy>>,
    pool: Mutex<IdentityPool>,
    pacer: Arc<dyn Pacer>,
    orchestrator_config: OrchestratorConfig,
    cancel: CancelFlag,
}

impl JobScraper {
    /// Scraper with default configuration.
    pub fn new() -> JobScraperResult<Self> {
        Self::with_config(JobScraperConfig::default())
    }

    pub fn builder() -> JobScraperBuilder {
        JobScraperBuilder::new()
    }

    pub fn with_config(config: JobScraperConfig) -> JobScraperResult<Self> {
        if config.user_agents.is_empty() {
            return Err(JobScraperError::Configuration(
                "at least one user agent is required".into(),
            ));
        }

        let detector = match &config.captcha_markers {
            Some(markers) => BlockingDetector::with_markers(markers)?,
            None => BlockingDetector::new(),
        };

        let proxies = config
            .proxies
            .iter()
            .map(|raw| Url::parse(raw).map_err(|err| JobScraperError::InvalidProxy(raw.clone(), err)))
            .collect::<Result<Vec<_>, _>>()?;

        let cookies = match &config.cookies_file {
            Some(path) => load_cookie_file(path)?,
            None => Vec::new(),
        };

        let api_endpoint = config
            .api_endpoint
            .as_deref()
            .map(Url::parse)
            .transpose()
            .map_err(JobScraperError::InvalidApiEndpoint)?;

        let priority = config
            .strategy_priority
            .clone()
            .unwrap_or_else(|| StrategyKind::DEFAULT_PRIORITY.to_vec());

        let mut strategies: Vec<Arc<dyn SearchStrategy>> = Vec::new();
        for kind in priority {
            match kind {
                StrategyKind::Direct if config.use_direct => {
                    strategies.push(Arc::new(DirectRequest::new(
                        detector.clone(),
                        cookie_header(&cookies),
                    )));
                }
                StrategyKind::Library if config.use_library => {
                    if let Some(backend) = &config.library_backend {
                        strategies.push(Arc::new(LibrarySearch::new(backend.clone())));
                    } else {
                        log::warn!("library strategy enabled without a backend, skipping");
                    }
                }
                StrategyKind::Browser if config.use_browser => {
                    // Navigation must give up before the attempt timeout so
                    // the session is still around to be torn down.
                    let navigation_timeout = config
                        .attempt_timeout
                        .saturating_sub(Duration::from_secs(5))
                        .max(Duration::from_secs(1));
                    strategies.push(Arc::new(BrowserStealth::new(
                        detector.clone(),
                        StealthConfig {
                            headless: config.headless,
                            use_stealth: config.use_stealth,
                            cookies: cookies.clone(),
                            navigation_timeout,
                        },
                        config.captcha_provider.clone(),
                    )));
                }
                StrategyKind::Api if config.use_api => {
                    strategies.push(Arc::new(ApiEndpoint::new(
                        detector.clone(),
                        api_endpoint.clone(),
                        config.api_key.clone(),
                    )));
                }
                _ => {}
            }
        }

        if strategies.is_empty() {
            return Err(JobScraperError::Configuration(
                "no retrieval strategies enabled".into(),
            ));
        }

        let pool = IdentityPool::new(config.user_agents.clone(), &proxies);
        let orchestrator_config = OrchestratorConfig {
            max_retries: config.max_retries,
            attempt_timeout: config.attempt_timeout,
            max_results: config.max_results,
            pacing: config.pacing.clone(),
        };

        Ok(Self {
            strategies,
            pool: Mutex::new(pool),
            pacer: Arc::new(TokioPacer),
            orchestrator_config,
            cancel: CancelFlag::new(),
        })
    }

    /// Search for job-posting URLs.
    ///
    /// Runs the strategy cascade for up to `pages_to_search` result pages and
    /// returns normalized, deduplicated URLs. Blocking and strategy failures
    /// are absorbed; the worst case is an empty list.
    pub async fn search_jobs(
        &self,
        query: &str,
        site_filter: Option<&str>,
        pages_to_search: usize,
    ) -> Vec<String> {
        // A cancellation only covers the invocation it interrupted.
        self.cancel.reset();

        let request = SearchRequest::new(query, site_filter.map(str::to_string), pages_to_search);
        log::debug!(
            "searching {:?} (site {:?}, {} pages, {} strategies)",
            request.query,
            request.site_filter,
            request.pages_to_search,
            self.strategies.len()
        );

        let mut pool = self.pool.lock().await;
        let report = Orchestrator::new(
            &self.strategies,
            &mut pool,
            self.pacer.as_ref(),
            &self.orchestrator_config,
            self.cancel.clone(),
        )
        .run(&request)
        .await;
        drop(pool);

        log::debug!(
            "search finished: {:?}, {} raw urls in {} attempts",
            report.outcome,
            report.urls.len(),
            report.attempts
        );
        normalize(&report.urls, site_filter, self.orchestrator_config.max_results)
    }

    /// Handle for cancelling an in-flight search from another task.
    pub fn cancel_handle(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Identity-pool health snapshot.
    pub async fn identity_report(&self) -> crate::identity::PoolReport {
        self.pool.lock().await.report()
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|strategy| strategy.name()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;

    use crate::strategies::library::BackendError;

    struct FixedBackend;

    #[async_trait]
    impl SearchBackend for FixedBackend {
        async fn search_page(&self, _query: &str, _page: usize) -> Result<Vec<String>, BackendError> {
            Ok(vec!["https://join.com/companies/acme/1".to_string()])
        }
    }

    fn library_only_scraper() -> JobScraper {
        JobScraper::builder()
            .use_direct(false)
            .use_browser(false)
            .use_api(false)
            .with_library_backend(Arc::new(FixedBackend))
            .build()
            .unwrap()
    }

    #[test]
    fn default_build_enables_three_strategies() {
        // Library is skipped without a backend; direct, browser, api remain.
        let scraper = JobScraper::new().unwrap();
        assert_eq!(scraper.strategy_names(), vec!["direct", "browser", "api"]);
    }

    #[test]
    fn no_strategies_is_a_configuration_error() {
        let result = JobScraper::builder()
            .use_direct(false)
            .use_library(false)
            .use_browser(false)
            .use_api(false)
            .build();
        assert!(matches!(result, Err(JobScraperError::Configuration(_))));
    }

    #[test]
    fn empty_user_agents_is_a_configuration_error() {
        let result = JobScraper::builder()
            .with_user_agents(Vec::<String>::new())
            .build();
        assert!(matches!(result, Err(JobScraperError::Configuration(_))));
    }

    #[test]
    fn invalid_proxy_is_rejected() {
        let result = JobScraper::builder().with_proxies(["not a proxy"]).build();
        assert!(matches!(result, Err(JobScraperError::InvalidProxy(_, _))));
    }

    #[test]
    fn invalid_marker_is_rejected() {
        let result = JobScraper::builder().with_captcha_markers(["("]).build();
        assert!(matches!(result, Err(JobScraperError::InvalidMarker(_))));
    }

    #[test]
    fn missing_cookie_file_is_rejected() {
        let result = JobScraper::builder()
            .with_cookies_file("/nonexistent/cookies.json")
            .build();
        assert!(matches!(result, Err(JobScraperError::Stealth(_))));
    }

    #[tokio::test]
    async fn search_works_again_after_cancellation() {
        let scraper = library_only_scraper();

        let first = scraper.search_jobs("rust engineer", None, 1).await;
        assert_eq!(first, vec!["https://join.com/companies/acme/1"]);

        scraper.cancel_handle().cancel();

        let second = scraper.search_jobs("rust engineer", None, 1).await;
        assert_eq!(second, vec!["https://join.com/companies/acme/1"]);
    }

    #[tokio::test]
    async fn cancel_during_run_does_not_poison_later_runs() {
        let scraper = library_only_scraper();
        scraper.cancel_handle().cancel();

        // The stale cancellation is cleared at invocation entry.
        let urls = scraper.search_jobs("rust engineer", None, 1).await;
        assert_eq!(urls, vec!["https://join.com/companies/acme/1"]);
    }

    #[test]
    fn priority_override_reorders_strategies() {
        let scraper = JobScraper::builder()
            .with_strategy_priority(vec![StrategyKind::Api, StrategyKind::Direct])
            .build()
            .unwrap();
        assert_eq!(scraper.strategy_names(), vec!["api", "direct"]);
    }
}
