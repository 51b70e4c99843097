//! # jobscout-rs
//!
//! CAPTCHA-resistant discovery of job postings via search-engine scraping.
//!
//! The crate cascades through several retrieval strategies (plain HTTP, an
//! injected search backend, a stealth headless browser, and a JSON search
//! API), detects blocking, rotates request identities, and hands back a
//! normalized list of posting URLs. Per-platform form filling and ATS DOM
//! modeling are out of scope; callers consume the URL list.
//!
//! ## Example
//!
//! ```no_run
//! use jobscout_rs::JobScraper;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let scraper = JobScraper::builder()
//!         .with_max_retries(3)
//!         .build()?;
//!     let urls = scraper
//!         .search_jobs("rust engineer berlin", Some("join.com"), 3)
//!         .await;
//!     for url in urls {
//!         println!("{url}");
//!     }
//!     Ok(())
//! }
//! ```

mod scraper;

pub mod detection;
pub mod external_deps;
pub mod identity;
pub mod pacing;
pub mod search;
pub mod stealth;
pub mod strategies;

pub use crate::scraper::{
    JobScraper,
    JobScraperBuilder,
    JobScraperConfig,
    JobScraperError,
    JobScraperResult,
};

pub use crate::detection::{
    BlockSignal,
    BlockingDetector,
    DEFAULT_CAPTCHA_MARKERS,
};

pub use crate::identity::{
    DEFAULT_USER_AGENTS,
    Identity,
    IdentityError,
    IdentityHealth,
    IdentityPool,
    PoolReport,
};

pub use crate::pacing::{
    NoopPacer,
    Pacer,
    PacingConfig,
    TokioPacer,
};

pub use crate::search::{
    AttemptOutcome,
    AttemptStatus,
    SearchRequest,
};

pub use crate::search::normalize::normalize;

pub use crate::search::orchestrator::{
    CancelFlag,
    Orchestrator,
    OrchestratorConfig,
    RunOutcome,
    SearchReport,
};

pub use crate::strategies::{
    SearchStrategy,
    StrategyKind,
};

pub use crate::strategies::library::{
    BackendError,
    SearchBackend,
};

pub use crate::stealth::{
    CookieRecord,
    StealthConfig,
    StealthError,
    StealthSession,
};

pub use crate::external_deps::captcha::{
    CapSolverProvider,
    CaptchaConfig,
    CaptchaError,
    CaptchaProvider,
    CaptchaResult,
    CaptchaSolution,
    CaptchaTask,
    TwoCaptchaProvider,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
