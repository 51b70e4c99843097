//! Captcha provider integrations.
//!
//! These adapters give the browser strategy a unified interface to
//! third-party reCAPTCHA solvers. The scraper stays agnostic of
//! vendor-specific request shapes and only consumes challenge tokens.

mod capsolver;
mod twocaptcha;

pub use capsolver::CapSolverProvider;
pub use twocaptcha::TwoCaptchaProvider;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Polling behaviour shared by the vendor adapters.
#[derive(Debug, Clone)]
pub struct CaptchaConfig {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for CaptchaConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            poll_interval: Duration::from_secs(5),
        }
    }
}

/// The challenge the search engine issued.
#[derive(Debug, Clone)]
pub struct CaptchaTask {
    pub site_key: String,
    pub page_url: String,
}

/// Resolved challenge token.
#[derive(Debug, Clone)]
pub struct CaptchaSolution {
    pub token: String,
}

impl CaptchaSolution {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

pub type CaptchaResult = Result<CaptchaSolution, CaptchaError>;

/// Shared interface implemented by captcha vendors.
#[async_trait]
pub trait CaptchaProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn solve(&self, task: &CaptchaTask) -> CaptchaResult;
}

/// Errors surfaced by captcha providers.
#[derive(Debug, Error)]
pub enum CaptchaError {
    #[error("captcha provider misconfigured: {0}")]
    Configuration(String),
    #[error("captcha provider request failed: {0}")]
    Provider(String),
    #[error("captcha rejected by provider: {0}")]
    Rejected(String),
    #[error("captcha solving timed out after {0:?}")]
    Timeout(Duration),
}
