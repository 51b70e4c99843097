//! Headless-browser retrieval with stealth hardening.
//!
//! Most expensive strategy; used when plain HTTP keeps getting walled. Each
//! attempt launches a fresh session, navigates, optionally hands a detected
//! reCAPTCHA to the configured provider, and always tears the session down.

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::detection::{BlockSignal, BlockingDetector};
use crate::external_deps::captcha::{CaptchaProvider, CaptchaTask};
use crate::identity::Identity;
use crate::search::extract::extract_posting_urls;
use crate::search::{AttemptOutcome, SearchRequest};
use crate::stealth::{StealthConfig, StealthSession};
use crate::strategies::SearchStrategy;

const NAME: &str = "browser";

static SITEKEY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"data-sitekey=["']([\w-]+)["']"#).expect("invalid sitekey pattern")
});

pub struct BrowserStealth {
    detector: BlockingDetector,
    stealth: StealthConfig,
    captcha_provider: Option<Arc<dyn CaptchaProvider>>,
}

impl BrowserStealth {
    pub fn new(
        detector: BlockingDetector,
        stealth: StealthConfig,
        captcha_provider: Option<Arc<dyn CaptchaProvider>>,
    ) -> Self {
        Self {
            detector,
            stealth,
            captcha_provider,
        }
    }

    async fn attempt(&self, session: &StealthSession, url: &str) -> AttemptOutcome {
        let html = match session.fetch_page(url).await {
            Ok(html) => html,
            Err(err) => return AttemptOutcome::error(NAME, err.to_string()),
        };

        // A rendered page has no HTTP status; classification is body-only.
        match self.detector.classify(200, &html) {
            BlockSignal::Ok => AttemptOutcome::success(NAME, extract_posting_urls(&html)),
            BlockSignal::Captcha => {
                if let Some(provider) = &self.captcha_provider {
                    self.try_solve(session, url, &html, provider.as_ref()).await
                } else {
                    AttemptOutcome::blocked(NAME, BlockSignal::Captcha, "captcha wall, no provider")
                }
            }
            signal => AttemptOutcome::blocked(NAME, signal, "blocked in rendered page"),
        }
    }

    /// Hand the challenge to the provider, inject the token, re-read the page.
    async fn try_solve(
        &self,
        session: &StealthSession,
        url: &str,
        html: &str,
        provider: &dyn CaptchaProvider,
    ) -> AttemptOutcome {
        let Some(site_key) = SITEKEY_PATTERN
            .captures(html)
            .and_then(|captures| captures.get(1))
            .map(|m| m.as_str().to_string())
        else {
            return AttemptOutcome::blocked(NAME, BlockSignal::Captcha, "captcha wall, no sitekey found");
        };

        log::debug!("submitting captcha to provider {}", provider.name());
        let task = CaptchaTask {
            site_key,
            page_url: url.to_string(),
        };
        let solution = match provider.solve(&task).await {
            Ok(solution) => solution,
            Err(err) => {
                return AttemptOutcome::blocked(
                    NAME,
                    BlockSignal::Captcha,
                    format!("provider failed: {err}"),
                );
            }
        };

        let inject = format!(
            r#"
            const field = document.getElementById('g-recaptcha-response');
            if (field) {{ field.innerHTML = '{token}'; }}
            if (typeof ___grecaptcha_cfg !== 'undefined' && window.submitCallback) {{
                window.submitCallback('{token}');
            }}
            "#,
            token = solution.token.replace('\'', "\\'"),
        );
        if let Err(err) = session.evaluate(&inject).await {
            return AttemptOutcome::error(NAME, err.to_string());
        }

        match session.fetch_page(url).await {
            Ok(html) => match self.detector.classify(200, &html) {
                BlockSignal::Ok => AttemptOutcome::success(NAME, extract_posting_urls(&html)),
                signal => AttemptOutcome::blocked(NAME, signal, "still blocked after solve"),
            },
            Err(err) => AttemptOutcome::error(NAME, err.to_string()),
        }
    }
}

#[async_trait]
impl SearchStrategy for BrowserStealth {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn fetch(&self, request: &SearchRequest, page: usize, identity: &Identity) -> AttemptOutcome {
        let session = match StealthSession::launch(self.stealth.clone(), &identity.user_agent).await {
            Ok(session) => session,
            Err(err) => return AttemptOutcome::error(NAME, err.to_string()),
        };

        let url = request.page_url(page);
        log::debug!("browser fetch page {page}: {url}");

        // The navigation runs under its own timeout so shutdown still
        // executes when a page stalls.
        let outcome = match tokio::time::timeout(
            self.stealth.navigation_timeout,
            self.attempt(&session, &url),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => AttemptOutcome::error(NAME, "navigation timed out"),
        };
        session.shutdown().await;
        outcome
    }
}
