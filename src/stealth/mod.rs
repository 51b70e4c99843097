//! Stealth browser sessions.
//!
//! Wraps a chromiumoxide browser launched with anti-automation flags, a
//! randomized fingerprint profile, `navigator.webdriver` masking, and cookie
//! injection. Sessions are scoped to one strategy attempt; `shutdown` runs on
//! every exit path and a `Drop` backstop aborts the CDP handler task.

use std::path::Path;
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use rand::Rng;
use rand::seq::SliceRandom;
use serde::Deserialize;
use thiserror::Error;
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum StealthError {
    #[error("browser launch failed: {0}")]
    Launch(String),
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("cookie file error: {0}")]
    CookieFile(String),
}

/// One cookie from a cookie file (JSON list of objects). Extra fields from
/// browser exports are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct CookieRecord {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}

/// Load a JSON cookie file (a list of `{name, value, ...}` objects).
pub fn load_cookie_file(path: &Path) -> Result<Vec<CookieRecord>, StealthError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|err| StealthError::CookieFile(format!("{}: {err}", path.display())))?;
    serde_json::from_str(&raw)
        .map_err(|err| StealthError::CookieFile(format!("{}: {err}", path.display())))
}

/// `Cookie` header value for HTTP strategies.
pub fn cookie_header(cookies: &[CookieRecord]) -> Option<String> {
    if cookies.is_empty() {
        return None;
    }
    Some(
        cookies
            .iter()
            .map(|cookie| format!("{}={}", cookie.name, cookie.value))
            .collect::<Vec<_>>()
            .join("; "),
    )
}

/// Randomized per-session fingerprint.
#[derive(Debug, Clone)]
pub struct FingerprintProfile {
    pub window: (u32, u32),
    pub platform: &'static str,
    pub language: &'static str,
    pub timezone: &'static str,
}

static WINDOW_SIZES: &[(u32, u32)] = &[(1920, 1080), (1600, 900), (1440, 900), (1366, 768)];
static PLATFORMS: &[&str] = &["Win32", "MacIntel", "Linux x86_64"];
static LANGUAGES: &[&str] = &["en-US", "en-GB", "en"];
static TIMEZONES: &[&str] = &["Europe/Berlin", "Europe/London", "America/New_York"];

impl FingerprintProfile {
    pub fn random() -> Self {
        let mut rng = rand::thread_rng();
        Self {
            window: *WINDOW_SIZES.choose(&mut rng).unwrap_or(&(1920, 1080)),
            platform: PLATFORMS.choose(&mut rng).copied().unwrap_or("Win32"),
            language: LANGUAGES.choose(&mut rng).copied().unwrap_or("en-US"),
            timezone: TIMEZONES.choose(&mut rng).copied().unwrap_or("Europe/Berlin"),
        }
    }

    /// Script that masks the automation giveaways for this profile.
    fn masking_script(&self) -> String {
        format!(
            r#"
            Object.defineProperty(navigator, 'webdriver', {{ get: () => undefined }});
            Object.defineProperty(navigator, 'platform', {{ get: () => '{platform}' }});
            Object.defineProperty(navigator, 'languages', {{ get: () => ['{language}'] }});
            Object.defineProperty(navigator, 'plugins', {{ get: () => [1, 2, 3] }});
            window.chrome = window.chrome || {{ runtime: {{}} }};
            (() => {{
                const resolvedOptions = Intl.DateTimeFormat.prototype.resolvedOptions;
                Intl.DateTimeFormat.prototype.resolvedOptions = function () {{
                    const options = resolvedOptions.call(this);
                    options.timeZone = '{timezone}';
                    return options;
                }};
            }})();
            "#,
            platform = self.platform,
            language = self.language,
            timezone = self.timezone,
        )
    }
}

#[derive(Debug, Clone)]
pub struct StealthConfig {
    pub headless: bool,
    pub use_stealth: bool,
    pub cookies: Vec<CookieRecord>,
    /// Cap on one navigate-and-read cycle. Must stay below any outer attempt
    /// timeout so the session is still alive to be shut down.
    pub navigation_timeout: Duration,
}

impl Default for StealthConfig {
    fn default() -> Self {
        Self {
            headless: true,
            use_stealth: true,
            cookies: Vec::new(),
            navigation_timeout: Duration::from_secs(40),
        }
    }
}

/// A launched browser plus the task draining its CDP event stream.
pub struct StealthSession {
    browser: Option<Browser>,
    page: Page,
    handler_task: JoinHandle<()>,
    profile: FingerprintProfile,
    config: StealthConfig,
}

impl StealthSession {
    pub async fn launch(config: StealthConfig, user_agent: &str) -> Result<Self, StealthError> {
        let profile = FingerprintProfile::random();
        let (width, height) = profile.window;

        let mut builder = BrowserConfig::builder()
            .window_size(width, height)
            .args(vec![
                "--disable-blink-features=AutomationControlled".to_string(),
                "--disable-infobars".to_string(),
                "--no-first-run".to_string(),
                "--no-default-browser-check".to_string(),
                "--disable-dev-shm-usage".to_string(),
                format!("--user-agent={user_agent}"),
                format!("--lang={}", profile.language),
            ]);
        if !config.headless {
            builder = builder.with_head();
        }
        let browser_config = builder
            .build()
            .map_err(StealthError::Launch)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|err| StealthError::Launch(err.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    log::debug!("cdp handler: {err}");
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|err| StealthError::Launch(err.to_string()))?;

        log::debug!(
            "stealth session up: {}x{} {} {}",
            width,
            height,
            profile.platform,
            profile.timezone
        );

        Ok(Self {
            browser: Some(browser),
            page,
            handler_task,
            profile,
            config,
        })
    }

    /// Navigate to a URL and return the rendered HTML. Applies masking and
    /// cookie injection, then re-navigates so the cookies take effect.
    pub async fn fetch_page(&self, url: &str) -> Result<String, StealthError> {
        self.goto(url).await?;

        if self.config.use_stealth {
            self.evaluate(&self.profile.masking_script()).await?;
        }

        if !self.config.cookies.is_empty() {
            self.inject_cookies().await?;
            self.goto(url).await?;
        }

        if self.config.use_stealth {
            self.simulate_scrolling().await?;
        }

        self.page
            .content()
            .await
            .map_err(|err| StealthError::Navigation(err.to_string()))
    }

    pub async fn evaluate(&self, script: &str) -> Result<(), StealthError> {
        self.page
            .evaluate(script.to_string())
            .await
            .map(|_| ())
            .map_err(|err| StealthError::Navigation(err.to_string()))
    }

    async fn goto(&self, url: &str) -> Result<(), StealthError> {
        self.page
            .goto(url)
            .await
            .map(|_| ())
            .map_err(|err| StealthError::Navigation(err.to_string()))
    }

    async fn inject_cookies(&self) -> Result<(), StealthError> {
        for cookie in &self.config.cookies {
            let mut assignment = format!(
                "document.cookie = '{}={}; path={}'",
                escape_js(&cookie.name),
                escape_js(&cookie.value),
                cookie.path.as_deref().unwrap_or("/"),
            );
            if let Some(domain) = &cookie.domain {
                assignment = format!(
                    "document.cookie = '{}={}; path={}; domain={}'",
                    escape_js(&cookie.name),
                    escape_js(&cookie.value),
                    cookie.path.as_deref().unwrap_or("/"),
                    escape_js(domain),
                );
            }
            self.evaluate(&assignment).await?;
        }
        Ok(())
    }

    /// A few randomized partial scrolls with short pauses, like a human
    /// skimming results.
    async fn simulate_scrolling(&self) -> Result<(), StealthError> {
        let steps = rand::thread_rng().gen_range(2..=4);
        for _ in 0..steps {
            let distance = rand::thread_rng().gen_range(200..700);
            self.evaluate(&format!("window.scrollBy(0, {distance})")).await?;
            let pause_ms = rand::thread_rng().gen_range(150..600);
            tokio::time::sleep(Duration::from_millis(pause_ms)).await;
        }
        Ok(())
    }

    /// Close the browser and stop the handler task. Called on every exit
    /// path of the browser strategy.
    pub async fn shutdown(mut self) {
        if let Some(mut browser) = self.browser.take()
            && let Err(err) = browser.close().await
        {
            log::debug!("browser close: {err}");
        }
        self.handler_task.abort();
    }
}

impl Drop for StealthSession {
    fn drop(&mut self) {
        self.handler_task.abort();
        // Shutdown can be skipped when the attempt future is dropped, e.g.
        // by an outer timeout. Close the browser from a background task so
        // the Chromium child does not outlive the session.
        if let Some(mut browser) = self.browser.take()
            && let Ok(handle) = tokio::runtime::Handle::try_current()
        {
            handle.spawn(async move {
                if let Err(err) = browser.close().await {
                    log::debug!("browser close: {err}");
                }
            });
        }
    }
}

fn escape_js(input: &str) -> String {
    input.replace('\\', "\\\\").replace('\'', "\\'")
}
