use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;

use super::{CaptchaConfig, CaptchaError, CaptchaProvider, CaptchaResult, CaptchaTask};

const SUBMIT_URL: &str = "https://2captcha.com/in.php";
const RESULT_URL: &str = "https://2captcha.com/res.php";

/// Adapter for the 2Captcha service: submit the sitekey, then poll for the
/// token until it is ready or the configured timeout elapses.
#[derive(Debug, Clone)]
pub struct TwoCaptchaProvider {
    api_key: String,
    config: CaptchaConfig,
    client: reqwest::Client,
}

impl TwoCaptchaProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_config(api_key, CaptchaConfig::default())
    }

    pub fn with_config(api_key: impl Into<String>, config: CaptchaConfig) -> Self {
        Self {
            api_key: api_key.into(),
            config,
            client: reqwest::Client::new(),
        }
    }

    async fn submit(&self, task: &CaptchaTask) -> Result<String, CaptchaError> {
        let response = self
            .client
            .post(SUBMIT_URL)
            .form(&[
                ("key", self.api_key.as_str()),
                ("method", "userrecaptcha"),
                ("googlekey", task.site_key.as_str()),
                ("pageurl", task.page_url.as_str()),
                ("json", "1"),
            ])
            .send()
            .await
            .map_err(|err| CaptchaError::Provider(err.to_string()))?;

        let body: Value = response
            .json()
            .await
            .map_err(|err| CaptchaError::Provider(err.to_string()))?;

        if body["status"].as_i64() != Some(1) {
            return Err(CaptchaError::Rejected(
                body["request"].as_str().unwrap_or("unknown").to_string(),
            ));
        }
        body["request"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| CaptchaError::Provider("missing task id".into()))
    }

    async fn poll(&self, task_id: &str) -> CaptchaResult {
        let started = Instant::now();
        loop {
            if started.elapsed() > self.config.timeout {
                return Err(CaptchaError::Timeout(self.config.timeout));
            }
            tokio::time::sleep(self.config.poll_interval).await;

            let response = self
                .client
                .get(RESULT_URL)
                .query(&[
                    ("key", self.api_key.as_str()),
                    ("action", "get"),
                    ("id", task_id),
                    ("json", "1"),
                ])
                .send()
                .await
                .map_err(|err| CaptchaError::Provider(err.to_string()))?;

            let body: Value = response
                .json()
                .await
                .map_err(|err| CaptchaError::Provider(err.to_string()))?;

            if body["status"].as_i64() == Some(1)
                && let Some(token) = body["request"].as_str()
            {
                return Ok(super::CaptchaSolution::new(token));
            }
            match body["request"].as_str() {
                Some("CAPCHA_NOT_READY") | None => continue,
                Some(other) => return Err(CaptchaError::Rejected(other.to_string())),
            }
        }
    }
}

#[async_trait]
impl CaptchaProvider for TwoCaptchaProvider {
    fn name(&self) -> &'static str {
        "twocaptcha"
    }

    async fn solve(&self, task: &CaptchaTask) -> CaptchaResult {
        if self.api_key.is_empty() {
            return Err(CaptchaError::Configuration("empty api key".into()));
        }
        let task_id = self.submit(task).await?;
        log::debug!("twocaptcha task {task_id} submitted, polling");
        self.poll(&task_id).await
    }
}
