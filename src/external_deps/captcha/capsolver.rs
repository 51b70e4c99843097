use std::time::Instant;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::{CaptchaConfig, CaptchaError, CaptchaProvider, CaptchaResult, CaptchaTask};

const CREATE_TASK_URL: &str = "https://api.capsolver.com/createTask";
const TASK_RESULT_URL: &str = "https://api.capsolver.com/getTaskResult";

/// Adapter for the CapSolver service (JSON task API).
#[derive(Debug, Clone)]
pub struct CapSolverProvider {
    api_key: String,
    config: CaptchaConfig,
    client: reqwest::Client,
}

impl CapSolverProvider {
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

    async fn post(&self, url: &str, payload: Value) -> Result<Value, CaptchaError> {
        let response = self
            .client
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(|err| CaptchaError::Provider(err.to_string()))?;
        response
            .json()
            .await
            .map_err(|err| CaptchaError::Provider(err.to_string()))
    }

    async fn create_task(&self, task: &CaptchaTask) -> Result<String, CaptchaError> {
        let body = self
            .post(
                CREATE_TASK_URL,
                json!({
                    "clientKey": self.api_key,
                    "task": {
                        "type": "ReCaptchaV2TaskProxyLess",
                        "websiteURL": task.page_url,
                        "websiteKey": task.site_key,
                    }
                }),
            )
            .await?;

        if body["errorId"].as_i64().unwrap_or(0) != 0 {
            return Err(CaptchaError::Rejected(
                body["errorDescription"].as_str().unwrap_or("unknown").to_string(),
            ));
        }
        body["taskId"]
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

            let body = self
                .post(
                    TASK_RESULT_URL,
                    json!({ "clientKey": self.api_key, "taskId": task_id }),
                )
                .await?;

            if body["errorId"].as_i64().unwrap_or(0) != 0 {
                return Err(CaptchaError::Rejected(
                    body["errorDescription"].as_str().unwrap_or("unknown").to_string(),
                ));
            }
            match body["status"].as_str() {
                Some("ready") => {
                    let token = body["solution"]["gRecaptchaResponse"]
                        .as_str()
                        .ok_or_else(|| CaptchaError::Provider("missing token".into()))?;
                    return Ok(super::CaptchaSolution::new(token));
                }
                _ => continue,
            }
        }
    }
}

#[async_trait]
impl CaptchaProvider for CapSolverProvider {
    fn name(&self) -> &'static str {
        "capsolver"
    }

    async fn solve(&self, task: &CaptchaTask) -> CaptchaResult {
        if self.api_key.is_empty() {
            return Err(CaptchaError::Configuration("empty api key".into()));
        }
        let task_id = self.create_task(task).await?;
        log::debug!("capsolver task {task_id} created, polling");
        self.poll(&task_id).await
    }
}
