//! Retrieval through a JSON search endpoint. Last-resort strategy.
//!
//! The endpoint URL and key are configuration because third-party search
//! APIs churn. The response parser harvests any string field named `link` or
//! `url` anywhere in the JSON tree, so vendor shape changes don't break the
//! strategy. Without a configured endpoint the strategy falls back to
//! Google's basic-HTML interface and reuses the shared extractor.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use crate::detection::{BlockSignal, BlockingDetector};
use crate::identity::Identity;
use crate::search::extract::{extract_posting_urls, is_posting_url};
use crate::search::{AttemptOutcome, SearchRequest};
use crate::strategies::SearchStrategy;

const NAME: &str = "api";

pub struct ApiEndpoint {
    detector: BlockingDetector,
    endpoint: Option<Url>,
    api_key: Option<String>,
    request_timeout: Duration,
}

impl ApiEndpoint {
    pub fn new(detector: BlockingDetector, endpoint: Option<Url>, api_key: Option<String>) -> Self {
        Self {
            detector,
            endpoint,
            api_key,
            request_timeout: Duration::from_secs(30),
        }
    }

    fn client(&self, identity: &Identity) -> Result<reqwest::Client, reqwest::Error> {
        reqwest::Client::builder()
            .user_agent(identity.user_agent.clone())
            .timeout(self.request_timeout)
            .build()
    }

    async fn fetch_json(
        &self,
        endpoint: &Url,
        request: &SearchRequest,
        page: usize,
        identity: &Identity,
    ) -> AttemptOutcome {
        let client = match self.client(identity) {
            Ok(client) => client,
            Err(err) => return AttemptOutcome::error(NAME, err.to_string()),
        };

        let mut builder = client
            .get(endpoint.clone())
            .query(&[("q", request.effective_query()), ("page", page.to_string())]);
        if let Some(key) = &self.api_key {
            builder = builder.header("x-api-key", key);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(err) => return AttemptOutcome::error(NAME, err.to_string()),
        };
        let status = response.status().as_u16();
        if matches!(status, 429 | 503) {
            return AttemptOutcome::blocked(NAME, BlockSignal::RateLimited, format!("status {status}"));
        }
        if status >= 400 {
            return AttemptOutcome::blocked(NAME, BlockSignal::UnknownError, format!("status {status}"));
        }

        match response.json::<Value>().await {
            Ok(value) => {
                let mut urls = Vec::new();
                harvest_links(&value, &mut urls);
                urls.retain(|url| is_posting_url(url));
                AttemptOutcome::success(NAME, urls)
            }
            Err(err) => AttemptOutcome::error(NAME, err.to_string()),
        }
    }

    /// Basic-HTML fallback when no endpoint is configured. `gbv=1` serves a
    /// script-free page that is lighter on bot checks.
    async fn fetch_basic_html(&self, request: &SearchRequest, page: usize, identity: &Identity) -> AttemptOutcome {
        let client = match self.client(identity) {
            Ok(client) => client,
            Err(err) => return AttemptOutcome::error(NAME, err.to_string()),
        };

        let url = format!("{}&gbv=1", request.page_url(page));
        log::debug!("api fallback fetch page {page}: {url}");

        let response = match client.get(&url).send().await {
            Ok(response) => response,
            Err(err) => return AttemptOutcome::error(NAME, err.to_string()),
        };
        let status = response.status().as_u16();
        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => return AttemptOutcome::error(NAME, err.to_string()),
        };

        match self.detector.classify(status, &body) {
            BlockSignal::Ok => AttemptOutcome::success(NAME, extract_posting_urls(&body)),
            signal => AttemptOutcome::blocked(NAME, signal, format!("status {status}")),
        }
    }
}

#[async_trait]
impl SearchStrategy for ApiEndpoint {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn fetch(&self, request: &SearchRequest, page: usize, identity: &Identity) -> AttemptOutcome {
        match &self.endpoint {
            Some(endpoint) => self.fetch_json(endpoint, request, page, identity).await,
            None => self.fetch_basic_html(request, page, identity).await,
        }
    }
}

/// Collect every string under a key named `link` or `url`, depth first.
fn harvest_links(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                if matches!(key.as_str(), "link" | "url")
                    && let Value::String(url) = child
                {
                    out.push(url.clone());
                } else {
                    harvest_links(child, out);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                harvest_links(item, out);
            }
        }
        _ => {}
    }
}
