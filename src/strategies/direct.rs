//! Plain HTTP retrieval with browser-like headers.
//!
//! Cheapest strategy and the first one tried. A fresh client is built per
//! attempt so the identity's proxy and user agent apply cleanly.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::detection::{BlockSignal, BlockingDetector};
use crate::identity::{Identity, browser_headers};
use crate::search::extract::extract_posting_urls;
use crate::search::{AttemptOutcome, SearchRequest};
use crate::strategies::SearchStrategy;

const NAME: &str = "direct";

pub struct DirectRequest {
    detector: BlockingDetector,
    /// Preformatted `Cookie` header value, when a cookie file was loaded.
    cookie_header: Option<String>,
    request_timeout: Duration,
}

impl DirectRequest {
    pub fn new(detector: BlockingDetector, cookie_header: Option<String>) -> Self {
        Self {
            detector,
            cookie_header,
            request_timeout: Duration::from_secs(30),
        }
    }

    fn build_client(&self, identity: &Identity) -> Result<reqwest::Client, String> {
        let mut headers = HeaderMap::new();
        for (name, value) in browser_headers(&identity.user_agent) {
            let name = HeaderName::from_static(name);
            let value = HeaderValue::from_str(&value).map_err(|err| err.to_string())?;
            headers.insert(name, value);
        }
        if let Some(cookie) = &self.cookie_header {
            let value = HeaderValue::from_str(cookie).map_err(|err| err.to_string())?;
            headers.insert(reqwest::header::COOKIE, value);
        }

        let mut builder = reqwest::Client::builder()
            .default_headers(headers)
            .cookie_store(true)
            .timeout(self.request_timeout);

        if let Some(proxy) = &identity.proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy.as_str()).map_err(|err| err.to_string())?);
        }

        builder.build().map_err(|err| err.to_string())
    }
}

#[async_trait]
impl SearchStrategy for DirectRequest {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn fetch(&self, request: &SearchRequest, page: usize, identity: &Identity) -> AttemptOutcome {
        let client = match self.build_client(identity) {
            Ok(client) => client,
            Err(err) => return AttemptOutcome::error(NAME, err),
        };

        let url = request.page_url(page);
        log::debug!("direct fetch page {page}: {url}");

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
