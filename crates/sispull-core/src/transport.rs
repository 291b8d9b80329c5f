//! Resilient request transport.
//!
//! `Transport::send` never returns `Err`: every failure mode is folded into
//! the returned [`Outcome`] so callers have a single code path. Beneath the
//! descriptor logic sits a silent pool-level retry loop for connection
//! failures and the forced-retry status set; application-visible failures
//! (anything that still is not 2xx after that budget) are handed back to the
//! caller together with the descriptor, after substituting the transport's
//! retry payload so a re-attempt goes out with corrected context.

use std::time::Duration;

use serde_json::Value;

use crate::error::FetchError;
use crate::retry::backoff_duration;
use crate::stream::{self, HttpConfig, StreamBody, http_config, SHARED_RUNTIME};

/// A fully-specified pending HTTP request for one entity/page.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    /// Relative endpoint path, or an absolute URL bypassing the hostname
    pub url: String,
    /// Override of the transport's default method
    pub method: Option<reqwest::Method>,
    /// Override of the transport's default headers (replaces, not merges)
    pub headers: Vec<(String, String)>,
    /// Query parameters
    pub params: Vec<(String, String)>,
    /// JSON request body
    pub payload: Option<Value>,
    /// Short name of the data set this request belongs to
    pub entity_name: String,
    /// Chunked-transfer mode: the body is handed back as a reader
    pub stream: bool,
    /// Override of the transport's request timeout
    pub timeout: Option<Duration>,
}

impl RequestDescriptor {
    pub fn new(url: impl Into<String>, entity_name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: None,
            headers: Vec::new(),
            params: Vec::new(),
            payload: None,
            entity_name: entity_name.into(),
            stream: false,
            timeout: None,
        }
    }

    pub fn with_params(mut self, params: Vec<(String, String)>) -> Self {
        self.params = params;
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }

    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }
}

/// Completed response: status plus either a buffered body or a byte stream.
#[derive(Debug)]
pub enum OutcomeBody {
    Text(String),
    Stream(StreamBody),
}

/// The result of sending a descriptor.
#[derive(Debug)]
pub struct Outcome {
    pub status: u16,
    pub body: OutcomeBody,
}

impl Outcome {
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Buffered body text; empty for streaming bodies.
    pub fn text(&self) -> &str {
        match &self.body {
            OutcomeBody::Text(t) => t,
            OutcomeBody::Stream(_) => "",
        }
    }

    /// Parse the buffered body as JSON.
    pub fn json(&self) -> Option<Value> {
        serde_json::from_str(self.text()).ok()
    }

    /// Locally fabricated outcome for failures that produced no response.
    pub fn synthetic(status: u16, message: &str) -> Self {
        Self {
            status,
            body: OutcomeBody::Text(serde_json::json!({ "error": message }).to_string()),
        }
    }
}

/// Connection-pooling transport with a base hostname and default headers.
pub struct Transport {
    hostname: String,
    method: reqwest::Method,
    headers: Vec<(String, String)>,
    retry_payload: Option<Value>,
    policy: HttpConfig,
}

impl Transport {
    /// Create a transport; the pool-retry policy is snapshotted from the
    /// global [`HttpConfig`].
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            method: reqwest::Method::POST,
            headers: Vec::new(),
            retry_payload: None,
            policy: http_config().clone(),
        }
    }

    pub fn with_policy(mut self, policy: HttpConfig) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the default headers (e.g. install the bearer token).
    pub fn set_headers(&mut self, headers: Vec<(String, String)>) {
        self.headers = headers;
    }

    /// Payload substituted into a descriptor after an HTTP failure, so the
    /// next attempt regenerates the request with corrected context.
    pub fn set_retry_payload(&mut self, payload: Option<Value>) {
        self.retry_payload = payload;
    }

    fn request_url(&self, desc: &RequestDescriptor) -> String {
        if desc.url.starts_with("http") {
            desc.url.clone()
        } else {
            format!("{}{}", self.hostname, desc.url)
        }
    }

    /// Send a descriptor. Always returns an outcome, never raises: connection
    /// failures become a synthetic 408 once the pool-retry budget is spent.
    pub fn send(&self, mut desc: RequestDescriptor) -> (Outcome, RequestDescriptor) {
        let url = self.request_url(&desc);
        let mut attempt = 0u32;
        loop {
            match self.dispatch(&url, &desc) {
                Ok(outcome) if outcome.ok() => {
                    log::debug!(
                        "request for {} with params {:?} executed with code {}",
                        url,
                        desc.params,
                        outcome.status
                    );
                    return (outcome, desc);
                }
                Ok(outcome) => {
                    if self.policy.retry_statuses.contains(&outcome.status)
                        && attempt < self.policy.pool_retries
                    {
                        attempt += 1;
                        log::debug!(
                            "{url}: status {} forces retry {attempt}/{}",
                            outcome.status,
                            self.policy.pool_retries
                        );
                        std::thread::sleep(backoff_duration(self.policy.backoff_factor, attempt));
                        continue;
                    }
                    log::debug!("request for {url} failed with code {}", outcome.status);
                    if let Some(payload) = &self.retry_payload {
                        desc.payload = Some(payload.clone());
                    }
                    return (outcome, desc);
                }
                Err(err) if err.is_connection() && attempt < self.policy.pool_retries => {
                    attempt += 1;
                    log::debug!("{url}: {err}, retry {attempt}/{}", self.policy.pool_retries);
                    std::thread::sleep(backoff_duration(self.policy.backoff_factor, attempt));
                }
                Err(err) => {
                    log::info!("request exception: {err}");
                    return (Outcome::synthetic(408, &err.to_string()), desc);
                }
            }
        }
    }

    fn dispatch(&self, url: &str, desc: &RequestDescriptor) -> Result<Outcome, FetchError> {
        SHARED_RUNTIME.handle().block_on(async {
            let method = desc.method.clone().unwrap_or_else(|| self.method.clone());
            let mut req = stream::http_client().request(method, url);
            if !desc.params.is_empty() {
                req = req.query(&desc.params);
            }
            if !desc.stream {
                req = req.timeout(desc.timeout.unwrap_or(self.policy.request_timeout));
            }
            let headers = if desc.headers.is_empty() {
                &self.headers
            } else {
                &desc.headers
            };
            for (name, value) in headers {
                req = req.header(name, value);
            }
            if let Some(payload) = &desc.payload {
                req = req.json(payload);
            }

            let resp = req.send().await.map_err(FetchError::from_reqwest)?;
            let status = resp.status().as_u16();
            if desc.stream && resp.status().is_success() {
                Ok(Outcome {
                    status,
                    body: OutcomeBody::Stream(stream::body_reader(resp)),
                })
            } else {
                let text = resp.text().await.map_err(FetchError::from_reqwest)?;
                Ok(Outcome {
                    status,
                    body: OutcomeBody::Text(text),
                })
            }
        })
    }
}
