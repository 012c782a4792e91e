//! HTTP probes against management endpoints of the server under test
//!
//! Bodies are untrusted input. Callers validate whatever fields they need
//! before folding them into records. No retries are made here.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::ProbeConfig;
use crate::error::{HarnessError, HarnessResult};

/// Per-request options; defaults to a plain GET
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub method: Option<Method>,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,

    /// Overrides the probe's default for non-2xx statuses
    pub tolerate_non_success: Option<bool>,
}

impl RequestOptions {
    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn tolerate_non_success(mut self, tolerate: bool) -> Self {
        self.tolerate_non_success = Some(tolerate);
        self
    }

    /// Parse a method name such as `post`.
    pub fn parse_method(name: &str) -> HarnessResult<Method> {
        Method::from_bytes(name.trim().to_ascii_uppercase().as_bytes())
            .map_err(|_| HarnessError::ScenarioParse(format!("invalid HTTP method '{}'", name)))
    }
}

/// Raw probe response
#[derive(Debug, Clone)]
pub struct ProbeResponse {
    pub url: String,
    pub status: u16,
    pub body: String,
}

impl ProbeResponse {
    /// Parse the body as JSON; malformed JSON is a probe failure.
    pub fn json(&self) -> HarnessResult<Value> {
        serde_json::from_str(&self.body)
            .map_err(|e| HarnessError::probe(&self.url, format!("malformed JSON: {}", e)))
    }
}

/// Inspects server-side state over HTTP
#[async_trait]
pub trait Prober: Send + Sync {
    async fn do_request(&self, url: &str, options: RequestOptions) -> HarnessResult<ProbeResponse>;

    async fn get_json(&self, url: &str) -> HarnessResult<Value> {
        self.do_request(url, RequestOptions::default()).await?.json()
    }
}

/// [`Prober`] over reqwest
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    tolerate_non_success: bool,
}

impl HttpProbe {
    pub fn new(config: &ProbeConfig) -> HarnessResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;

        Ok(Self {
            client,
            tolerate_non_success: config.tolerate_non_success,
        })
    }
}

#[async_trait]
impl Prober for HttpProbe {
    async fn do_request(&self, url: &str, options: RequestOptions) -> HarnessResult<ProbeResponse> {
        let method = options.method.unwrap_or(Method::GET);
        info!("Probing {} {}", method, url);

        let mut request = self.client.request(method, url);
        for (name, value) in &options.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(body) = options.body {
            request = request.body(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| HarnessError::probe(url, e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| HarnessError::probe(url, format!("reading body: {}", e)))?;

        debug!("Probe {} returned {} ({} bytes)", url, status, body.len());

        let tolerate = options
            .tolerate_non_success
            .unwrap_or(self.tolerate_non_success);
        if !status.is_success() && !tolerate {
            return Err(HarnessError::probe(url, format!("status {}", status)));
        }

        Ok(ProbeResponse {
            url: url.to_string(),
            status: status.as_u16(),
            body,
        })
    }
}

/// Resolve a JSON pointer, treating a missing or null target as absent.
pub fn pointer<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    value.pointer(path).filter(|v| !v.is_null())
}

/// Render a scalar the way it should be typed into a page: strings without
/// quotes, everything else as JSON.
pub fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
