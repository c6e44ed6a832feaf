use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use sca_core::{errors::Error, retry::RequestError, Result};
use serde_json::Value;

/// One GET against a Web API method, returning the decoded JSON body.
///
/// Implementations classify failures for the retry policy; they never retry
/// themselves.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(
        &self,
        method: &str,
        query: &[(&'static str, String)],
    ) -> std::result::Result<Value, RequestError>;
}

#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl ReqwestTransport {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("sca/0.1")
            .build()
            .map_err(|e| Error::Transport(format!("http client build failed: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            token: token.into(),
        })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(
        &self,
        method: &str,
        query: &[(&'static str, String)],
    ) -> std::result::Result<Value, RequestError> {
        let url = format!("{}{}", self.base_url, method);
        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .query(query)
            .send()
            .await
            .map_err(|e| {
                if e.is_builder() {
                    RequestError::Fatal(Error::Transport(format!("{method}: {e}")))
                } else {
                    RequestError::Transient(format!("{method}: {e}"))
                }
            })?;

        let retry_after = resp
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        if let Some(err) = classify_status(resp.status().as_u16(), retry_after) {
            return Err(err);
        }

        let body = resp
            .text()
            .await
            .map_err(|e| RequestError::Transient(format!("{method}: reading body: {e}")))?;
        serde_json::from_str(&body).map_err(|e| RequestError::Fatal(Error::Json(e)))
    }
}

/// Map an HTTP status to a retry decision. `None` means success.
pub fn classify_status(status: u16, retry_after: Option<Duration>) -> Option<RequestError> {
    match status {
        200..=299 => None,
        429 => Some(RequestError::RateLimited { retry_after }),
        s => Some(RequestError::Transient(format!("HTTP {s}"))),
    }
}

/// `Retry-After` in delta-seconds form. HTTP-date values fall back to the
/// policy default.
pub fn parse_retry_after(raw: &str) -> Option<Duration> {
    raw.trim().parse::<u64>().ok().map(Duration::from_secs)
}
