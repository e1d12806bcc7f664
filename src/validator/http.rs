//! HTTP probing of media URLs

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, RANGE};
use reqwest::{Client, Method, StatusCode, redirect};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::config::ValidatorConfig;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Too many redirects")]
    TooManyRedirects,

    #[error("Client construction failed: {0}")]
    Client(String),
}

pub type Result<T> = std::result::Result<T, ProbeError>;

/// Status line and headers of a probe; the body is never read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResponse {
    pub status: u16,
    pub content_type: Option<String>,
}

impl ProbeResponse {
    pub fn new(status: u16, content_type: Option<&str>) -> Self {
        Self {
            status,
            content_type: content_type.map(str::to_string),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// `head(url, {timeout, maxRedirects, headers}) -> {status, headers}`
#[async_trait]
pub trait MediaProbe: Send + Sync {
    async fn head(&self, url: &Url) -> Result<ProbeResponse>;
}

/// reqwest-backed probe
pub struct HttpProbe {
    client: Client,
    fallback_to_get: bool,
}

impl HttpProbe {
    pub fn new(config: &ValidatorConfig) -> Result<Self> {
        let timeout = config.timeout.as_duration();
        let client = Client::builder()
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .timeout(timeout)
            .user_agent(&config.user_agent)
            .redirect(redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| ProbeError::Client(e.to_string()))?;

        Ok(Self {
            client,
            fallback_to_get: config.fallback_to_get,
        })
    }

    async fn send(&self, method: Method, url: &Url) -> Result<ProbeResponse> {
        let mut request = self.client.request(method.clone(), url.clone());
        if method == Method::GET {
            request = request.header(RANGE, "bytes=0-0");
        }

        let response = request.send().await.map_err(map_reqwest_error)?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Ok(ProbeResponse {
            status: response.status().as_u16(),
            content_type,
        })
    }
}

#[async_trait]
impl MediaProbe for HttpProbe {
    async fn head(&self, url: &Url) -> Result<ProbeResponse> {
        debug!(%url, "Probing");
        let response = self.send(Method::HEAD, url).await?;

        let head_refused = response.status == StatusCode::METHOD_NOT_ALLOWED.as_u16()
            || response.status == StatusCode::NOT_IMPLEMENTED.as_u16();
        if head_refused && self.fallback_to_get {
            debug!(%url, status = response.status, "HEAD refused, retrying with ranged GET");
            return self.send(Method::GET, url).await;
        }

        Ok(response)
    }
}

fn map_reqwest_error(e: reqwest::Error) -> ProbeError {
    if e.is_timeout() {
        ProbeError::Timeout
    } else if e.is_redirect() {
        ProbeError::TooManyRedirects
    } else if e.is_connect() {
        ProbeError::Connect(e.to_string())
    } else {
        ProbeError::RequestFailed(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_response_success_range() {
        assert!(ProbeResponse::new(200, None).is_success());
        assert!(ProbeResponse::new(206, None).is_success());
        assert!(!ProbeResponse::new(301, None).is_success());
        assert!(!ProbeResponse::new(404, Some("text/html")).is_success());
    }

    #[test]
    fn test_http_probe_builds_from_defaults() {
        assert!(HttpProbe::new(&ValidatorConfig::default()).is_ok());
    }
}
