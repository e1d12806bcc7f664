//! URL reachability and media-kind validation
//!
//! [`UrlValidator`] applies the check policy to one [`MediaField`]:
//!
//! 1. blank URLs are malformed
//! 2. `blob:`/`data:` references and URLs containing an ignore keyword are
//!    never fetched (special-unvalidatable)
//! 3. relative URLs resolve against `validator.base_url` or are reported
//!    as unreachable-relative
//! 4. a HEAD probe bounded by the configured timeout
//! 5. status must be 2xx
//! 6. the response's media kind must agree with the field's expected kind
//!
//! URL-level outcomes are memoised in a [`ValidationCache`] that the caller
//! owns for exactly one run.

mod cache;
pub mod http;

pub use cache::ValidationCache;
pub use http::{HttpProbe, MediaProbe, ProbeError, ProbeResponse};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use url::Url;

use crate::config::{UnvalidatablePolicy, ValidatorConfig};
use crate::media::{FieldPath, MediaField, MediaKind};

/// Why a field failed (or was not) validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorReason {
    MalformedUrl,
    UnreachableRelative,
    TransportError,
    HttpError,
    KindMismatch,
    SpecialUnvalidatable,
}

impl ErrorReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorReason::MalformedUrl => "malformed-url",
            ErrorReason::UnreachableRelative => "unreachable-relative",
            ErrorReason::TransportError => "transport-error",
            ErrorReason::HttpError => "http-error",
            ErrorReason::KindMismatch => "kind-mismatch",
            ErrorReason::SpecialUnvalidatable => "special-unvalidatable",
        }
    }
}

impl fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub field: MediaField,
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<ErrorReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ValidationResult {
    pub fn valid(field: MediaField) -> Self {
        Self {
            field,
            is_valid: true,
            http_status: None,
            content_type: None,
            error_reason: None,
            error_message: None,
        }
    }

    pub fn invalid(field: MediaField, reason: ErrorReason, message: impl Into<String>) -> Self {
        Self {
            field,
            is_valid: false,
            http_status: None,
            content_type: None,
            error_reason: Some(reason),
            error_message: Some(message.into()),
        }
    }

    fn with_response(mut self, response: &ProbeResponse) -> Self {
        self.http_status = Some(response.status);
        self.content_type = response.content_type.clone();
        self
    }

    /// Blank declared URL.
    pub fn is_missing(&self) -> bool {
        !self.is_valid
            && self.error_reason == Some(ErrorReason::MalformedUrl)
            && self.field.url.trim().is_empty()
    }
}

/// Kind-independent outcome of checking one raw URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlCheck {
    Malformed(String),
    Unvalidatable,
    Relative,
    Transport(String),
    Responded(ProbeResponse),
}

pub struct UrlValidator {
    probe: Arc<dyn MediaProbe>,
    config: ValidatorConfig,
}

impl UrlValidator {
    pub fn new(probe: Arc<dyn MediaProbe>, config: ValidatorConfig) -> Self {
        Self { probe, config }
    }

    /// Validator backed by a real HTTP client.
    pub fn http(config: ValidatorConfig) -> Result<Self, ProbeError> {
        let probe = HttpProbe::new(&config)?;
        Ok(Self::new(Arc::new(probe), config))
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    pub async fn validate(&self, field: &MediaField, cache: &ValidationCache) -> ValidationResult {
        let check = cache
            .get_or_check(&field.url, || self.check_url(&field.url))
            .await;
        self.interpret(field.clone(), check)
    }

    /// Validate a bare URL outside any document.
    pub async fn validate_url(
        &self,
        url: &str,
        expected_kind: MediaKind,
        cache: &ValidationCache,
    ) -> ValidationResult {
        let field = MediaField {
            path: FieldPath::root(),
            url: url.to_string(),
            expected_kind,
            declared: expected_kind.is_known(),
        };
        self.validate(&field, cache).await
    }

    async fn check_url(&self, raw: &str) -> UrlCheck {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return UrlCheck::Malformed("empty url".to_string());
        }

        if self.is_unvalidatable(trimmed) {
            return UrlCheck::Unvalidatable;
        }

        let target = match self.resolve(trimmed) {
            Ok(url) => url,
            Err(check) => return check,
        };

        let timeout = self.config.timeout.as_duration();
        match tokio::time::timeout(timeout, self.probe.head(&target)).await {
            Ok(Ok(response)) => UrlCheck::Responded(response),
            Ok(Err(e)) => {
                debug!(url = %target, error = %e, "Probe failed");
                UrlCheck::Transport(e.to_string())
            }
            Err(_) => {
                debug!(url = %target, timeout_ms = self.config.timeout.as_millis(), "Probe timed out");
                UrlCheck::Transport(ProbeError::Timeout.to_string())
            }
        }
    }

    fn is_unvalidatable(&self, url: &str) -> bool {
        let lowered = url.to_ascii_lowercase();
        lowered.starts_with("blob:")
            || lowered.starts_with("data:")
            || self
                .config
                .ignore_keywords
                .iter()
                .any(|k| !k.is_empty() && lowered.contains(&k.to_ascii_lowercase()))
    }

    fn resolve(&self, url: &str) -> Result<Url, UrlCheck> {
        if url.starts_with('/') {
            return match &self.config.base_url {
                Some(base) => base
                    .join(url)
                    .map_err(|e| UrlCheck::Malformed(format!("{}: {}", url, e))),
                None => Err(UrlCheck::Relative),
            };
        }

        let parsed = Url::parse(url).map_err(|e| UrlCheck::Malformed(format!("{}: {}", url, e)))?;
        match parsed.scheme() {
            "http" | "https" => Ok(parsed),
            other => Err(UrlCheck::Malformed(format!("unsupported scheme '{}'", other))),
        }
    }

    fn interpret(&self, field: MediaField, check: UrlCheck) -> ValidationResult {
        match check {
            UrlCheck::Malformed(message) => {
                ValidationResult::invalid(field, ErrorReason::MalformedUrl, message)
            }
            UrlCheck::Unvalidatable => {
                let message = "ephemeral or ignored reference, not fetched";
                match self.config.unvalidatable_policy {
                    UnvalidatablePolicy::Pass => ValidationResult {
                        error_reason: Some(ErrorReason::SpecialUnvalidatable),
                        error_message: Some(message.to_string()),
                        ..ValidationResult::valid(field)
                    },
                    UnvalidatablePolicy::Fail => {
                        ValidationResult::invalid(field, ErrorReason::SpecialUnvalidatable, message)
                    }
                }
            }
            UrlCheck::Relative => ValidationResult::invalid(
                field,
                ErrorReason::UnreachableRelative,
                "relative url and no base url configured",
            ),
            UrlCheck::Transport(message) => {
                ValidationResult::invalid(field, ErrorReason::TransportError, message)
            }
            UrlCheck::Responded(response) if !response.is_success() => {
                let message = format!("HTTP {}", response.status);
                ValidationResult::invalid(field, ErrorReason::HttpError, message)
                    .with_response(&response)
            }
            UrlCheck::Responded(response) => {
                if kind_conflicts(field.expected_kind, response.content_type.as_deref(), &field.url) {
                    let message = format!(
                        "expected {} but received {}",
                        field.expected_kind,
                        response.content_type.as_deref().unwrap_or("unknown content")
                    );
                    ValidationResult::invalid(field, ErrorReason::KindMismatch, message)
                        .with_response(&response)
                } else {
                    ValidationResult::valid(field).with_response(&response)
                }
            }
        }
    }
}

/// A known expectation conflicts with the kind the response shows. The
/// content type decides when it names image or video; a missing or generic
/// one (`binary/octet-stream`, `text/plain`) defers to the URL's extension.
/// An undecidable kind is never a conflict.
fn kind_conflicts(expected: MediaKind, content_type: Option<&str>, url: &str) -> bool {
    if !expected.is_known() {
        return false;
    }

    let actual = content_type
        .map(MediaKind::from_content_type)
        .filter(|kind| kind.is_known())
        .unwrap_or_else(|| MediaKind::from_extension(url));

    actual.is_known() && actual != expected
}
