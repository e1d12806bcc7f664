//! Placeholder and absolutisation repairs
//!
//! The engine only looks at fields the latest validation flagged invalid.
//! It works on a deep copy, so the caller's document is never touched, and
//! it hands back field-level patches for the store.

mod placeholders;

pub use placeholders::{Placeholder, PlaceholderCatalogue};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::config::RepairConfig;
use crate::document::DocumentValidationResult;
use crate::media::{FieldPath, has_media_extension};
use crate::store::FieldPatch;
use crate::validator::{ErrorReason, ValidationResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixResult {
    pub field: FieldPath,
    pub original_url: String,
    /// Equal to `original_url` when nothing was fixed
    pub new_url: String,
    pub fixed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FixResult {
    fn fixed(field: FieldPath, original_url: String, new_url: String) -> Self {
        Self {
            field,
            original_url,
            new_url,
            fixed: true,
            error: None,
        }
    }

    fn skipped(field: FieldPath, original_url: String, error: impl Into<String>) -> Self {
        Self {
            new_url: original_url.clone(),
            field,
            original_url,
            fixed: false,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RepairOutcome {
    pub document: Value,
    pub fixes: Vec<FixResult>,
}

impl RepairOutcome {
    pub fn applied(&self) -> impl Iterator<Item = &FixResult> {
        self.fixes.iter().filter(|fix| fix.fixed)
    }

    pub fn has_changes(&self) -> bool {
        self.fixes.iter().any(|fix| fix.fixed)
    }

    /// One patch per applied fix, addressed by the extraction path.
    pub fn patch(&self) -> Vec<FieldPatch> {
        self.applied()
            .map(|fix| FieldPatch {
                path: fix.field.clone(),
                value: Value::String(fix.new_url.clone()),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct RepairEngine {
    base_url: Option<Url>,
    placeholders: PlaceholderCatalogue,
}

impl RepairEngine {
    pub fn new(config: &RepairConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            placeholders: PlaceholderCatalogue::new(config.placeholders.clone()),
        }
    }

    pub fn placeholders(&self) -> &PlaceholderCatalogue {
        &self.placeholders
    }

    pub fn repair(&self, document: &Value, validation: &DocumentValidationResult) -> RepairOutcome {
        let mut repaired = document.clone();
        let mut fixes = Vec::new();

        for result in validation.invalid_results() {
            let Some(mut fix) = self.plan(result) else {
                continue;
            };

            if fix.fixed && !fix.field.set(&mut repaired, Value::String(fix.new_url.clone())) {
                fix = FixResult::skipped(
                    fix.field,
                    fix.original_url,
                    "field path no longer resolves",
                );
            }

            debug!(
                collection = %validation.collection,
                id = %validation.id,
                path = %fix.field,
                fixed = fix.fixed,
                "Planned repair"
            );
            fixes.push(fix);
        }

        RepairOutcome {
            document: repaired,
            fixes,
        }
    }

    /// Replacement for one invalid field. `None` means the field is left
    /// alone without a record, which is the case for valid fields and for
    /// fields that already hold a placeholder.
    pub fn plan(&self, result: &ValidationResult) -> Option<FixResult> {
        if result.is_valid {
            return None;
        }

        let field = &result.field;
        let original = field.url.clone();
        let path = field.path.clone();

        let Some(reason) = result.error_reason else {
            return Some(FixResult::skipped(path, original, "no failure reason recorded"));
        };

        match reason {
            ErrorReason::UnreachableRelative => Some(match &self.base_url {
                Some(base) => match base.join(original.trim()) {
                    Ok(absolute) => FixResult::fixed(path, original, absolute.to_string()),
                    Err(e) => FixResult::skipped(path, original, format!("cannot absolutise: {}", e)),
                },
                None => FixResult::skipped(path, original, "no base url configured for repair"),
            }),
            ErrorReason::KindMismatch | ErrorReason::HttpError | ErrorReason::TransportError => {
                if self.placeholders.contains(&original) {
                    return None;
                }
                let placeholder = self.placeholders.select(field.expected_kind, &field.path);
                Some(FixResult::fixed(path, original, placeholder.to_string()))
            }
            ErrorReason::MalformedUrl => Some(match safe_interpretation(&original) {
                Some(url) => FixResult::fixed(path, original, url),
                None => FixResult::skipped(path, original, "malformed url has no safe interpretation"),
            }),
            ErrorReason::SpecialUnvalidatable => Some(FixResult::skipped(
                path,
                original,
                "reference cannot be validated, left untouched",
            )),
        }
    }
}

/// `www.example.com/a.jpg` -> `https://www.example.com/a.jpg`. Only
/// scheme-less values whose first segment is a dotted host qualify.
fn safe_interpretation(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.contains("://") || trimmed.contains(char::is_whitespace) {
        return None;
    }

    let host = trimmed.split(['/', '?', '#']).next()?;
    let labels: Vec<&str> = host.split('.').collect();
    let host_like = labels.len() >= 2
        && labels
            .iter()
            .all(|label| !label.is_empty() && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'))
        && labels.last().is_some_and(|tld| tld.chars().all(|c| c.is_ascii_alphabetic()));
    if !host_like || has_media_extension(host) {
        return None;
    }

    let candidate = format!("https://{}", trimmed);
    Url::parse(&candidate).ok().map(|url| url.to_string())
}
