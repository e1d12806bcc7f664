//! Validation report model
//!
//! The JSON shape of [`ValidationReport`] is what gets persisted and what
//! operators read back, so field names are fixed (camelCase).

mod builder;

pub use builder::{DEFAULT_MAX_INVALID_RESULTS, ReportBuilder};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::validator::ErrorReason;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Milliseconds between start and end
    pub duration: u64,
    pub total_documents: usize,
    pub total_fields: usize,
    pub valid_urls: usize,
    pub invalid_urls: usize,
    pub missing_urls: usize,
    #[serde(default)]
    pub fixed_urls: usize,
    pub collection_summaries: Vec<CollectionSummary>,
    pub invalid_results: Vec<InvalidResultEntry>,
    /// Invalid entries dropped by the cap
    #[serde(default)]
    pub truncated_results: usize,
}

impl ValidationReport {
    /// Report ids lead with the run's start time, so they sort by it. The
    /// random tail keeps two runs started in the same millisecond apart.
    pub fn id_for(start: DateTime<Utc>) -> String {
        let nonce = Uuid::new_v4().simple().to_string();
        format!("report-{}-{}", start.format("%Y%m%dT%H%M%S%.3fZ"), &nonce[..8])
    }

    pub fn is_partial(&self) -> bool {
        self.collection_summaries.iter().any(|s| s.error.is_some())
    }

    pub fn summary(&self, collection: &str) -> Option<&CollectionSummary> {
        self.collection_summaries
            .iter()
            .find(|s| s.collection == collection)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSummary {
    pub collection: String,
    pub documents: usize,
    pub total_fields: usize,
    pub valid_urls: usize,
    pub invalid_urls: usize,
    pub missing_urls: usize,
    pub valid_percentage: f64,
    pub invalid_percentage: f64,
    pub missing_percentage: f64,
    #[serde(default)]
    pub fixed_urls: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One invalid field, annotated for triage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidResultEntry {
    /// `collection (documentId): field`
    pub location: String,
    pub collection: String,
    pub document_id: String,
    pub field: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<ErrorReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
}

pub(crate) fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    (part as f64 * 10_000.0 / whole as f64).round() / 100.0
}
