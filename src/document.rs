//! Per-document validation
//!
//! Extraction followed by bounded-concurrency URL checks. Field results keep
//! extraction order so reports and repairs are deterministic.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::media::{MediaField, extract_media_fields};
use crate::store::Document;
use crate::validator::{ErrorReason, UrlValidator, ValidationCache, ValidationResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentValidationResult {
    pub id: String,
    pub collection: String,
    pub total_fields: usize,
    pub valid_fields: usize,
    /// Invalid fields, excluding missing ones
    pub invalid_fields: usize,
    pub missing_fields: usize,
    pub results: Vec<ValidationResult>,
}

impl DocumentValidationResult {
    pub fn new(id: impl Into<String>, collection: impl Into<String>, results: Vec<ValidationResult>) -> Self {
        let mut valid_fields = 0;
        let mut invalid_fields = 0;
        let mut missing_fields = 0;

        for result in &results {
            if result.is_valid {
                valid_fields += 1;
            } else if result.is_missing() {
                missing_fields += 1;
            } else {
                invalid_fields += 1;
            }
        }

        Self {
            id: id.into(),
            collection: collection.into(),
            total_fields: results.len(),
            valid_fields,
            invalid_fields,
            missing_fields,
            results,
        }
    }

    pub fn has_invalid(&self) -> bool {
        self.valid_fields < self.total_fields
    }

    pub fn invalid_results(&self) -> impl Iterator<Item = &ValidationResult> {
        self.results.iter().filter(|r| !r.is_valid)
    }
}

#[derive(Clone)]
pub struct DocumentValidator {
    validator: Arc<UrlValidator>,
    permits: Arc<Semaphore>,
}

impl DocumentValidator {
    pub fn new(validator: Arc<UrlValidator>) -> Self {
        let limit = validator.config().max_concurrency.max(1);
        Self {
            validator,
            permits: Arc::new(Semaphore::new(limit)),
        }
    }

    pub fn url_validator(&self) -> &Arc<UrlValidator> {
        &self.validator
    }

    pub async fn validate(
        &self,
        collection: &str,
        id: &str,
        document: &Value,
        cache: &ValidationCache,
    ) -> DocumentValidationResult {
        let fields = extract_media_fields(document);
        debug!(collection, id, fields = fields.len(), "Validating document");

        let results = self.validate_fields(fields, cache).await;
        DocumentValidationResult::new(id, collection, results)
    }

    /// Validate a page of documents; every field of the page shares one
    /// bounded pool. Results come back in document order.
    pub async fn validate_page(
        &self,
        collection: &str,
        documents: &[Document],
        cache: &ValidationCache,
    ) -> Vec<DocumentValidationResult> {
        let mut counts = Vec::with_capacity(documents.len());
        let mut fields = Vec::new();
        for document in documents {
            let extracted = extract_media_fields(&document.data);
            counts.push(extracted.len());
            fields.extend(extracted);
        }

        let mut results = self.validate_fields(fields, cache).await.into_iter();
        documents
            .iter()
            .zip(counts)
            .map(|(document, count)| {
                let own: Vec<ValidationResult> = results.by_ref().take(count).collect();
                DocumentValidationResult::new(document.id.clone(), collection, own)
            })
            .collect()
    }

    /// Validate fields concurrently, bounded by `validator.max_concurrency`.
    pub async fn validate_fields(
        &self,
        fields: Vec<MediaField>,
        cache: &ValidationCache,
    ) -> Vec<ValidationResult> {
        let mut handles = Vec::with_capacity(fields.len());

        for field in &fields {
            let validator = self.validator.clone();
            let permits = self.permits.clone();
            let cache = cache.clone();
            let field = field.clone();

            handles.push(tokio::spawn(async move {
                // The semaphore is never closed.
                let _permit = permits.acquire_owned().await.ok();
                validator.validate(&field, &cache).await
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (handle, field) in handles.into_iter().zip(fields) {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => {
                    warn!(path = %field.path, error = %e, "Field check aborted");
                    results.push(ValidationResult::invalid(
                        field,
                        ErrorReason::TransportError,
                        format!("check aborted: {}", e),
                    ));
                }
            }
        }
        results
    }
}
