use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use super::{CollectionSummary, InvalidResultEntry, ValidationReport, percentage};
use crate::document::DocumentValidationResult;

pub const DEFAULT_MAX_INVALID_RESULTS: usize = 1000;

#[derive(Debug, Default)]
struct Tally {
    documents: usize,
    valid: usize,
    invalid: usize,
    missing: usize,
    fixed: usize,
    error: Option<String>,
}

/// Folds document results into a [`ValidationReport`].
///
/// Documents are added one at a time so a run never holds more than one
/// page of results. Invalid entries are kept in location order and the
/// list never grows past the cap.
#[derive(Debug)]
pub struct ReportBuilder {
    start: DateTime<Utc>,
    max_invalid_results: usize,
    // Insertion order of collections
    order: Vec<String>,
    tallies: BTreeMap<String, Tally>,
    invalid: BTreeMap<String, InvalidResultEntry>,
    dropped: usize,
}

impl ReportBuilder {
    pub fn new(start: DateTime<Utc>, max_invalid_results: usize) -> Self {
        Self {
            start,
            max_invalid_results,
            order: Vec::new(),
            tallies: BTreeMap::new(),
            invalid: BTreeMap::new(),
            dropped: 0,
        }
    }

    /// Build a report from a complete list of document results.
    pub fn from_results<'a>(
        results: impl IntoIterator<Item = &'a DocumentValidationResult>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        max_invalid_results: usize,
    ) -> ValidationReport {
        let mut builder = Self::new(start, max_invalid_results);
        for result in results {
            builder.add_document(result);
        }
        builder.build(end)
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    fn tally(&mut self, collection: &str) -> &mut Tally {
        if !self.tallies.contains_key(collection) {
            self.order.push(collection.to_string());
        }
        self.tallies.entry(collection.to_string()).or_default()
    }

    /// Make a collection appear in the report even if it yields no documents.
    pub fn begin_collection(&mut self, collection: &str) {
        self.tally(collection);
    }

    pub fn add_document(&mut self, result: &DocumentValidationResult) {
        let tally = self.tally(&result.collection);
        tally.documents += 1;
        tally.valid += result.valid_fields;
        tally.invalid += result.invalid_fields;
        tally.missing += result.missing_fields;

        for invalid in result.invalid_results() {
            let field = invalid.field.path.to_string();
            let location = format!("{} ({}): {}", result.collection, result.id, field);
            let entry = InvalidResultEntry {
                location: location.clone(),
                collection: result.collection.clone(),
                document_id: result.id.clone(),
                field,
                url: invalid.field.url.clone(),
                error_reason: invalid.error_reason,
                error_message: invalid.error_message.clone(),
                http_status: invalid.http_status,
            };
            self.push_invalid(location, entry);
        }
    }

    fn push_invalid(&mut self, location: String, entry: InvalidResultEntry) {
        self.invalid.insert(location, entry);
        if self.invalid.len() > self.max_invalid_results {
            self.invalid.pop_last();
            self.dropped += 1;
        }
    }

    pub fn add_fixes(&mut self, collection: &str, fixed: usize) {
        self.tally(collection).fixed += fixed;
    }

    /// Record a batch-level failure; the collection's counts so far are kept.
    pub fn fail_collection(&mut self, collection: &str, error: impl Into<String>) {
        self.tally(collection).error = Some(error.into());
    }

    pub fn build(self, end: DateTime<Utc>) -> ValidationReport {
        let mut summaries = Vec::with_capacity(self.order.len());
        let mut tallies = self.tallies;

        for collection in self.order {
            let Some(tally) = tallies.remove(&collection) else {
                continue;
            };
            let total = tally.valid + tally.invalid + tally.missing;
            summaries.push(CollectionSummary {
                collection,
                documents: tally.documents,
                total_fields: total,
                valid_urls: tally.valid,
                invalid_urls: tally.invalid,
                missing_urls: tally.missing,
                valid_percentage: percentage(tally.valid, total),
                invalid_percentage: percentage(tally.invalid, total),
                missing_percentage: percentage(tally.missing, total),
                fixed_urls: tally.fixed,
                error: tally.error,
            });
        }

        let total_documents = summaries.iter().map(|s| s.documents).sum();
        let valid_urls = summaries.iter().map(|s| s.valid_urls).sum();
        let invalid_urls = summaries.iter().map(|s| s.invalid_urls).sum();
        let missing_urls = summaries.iter().map(|s| s.missing_urls).sum();
        let fixed_urls = summaries.iter().map(|s| s.fixed_urls).sum();
        let total_fields = summaries.iter().map(|s| s.total_fields).sum();

        let duration = (end - self.start).num_milliseconds().max(0) as u64;

        ValidationReport {
            id: ValidationReport::id_for(self.start),
            start_time: self.start,
            end_time: end,
            duration,
            total_documents,
            total_fields,
            valid_urls,
            invalid_urls,
            missing_urls,
            fixed_urls,
            collection_summaries: summaries,
            invalid_results: self.invalid.into_values().collect(),
            truncated_results: self.dropped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{MediaField, MediaKind};
    use crate::validator::{ErrorReason, ValidationResult};
    use chrono::Duration;

    fn field(path: &str, url: &str) -> MediaField {
        MediaField {
            path: path.parse().unwrap(),
            url: url.to_string(),
            expected_kind: MediaKind::Image,
            declared: false,
        }
    }

    fn doc(collection: &str, id: &str, valid: usize, invalid: usize, missing: usize) -> DocumentValidationResult {
        let mut results = Vec::new();
        for i in 0..valid {
            results.push(ValidationResult::valid(field(&format!("ok{}", i), "https://x/a.jpg")));
        }
        for i in 0..invalid {
            results.push(ValidationResult::invalid(
                field(&format!("bad{}", i), "https://x/gone.jpg"),
                ErrorReason::HttpError,
                "HTTP 404",
            ));
        }
        for i in 0..missing {
            results.push(ValidationResult::invalid(
                field(&format!("hero{}.url", i), ""),
                ErrorReason::MalformedUrl,
                "empty url",
            ));
        }
        DocumentValidationResult::new(id, collection, results)
    }

    #[test]
    fn test_totals_equal_sum_of_collections() {
        let start = Utc::now();
        let results = vec![
            doc("yachts", "a", 3, 1, 0),
            doc("yachts", "b", 0, 2, 1),
            doc("users", "u", 1, 0, 1),
        ];

        let report = ReportBuilder::from_results(&results, start, start + Duration::seconds(2), 100);

        assert_eq!(report.total_documents, 3);
        assert_eq!(report.valid_urls, 4);
        assert_eq!(report.invalid_urls, 3);
        assert_eq!(report.missing_urls, 2);
        assert_eq!(report.total_fields, 9);
        assert_eq!(report.duration, 2000);

        let sum = |f: fn(&CollectionSummary) -> usize| -> usize {
            report.collection_summaries.iter().map(f).sum()
        };
        assert_eq!(sum(|s| s.valid_urls), report.valid_urls);
        assert_eq!(sum(|s| s.invalid_urls), report.invalid_urls);
        assert_eq!(sum(|s| s.missing_urls), report.missing_urls);

        let yachts = report.summary("yachts").unwrap();
        assert_eq!(yachts.total_fields, 7);
        assert_eq!(yachts.valid_percentage, 42.86);
        assert_eq!(yachts.invalid_percentage, 42.86);
        assert_eq!(yachts.missing_percentage, 14.29);
    }

    #[test]
    fn test_invalid_results_sorted_and_annotated() {
        let start = Utc::now();
        let results = vec![doc("yachts", "b", 0, 1, 0), doc("users", "z", 0, 1, 1)];

        let report = ReportBuilder::from_results(&results, start, start, 100);
        let locations: Vec<&str> = report
            .invalid_results
            .iter()
            .map(|e| e.location.as_str())
            .collect();

        assert_eq!(
            locations,
            vec!["users (z): bad0", "users (z): hero0.url", "yachts (b): bad0"]
        );
        assert_eq!(report.invalid_results[0].http_status, None);
        assert_eq!(report.invalid_results[0].error_reason, Some(ErrorReason::HttpError));
    }

    #[test]
    fn test_invalid_results_capped_deterministically() {
        let start = Utc::now();
        let results: Vec<_> = (0..10)
            .rev()
            .map(|i| doc("yachts", &format!("d{}", i), 0, 1, 0))
            .collect();

        let report = ReportBuilder::from_results(&results, start, start, 3);

        assert_eq!(report.invalid_results.len(), 3);
        assert_eq!(report.truncated_results, 7);
        assert_eq!(report.invalid_results[0].document_id, "d0");
        assert_eq!(report.invalid_results[2].document_id, "d2");
        // totals are not affected by the cap
        assert_eq!(report.invalid_urls, 10);
    }

    #[test]
    fn test_failed_and_empty_collections_are_listed() {
        let start = Utc::now();
        let mut builder = ReportBuilder::new(start, 10);
        builder.begin_collection("yachts");
        builder.begin_collection("users");
        builder.add_document(&doc("users", "u", 1, 0, 0));
        builder.add_fixes("users", 0);
        builder.fail_collection("yachts", "read failed");

        let report = builder.build(start);
        let names: Vec<&str> = report
            .collection_summaries
            .iter()
            .map(|s| s.collection.as_str())
            .collect();
        assert_eq!(names, vec!["yachts", "users"]);
        assert!(report.is_partial());
        assert_eq!(report.summary("yachts").unwrap().documents, 0);
        assert_eq!(report.summary("yachts").unwrap().valid_percentage, 0.0);
    }

    #[test]
    fn test_serialized_shape() {
        let start = Utc::now();
        let report = ReportBuilder::from_results(&[doc("yachts", "a", 1, 0, 0)], start, start, 10);
        let json = serde_json::to_value(&report).unwrap();

        for key in [
            "id",
            "startTime",
            "endTime",
            "duration",
            "totalDocuments",
            "totalFields",
            "validUrls",
            "invalidUrls",
            "missingUrls",
            "collectionSummaries",
            "invalidResults",
        ] {
            assert!(json.get(key).is_some(), "missing {}", key);
        }
    }
}
