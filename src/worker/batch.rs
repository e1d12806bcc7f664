use bon::Builder;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::{
    DocumentFix, EventSender, Progress, Result, RunConfig, RunEvent, RunOutcome, StopSignal,
    WorkerError,
};
use crate::config::{CollectionConfig, Config};
use crate::document::{DocumentValidationResult, DocumentValidator};
use crate::media::MediaField;
use crate::observability::Metrics;
use crate::repair::{RepairEngine, RepairOutcome};
use crate::report::ReportBuilder;
use crate::store::{DocumentStore, DocumentUpdate, FieldPatch};
use crate::validator::{ProbeError, UrlValidator, ValidationCache};

/// How a collection pass ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CollectionEnd {
    Finished,
    Stopped,
}

#[derive(Builder)]
pub struct BatchWorker {
    store: Arc<dyn DocumentStore>,
    validator: DocumentValidator,
    #[builder(default)]
    repair: RepairEngine,
    #[builder(default)]
    metrics: Arc<Metrics>,
}

impl BatchWorker {
    /// Worker with the HTTP probe and repair settings from `config`.
    pub fn from_config(
        config: &Config,
        store: Arc<dyn DocumentStore>,
        metrics: Arc<Metrics>,
    ) -> std::result::Result<Self, ProbeError> {
        let validator = UrlValidator::http(config.validator.clone())?;
        Ok(Self::builder()
            .store(store)
            .validator(DocumentValidator::new(Arc::new(validator)))
            .repair(RepairEngine::new(&config.repair))
            .metrics(metrics)
            .build())
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Run over every configured collection, sequentially.
    ///
    /// Collection failures are recorded in the report and announced on the
    /// event stream; the remaining collections still run.
    pub async fn run(
        &self,
        config: &RunConfig,
        events: Option<&EventSender>,
        stop: &StopSignal,
    ) -> RunOutcome {
        let start = Utc::now();
        let cache = ValidationCache::new();
        let mut report = ReportBuilder::new(start, config.worker.max_invalid_results);
        let total_collections = config.collections.len();
        let mut completed_collections = 0;
        let mut stopped = false;

        info!(collections = total_collections, "Validation run started");

        for (name, collection) in &config.collections {
            if stop.is_stopped() {
                stopped = true;
                break;
            }

            report.begin_collection(name);
            let mut pass = CollectionPass {
                name,
                collection,
                config,
                cache: &cache,
                report: &mut report,
                events,
                completed_collections,
                total_collections,
            };

            match self.run_collection(&mut pass, stop).await {
                Ok(CollectionEnd::Finished) => completed_collections += 1,
                Ok(CollectionEnd::Stopped) => {
                    stopped = true;
                    break;
                }
                Err(e) => {
                    error!(collection = %name, error = %e, "Collection failed, continuing with the next one");
                    self.metrics.collection_failed();
                    report.fail_collection(name, e.to_string());
                    emit(
                        events,
                        RunEvent::CollectionFailed {
                            collection: name.clone(),
                            error: e.to_string(),
                        },
                    );
                    completed_collections += 1;
                }
            }
        }

        let report = report.build(Utc::now());
        info!(
            report_id = %report.id,
            documents = report.total_documents,
            valid = report.valid_urls,
            invalid = report.invalid_urls,
            missing = report.missing_urls,
            fixed = report.fixed_urls,
            checks = cache.checks(),
            stopped,
            "Validation run finished"
        );

        RunOutcome { report, stopped }
    }

    async fn run_collection(&self, pass: &mut CollectionPass<'_>, stop: &StopSignal) -> Result<CollectionEnd> {
        let name = pass.name;
        let read_error = |source| WorkerError::CollectionRead {
            collection: name.to_string(),
            source,
        };

        let count = self.store.count(name).await.map_err(read_error)?;
        let total = count.min(pass.config.cap_for(pass.collection));
        let fixable = pass.collection.fixable && pass.config.apply_fixes;
        let batch_size = pass.config.worker.batch_size.max(1);

        info!(collection = name, count, total, fixable, "Scanning collection");

        let mut processed = 0;
        let mut cursor: Option<String> = None;

        while processed < total {
            if stop.is_stopped() {
                info!(collection = name, processed, "Stop requested, ending run between pages");
                return Ok(CollectionEnd::Stopped);
            }

            let limit = batch_size.min(total - processed);
            let page = self
                .store
                .list_page(name, cursor.as_deref(), limit)
                .await
                .map_err(read_error)?;
            if page.documents.is_empty() {
                break;
            }

            let results = self
                .validator
                .validate_page(name, &page.documents, pass.cache)
                .await;

            let mut updates = Vec::new();
            let mut fixed = 0;
            for (document, result) in page.documents.iter().zip(&results) {
                self.metrics
                    .document_scanned(result.total_fields, result.total_fields - result.valid_fields);
                pass.report.add_document(result);

                if fixable && result.has_invalid() {
                    let mut outcome = self.repair.repair(&document.data, result);
                    self.confirm_rewrites(result, &mut outcome, pass.cache).await;
                    let patch = outcome.patch();
                    if !patch.is_empty() {
                        fixed += patch.len();
                        updates.push(DocumentUpdate {
                            collection: name.to_string(),
                            id: document.id.clone(),
                            patch,
                        });
                    }
                }
            }

            if !updates.is_empty() {
                self.commit_in_batches(name, updates, pass.config.worker.write_batch_size)
                    .await?;
                pass.report.add_fixes(name, fixed);
                self.metrics.fixes_applied(fixed);
            }

            processed += page.documents.len();
            cursor = page.next_cursor;

            debug!(collection = name, processed, total, "Page done");
            emit(
                pass.events,
                RunEvent::Progress(Progress {
                    collection: name.to_string(),
                    processed,
                    total,
                    completed_collections: pass.completed_collections,
                    total_collections: pass.total_collections,
                }),
            );
        }

        Ok(CollectionEnd::Finished)
    }

    /// Check absolutised and scheme-completed URLs through the run cache
    /// before they are written. A rewrite that fails its own check is
    /// replaced by the field's placeholder, so a later pass finds nothing
    /// left to fix.
    async fn confirm_rewrites(
        &self,
        validation: &DocumentValidationResult,
        outcome: &mut RepairOutcome,
        cache: &ValidationCache,
    ) {
        let placeholders = self.repair.placeholders();

        for fix in outcome.fixes.iter_mut().filter(|fix| fix.fixed) {
            if placeholders.contains(&fix.new_url) {
                continue;
            }
            let Some(checked) = validation.results.iter().find(|r| r.field.path == fix.field) else {
                continue;
            };

            let field = MediaField {
                url: fix.new_url.clone(),
                ..checked.field.clone()
            };
            let result = self.validator.url_validator().validate(&field, cache).await;
            if result.is_valid {
                continue;
            }

            let placeholder = placeholders.select(field.expected_kind, &field.path).to_string();
            debug!(
                collection = %validation.collection,
                id = %validation.id,
                path = %fix.field,
                rewritten = %fix.new_url,
                reason = ?result.error_reason,
                "Rewritten url failed its check, using placeholder"
            );
            fix.field.set(&mut outcome.document, Value::String(placeholder.clone()));
            fix.new_url = placeholder;
        }
    }

    async fn commit_in_batches(
        &self,
        collection: &str,
        updates: Vec<DocumentUpdate>,
        write_batch_size: usize,
    ) -> Result<()> {
        for chunk in chunk_updates(updates, write_batch_size) {
            let mutations: usize = chunk.iter().map(DocumentUpdate::mutations).sum();
            self.store
                .commit(chunk)
                .await
                .map_err(|source| WorkerError::WriteCommit {
                    collection: collection.to_string(),
                    source,
                })?;
            debug!(collection, mutations, "Committed repair batch");
        }
        Ok(())
    }

    /// Validate, repair and (for fixable collections) commit one document.
    pub async fn fix_document(
        &self,
        collection: &str,
        id: &str,
        settings: &CollectionConfig,
    ) -> Result<DocumentFix> {
        let read_error = |source| WorkerError::CollectionRead {
            collection: collection.to_string(),
            source,
        };

        let document = self
            .store
            .get(collection, id)
            .await
            .map_err(read_error)?
            .ok_or_else(|| WorkerError::DocumentNotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;

        let cache = ValidationCache::new();
        let validation = self
            .validator
            .validate(collection, id, &document.data, &cache)
            .await;
        let mut outcome = self.repair.repair(&document.data, &validation);
        self.confirm_rewrites(&validation, &mut outcome, &cache).await;
        let patch = outcome.patch();

        let committed = settings.fixable && !patch.is_empty();
        if committed {
            let applied = patch.len();
            self.commit_in_batches(
                collection,
                vec![DocumentUpdate {
                    collection: collection.to_string(),
                    id: id.to_string(),
                    patch,
                }],
                crate::config::MAX_WRITE_BATCH,
            )
            .await?;
            self.metrics.fixes_applied(applied);
            info!(collection, id, applied, "Document repaired");
        } else if !patch.is_empty() {
            warn!(collection, id, "Collection is not fixable, repairs not written");
        }

        Ok(DocumentFix {
            validation,
            fixes: outcome.fixes,
            committed,
        })
    }
}

struct CollectionPass<'a> {
    name: &'a str,
    collection: &'a CollectionConfig,
    config: &'a RunConfig,
    cache: &'a ValidationCache,
    report: &'a mut ReportBuilder,
    events: Option<&'a EventSender>,
    completed_collections: usize,
    total_collections: usize,
}

fn emit(events: Option<&EventSender>, event: RunEvent) {
    if let Some(tx) = events {
        // Nobody listening is fine.
        let _ = tx.send(event);
    }
}

/// Group updates so no commit carries more than `limit` mutations. A single
/// document with more patches than the limit is split across commits.
fn chunk_updates(updates: Vec<DocumentUpdate>, limit: usize) -> Vec<Vec<DocumentUpdate>> {
    let limit = limit.max(1);
    let mut chunks = Vec::new();
    let mut current: Vec<DocumentUpdate> = Vec::new();
    let mut current_size = 0;

    for update in updates {
        let pieces: Vec<DocumentUpdate> = if update.patch.len() > limit {
            update
                .patch
                .chunks(limit)
                .map(|patch: &[FieldPatch]| DocumentUpdate {
                    collection: update.collection.clone(),
                    id: update.id.clone(),
                    patch: patch.to_vec(),
                })
                .collect()
        } else {
            vec![update]
        };

        for piece in pieces {
            let size = piece.mutations();
            if current_size + size > limit && !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_size = 0;
            }
            current_size += size;
            current.push(piece);
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
