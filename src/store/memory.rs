use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

use super::{
    Document, DocumentStore, DocumentUpdate, Page, Result, StoreError, apply_patch, page_from,
};

type Collection = BTreeMap<String, Value>;

/// In-process document store
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
    page_reads: AtomicUsize,
    commits: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, collection: &str, id: impl Into<String>, data: Value) {
        let mut collections = self.collections.write().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.into(), data);
    }

    /// Number of `list_page` calls served so far
    pub fn page_reads(&self) -> usize {
        self.page_reads.load(Ordering::Relaxed)
    }

    /// Number of successful commits so far
    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn count(&self, collection: &str) -> Result<usize> {
        let collections = self.collections.read().await;
        Ok(collections.get(collection).map_or(0, BTreeMap::len))
    }

    async fn list_page(&self, collection: &str, cursor: Option<&str>, limit: usize) -> Result<Page> {
        self.page_reads.fetch_add(1, Ordering::Relaxed);

        let collections = self.collections.read().await;
        let Some(docs) = collections.get(collection) else {
            return Ok(Page::default());
        };

        let lower = match cursor {
            Some(after) => Bound::Excluded(after.to_string()),
            None => Bound::Unbounded,
        };

        let documents = docs
            .range((lower, Bound::Unbounded))
            .take(limit)
            .map(|(id, data)| Document::new(id.clone(), data.clone()))
            .collect();

        Ok(page_from(documents))
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|data| Document::new(id, data.clone())))
    }

    async fn put(&self, collection: &str, document: Document) -> Result<()> {
        self.insert(collection, document.id, document.data).await;
        Ok(())
    }

    async fn commit(&self, updates: Vec<DocumentUpdate>) -> Result<()> {
        let mut collections = self.collections.write().await;

        // Stage every change first so a failing update leaves the store untouched.
        let mut staged: Vec<(String, String, Value)> = Vec::with_capacity(updates.len());
        for update in &updates {
            let current = staged
                .iter()
                .rev()
                .find(|(c, i, _)| *c == update.collection && *i == update.id)
                .map(|(_, _, data)| data.clone())
                .or_else(|| {
                    collections
                        .get(&update.collection)
                        .and_then(|docs| docs.get(&update.id))
                        .cloned()
                });

            let mut data = current.ok_or_else(|| StoreError::NotFound {
                collection: update.collection.clone(),
                id: update.id.clone(),
            })?;
            apply_patch(&update.collection, &update.id, &mut data, &update.patch)?;
            staged.push((update.collection.clone(), update.id.clone(), data));
        }

        for (collection, id, data) in staged {
            collections.entry(collection).or_default().insert(id, data);
        }

        self.commits.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
