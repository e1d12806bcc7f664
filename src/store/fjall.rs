use async_trait::async_trait;
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use std::ops::Bound;
use std::path::Path;
use tracing::{debug, info};

use super::{
    Document, DocumentStore, DocumentUpdate, Page, Result, StoreError, apply_patch, page_from,
};

/// Fjall-backed document store
///
/// Layout:
/// - `documents` partition: `doc:{collection}:{id}` -> document body (JSON)
///
/// Ids sort bytewise, so cursor pagination is a range scan starting just
/// past the cursor key.
#[derive(Clone)]
pub struct FjallDocumentStore {
    keyspace: Keyspace,
    documents: PartitionHandle,
}

impl FjallDocumentStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening document store at: {}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let keyspace = Config::new(path).open()?;
        let documents = keyspace.open_partition("documents", PartitionCreateOptions::default())?;

        Ok(Self {
            keyspace,
            documents,
        })
    }

    /// Persist all pending writes to disk
    pub fn persist(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }
}

fn check_segment(value: &str) -> Result<()> {
    if value.is_empty() || value.contains(':') {
        return Err(StoreError::InvalidId(value.to_string()));
    }
    Ok(())
}

/// `doc:{collection}:{id}`
fn encode_doc_key(collection: &str, id: &str) -> Vec<u8> {
    format!("doc:{}:{}", collection, id).into_bytes()
}

/// `doc:{collection}:`
fn encode_collection_prefix(collection: &str) -> Vec<u8> {
    format!("doc:{}:", collection).into_bytes()
}

/// First key past every key of the collection (`:` + 1 is `;`).
fn encode_collection_end(collection: &str) -> Vec<u8> {
    format!("doc:{};", collection).into_bytes()
}

fn decode_doc_id(collection: &str, key: &[u8]) -> Option<String> {
    let key = std::str::from_utf8(key).ok()?;
    key.strip_prefix("doc:")?
        .strip_prefix(collection)?
        .strip_prefix(':')
        .map(String::from)
}

#[async_trait]
impl DocumentStore for FjallDocumentStore {
    async fn count(&self, collection: &str) -> Result<usize> {
        check_segment(collection)?;
        let mut count = 0;
        for item in self.documents.prefix(encode_collection_prefix(collection)) {
            item?;
            count += 1;
        }
        Ok(count)
    }

    async fn list_page(&self, collection: &str, cursor: Option<&str>, limit: usize) -> Result<Page> {
        check_segment(collection)?;

        let lower = match cursor {
            Some(after) => Bound::Excluded(encode_doc_key(collection, after)),
            None => Bound::Included(encode_collection_prefix(collection)),
        };
        let upper = Bound::Excluded(encode_collection_end(collection));

        let mut documents = Vec::with_capacity(limit);
        for item in self.documents.range((lower, upper)).take(limit) {
            let (key, value) = item?;
            let Some(id) = decode_doc_id(collection, &key) else {
                continue;
            };
            documents.push(Document::new(id, serde_json::from_slice(&value)?));
        }

        debug!(collection, ?cursor, returned = documents.len(), "Listed page");
        Ok(page_from(documents))
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        check_segment(collection)?;
        match self.documents.get(encode_doc_key(collection, id))? {
            Some(value) => Ok(Some(Document::new(id, serde_json::from_slice(&value)?))),
            None => Ok(None),
        }
    }

    async fn put(&self, collection: &str, document: Document) -> Result<()> {
        check_segment(collection)?;
        if document.id.is_empty() {
            return Err(StoreError::InvalidId(document.id));
        }
        let value = serde_json::to_vec(&document.data)?;
        self.documents
            .insert(encode_doc_key(collection, &document.id), value)?;
        Ok(())
    }

    async fn commit(&self, updates: Vec<DocumentUpdate>) -> Result<()> {
        let mut batch = self.keyspace.batch();
        let mut staged: Vec<(Vec<u8>, serde_json::Value)> = Vec::with_capacity(updates.len());

        for update in &updates {
            check_segment(&update.collection)?;
            let key = encode_doc_key(&update.collection, &update.id);

            // A document patched twice in one batch builds on its staged body.
            let current = match staged.iter().rposition(|(k, _)| *k == key) {
                Some(pos) => Some(staged[pos].1.clone()),
                None => match self.documents.get(&key)? {
                    Some(value) => Some(serde_json::from_slice(&value)?),
                    None => None,
                },
            };

            let mut data = current.ok_or_else(|| StoreError::NotFound {
                collection: update.collection.clone(),
                id: update.id.clone(),
            })?;
            apply_patch(&update.collection, &update.id, &mut data, &update.patch)?;
            staged.push((key, data));
        }

        for (key, data) in &staged {
            batch.insert(&self.documents, key.clone(), serde_json::to_vec(data)?);
        }
        batch.commit()?;

        debug!(updates = updates.len(), "Committed document updates");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FieldPatch;
    use serde_json::json;
    use tempfile::TempDir;

    fn create_test_store() -> (FjallDocumentStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = FjallDocumentStore::open(temp_dir.path().join("documents")).unwrap();
        (store, temp_dir)
    }

    #[test]
    fn test_key_encoding() {
        assert_eq!(encode_doc_key("yachts", "abc"), b"doc:yachts:abc");
        assert_eq!(
            decode_doc_id("yachts", b"doc:yachts:abc"),
            Some("abc".to_string())
        );
        assert_eq!(decode_doc_id("users", b"doc:yachts:abc"), None);
    }

    #[tokio::test]
    async fn test_collections_are_isolated() {
        let (store, _temp) = create_test_store();
        store.put("yachts", Document::new("a", json!({}))).await.unwrap();
        store.put("yachts", Document::new("b", json!({}))).await.unwrap();
        store.put("yachtsx", Document::new("c", json!({}))).await.unwrap();

        assert_eq!(store.count("yachts").await.unwrap(), 2);
        let page = store.list_page("yachts", None, 10).await.unwrap();
        let ids: Vec<_> = page.documents.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_cursor_pagination() {
        let (store, _temp) = create_test_store();
        for i in 0..7 {
            store
                .put("yachts", Document::new(format!("y{}", i), json!({"n": i})))
                .await
                .unwrap();
        }

        let mut cursor: Option<String> = None;
        let mut pages = 0;
        let mut seen = Vec::new();
        loop {
            let page = store.list_page("yachts", cursor.as_deref(), 3).await.unwrap();
            if page.documents.is_empty() {
                break;
            }
            pages += 1;
            seen.extend(page.documents.into_iter().map(|d| d.id));
            cursor = page.next_cursor;
        }

        assert_eq!(pages, 3);
        assert_eq!(seen.len(), 7);
    }

    #[tokio::test]
    async fn test_commit_patches_in_batch() {
        let (store, _temp) = create_test_store();
        store
            .put(
                "yachts",
                Document::new("a", json!({"imageUrl": "old", "media": [{"url": "x"}]})),
            )
            .await
            .unwrap();

        let update = DocumentUpdate {
            collection: "yachts".to_string(),
            id: "a".to_string(),
            patch: vec![
                FieldPatch {
                    path: "imageUrl".parse().unwrap(),
                    value: json!("new"),
                },
                FieldPatch {
                    path: "media.[0].url".parse().unwrap(),
                    value: json!("y"),
                },
            ],
        };
        store.commit(vec![update]).await.unwrap();

        let doc = store.get("yachts", "a").await.unwrap().unwrap();
        assert_eq!(doc.data, json!({"imageUrl": "new", "media": [{"url": "y"}]}));
    }

    #[tokio::test]
    async fn test_commit_rejects_missing_document() {
        let (store, _temp) = create_test_store();
        let result = store
            .commit(vec![DocumentUpdate {
                collection: "yachts".to_string(),
                id: "ghost".to_string(),
                patch: vec![],
            }])
            .await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_colon_in_collection_rejected() {
        let (store, _temp) = create_test_store();
        assert!(matches!(
            store.count("a:b").await,
            Err(StoreError::InvalidId(_))
        ));
    }
}
