//! Document store abstraction
//!
//! The pipeline needs three things from the store: a document count, a
//! cursor-paginated read ordered by document id, and a batched commit of
//! field-level patches.

mod fjall;
mod memory;

pub use self::fjall::FjallDocumentStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::media::FieldPath;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Fjall error: {0}")]
    Fjall(#[from] ::fjall::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("Patch path {path} does not resolve in {collection}/{id}")]
    PatchTarget {
        collection: String,
        id: String,
        path: String,
    },

    #[error("Invalid document id: {0:?}")]
    InvalidId(String),

    #[error("Invalid import: {0}")]
    InvalidImport(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

impl Document {
    pub fn new(id: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Page {
    pub documents: Vec<Document>,
    /// Id of the last document in this page, `None` when the page is empty
    pub next_cursor: Option<String>,
}

/// One leaf replacement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldPatch {
    pub path: FieldPath,
    pub value: Value,
}

/// Patches for one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentUpdate {
    pub collection: String,
    pub id: String,
    pub patch: Vec<FieldPatch>,
}

impl DocumentUpdate {
    /// Number of mutations this update counts for in a write batch.
    pub fn mutations(&self) -> usize {
        self.patch.len().max(1)
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn count(&self, collection: &str) -> Result<usize>;

    /// Up to `limit` documents with id strictly greater than `cursor`, in id order.
    async fn list_page(&self, collection: &str, cursor: Option<&str>, limit: usize) -> Result<Page>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    async fn put(&self, collection: &str, document: Document) -> Result<()>;

    /// Apply all updates atomically.
    async fn commit(&self, updates: Vec<DocumentUpdate>) -> Result<()>;
}

/// Apply patches to a document in place, failing on the first path that
/// no longer resolves.
pub(crate) fn apply_patch(
    collection: &str,
    id: &str,
    data: &mut Value,
    patch: &[FieldPatch],
) -> Result<()> {
    for change in patch {
        if !change.path.set(data, change.value.clone()) {
            return Err(StoreError::PatchTarget {
                collection: collection.to_string(),
                id: id.to_string(),
                path: change.path.to_string(),
            });
        }
    }
    Ok(())
}

pub(crate) fn page_from(documents: Vec<Document>) -> Page {
    let next_cursor = documents.last().map(|d| d.id.clone());
    Page {
        documents,
        next_cursor,
    }
}

/// Documents from an import file: an array of objects (id taken from an `id`
/// member, generated when absent) or an object keyed by document id.
pub fn documents_from_json(value: Value) -> Result<Vec<Document>> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                if !item.is_object() {
                    return Err(StoreError::InvalidImport(format!(
                        "element {} is not an object",
                        index
                    )));
                }
                let id = match item.get("id") {
                    Some(Value::String(id)) => id.clone(),
                    Some(Value::Number(n)) => n.to_string(),
                    Some(other) => {
                        return Err(StoreError::InvalidImport(format!(
                            "element {} has a non-scalar id: {}",
                            index, other
                        )));
                    }
                    None => uuid::Uuid::new_v4().to_string(),
                };
                Ok(Document::new(id, item))
            })
            .collect(),
        Value::Object(map) => Ok(map
            .into_iter()
            .map(|(id, data)| Document::new(id, data))
            .collect()),
        other => Err(StoreError::InvalidImport(format!(
            "expected an array or an object, got {}",
            json_type(&other)
        ))),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_import_array_uses_id_member() {
        let docs = documents_from_json(json!([
            {"id": "y1", "name": "Aurora"},
            {"id": 7, "name": "Breeze"},
            {"name": "No id"}
        ]))
        .unwrap();

        assert_eq!(docs[0].id, "y1");
        assert_eq!(docs[0].data["name"], "Aurora");
        assert_eq!(docs[1].id, "7");
        assert!(!docs[2].id.is_empty());
    }

    #[test]
    fn test_import_map_keys_become_ids() {
        let docs = documents_from_json(json!({"a": {"photo": "x"}, "b": {}})).unwrap();
        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_import_rejects_scalars() {
        assert!(matches!(
            documents_from_json(json!("nope")),
            Err(StoreError::InvalidImport(_))
        ));
        assert!(documents_from_json(json!([1, 2])).is_err());
    }

    #[test]
    fn test_mutations_count_at_least_one() {
        let update = DocumentUpdate {
            collection: "yachts".to_string(),
            id: "y1".to_string(),
            patch: Vec::new(),
        };
        assert_eq!(update.mutations(), 1);
    }
}
