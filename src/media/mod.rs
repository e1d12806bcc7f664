//! Media field discovery in arbitrary documents
//!
//! Documents are plain `serde_json::Value` trees. Extraction is a pure
//! structural walk: no I/O, deterministic output for equal input.

mod extract;
mod kind;
mod path;

pub use extract::{MEDIA_NAME_KEYWORDS, extract_media_fields, extract_media_fields_at};
pub use kind::{MediaKind, has_media_extension};
pub use path::{FieldPath, PathError, PathSegment};

use serde::{Deserialize, Serialize};

/// A document leaf believed to hold an image/video URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaField {
    pub path: FieldPath,
    pub url: String,
    pub expected_kind: MediaKind,
    /// Kind came from a `{type, url}` descriptor rather than inference.
    #[serde(default)]
    pub declared: bool,
}
