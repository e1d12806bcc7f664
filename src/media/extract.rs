use serde_json::{Map, Value};

use super::kind::{MediaKind, has_media_extension};
use super::path::FieldPath;
use super::MediaField;

/// Field-name keywords marking a leaf as a media candidate.
pub const MEDIA_NAME_KEYWORDS: &[&str] = &[
    "image",
    "media",
    "photo",
    "picture",
    "thumbnail",
    "avatar",
    "icon",
    "logo",
    "banner",
    "cover",
    "url",
    "video",
];

/// Enumerate candidate media fields in `document`, depth first.
///
/// Object keys are visited in the map's order, which is sorted for
/// `serde_json::Map`, so the output is deterministic for equal documents.
pub fn extract_media_fields(document: &Value) -> Vec<MediaField> {
    let mut fields = Vec::new();
    walk(document, &FieldPath::root(), &mut fields);
    fields
}

/// Same as [`extract_media_fields`] but starting below `prefix`.
pub fn extract_media_fields_at(document: &Value, prefix: &FieldPath) -> Vec<MediaField> {
    let mut fields = Vec::new();
    if let Some(value) = prefix.get(document) {
        walk(value, prefix, &mut fields);
    }
    fields
}

fn walk(value: &Value, path: &FieldPath, out: &mut Vec<MediaField>) {
    match value {
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                walk(item, &path.index(i), out);
            }
        }
        Value::Object(map) => walk_object(map, path, out),
        Value::String(text) => {
            if is_candidate(path, text) {
                out.push(MediaField {
                    path: path.clone(),
                    url: text.clone(),
                    expected_kind: infer_kind(path, text),
                    declared: false,
                });
            }
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

fn walk_object(map: &Map<String, Value>, path: &FieldPath, out: &mut Vec<MediaField>) {
    let declared = declared_descriptor(map);

    for (key, child) in map {
        let child_path = path.key(key.as_str());
        match (&declared, key.as_str(), child) {
            (Some(kind), "url", Value::String(url)) => out.push(MediaField {
                path: child_path,
                url: url.clone(),
                expected_kind: *kind,
                declared: true,
            }),
            // The descriptor's `type` is metadata, not a URL.
            (Some(_), "type", _) => {}
            _ => walk(child, &child_path, out),
        }
    }
}

/// `{ type: "image"|"video", url: <string> }`
fn declared_descriptor(map: &Map<String, Value>) -> Option<MediaKind> {
    let kind = map.get("type")?.as_str().and_then(MediaKind::from_declared)?;
    map.get("url")?.as_str()?;
    Some(kind)
}

fn is_candidate(path: &FieldPath, value: &str) -> bool {
    name_matches(path) && looks_like_url(value, path)
}

fn name_matches(path: &FieldPath) -> bool {
    let rendered = path.to_string().to_ascii_lowercase();
    MEDIA_NAME_KEYWORDS.iter().any(|k| rendered.contains(k))
}

/// Absolute http(s) and `blob:` references are always candidates. Relative
/// references need a media extension or a media-specific field name, which
/// keeps route strings such as `/yachts` under a generic `url` key out.
fn looks_like_url(value: &str, path: &FieldPath) -> bool {
    let trimmed = value.trim();
    let lowered = trimmed.to_ascii_lowercase();

    if lowered.starts_with("http://") || lowered.starts_with("https://") || lowered.starts_with("blob:") {
        return true;
    }

    if trimmed.starts_with('/') {
        return has_media_extension(trimmed) || MediaKind::from_field_name(&path.to_string()).is_known();
    }

    false
}

/// Field name first, then the URL's own extension.
fn infer_kind(path: &FieldPath, url: &str) -> MediaKind {
    let by_name = path
        .enclosing_key()
        .map(MediaKind::from_field_name)
        .unwrap_or_default();
    if by_name.is_known() {
        return by_name;
    }

    let by_path = MediaKind::from_field_name(&path.to_string());
    if by_path.is_known() {
        return by_path;
    }

    MediaKind::from_extension(url)
}
