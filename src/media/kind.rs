use serde::{Deserialize, Serialize};
use std::fmt;

/// Image/video classification of a media reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    #[default]
    Unknown,
}

const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "svg", "bmp", "ico", "avif", "heic", "tif", "tiff",
];

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "webm", "m4v", "avi", "mkv", "ogv", "m3u8"];

/// Field-name keywords that imply an image.
const IMAGE_NAME_KEYWORDS: &[&str] = &[
    "image", "photo", "picture", "thumbnail", "avatar", "icon", "logo", "banner", "cover",
];

impl MediaKind {
    pub fn is_known(self) -> bool {
        self != MediaKind::Unknown
    }

    /// Parse a declared descriptor `type` value.
    pub fn from_declared(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "image" => Some(MediaKind::Image),
            "video" => Some(MediaKind::Video),
            _ => None,
        }
    }

    /// Classify from a `Content-Type` header value. Parameters are ignored.
    pub fn from_content_type(value: &str) -> Self {
        match value.parse::<mime::Mime>() {
            Ok(parsed) if parsed.type_() == mime::IMAGE => MediaKind::Image,
            Ok(parsed) if parsed.type_() == mime::VIDEO => MediaKind::Video,
            _ => MediaKind::Unknown,
        }
    }

    /// Classify from the file extension of a URL path, ignoring query and fragment.
    pub fn from_extension(url: &str) -> Self {
        match file_extension(url) {
            Some(ext) if IMAGE_EXTENSIONS.contains(&ext.as_str()) => MediaKind::Image,
            Some(ext) if VIDEO_EXTENSIONS.contains(&ext.as_str()) => MediaKind::Video,
            _ => MediaKind::Unknown,
        }
    }

    /// Keyword heuristic over a (lowercased) field path.
    pub fn from_field_name(path: &str) -> Self {
        let lowered = path.to_ascii_lowercase();
        if lowered.contains("video") {
            MediaKind::Video
        } else if IMAGE_NAME_KEYWORDS.iter().any(|k| lowered.contains(k)) {
            MediaKind::Image
        } else {
            MediaKind::Unknown
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Unknown => "unknown",
        })
    }
}

/// True when the URL ends in an extension either media kind recognises.
pub fn has_media_extension(url: &str) -> bool {
    MediaKind::from_extension(url).is_known()
}

fn file_extension(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let last = path.rsplit('/').next()?;
    let (_, ext) = last.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_content_type() {
        assert_eq!(MediaKind::from_content_type("image/jpeg"), MediaKind::Image);
        assert_eq!(
            MediaKind::from_content_type("video/mp4; codecs=avc1"),
            MediaKind::Video
        );
        assert_eq!(
            MediaKind::from_content_type("text/html; charset=utf-8"),
            MediaKind::Unknown
        );
        assert_eq!(MediaKind::from_content_type("not a mime"), MediaKind::Unknown);
    }

    #[test]
    fn test_from_extension_ignores_query() {
        assert_eq!(
            MediaKind::from_extension("https://x/a.JPG?w=800&q=80"),
            MediaKind::Image
        );
        assert_eq!(MediaKind::from_extension("/clip.mp4#t=10"), MediaKind::Video);
        assert_eq!(MediaKind::from_extension("https://x/page"), MediaKind::Unknown);
        assert_eq!(MediaKind::from_extension("https://x.com/"), MediaKind::Unknown);
    }

    #[test]
    fn test_from_field_name() {
        assert_eq!(MediaKind::from_field_name("videoUrl"), MediaKind::Video);
        assert_eq!(MediaKind::from_field_name("profile.avatar"), MediaKind::Image);
        assert_eq!(MediaKind::from_field_name("media.[0].url"), MediaKind::Unknown);
    }

    #[test]
    fn test_from_declared() {
        assert_eq!(MediaKind::from_declared("Image"), Some(MediaKind::Image));
        assert_eq!(MediaKind::from_declared("video"), Some(MediaKind::Video));
        assert_eq!(MediaKind::from_declared("audio"), None);
    }
}
