use serde::Serialize;
use url::Url;

use crate::config::PlaceholderConfig;
use crate::media::{FieldPath, MediaKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Placeholder {
    Image,
    Video,
    Avatar,
    Thumbnail,
    Yacht,
    Addon,
}

/// Path keywords checked in order when the expected kind does not decide.
const CONTEXT_KEYWORDS: &[(&str, Placeholder)] = &[
    ("avatar", Placeholder::Avatar),
    ("profile", Placeholder::Avatar),
    ("thumbnail", Placeholder::Thumbnail),
    ("thumb", Placeholder::Thumbnail),
    ("video", Placeholder::Video),
    ("yacht", Placeholder::Yacht),
    ("addon", Placeholder::Addon),
    ("add_on", Placeholder::Addon),
    ("add-on", Placeholder::Addon),
];

impl Placeholder {
    /// Expected kind first, then context keywords in the field path.
    pub fn select(expected: MediaKind, path: &FieldPath) -> Self {
        if expected == MediaKind::Video {
            return Placeholder::Video;
        }

        let rendered = path.to_string().to_ascii_lowercase();
        CONTEXT_KEYWORDS
            .iter()
            .filter(|(_, placeholder)| {
                // An image expectation never falls through to a video.
                *placeholder != Placeholder::Video || expected == MediaKind::Unknown
            })
            .find(|(keyword, _)| rendered.contains(keyword))
            .map_or(Placeholder::Image, |(_, placeholder)| *placeholder)
    }
}

/// Placeholder URLs by role
#[derive(Debug, Clone)]
pub struct PlaceholderCatalogue {
    config: PlaceholderConfig,
}

impl PlaceholderCatalogue {
    pub fn new(config: PlaceholderConfig) -> Self {
        Self { config }
    }

    pub fn url(&self, placeholder: Placeholder) -> &Url {
        match placeholder {
            Placeholder::Image => &self.config.image,
            Placeholder::Video => &self.config.video,
            Placeholder::Avatar => &self.config.avatar,
            Placeholder::Thumbnail => &self.config.thumbnail,
            Placeholder::Yacht => &self.config.yacht,
            Placeholder::Addon => &self.config.addon,
        }
    }

    pub fn select(&self, expected: MediaKind, path: &FieldPath) -> &Url {
        self.url(Placeholder::select(expected, path))
    }

    /// True when `url` is already one of the catalogue's URLs.
    pub fn contains(&self, url: &str) -> bool {
        let url = url.trim();
        [
            &self.config.image,
            &self.config.video,
            &self.config.avatar,
            &self.config.thumbnail,
            &self.config.yacht,
            &self.config.addon,
        ]
        .iter()
        .any(|placeholder| placeholder.as_str() == url)
    }
}

impl Default for PlaceholderCatalogue {
    fn default() -> Self {
        Self::new(PlaceholderConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(raw: &str) -> FieldPath {
        raw.parse().unwrap()
    }

    #[test]
    fn test_expected_video_wins() {
        assert_eq!(
            Placeholder::select(MediaKind::Video, &path("profile.avatarUrl")),
            Placeholder::Video
        );
    }

    #[test]
    fn test_context_keywords() {
        let cases = [
            ("owner.avatarUrl", Placeholder::Avatar),
            ("profilePicture", Placeholder::Avatar),
            ("thumbnailUrl", Placeholder::Thumbnail),
            ("yachtImages.[0]", Placeholder::Yacht),
            ("addonImage", Placeholder::Addon),
            ("imageUrl", Placeholder::Image),
        ];
        for (raw, expected) in cases {
            assert_eq!(Placeholder::select(MediaKind::Image, &path(raw)), expected, "{}", raw);
        }
    }

    #[test]
    fn test_video_keyword_only_without_kind() {
        assert_eq!(
            Placeholder::select(MediaKind::Unknown, &path("promo.video.url")),
            Placeholder::Video
        );
        assert_eq!(
            Placeholder::select(MediaKind::Image, &path("videoPoster")),
            Placeholder::Image
        );
    }

    #[test]
    fn test_catalogue_membership() {
        let catalogue = PlaceholderCatalogue::default();
        let image = catalogue.url(Placeholder::Image).to_string();
        assert!(catalogue.contains(&image));
        assert!(!catalogue.contains("https://x/a.jpg"));
    }
}
