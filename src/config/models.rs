use crate::humanize::HumanDuration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use url::Url;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub validator: ValidatorConfig,
    #[serde(default)]
    pub repair: RepairConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Collections to scan, keyed by collection name
    #[serde(default)]
    pub collections: BTreeMap<String, CollectionConfig>,
}

/// Host process configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

/// Local fjall directories
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl StorageConfig {
    pub fn documents_path(&self) -> PathBuf {
        self.data_dir.join("documents")
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join("ledger")
    }

    pub fn queue_path(&self) -> PathBuf {
        self.data_dir.join("queue")
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

/// How references that are never fetched (`blob:`, `data:`, ignore keywords)
/// are counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnvalidatablePolicy {
    /// Counted as valid; the reason is still recorded
    #[default]
    Pass,
    /// Counted as invalid; never repaired
    Fail,
}

/// URL validator configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ValidatorConfig {
    #[serde(default = "default_timeout")]
    pub timeout: HumanDuration,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Substrings marking URLs that must not be fetched (emulators, fixtures)
    #[serde(default = "default_ignore_keywords")]
    pub ignore_keywords: Vec<String>,
    /// Base for resolving relative URLs before checking them
    #[serde(default)]
    pub base_url: Option<Url>,
    #[serde(default)]
    pub unvalidatable_policy: UnvalidatablePolicy,
    /// Concurrent URL checks within one page
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Retry with a ranged GET when HEAD is answered with 405/501
    #[serde(default = "default_true")]
    pub fallback_to_get: bool,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            max_redirects: default_max_redirects(),
            user_agent: default_user_agent(),
            ignore_keywords: default_ignore_keywords(),
            base_url: None,
            unvalidatable_policy: UnvalidatablePolicy::default(),
            max_concurrency: default_max_concurrency(),
            fallback_to_get: true,
        }
    }
}

fn default_timeout() -> HumanDuration {
    HumanDuration::from_secs(5)
}

fn default_max_redirects() -> usize {
    5
}

fn default_user_agent() -> String {
    format!("MediaSweep/{}", env!("CARGO_PKG_VERSION"))
}

fn default_ignore_keywords() -> Vec<String> {
    vec![
        "localhost:9199".to_string(),
        "127.0.0.1:9199".to_string(),
        "emulator".to_string(),
    ]
}

fn default_max_concurrency() -> usize {
    10
}

fn default_true() -> bool {
    true
}

/// Replacement URLs substituted for broken media
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PlaceholderConfig {
    #[serde(default = "default_image_placeholder")]
    pub image: Url,
    #[serde(default = "default_video_placeholder")]
    pub video: Url,
    #[serde(default = "default_avatar_placeholder")]
    pub avatar: Url,
    #[serde(default = "default_thumbnail_placeholder")]
    pub thumbnail: Url,
    #[serde(default = "default_yacht_placeholder")]
    pub yacht: Url,
    #[serde(default = "default_addon_placeholder")]
    pub addon: Url,
}

impl Default for PlaceholderConfig {
    fn default() -> Self {
        Self {
            image: default_image_placeholder(),
            video: default_video_placeholder(),
            avatar: default_avatar_placeholder(),
            thumbnail: default_thumbnail_placeholder(),
            yacht: default_yacht_placeholder(),
            addon: default_addon_placeholder(),
        }
    }
}

fn static_url(raw: &'static str) -> Url {
    // Literal constants below are valid absolute URLs.
    Url::parse(raw).unwrap_or_else(|e| panic!("invalid built-in placeholder {raw}: {e}"))
}

fn default_image_placeholder() -> Url {
    static_url("https://images.unsplash.com/photo-1569263979104-865ab7cd8d13?w=800&q=80")
}

fn default_video_placeholder() -> Url {
    static_url("https://storage.googleapis.com/etoile-yachts.firebasestorage.app/placeholders/video-placeholder.mp4")
}

fn default_avatar_placeholder() -> Url {
    static_url("https://storage.googleapis.com/etoile-yachts.firebasestorage.app/placeholders/avatar-placeholder.png")
}

fn default_thumbnail_placeholder() -> Url {
    static_url("https://storage.googleapis.com/etoile-yachts.firebasestorage.app/placeholders/thumbnail-placeholder.jpg")
}

fn default_yacht_placeholder() -> Url {
    static_url("https://images.unsplash.com/photo-1567899378494-47b22a2ae96a?w=1200&q=80")
}

fn default_addon_placeholder() -> Url {
    static_url("https://storage.googleapis.com/etoile-yachts.firebasestorage.app/service-addons/private-dining-1.jpg")
}

/// Repair engine configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RepairConfig {
    /// Base for absolutising relative URLs
    #[serde(default)]
    pub base_url: Option<Url>,
    #[serde(default)]
    pub placeholders: PlaceholderConfig,
}

/// Batch worker configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct WorkerConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Mutations per store commit
    #[serde(default = "default_write_batch_size")]
    pub write_batch_size: usize,
    #[serde(default = "default_max_documents")]
    pub max_documents_per_collection: usize,
    /// Cap on invalid entries kept in a report
    #[serde(default = "default_max_invalid_results")]
    pub max_invalid_results: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            write_batch_size: default_write_batch_size(),
            max_documents_per_collection: default_max_documents(),
            max_invalid_results: default_max_invalid_results(),
        }
    }
}

fn default_batch_size() -> usize {
    50
}

fn default_write_batch_size() -> usize {
    500
}

fn default_max_documents() -> usize {
    10_000
}

fn default_max_invalid_results() -> usize {
    1000
}

/// Per-collection scan settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct CollectionConfig {
    /// Repairs may be written back to this collection
    #[serde(default)]
    pub fixable: bool,
    /// Overrides `worker.max_documents_per_collection`
    #[serde(default)]
    pub max_documents: Option<usize>,
}

/// Scheduler and task consumer configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_topic")]
    pub topic: String,
    /// Queued/running tasks older than this are removed by cleanup
    #[serde(default = "default_task_retention")]
    pub task_retention: HumanDuration,
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: HumanDuration,
    #[serde(default = "default_channel_size")]
    pub channel_size: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            topic: default_topic(),
            task_retention: default_task_retention(),
            cleanup_interval: default_cleanup_interval(),
            channel_size: default_channel_size(),
        }
    }
}

fn default_topic() -> String {
    "media-validation".to_string()
}

fn default_task_retention() -> HumanDuration {
    HumanDuration::from_secs(7 * 86_400)
}

fn default_cleanup_interval() -> HumanDuration {
    HumanDuration::from_secs(3_600)
}

fn default_channel_size() -> usize {
    16
}
