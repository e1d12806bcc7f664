use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OnceCell;

use super::UrlCheck;

/// Per-run memo of URL checks keyed by the raw URL string.
///
/// Concurrent lookups of the same URL share one in-flight check, so a URL
/// referenced from many documents is probed once per run. Create one cache
/// per run; never share it between runs.
#[derive(Clone, Default)]
pub struct ValidationCache {
    entries: Arc<Mutex<HashMap<String, Arc<OnceCell<UrlCheck>>>>>,
    lookups: Arc<AtomicU64>,
    checks: Arc<AtomicU64>,
}

impl ValidationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_check<F, Fut>(&self, url: &str, check: F) -> UrlCheck
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = UrlCheck>,
    {
        self.lookups.fetch_add(1, Ordering::Relaxed);

        let cell = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            entries.entry(url.to_string()).or_default().clone()
        };

        let checks = &self.checks;
        cell.get_or_init(|| async move {
            checks.fetch_add(1, Ordering::Relaxed);
            check().await
        })
        .await
        .clone()
    }

    pub fn get(&self, url: &str) -> Option<UrlCheck> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(url).and_then(|cell| cell.get().cloned())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of checks actually executed (cache misses).
    pub fn checks(&self) -> u64 {
        self.checks.load(Ordering::Relaxed)
    }

    pub fn lookups(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_url_checked_once() {
        let cache = ValidationCache::new();

        for _ in 0..3 {
            let check = cache
                .get_or_check("https://x/a.jpg", || async { UrlCheck::Unvalidatable })
                .await;
            assert_eq!(check, UrlCheck::Unvalidatable);
        }

        assert_eq!(cache.checks(), 1);
        assert_eq!(cache.lookups(), 3);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("https://x/a.jpg"), Some(UrlCheck::Unvalidatable));
    }

    #[tokio::test]
    async fn test_concurrent_lookups_share_inflight_check() {
        let cache = ValidationCache::new();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_check("https://x/slow.jpg", || async {
                        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                        UrlCheck::Relative
                    })
                    .await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), UrlCheck::Relative);
        }

        assert_eq!(cache.checks(), 1);
    }

    #[tokio::test]
    async fn test_separate_caches_are_isolated() {
        let first = ValidationCache::new();
        let second = ValidationCache::new();
        first
            .get_or_check("https://x/a.jpg", || async { UrlCheck::Relative })
            .await;
        assert!(second.is_empty());
    }
}
