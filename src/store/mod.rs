//! Durable key-value state shared by the bootstrap pipeline.
//!
//! Every persisted fact the pipeline carries across launches lives behind the
//! [`StateStore`] trait: the resolver cache, the permission cooldown, the
//! cookie jar, the last loaded URL, and the attribution inputs written by the
//! external attribution collaborator. The store is injected, never ambient,
//! so tests run against [`MemoryStateStore`].

mod sqlite;

pub use sqlite::SqliteStateStore;

use anyhow::Result;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

/// Persisted key surface. Key names are part of the on-disk contract and
/// survive from the original install base; do not rename.
pub mod keys {
    /// Last resolved content URL (resolver cache).
    pub const CONFIG_URL: &str = "config_url";
    /// Expiry of the cached resolution, unix seconds.
    pub const CONFIG_EXPIRES: &str = "config_expires";
    /// One-way latch: once set the endpoint is never asked again.
    pub const CONFIG_NO_MORE_REQUESTS: &str = "config_no_more_requests";
    /// RFC 3339 timestamp of the last permission prompt denial.
    pub const LAST_NOTIFICATION_DENIED: &str = "lastNotificationDeniedDate";
    /// Serialized cookie jar (versioned JSON, see `session::cookies`).
    pub const COOKIE: &str = "cookie";
    /// Last successfully loaded content URL, for relaunch resume.
    pub const LAST_URL: &str = "lastURL";
    /// Attribution payload JSON, written by the attribution collaborator.
    pub const CONVERSION_DATA: &str = "conversion_data";
    /// Whether the install is organic, written by the attribution collaborator.
    pub const IS_ORGANIC_CONVERSION: &str = "is_organic_conversion";
}

/// Async key-value persistence contract.
pub trait StateStore: Send + Sync {
    fn get<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>>> + Send + 'a>>;

    fn put<'a>(
        &'a self,
        key: &'a str,
        value: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    fn remove<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>>;
}

/// In-memory store for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryStateStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a key before a test run.
    pub fn seed(&self, key: &str, value: &str) {
        self.values
            .lock()
            .expect("state map poisoned")
            .insert(key.to_string(), value.to_string());
    }
}

impl StateStore for MemoryStateStore {
    fn get<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>>> + Send + 'a>> {
        Box::pin(async move {
            Ok(self
                .values
                .lock()
                .expect("state map poisoned")
                .get(key)
                .cloned())
        })
    }

    fn put<'a>(
        &'a self,
        key: &'a str,
        value: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            self.values
                .lock()
                .expect("state map poisoned")
                .insert(key.to_string(), value.to_string());
            Ok(())
        })
    }

    fn remove<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>> {
        Box::pin(async move {
            Ok(self
                .values
                .lock()
                .expect("state map poisoned")
                .remove(key)
                .is_some())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_round_trips() {
        let store = MemoryStateStore::new();
        store.put(keys::CONFIG_URL, "https://x").await.unwrap();

        let value = store.get(keys::CONFIG_URL).await.unwrap();
        assert_eq!(value.as_deref(), Some("https://x"));
    }

    #[tokio::test]
    async fn memory_store_get_missing_returns_none() {
        let store = MemoryStateStore::new();
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn memory_store_remove_returns_true_then_false() {
        let store = MemoryStateStore::new();
        store.put("k", "v").await.unwrap();

        assert!(store.remove("k").await.unwrap());
        assert!(!store.remove("k").await.unwrap());
    }

    #[tokio::test]
    async fn memory_store_put_overwrites() {
        let store = MemoryStateStore::new();
        store.put("k", "v1").await.unwrap();
        store.put("k", "v2").await.unwrap();

        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v2"));
    }
}
