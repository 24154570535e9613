//! Persisted configuration cache.
//!
//! Typed view over the state store for the resolver's three keys:
//! `config_url`, `config_expires`, `config_no_more_requests`. Absence is a
//! valid initial state. `config_no_more_requests` is a one-way latch: normal
//! operation only ever sets it; it is cleared solely by a later successful
//! resolution.

use crate::store::{StateStore, keys};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

/// Last resolved URL with its server-provided expiry (unix seconds).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigCacheEntry {
    pub url: String,
    pub expires_at: i64,
}

impl ConfigCacheEntry {
    /// Whether the entry is still valid at `now`.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now.timestamp()
    }
}

pub struct ConfigCache {
    store: Arc<dyn StateStore>,
}

impl ConfigCache {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    /// Load the cached entry, if a complete one exists.
    pub async fn entry(&self) -> Result<Option<ConfigCacheEntry>> {
        let Some(url) = self.store.get(keys::CONFIG_URL).await? else {
            return Ok(None);
        };
        let Some(expires_raw) = self.store.get(keys::CONFIG_EXPIRES).await? else {
            return Ok(None);
        };
        let expires_at = expires_raw
            .parse::<i64>()
            .with_context(|| format!("invalid config_expires value: {expires_raw}"))?;
        Ok(Some(ConfigCacheEntry { url, expires_at }))
    }

    /// Load the cached entry only if it is unexpired at `now`.
    pub async fn fresh_entry(&self, now: DateTime<Utc>) -> Result<Option<ConfigCacheEntry>> {
        Ok(self.entry().await?.filter(|entry| entry.is_fresh(now)))
    }

    pub async fn no_more_requests(&self) -> Result<bool> {
        Ok(self
            .store
            .get(keys::CONFIG_NO_MORE_REQUESTS)
            .await?
            .is_some_and(|value| value == "true"))
    }

    /// Set the one-way latch. The endpoint is never asked again for the
    /// remainder of the install.
    pub async fn latch(&self) -> Result<()> {
        debug!("config_cache.latched");
        self.store.put(keys::CONFIG_NO_MORE_REQUESTS, "true").await
    }

    /// Persist a successful resolution and clear the latch.
    pub async fn store_resolution(&self, url: &str, expires_at: i64) -> Result<()> {
        self.store.put(keys::CONFIG_URL, url).await?;
        self.store
            .put(keys::CONFIG_EXPIRES, &expires_at.to_string())
            .await?;
        self.store.remove(keys::CONFIG_NO_MORE_REQUESTS).await?;
        debug!(url = %url, expires_at, "config_cache.stored");
        Ok(())
    }
}
