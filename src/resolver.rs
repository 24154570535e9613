//! Config resolver.
//!
//! One POST exchange that turns attribution data into a content URL,
//! consulting and updating the persisted [`ConfigCache`]. Any failure —
//! transport, status, or parse — latches `config_no_more_requests` and the
//! endpoint is never asked again for the remainder of the install. This is a
//! deliberate one-shot-then-latch design, not a transient backoff.

use crate::attribution::{AttributionPayload, AttributionStore};
use crate::cache::ConfigCache;
use crate::device::DeviceProfile;
use crate::error::ResolutionError;
use crate::store::StateStore;
use anyhow::Result;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Definitive routing decision for this launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    UseContent(String),
    UseMain,
}

/// Success response shape. Anything else is treated as malformed.
#[derive(Debug, Deserialize)]
struct EndpointResponse {
    #[serde(default)]
    ok: bool,
    url: Option<String>,
    expires: Option<i64>,
}

fn build_endpoint_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(10))
        .connect_timeout(Duration::from_secs(5))
        .build()
        .unwrap_or_else(|_| Client::new())
}

pub struct ConfigResolver {
    cache: ConfigCache,
    attribution: Arc<AttributionStore>,
    device: DeviceProfile,
    endpoint: String,
    client: Client,
    /// One resolution per launch; concurrent triggers share it.
    slot: Mutex<Option<Resolution>>,
}

impl ConfigResolver {
    pub fn new(
        store: Arc<dyn StateStore>,
        attribution: Arc<AttributionStore>,
        device: DeviceProfile,
        endpoint: &str,
    ) -> Self {
        Self {
            cache: ConfigCache::new(store),
            attribution,
            device,
            endpoint: endpoint.to_string(),
            client: build_endpoint_client(),
            slot: Mutex::new(None),
        }
    }

    /// Resolve the launch routing decision. Idempotent within a launch:
    /// repeated and concurrent calls return the first resolution without a
    /// second network exchange.
    pub async fn resolve(&self) -> Resolution {
        let mut slot = self.slot.lock().await;
        if let Some(resolution) = slot.as_ref() {
            debug!("resolver.already_resolved");
            return resolution.clone();
        }

        let resolution = match self.try_resolve(Utc::now()).await {
            Ok(resolution) => resolution,
            Err(err) => {
                // Network and parse failures are treated identically: latch
                // and degrade to the main experience.
                warn!(error = %err, "resolver.latched");
                if let Err(latch_err) = self.cache.latch().await {
                    warn!(error = %latch_err, "resolver.latch_write_failed");
                }
                Resolution::UseMain
            }
        };

        *slot = Some(resolution.clone());
        resolution
    }

    async fn try_resolve(&self, now: DateTime<Utc>) -> Result<Resolution> {
        if self.cache.no_more_requests().await? {
            debug!("resolver.latch_set_use_main");
            return Ok(Resolution::UseMain);
        }

        if let Some(entry) = self.cache.fresh_entry(now).await? {
            debug!(url = %entry.url, "resolver.cache_hit");
            return Ok(Resolution::UseContent(entry.url));
        }

        let Some(attribution) = self.attribution.load().await? else {
            return Err(ResolutionError::NoConversionData.into());
        };

        let body = self.request_body(&attribution);
        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|err| ResolutionError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ResolutionError::Status(status.as_u16()).into());
        }

        let parsed: EndpointResponse = response
            .json()
            .await
            .map_err(|err| ResolutionError::Malformed(err.to_string()))?;

        let (url, expires) = match parsed {
            EndpointResponse {
                ok: true,
                url: Some(url),
                expires: Some(expires),
            } => (url, expires),
            other => {
                return Err(ResolutionError::Malformed(format!(
                    "unexpected response shape: ok={}, url={:?}, expires={:?}",
                    other.ok, other.url, other.expires
                ))
                .into());
            }
        };

        self.cache.store_resolution(&url, expires).await?;
        info!(url = %url, expires, "resolver.resolved");
        Ok(Resolution::UseContent(url))
    }

    /// Merge attribution fields with device identifiers; device fields win on
    /// key collision.
    fn request_body(&self, attribution: &AttributionPayload) -> serde_json::Value {
        let mut body = serde_json::Map::new();
        for (key, value) in &attribution.fields {
            body.insert(key.clone(), value.clone());
        }
        if let Ok(serde_json::Value::Object(device)) = serde_json::to_value(&self.device) {
            body.extend(device);
        }
        serde_json::Value::Object(body)
    }
}
