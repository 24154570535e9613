//! Install attribution data and the one-shot conversion signal.
//!
//! The external attribution collaborator reports conversion data exactly once
//! per install. [`AttributionStore`] persists it under `conversion_data` /
//! `is_organic_conversion` and fires [`ConversionSignal`]; the payload is
//! read-only after the signal has fired, and duplicate reports are ignored.

use crate::store::{StateStore, keys};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Install metadata delivered with the conversion signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributionPayload {
    pub fields: BTreeMap<String, serde_json::Value>,
    pub is_organic: bool,
}

impl AttributionPayload {
    /// Build a payload, deriving the organic flag from the `af_status` field.
    pub fn new(fields: BTreeMap<String, serde_json::Value>) -> Self {
        let is_organic = fields
            .get("af_status")
            .and_then(serde_json::Value::as_str)
            .is_some_and(|status| status.eq_ignore_ascii_case("organic"));
        Self { fields, is_organic }
    }

    /// Build a payload with an explicitly supplied organic flag.
    pub fn from_parts(fields: BTreeMap<String, serde_json::Value>, is_organic: bool) -> Self {
        Self { fields, is_organic }
    }
}

/// One-shot signal that conversion data has become available.
///
/// The first `fire` wins; later fires are no-ops so a chatty attribution SDK
/// cannot restart the pipeline.
pub struct ConversionSignal {
    tx: watch::Sender<bool>,
}

impl ConversionSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Fire the signal. Returns `true` only on the first call.
    pub fn fire(&self) -> bool {
        self.tx.send_if_modified(|fired| {
            if *fired {
                return false;
            }
            *fired = true;
            true
        })
    }

    pub fn fired(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Suspend until the signal has fired.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender half lives as long as &self, so this cannot fail.
        let _ = rx.wait_for(|fired| *fired).await;
    }
}

impl Default for ConversionSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Persistent attribution state plus the conversion signal.
pub struct AttributionStore {
    store: Arc<dyn StateStore>,
    signal: ConversionSignal,
}

impl AttributionStore {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            store,
            signal: ConversionSignal::new(),
        }
    }

    pub fn signal(&self) -> &ConversionSignal {
        &self.signal
    }

    /// Record a conversion report. The first report persists the payload and
    /// fires the signal; anything after that is dropped.
    pub async fn record_conversion(&self, payload: &AttributionPayload) -> Result<()> {
        if self.signal.fired() {
            warn!("attribution.duplicate_conversion_ignored");
            return Ok(());
        }

        let data = serde_json::to_string(&payload.fields).context("serialize conversion data")?;
        self.store.put(keys::CONVERSION_DATA, &data).await?;
        self.store
            .put(
                keys::IS_ORGANIC_CONVERSION,
                if payload.is_organic { "true" } else { "false" },
            )
            .await?;

        self.signal.fire();
        debug!(is_organic = payload.is_organic, "attribution.conversion_recorded");
        Ok(())
    }

    /// Load the persisted payload, if any launch has recorded one.
    pub async fn load(&self) -> Result<Option<AttributionPayload>> {
        let Some(data) = self.store.get(keys::CONVERSION_DATA).await? else {
            return Ok(None);
        };

        let fields: BTreeMap<String, serde_json::Value> =
            serde_json::from_str(&data).context("deserialize conversion data")?;
        let is_organic = self
            .store
            .get(keys::IS_ORGANIC_CONVERSION)
            .await?
            .is_some_and(|value| value == "true");

        Ok(Some(AttributionPayload::from_parts(fields, is_organic)))
    }
}
