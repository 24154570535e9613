//! Notification permission gate.
//!
//! Decides whether to surface a permission prompt before resolution proceeds.
//! The gate never blocks the pipeline: a denial is recorded for the cooldown
//! window and the launch continues. At most one prompt per launch.

use crate::store::{StateStore, keys};
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// Days a denial suppresses further prompts.
const DENIAL_COOLDOWN_DAYS: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    NotDetermined,
    Denied,
    Granted,
    Provisional,
}

/// Platform permission collaborator: queries the current authorization state
/// and, when asked, shows the system prompt.
pub trait PermissionAuthority: Send + Sync {
    fn status(&self) -> Pin<Box<dyn Future<Output = Result<PermissionStatus>> + Send + '_>>;

    /// Show the prompt; resolves to `true` when the user grants.
    fn request(&self) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + '_>>;
}

/// What the gate did this launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateOutcome {
    pub prompted: bool,
    pub granted: Option<bool>,
}

impl GateOutcome {
    fn skipped() -> Self {
        Self {
            prompted: false,
            granted: None,
        }
    }
}

/// Whether a prompt should be shown given the authorization state and the
/// recorded denial, if any.
pub fn should_prompt(
    status: PermissionStatus,
    last_denied_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    if status != PermissionStatus::NotDetermined {
        return false;
    }
    match last_denied_at {
        None => true,
        Some(denied_at) => now - denied_at > Duration::days(DENIAL_COOLDOWN_DAYS),
    }
}

pub struct PermissionGate {
    store: Arc<dyn StateStore>,
    authority: Arc<dyn PermissionAuthority>,
    ran: AtomicBool,
}

impl PermissionGate {
    pub fn new(store: Arc<dyn StateStore>, authority: Arc<dyn PermissionAuthority>) -> Self {
        Self {
            store,
            authority,
            ran: AtomicBool::new(false),
        }
    }

    async fn last_denied_at(&self) -> Result<Option<DateTime<Utc>>> {
        let Some(raw) = self.store.get(keys::LAST_NOTIFICATION_DENIED).await? else {
            return Ok(None);
        };
        let parsed = DateTime::parse_from_rfc3339(&raw)
            .with_context(|| format!("invalid denial timestamp: {raw}"))?;
        Ok(Some(parsed.with_timezone(&Utc)))
    }

    /// Read-decide-record. Authority failures are absorbed: the pipeline
    /// proceeds as if the prompt had been skipped.
    pub async fn run(&self) -> GateOutcome {
        if self.ran.swap(true, Ordering::SeqCst) {
            return GateOutcome::skipped();
        }
        self.run_once(Utc::now()).await.unwrap_or_else(|err| {
            warn!(error = %err, "permission.gate_failed");
            GateOutcome::skipped()
        })
    }

    async fn run_once(&self, now: DateTime<Utc>) -> Result<GateOutcome> {
        let status = self.authority.status().await?;
        let last_denied_at = self.last_denied_at().await?;

        if !should_prompt(status, last_denied_at, now) {
            debug!(?status, "permission.prompt_skipped");
            return Ok(GateOutcome::skipped());
        }

        let granted = self.authority.request().await?;
        if !granted {
            self.store
                .put(keys::LAST_NOTIFICATION_DENIED, &now.to_rfc3339())
                .await?;
        }
        debug!(granted, "permission.prompted");
        Ok(GateOutcome {
            prompted: true,
            granted: Some(granted),
        })
    }
}
