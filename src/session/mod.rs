//! Content session.
//!
//! Navigation policy for the browsing surface that displays resolved or
//! deep-linked content. The surface itself (the web view) is an external
//! collaborator; it reports navigation requests, responses, completions, and
//! failures here and executes the decisions this module hands back.
//!
//! Policy per navigation:
//! - redirects (300–399) proceed automatically;
//! - the surface becomes visible on the first 200 only, never before;
//! - client/server errors (≥ 400) cancel the navigation;
//! - non-web schemes are handed to the platform's external opener, the
//!   in-session navigation is cancelled, and history steps back if possible;
//! - a redirect loop replays the last known redirect target exactly once.
//!
//! Every successful completion persists the cookie set and the current URL so
//! a relaunch resumes in place instead of re-resolving.

pub mod cookies;

pub use cookies::CookieRecord;

use crate::store::{StateStore, keys};
use anyhow::Result;
use chrono::Utc;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// Platform hand-off for URLs the browsing surface cannot host (app-store,
/// phone, mail links inside fetched content).
pub trait ExternalOpener: Send + Sync {
    fn can_open(&self, url: &Url) -> bool;

    fn open(&self, url: &Url) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Decision for an outgoing navigation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestDecision {
    Allow,
    Cancel,
    /// Cancelled in-session; the URL was handed to the external opener. The
    /// surface should also step back in history when `step_back` is set.
    OpenedExternally { step_back: bool },
}

/// Decision for a received navigation response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseDecision {
    Allow,
    /// Allow, and make the surface visible: first successful response.
    AllowAndReveal,
    Cancel,
}

/// Classified transport failure reported by the surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationFailure {
    RedirectLoop,
    Transport(String),
}

/// Recovery the surface should attempt after a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    Replay(String),
}

/// State restored when the session starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStart {
    pub cookies: Vec<CookieRecord>,
    /// Last successfully loaded URL, for relaunch resume.
    pub resume_url: Option<String>,
}

pub struct ContentSession {
    store: Arc<dyn StateStore>,
    opener: Arc<dyn ExternalOpener>,
    revealed: bool,
    replayed_redirect: bool,
    redirect_pending: bool,
    last_redirect_target: Option<String>,
    completed_navigations: u32,
}

impl ContentSession {
    pub fn new(store: Arc<dyn StateStore>, opener: Arc<dyn ExternalOpener>) -> Self {
        Self {
            store,
            opener,
            revealed: false,
            replayed_redirect: false,
            redirect_pending: false,
            last_redirect_target: None,
            completed_navigations: 0,
        }
    }

    /// Restore persisted cookies and the resume URL. Called before the
    /// surface issues any request.
    pub async fn start(&mut self) -> Result<SessionStart> {
        let cookies = match self.store.get(keys::COOKIE).await? {
            Some(raw) => match cookies::deserialize_jar(&raw, Utc::now()) {
                Ok(cookies) => cookies,
                Err(err) => {
                    // A corrupt jar must not block the session; start clean.
                    warn!(error = %err, "session.cookie_jar_discarded");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };
        let resume_url = self.store.get(keys::LAST_URL).await?;
        debug!(cookies = cookies.len(), resume = ?resume_url, "session.started");
        Ok(SessionStart { cookies, resume_url })
    }

    /// Evaluate an outgoing navigation request.
    pub async fn decide_request(&mut self, raw_url: &str) -> RequestDecision {
        let Ok(url) = Url::parse(raw_url) else {
            warn!(url = %raw_url, "session.unparseable_url_cancelled");
            return RequestDecision::Cancel;
        };

        match url.scheme() {
            "http" | "https" => {
                if self.redirect_pending {
                    self.redirect_pending = false;
                    self.last_redirect_target = Some(raw_url.to_string());
                }
                RequestDecision::Allow
            }
            scheme => {
                if self.opener.can_open(&url) {
                    if let Err(err) = self.opener.open(&url).await {
                        warn!(scheme, error = %err, "session.external_open_failed");
                    } else {
                        info!(scheme, "session.opened_externally");
                    }
                    RequestDecision::OpenedExternally {
                        step_back: self.completed_navigations > 0,
                    }
                } else {
                    debug!(scheme, "session.unhandled_scheme_cancelled");
                    RequestDecision::Cancel
                }
            }
        }
    }

    /// Evaluate a received navigation response.
    pub fn decide_response(&mut self, status: u16) -> ResponseDecision {
        match status {
            300..=399 => {
                self.redirect_pending = true;
                ResponseDecision::Allow
            }
            200 if !self.revealed => {
                self.revealed = true;
                info!("session.revealed");
                ResponseDecision::AllowAndReveal
            }
            200..=299 => ResponseDecision::Allow,
            _ => {
                debug!(status, "session.navigation_cancelled");
                ResponseDecision::Cancel
            }
        }
    }

    /// Record a successful page completion: persist the cookie set and the
    /// current URL.
    pub async fn finish_navigation(&mut self, url: &str, cookies: &[CookieRecord]) -> Result<()> {
        let jar = cookies::serialize_jar(cookies)?;
        self.store.put(keys::COOKIE, &jar).await?;
        self.store.put(keys::LAST_URL, url).await?;
        self.completed_navigations += 1;
        debug!(url = %url, cookies = cookies.len(), "session.navigation_finished");
        Ok(())
    }

    /// Classify a transport failure. A redirect loop replays the last known
    /// redirect target once; everything else is absorbed silently.
    pub fn on_failure(&mut self, failure: &NavigationFailure) -> Option<RecoveryAction> {
        match failure {
            NavigationFailure::RedirectLoop => {
                if self.replayed_redirect {
                    debug!("session.redirect_loop_gave_up");
                    return None;
                }
                let target = self.last_redirect_target.clone()?;
                self.replayed_redirect = true;
                info!(target = %target, "session.redirect_loop_replay");
                Some(RecoveryAction::Replay(target))
            }
            NavigationFailure::Transport(message) => {
                warn!(error = %message, "session.transport_failure");
                None
            }
        }
    }

    pub fn is_revealed(&self) -> bool {
        self.revealed
    }
}
