use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for `coldstart`.
///
/// Each subsystem defines its own error variant. Library callers can match on
/// these to decide recovery strategy; internal code continues to use
/// `anyhow::Result` for ad-hoc context chains. Note that most bootstrap
/// failures never surface here at all — the resolver latches and degrades to
/// the main experience, and the session absorbs navigation faults locally.
#[derive(Debug, Error)]
pub enum BootstrapError {
    // ── Persisted state ─────────────────────────────────────────────────
    #[error("store: {0}")]
    Store(#[from] StoreError),

    // ── Config resolution ───────────────────────────────────────────────
    #[error("resolution: {0}")]
    Resolution(#[from] ResolutionError),

    // ── Permission gate ─────────────────────────────────────────────────
    #[error("permission: {0}")]
    Permission(#[from] PermissionError),

    // ── Content session ─────────────────────────────────────────────────
    #[error("session: {0}")]
    Session(#[from] SessionError),

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ─── Store errors ────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open store: {0}")]
    Open(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("corrupt value under key {key}: {message}")]
    Corrupt { key: String, message: String },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Resolution errors ──────────────────────────────────────────────────────

/// Failures observed while talking to the configuration endpoint.
///
/// Every variant latches `config_no_more_requests`; the orchestrator only
/// ever sees `Resolution::UseMain` afterwards.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("transport: {0}")]
    Transport(String),

    #[error("endpoint returned status {0}")]
    Status(u16),

    #[error("malformed response body: {0}")]
    Malformed(String),

    #[error("no conversion data available")]
    NoConversionData,
}

// ─── Permission errors ──────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum PermissionError {
    #[error("authority query failed: {0}")]
    Query(String),

    #[error("prompt failed: {0}")]
    Prompt(String),
}

// ─── Session errors ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("redirect loop at {last_target}")]
    RedirectLoop { last_target: String },

    #[error("transport: {0}")]
    Transport(String),

    #[error("cookie jar: {0}")]
    CookieJar(String),
}

// ─── Convenience re-exports ─────────────────────────────────────────────────

/// Shorthand result type for the crate.
pub type Result<T> = std::result::Result<T, BootstrapError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_displays_correctly() {
        let err = BootstrapError::Store(StoreError::Open("locked".into()));
        assert!(err.to_string().contains("failed to open store"));
    }

    #[test]
    fn resolution_status_displays_code() {
        let err = BootstrapError::Resolution(ResolutionError::Status(503));
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn redirect_loop_displays_target() {
        let err = BootstrapError::Session(SessionError::RedirectLoop {
            last_target: "https://x/loop".into(),
        });
        assert!(err.to_string().contains("https://x/loop"));
    }

    #[test]
    fn anyhow_interop() {
        let anyhow_err = anyhow::anyhow!("something went wrong");
        let err: BootstrapError = anyhow_err.into();
        assert!(err.to_string().contains("something went wrong"));
    }
}
