//! Structured, versioned cookie serialization.
//!
//! Cookies persist as explicit name/value/domain/expiry tuples instead of an
//! opaque platform object graph, so the jar survives runtime upgrades and can
//! be inspected in tests.

use crate::error::SessionError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const COOKIE_JAR_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieRecord {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    /// Unix seconds; `None` for session cookies.
    pub expires_at: Option<i64>,
    pub secure: bool,
    pub http_only: bool,
}

impl CookieRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .is_some_and(|expires_at| expires_at <= now.timestamp())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CookieJarFile {
    version: u32,
    cookies: Vec<CookieRecord>,
}

pub fn serialize_jar(cookies: &[CookieRecord]) -> Result<String, SessionError> {
    let file = CookieJarFile {
        version: COOKIE_JAR_VERSION,
        cookies: cookies.to_vec(),
    };
    serde_json::to_string(&file).map_err(|err| SessionError::CookieJar(err.to_string()))
}

/// Deserialize a persisted jar, dropping cookies already expired at `now`.
pub fn deserialize_jar(raw: &str, now: DateTime<Utc>) -> Result<Vec<CookieRecord>, SessionError> {
    let file: CookieJarFile =
        serde_json::from_str(raw).map_err(|err| SessionError::CookieJar(err.to_string()))?;
    if file.version != COOKIE_JAR_VERSION {
        return Err(SessionError::CookieJar(format!(
            "unsupported cookie jar version {}",
            file.version
        )));
    }
    Ok(file
        .cookies
        .into_iter()
        .filter(|cookie| !cookie.is_expired(now))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cookie(name: &str, expires_at: Option<i64>) -> CookieRecord {
        CookieRecord {
            name: name.into(),
            value: "v".into(),
            domain: "example.com".into(),
            path: "/".into(),
            expires_at,
            secure: true,
            http_only: false,
        }
    }

    #[test]
    fn jar_round_trips() {
        let cookies = vec![cookie("sid", None), cookie("pref", Some(i64::MAX))];
        let raw = serialize_jar(&cookies).unwrap();

        let restored = deserialize_jar(&raw, Utc::now()).unwrap();
        assert_eq!(restored, cookies);
    }

    #[test]
    fn expired_cookies_dropped_on_restore() {
        let cookies = vec![cookie("old", Some(1)), cookie("sid", None)];
        let raw = serialize_jar(&cookies).unwrap();

        let restored = deserialize_jar(&raw, Utc::now()).unwrap();
        assert_eq!(restored.len(), 1);
        assert_eq!(restored[0].name, "sid");
    }

    #[test]
    fn unknown_version_rejected() {
        let raw = r#"{"version": 9, "cookies": []}"#;
        let err = deserialize_jar(raw, Utc::now()).unwrap_err();
        assert!(err.to_string().contains("version 9"));
    }

    #[test]
    fn garbage_rejected() {
        assert!(deserialize_jar("not json", Utc::now()).is_err());
    }
}
