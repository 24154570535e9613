//! Device and runtime identifiers merged into the resolver request body.

use serde::Serialize;
use uuid::Uuid;

/// Identifiers describing this install. Field names match the configuration
/// endpoint's wire contract.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceProfile {
    pub af_id: String,
    pub bundle_id: String,
    pub os: String,
    pub store_id: String,
    pub locale: String,
    pub firebase_project_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push_token: Option<String>,
}

impl DeviceProfile {
    /// Build a profile with a freshly generated install id.
    pub fn new(bundle_id: &str, store_id: &str, firebase_project_id: &str, locale: &str) -> Self {
        Self {
            af_id: Uuid::new_v4().to_string(),
            bundle_id: bundle_id.to_string(),
            os: std::env::consts::OS.to_string(),
            store_id: store_id.to_string(),
            locale: locale.to_string(),
            firebase_project_id: firebase_project_id.to_string(),
            push_token: None,
        }
    }

    pub fn with_push_token(mut self, token: &str) -> Self {
        self.push_token = Some(token.to_string());
        self
    }
}
