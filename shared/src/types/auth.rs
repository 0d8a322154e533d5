use serde::{Deserialize, Serialize};

/// The user profile returned by the external auth service's
/// `/api/v1/internal/auth/validate` endpoint, and what gets cached (and
/// reused across reconnects) under `auth:token:{sha256(token)}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthProfile {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
