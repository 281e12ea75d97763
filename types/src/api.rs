//! Plain HTTP API types (non JSON-RPC).

use serde::{Deserialize, Serialize};

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// Liveness probe payload returned by `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct HealthResponse {
    /// Always `"ok"` while the process is serving requests.
    pub status: String,
    /// Configured server name.
    pub server: String,
    /// Configured server version.
    pub version: String,
    /// RFC 3339 timestamp of the probe.
    pub timestamp: String,
}

impl HealthResponse {
    pub fn ok(server: impl Into<String>, version: impl Into<String>, timestamp: String) -> Self {
        Self {
            status: "ok".to_string(),
            server: server.into(),
            version: version.into(),
            timestamp,
        }
    }
}
