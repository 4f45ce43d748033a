// Shared transport configuration for building reqwest::Client instances.
//
// The Zaptec cloud is a public TLS endpoint, so there is no certificate
// juggling here -- just timeout and user-agent policy in one place.

use std::time::Duration;

use crate::error::ApiError;

/// Transport configuration for the cloud HTTP client.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Per-request timeout. A timeout counts as a transient failure
    /// subject to the retry policy.
    pub timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, ApiError> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(concat!("zaplink/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::Connection {
                message: format!("failed to build HTTP client: {e}"),
            })
    }
}
