use thiserror::Error;

/// Top-level error type for the `zaplink-api` crate.
///
/// Covers every failure mode of the cloud exchange: authentication,
/// transport, rate limiting, and response validation. `zaplink-core`
/// maps these into host-facing diagnostics.
#[derive(Debug, Error)]
pub enum ApiError {
    // ── Authentication ──────────────────────────────────────────────
    /// Token request rejected (wrong credentials, account locked, etc.)
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// Connection-level failure (refused, DNS, TLS handshake).
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// Request exceeded the configured timeout on every attempt.
    #[error("Request to {url} timed out after {attempts} attempts")]
    Timeout { url: String, attempts: u32 },

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ── Cloud policy ────────────────────────────────────────────────
    /// Fair-use ceiling hit on every attempt (HTTP 429 throughout the
    /// retry budget).
    #[error("Rate limited by the cloud API after {attempts} attempts")]
    RateLimited { attempts: u32 },

    // ── Request outcome ─────────────────────────────────────────────
    /// The API answered with a non-success status that is not retried
    /// (or whose retries were exhausted).
    #[error("{method} request to {url} failed with status {status}")]
    RequestFailed {
        method: &'static str,
        url: String,
        status: u16,
    },

    // ── Data ────────────────────────────────────────────────────────
    /// Response body did not match the expected shape. Never retried;
    /// the caller keeps its stale state instead.
    #[error("Validation error: {message}")]
    Validation { message: String, body: String },
}

impl ApiError {
    /// `true` if re-authentication might resolve this error.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    /// `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::Timeout { .. } | Self::RateLimited { .. }
        )
    }

    /// The HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RequestFailed { status, .. } => Some(*status),
            Self::RateLimited { .. } => Some(429),
            _ => None,
        }
    }
}
