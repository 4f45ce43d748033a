// ── Core error types ──
//
// Host-facing errors from zaplink-core. These are NOT wire-specific --
// consumers never see HTTP status codes or JSON parse failures directly
// unless the class requires their action. The `From<ApiError>` impl
// translates transport-layer errors into domain-appropriate variants.

use thiserror::Error;

use zaplink_api::ApiError;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Requires reconfiguration ─────────────────────────────────────
    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    // ── Command gating ───────────────────────────────────────────────
    /// A command was rejected locally by the operation-mode gate or
    /// remotely by the vendor. Never retried automatically.
    #[error("Command rejected: {reason}")]
    CommandRejected { reason: String },

    #[error("Unknown command: {name}")]
    UnknownCommand { name: String },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Device not found: {uid}")]
    DeviceNotFound { uid: String },

    /// A numeric vendor code with no catalog entry, in a context where
    /// pass-through is not possible (e.g. encoding a command).
    #[error("Unknown {category} code: {code}")]
    UnknownCode { category: &'static str, code: i64 },

    #[error("Invalid setting: {message}")]
    InvalidSetting { message: String },

    /// Response shape mismatch. The stale cached value is kept.
    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api {
        message: String,
        status: Option<u16>,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl From<ApiError> for CoreError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Authentication { message } => CoreError::AuthenticationFailed { message },
            ApiError::Validation { message, .. } => CoreError::ValidationFailed { message },
            ApiError::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            other => {
                let status = other.status();
                CoreError::Api {
                    message: other.to_string(),
                    status,
                }
            }
        }
    }
}
