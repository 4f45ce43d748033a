// ── Runtime account configuration ──
//
// Describes *how* to talk to the Zaptec cloud for one account. Carries
// credentials and tuning, never touches disk -- the config crate (or
// the host) constructs an `AccountConfig` and hands it in.

use std::collections::HashSet;
use std::time::Duration;

use zaplink_api::{ApiConfig, Credentials};

use crate::poll::CadencePolicy;

/// Configuration for a single cloud account.
#[derive(Debug, Clone)]
pub struct AccountConfig {
    /// Cloud credentials (OAuth password grant).
    pub credentials: Credentials,
    /// Request/retry tuning for the API client.
    pub api: ApiConfig,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Fair-use ceiling: max requests per rolling window.
    pub rate_limit_max_requests: usize,
    /// Fair-use rolling window.
    pub rate_limit_window: Duration,
    /// Poll cadence tuning.
    pub cadence: CadencePolicy,
    /// Optional charger allowlist. When set, only these chargers (and
    /// the installations that own them) are tracked.
    pub tracked_chargers: Option<HashSet<String>>,
    /// Prefix prepended to device display names.
    pub name_prefix: String,
}

impl AccountConfig {
    /// Config with vendor-default tuning for the given credentials.
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            api: ApiConfig::default(),
            timeout: Duration::from_secs(10),
            rate_limit_max_requests: 10,
            rate_limit_window: Duration::from_secs(1),
            cadence: CadencePolicy::default(),
            tracked_chargers: None,
            name_prefix: String::new(),
        }
    }
}
