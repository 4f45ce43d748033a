//! Shared configuration for zaplink consumers.
//!
//! TOML account profiles, credential resolution (env + keyring +
//! plaintext), and translation to `zaplink_core::AccountConfig`. The
//! core never reads disk -- hosts load a profile here and hand the
//! resulting config in.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use zaplink_core::{AccountConfig, Credentials};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no credentials configured for account '{account}'")]
    NoCredentials { account: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Default account name.
    pub default_account: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named cloud account profiles.
    #[serde(default)]
    pub accounts: HashMap<String, AccountProfile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_account: Some("default".into()),
            defaults: Defaults::default(),
            accounts: HashMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
        }
    }
}

fn default_timeout() -> u64 {
    10
}

/// A named cloud account profile.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct AccountProfile {
    /// Account username (email).
    pub username: Option<String>,

    /// Password (plaintext -- prefer keyring or env var).
    pub password: Option<String>,

    /// Environment variable name containing the password.
    pub password_env: Option<String>,

    /// Optional charger allowlist (device uids). When set, only these
    /// chargers and their installations are tracked.
    pub chargers: Option<Vec<String>>,

    /// Prefix prepended to device display names.
    pub prefix: Option<String>,

    /// Override request timeout (seconds).
    pub timeout: Option<u64>,

    /// State poll interval while idle (seconds).
    pub poll_idle: Option<u64>,

    /// State poll interval while charging (seconds).
    pub poll_charging: Option<u64>,

    /// Info poll interval (seconds).
    pub poll_info: Option<u64>,

    /// Firmware poll interval (seconds).
    pub poll_firmware: Option<u64>,

    /// Fair-use ceiling override: max requests per window.
    pub rate_limit_max_requests: Option<usize>,

    /// Fair-use window override (seconds).
    pub rate_limit_window: Option<u64>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "zaplink", "zaplink").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("zaplink");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load a Config from an explicit path + environment.
pub fn load_config_from(path: &std::path::Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("ZAPLINK_").split("_"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    let path = config_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(&path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve credentials from the chain: env var → system keyring →
/// plaintext profile entry.
pub fn resolve_credentials(
    profile: &AccountProfile,
    account_name: &str,
) -> Result<Credentials, ConfigError> {
    let username = profile
        .username
        .clone()
        .or_else(|| std::env::var("ZAPLINK_USERNAME").ok())
        .ok_or_else(|| ConfigError::NoCredentials {
            account: account_name.into(),
        })?;

    // 1. Profile's password_env → env var lookup
    if let Some(ref env_name) = profile.password_env {
        if let Ok(pw) = std::env::var(env_name) {
            return Ok(Credentials::new(username, SecretString::from(pw)));
        }
    }

    // 2. ZAPLINK_PASSWORD env var
    if let Ok(pw) = std::env::var("ZAPLINK_PASSWORD") {
        return Ok(Credentials::new(username, SecretString::from(pw)));
    }

    // 3. System keyring
    if let Ok(entry) = keyring::Entry::new("zaplink", &format!("{account_name}/password")) {
        if let Ok(pw) = entry.get_password() {
            return Ok(Credentials::new(username, SecretString::from(pw)));
        }
    }

    // 4. Plaintext in config
    if let Some(ref pw) = profile.password {
        return Ok(Credentials::new(username, SecretString::from(pw.clone())));
    }

    Err(ConfigError::NoCredentials {
        account: account_name.into(),
    })
}

// ── Translation to the core config ──────────────────────────────────

/// Build an `AccountConfig` from a profile.
pub fn profile_to_account_config(
    profile: &AccountProfile,
    account_name: &str,
    defaults: &Defaults,
) -> Result<AccountConfig, ConfigError> {
    let credentials = resolve_credentials(profile, account_name)?;
    let mut config = AccountConfig::new(credentials);

    config.timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));
    if let Some(secs) = profile.poll_idle {
        config.cadence.state_idle = Duration::from_secs(secs);
    }
    if let Some(secs) = profile.poll_charging {
        config.cadence.state_charging = Duration::from_secs(secs);
    }
    if let Some(secs) = profile.poll_info {
        config.cadence.info = Duration::from_secs(secs);
    }
    if let Some(secs) = profile.poll_firmware {
        config.cadence.firmware = Duration::from_secs(secs);
    }
    if let Some(max) = profile.rate_limit_max_requests {
        if max == 0 {
            return Err(ConfigError::Validation {
                field: "rate_limit_max_requests".into(),
                reason: "must be at least 1".into(),
            });
        }
        config.rate_limit_max_requests = max;
    }
    if let Some(secs) = profile.rate_limit_window {
        config.rate_limit_window = Duration::from_secs(secs);
    }
    config.tracked_chargers = profile
        .chargers
        .as_ref()
        .map(|list| list.iter().cloned().collect());
    config.name_prefix = profile.prefix.clone().unwrap_or_default();

    Ok(config)
}
