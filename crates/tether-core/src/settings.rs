//! Client settings with file deep-merge and environment overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`TetherSettings::default()`]
//! 2. If a settings file exists, deep-merge user values over defaults
//! 3. Apply `TETHER_*` environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::errors::{ClientError, Result};

/// Default base reconnect delay in milliseconds.
pub const DEFAULT_RECONNECT_INTERVAL_MS: u64 = 1000;
/// Default maximum reconnect attempts before the error state.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 10;
/// Default heartbeat interval in milliseconds.
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 30_000;
/// Default correlated-request timeout in milliseconds.
pub const DEFAULT_MESSAGE_TIMEOUT_MS: u64 = 10_000;
/// Default cap on the reconnect backoff delay in milliseconds.
pub const DEFAULT_BACKOFF_CAP_MS: u64 = 30_000;

/// Configuration surface for a tether client instance.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TetherSettings {
    /// WebSocket endpoint (`ws://` or `wss://`).
    pub url: String,
    /// Base delay for reconnect backoff in ms (default: 1000).
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
    /// Maximum reconnect attempts before the error state (default: 10).
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Heartbeat probe interval in ms (default: 30000).
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Per-request timeout for correlated sends in ms (default: 10000).
    #[serde(default = "default_message_timeout_ms")]
    pub message_timeout_ms: u64,
    /// Cap on the computed backoff delay in ms (default: 30000).
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,
    /// Install a tracing subscriber on client construction (default: false).
    #[serde(default)]
    pub enable_logging: bool,
}

fn default_reconnect_interval_ms() -> u64 {
    DEFAULT_RECONNECT_INTERVAL_MS
}
fn default_max_reconnect_attempts() -> u32 {
    DEFAULT_MAX_RECONNECT_ATTEMPTS
}
fn default_heartbeat_interval_ms() -> u64 {
    DEFAULT_HEARTBEAT_INTERVAL_MS
}
fn default_message_timeout_ms() -> u64 {
    DEFAULT_MESSAGE_TIMEOUT_MS
}
fn default_backoff_cap_ms() -> u64 {
    DEFAULT_BACKOFF_CAP_MS
}

impl Default for TetherSettings {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8080/ws".into(),
            reconnect_interval_ms: DEFAULT_RECONNECT_INTERVAL_MS,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
            message_timeout_ms: DEFAULT_MESSAGE_TIMEOUT_MS,
            backoff_cap_ms: DEFAULT_BACKOFF_CAP_MS,
            enable_logging: false,
        }
    }
}

impl TetherSettings {
    /// Create settings for an endpoint with all defaults.
    #[must_use]
    pub fn for_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Validate ranges and the endpoint scheme.
    pub fn validate(&self) -> Result<()> {
        if !self.url.starts_with("ws://") && !self.url.starts_with("wss://") {
            return Err(invalid(format!(
                "url must use ws:// or wss://, got {}",
                self.url
            )));
        }
        if self.reconnect_interval_ms == 0 {
            return Err(invalid("reconnectIntervalMs must be non-zero"));
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(invalid("heartbeatIntervalMs must be non-zero"));
        }
        if self.message_timeout_ms == 0 {
            return Err(invalid("messageTimeoutMs must be non-zero"));
        }
        if self.backoff_cap_ms < self.reconnect_interval_ms {
            return Err(invalid(
                "backoffCapMs must be at least reconnectIntervalMs",
            ));
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> ClientError {
    ClientError::InvalidSettings(message.into())
}

/// Load settings from a JSON file with env var overrides.
///
/// If the file does not exist, returns defaults (plus overrides). If the
/// file contains invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<TetherSettings> {
    let defaults = serde_json::to_value(TetherSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading tether settings from file");
        let content = std::fs::read_to_string(path)
            .map_err(|e| invalid(format!("failed to read {}: {e}", path.display())))?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: TetherSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `TETHER_*` environment variable overrides.
///
/// Invalid values are silently ignored (fall back to file/default).
pub fn apply_env_overrides(settings: &mut TetherSettings) {
    if let Some(v) = read_env_string("TETHER_URL") {
        settings.url = v;
    }
    if let Some(v) = read_env_u64("TETHER_RECONNECT_INTERVAL_MS", 1, 600_000) {
        settings.reconnect_interval_ms = v;
    }
    if let Some(v) = read_env_u32("TETHER_MAX_RECONNECT_ATTEMPTS", 1, 10_000) {
        settings.max_reconnect_attempts = v;
    }
    if let Some(v) = read_env_u64("TETHER_HEARTBEAT_INTERVAL_MS", 100, 3_600_000) {
        settings.heartbeat_interval_ms = v;
    }
    if let Some(v) = read_env_u64("TETHER_MESSAGE_TIMEOUT_MS", 1, 3_600_000) {
        settings.message_timeout_ms = v;
    }
    if let Some(v) = read_env_u64("TETHER_BACKOFF_CAP_MS", 1, 3_600_000) {
        settings.backoff_cap_ms = v;
    }
    if let Some(v) = std::env::var("TETHER_ENABLE_LOGGING").ok().and_then(|s| parse_bool(&s)) {
        settings.enable_logging = v;
    }
}

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = std::env::var(name).ok()?.parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

fn read_env_u32(name: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = std::env::var(name).ok()?.parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}
