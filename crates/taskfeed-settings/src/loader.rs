//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`FeedSettings::default()`]
//! 2. If `~/.taskfeed/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `TASKFEED_*` environment variable overrides (highest priority)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::FeedSettings;

/// Resolve the path to the settings file (`~/.taskfeed/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".taskfeed").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<FeedSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON or the merged result fails validation, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<FeedSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    settings.validate()?;
    Ok(settings)
}

fn load_file_layer(path: &Path) -> Result<FeedSettings> {
    let defaults = serde_json::to_value(FeedSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Overlay the user's `settings.json` onto the defaults.
///
/// Nested sections merge key by key, so a file that only sets
/// `connection.reconnectDelayMs` keeps every other connection default.
/// A `null` leaves the default in place; any other value, arrays included,
/// wins outright.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut base), Value::Object(overlay)) => {
            for (key, value) in overlay.into_iter().filter(|(_, v)| !v.is_null()) {
                let merged = match base.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                let _ = base.insert(key, merged);
            }
            Value::Object(base)
        }
        (_, overlay) => overlay,
    }
}

/// Apply environment overrides read through `lookup`.
///
/// Integers must parse and fall within range; booleans accept
/// `true`/`1`/`yes`/`on` and `false`/`0`/`no`/`off`. Invalid values are
/// ignored and the file/default value is kept.
pub fn apply_env_overrides<F>(settings: &mut FeedSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let string = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
    let number = |key: &str, min: u64, max: u64| {
        string(key)
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| (min..=max).contains(v))
    };
    let boolean = |key: &str| string(key).and_then(|v| parse_bool(&v));

    if let Some(v) = string("TASKFEED_API_BASE_URL") {
        settings.api.base_url = v;
    }

    if let Some(v) = number("TASKFEED_MAX_RECONNECT", 1, 100) {
        settings.connection.max_reconnect_attempts = v as u32;
    }
    if let Some(v) = number("TASKFEED_RECONNECT_DELAY_MS", 100, 600_000) {
        settings.connection.reconnect_delay_ms = v;
    }
    if let Some(v) = number("TASKFEED_CLOSE_GRACE_MS", 0, 60_000) {
        settings.connection.close_grace_ms = v;
    }
    if let Some(v) = boolean("TASKFEED_AUTO_CONNECT") {
        settings.connection.auto_connect = v;
    }

    if let Some(v) = number("TASKFEED_HIDE_PANEL_MS", 0, 600_000) {
        settings.store.hide_panel_delay_ms = v;
    }
    if let Some(v) = number("TASKFEED_CLEAR_ACTIVE_MS", 0, 3_600_000) {
        settings.store.clear_active_delay_ms = v;
    }
    if let Some(v) = string("TASKFEED_SNAPSHOT_PATH") {
        settings.store.snapshot_path = Some(v);
    }

    if let Some(v) = string("TASKFEED_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = boolean("TASKFEED_LOG_JSON") {
        settings.logging.json = v;
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
