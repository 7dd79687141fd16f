//! Settings schema. Keys are camelCase in `settings.json`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeedSettings {
    pub api: ApiSettings,
    pub connection: ConnectionSettings,
    pub store: StoreSettings,
    pub logging: LoggingSettings,
}

impl FeedSettings {
    /// Reject values that cannot produce a working subscriber.
    pub fn validate(&self) -> Result<()> {
        if self.api.base_url.trim().is_empty() {
            return Err(SettingsError::InvalidValue("api.baseUrl is empty".into()));
        }
        if self.connection.max_reconnect_attempts == 0 {
            return Err(SettingsError::InvalidValue(
                "connection.maxReconnectAttempts must be at least 1".into(),
            ));
        }
        if self.store.clear_active_delay_ms < self.store.hide_panel_delay_ms {
            return Err(SettingsError::InvalidValue(
                "store.clearActiveDelayMs must not be shorter than store.hidePanelDelayMs".into(),
            ));
        }
        Ok(())
    }
}

/// REST backend location.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiSettings {
    /// REST base URL; the progress channel URL is derived from it.
    pub base_url: String,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api".to_string(),
        }
    }
}

/// Progress channel reconnection behaviour.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionSettings {
    pub max_reconnect_attempts: u32,
    /// Fixed delay between reconnect attempts.
    pub reconnect_delay_ms: u64,
    /// Pause between a `complete` frame and closing the socket.
    pub close_grace_ms: u64,
    pub auto_connect: bool,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: 5,
            reconnect_delay_ms: 3_000,
            close_grace_ms: 1_000,
            auto_connect: true,
        }
    }
}

impl ConnectionSettings {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn close_grace(&self) -> Duration {
        Duration::from_millis(self.close_grace_ms)
    }
}

/// Task store timing and persistence.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreSettings {
    pub hide_panel_delay_ms: u64,
    pub clear_active_delay_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_path: Option<String>,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            hide_panel_delay_ms: 2_000,
            clear_active_delay_ms: 5_000,
            snapshot_path: None,
        }
    }
}

impl StoreSettings {
    pub fn hide_panel_delay(&self) -> Duration {
        Duration::from_millis(self.hide_panel_delay_ms)
    }

    pub fn clear_active_delay(&self) -> Duration {
        Duration::from_millis(self.clear_active_delay_ms)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
