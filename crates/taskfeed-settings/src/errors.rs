use thiserror::Error;

/// Why a [`FeedSettings`](crate::FeedSettings) could not be produced.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("cannot read settings.json: {0}")]
    Io(#[from] std::io::Error),
    #[error("settings.json is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// Merged settings failed [`FeedSettings::validate`](crate::FeedSettings::validate).
    #[error("rejected setting: {0}")]
    InvalidValue(String),
}

pub type Result<T> = std::result::Result<T, SettingsError>;
