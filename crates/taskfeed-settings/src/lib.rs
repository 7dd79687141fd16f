//! # taskfeed-settings
//!
//! Configuration for the progress subscriber, loaded from three layers
//! (in priority order):
//! 1. **Compiled defaults**: [`FeedSettings::default()`]
//! 2. **User file**: `~/.taskfeed/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `TASKFEED_*` overrides (highest priority)
//!
//! Settings are loaded explicitly and passed down; there is no global instance.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_env_overrides, deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
