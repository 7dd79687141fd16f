use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use taskfeed_core::DownloadTask;

use crate::error::StoreError;
use crate::store::TaskProgressStore;

/// Serializable copy of the store contents, used to survive restarts.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreSnapshot {
    pub active: Option<DownloadTask>,
    pub history: Vec<DownloadTask>,
}

impl StoreSnapshot {
    pub fn read(path: &Path) -> Result<Option<Self>, StoreError> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    pub fn write(&self, path: &Path) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl TaskProgressStore {
    pub fn save_to(&self, path: &Path) -> Result<(), StoreError> {
        let snapshot = self.snapshot();
        snapshot.write(path)?;
        debug!(path = %path.display(), history = snapshot.history.len(), "store snapshot saved");
        Ok(())
    }

    /// Load a snapshot written by [`save_to`](Self::save_to). Returns false
    /// when the file does not exist.
    pub fn restore_from(&self, path: &Path) -> Result<bool, StoreError> {
        match StoreSnapshot::read(path)? {
            Some(snapshot) => {
                self.restore(snapshot);
                debug!(path = %path.display(), "store snapshot restored");
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
