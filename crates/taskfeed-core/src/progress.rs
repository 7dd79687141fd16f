use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::TaskId;

/// Connection state of a single progress subscription.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
        }
    }

    /// A socket is live or being established.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a tracked task. Ordered: transitions only move forward.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Pending,
    Downloading,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Map a backend status string. Unknown values mean work is under way.
    pub fn from_wire(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "pending" | "queued" => Self::Pending,
            "completed" | "complete" | "success" | "done" => Self::Completed,
            "failed" | "error" => Self::Failed,
            _ => Self::Downloading,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Downloading => 1,
            Self::Completed | Self::Failed => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Downloading => "downloading",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Clamp a percentage into [0, 100]. NaN becomes 0.
pub fn clamp_progress(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

/// Latest progress snapshot received on a live connection.
/// Every field is replaced wholesale by each progress frame.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadProgress {
    pub status: String,
    pub progress: f64,
    pub progress_message: String,
    pub downloaded_count: u64,
    pub estimated_total: Option<u64>,
}

/// Fields merged into the active task by a progress update.
#[derive(Clone, Debug, PartialEq)]
pub struct ProgressUpdate {
    pub progress: f64,
    pub status: TaskStatus,
    pub message: String,
    pub downloaded_count: u64,
    pub estimated_total: Option<u64>,
}

impl From<&DownloadProgress> for ProgressUpdate {
    fn from(p: &DownloadProgress) -> Self {
        Self {
            progress: p.progress,
            status: TaskStatus::from_wire(&p.status),
            message: p.progress_message.clone(),
            downloaded_count: p.downloaded_count,
            estimated_total: p.estimated_total,
        }
    }
}

/// Durable record of one task's lifecycle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadTask {
    pub task_id: TaskId,
    pub filename: String,
    pub status: TaskStatus,
    pub progress: f64,
    pub progress_message: String,
    pub downloaded_count: u64,
    pub estimated_total: Option<u64>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl DownloadTask {
    pub fn new(task_id: TaskId, filename: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            task_id,
            filename: filename.into(),
            status: TaskStatus::Pending,
            progress: 0.0,
            progress_message: String::new(),
            downloaded_count: 0,
            estimated_total: None,
            error: None,
            created_at: now,
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Merge a progress update. Returns false when the task is already
    /// finished and the update was dropped.
    ///
    /// Status never moves backwards, and never into a terminal state here:
    /// only [`complete`](Self::complete) and [`fail`](Self::fail) finish a task.
    pub fn apply(&mut self, update: &ProgressUpdate) -> bool {
        if self.is_terminal() {
            return false;
        }
        if !update.status.is_terminal() && update.status.rank() > self.status.rank() {
            self.status = update.status;
        }
        self.progress = clamp_progress(update.progress);
        self.progress_message.clone_from(&update.message);
        self.downloaded_count = update.downloaded_count;
        self.estimated_total = update.estimated_total;
        true
    }

    pub fn complete(&mut self, downloaded_count: u64, now: DateTime<Utc>) {
        self.status = TaskStatus::Completed;
        self.progress = 100.0;
        self.downloaded_count = downloaded_count;
        self.completed_at = Some(now);
    }

    pub fn fail(&mut self, error: impl Into<String>, now: DateTime<Utc>) {
        self.status = TaskStatus::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(now);
    }
}
