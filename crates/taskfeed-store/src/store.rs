use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use taskfeed_core::{DownloadTask, ProgressUpdate, TaskId};

use crate::snapshot::StoreSnapshot;

/// Finished tasks kept in history, newest first.
pub const HISTORY_LIMIT: usize = 10;

/// Error attached to a task dismissed by the user.
pub const CANCELLED_MESSAGE: &str = "Cancelled by user";

const EVENT_CAPACITY: usize = 256;

/// Timing of the delayed effects that follow a completion.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub hide_panel_delay: Duration,
    pub clear_active_delay: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            hide_panel_delay: Duration::from_secs(2),
            clear_active_delay: Duration::from_secs(5),
        }
    }
}

/// Change notifications for views that render the store.
#[derive(Clone, Debug, PartialEq)]
pub enum StoreEvent {
    Started(TaskId),
    Progress(TaskId),
    Completed(TaskId),
    Failed { task_id: TaskId, error: String },
    Cancelled(TaskId),
    ActiveCleared(TaskId),
    PanelHidden,
    HistoryCleared,
}

#[derive(Default)]
struct StoreState {
    active: Option<DownloadTask>,
    /// Bumped on every start/restore; tags delayed effects.
    epoch: u64,
    history: VecDeque<DownloadTask>,
    show_progress_panel: bool,
}

impl StoreState {
    fn is_current(&self, tag: &EffectTag) -> bool {
        self.epoch == tag.epoch
            && self
                .active
                .as_ref()
                .is_some_and(|t| t.task_id == tag.task_id)
    }

    fn push_history(&mut self, task: DownloadTask) {
        self.history.push_front(task);
        self.history.truncate(HISTORY_LIMIT);
    }
}

#[derive(Clone, Debug)]
struct EffectTag {
    task_id: TaskId,
    epoch: u64,
}

#[derive(Clone, Copy, Debug)]
enum DelayedEffect {
    HidePanel,
    ClearActive,
}

struct Inner {
    config: StoreConfig,
    state: Mutex<StoreState>,
    events: broadcast::Sender<StoreEvent>,
}

/// Process-wide record of task lifecycle: one active task plus bounded history.
///
/// Cloning yields another handle to the same state. Every mutation is a single
/// critical section; nothing awaits while the lock is held.
#[derive(Clone)]
pub struct TaskProgressStore {
    inner: Arc<Inner>,
}

impl Default for TaskProgressStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl TaskProgressStore {
    pub fn new(config: StoreConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(StoreState::default()),
                events,
            }),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.events.subscribe()
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────

    /// Begin tracking a task. Replaces whatever occupied the active slot.
    pub fn start_download(&self, task_id: TaskId, filename: impl Into<String>) {
        let task = DownloadTask::new(task_id.clone(), filename, Utc::now());
        {
            let mut state = self.inner.state.lock();
            if let Some(prev) = &state.active {
                if !prev.is_terminal() {
                    debug!(replaced = %prev.task_id, task_id = %task_id, "active task replaced");
                }
            }
            state.epoch += 1;
            state.active = Some(task);
            state.show_progress_panel = true;
        }
        info!(task_id = %task_id, "download started");
        self.emit(StoreEvent::Started(task_id));
    }

    /// Merge progress into the active task. Silently ignored without one.
    pub fn update_progress(&self, update: ProgressUpdate) {
        let task_id = {
            let mut state = self.inner.state.lock();
            let Some(task) = state.active.as_mut() else {
                debug!("progress update with no active task ignored");
                return;
            };
            if !task.apply(&update) {
                debug!(task_id = %task.task_id, status = %task.status, "progress update for finished task ignored");
                return;
            }
            task.task_id.clone()
        };
        self.emit(StoreEvent::Progress(task_id));
    }

    /// Mark the active task completed and schedule the panel hide and slot clear.
    pub fn complete_download(&self, downloaded_count: u64) {
        let tag = {
            let mut state = self.inner.state.lock();
            let Some(task) = state.active.as_mut() else {
                debug!("completion with no active task ignored");
                return;
            };
            if task.is_terminal() {
                debug!(task_id = %task.task_id, "completion for finished task ignored");
                return;
            }
            task.complete(downloaded_count, Utc::now());
            let snapshot = task.clone();
            let tag = EffectTag {
                task_id: snapshot.task_id.clone(),
                epoch: state.epoch,
            };
            state.push_history(snapshot);
            tag
        };

        info!(task_id = %tag.task_id, downloaded_count, "download completed");
        self.emit(StoreEvent::Completed(tag.task_id.clone()));

        self.schedule(self.inner.config.hide_panel_delay, tag.clone(), DelayedEffect::HidePanel);
        self.schedule(self.inner.config.clear_active_delay, tag, DelayedEffect::ClearActive);
    }

    /// Mark the active task failed. It stays visible until cleared.
    pub fn fail_download(&self, error: impl Into<String>) {
        let error = error.into();
        let task_id = {
            let mut state = self.inner.state.lock();
            let Some(task) = state.active.as_mut() else {
                debug!(error = %error, "failure with no active task ignored");
                return;
            };
            if task.is_terminal() {
                debug!(task_id = %task.task_id, "failure for finished task ignored");
                return;
            }
            task.fail(error.clone(), Utc::now());
            let snapshot = task.clone();
            let task_id = snapshot.task_id.clone();
            state.push_history(snapshot);
            task_id
        };
        warn!(task_id = %task_id, error = %error, "download failed");
        self.emit(StoreEvent::Failed { task_id, error });
    }

    /// User dismissal: record the task as cancelled and clear it at once.
    pub fn cancel_download(&self) {
        let task_id = {
            let mut state = self.inner.state.lock();
            let Some(mut task) = state.active.take() else {
                return;
            };
            state.show_progress_panel = false;
            if !task.is_terminal() {
                task.fail(CANCELLED_MESSAGE, Utc::now());
                state.push_history(task.clone());
            }
            task.task_id
        };
        info!(task_id = %task_id, "download cancelled");
        self.emit(StoreEvent::Cancelled(task_id));
    }

    // ─── Reads ───────────────────────────────────────────────────────────

    /// Look up a task in the active slot, then in history.
    pub fn get_task(&self, task_id: &TaskId) -> Option<DownloadTask> {
        let state = self.inner.state.lock();
        state
            .active
            .iter()
            .chain(state.history.iter())
            .find(|t| &t.task_id == task_id)
            .cloned()
    }

    pub fn active_task(&self) -> Option<DownloadTask> {
        self.inner.state.lock().active.clone()
    }

    /// Whether `task_id` occupies the active slot.
    pub fn is_active(&self, task_id: &TaskId) -> bool {
        self.inner
            .state
            .lock()
            .active
            .as_ref()
            .is_some_and(|t| &t.task_id == task_id)
    }

    /// Finished tasks, newest first.
    pub fn history(&self) -> Vec<DownloadTask> {
        self.inner.state.lock().history.iter().cloned().collect()
    }

    pub fn show_progress_panel(&self) -> bool {
        self.inner.state.lock().show_progress_panel
    }

    // ─── Resets ──────────────────────────────────────────────────────────

    pub fn clear_active_task(&self) {
        let cleared = {
            let mut state = self.inner.state.lock();
            state.show_progress_panel = false;
            state.active.take()
        };
        if let Some(task) = cleared {
            self.emit(StoreEvent::ActiveCleared(task.task_id));
        }
    }

    pub fn clear_history(&self) {
        self.inner.state.lock().history.clear();
        self.emit(StoreEvent::HistoryCleared);
    }

    /// Return to the freshly constructed state. Pending delayed effects
    /// become no-ops.
    pub fn reset(&self) {
        let mut state = self.inner.state.lock();
        let epoch = state.epoch + 1;
        *state = StoreState {
            epoch,
            ..StoreState::default()
        };
    }

    // ─── Persistence ─────────────────────────────────────────────────────

    pub fn snapshot(&self) -> StoreSnapshot {
        let state = self.inner.state.lock();
        StoreSnapshot {
            active: state.active.clone(),
            history: state.history.iter().cloned().collect(),
        }
    }

    /// Replace the current contents with a snapshot.
    pub fn restore(&self, snapshot: StoreSnapshot) {
        let mut state = self.inner.state.lock();
        state.epoch += 1;
        state.show_progress_panel = snapshot.active.is_some();
        state.active = snapshot.active;
        state.history = snapshot.history.into_iter().take(HISTORY_LIMIT).collect();
    }

    // ─── Internals ───────────────────────────────────────────────────────

    fn emit(&self, event: StoreEvent) {
        // No receivers is fine.
        let _ = self.inner.events.send(event);
    }

    fn schedule(&self, delay: Duration, tag: EffectTag, effect: DelayedEffect) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(task_id = %tag.task_id, ?effect, "no async runtime, delayed effect skipped");
            return;
        };
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                TaskProgressStore { inner }.fire(effect, &tag);
            }
        });
    }

    fn fire(&self, effect: DelayedEffect, tag: &EffectTag) {
        let event = {
            let mut state = self.inner.state.lock();
            if !state.is_current(tag) {
                debug!(task_id = %tag.task_id, ?effect, "stale delayed effect dropped");
                return;
            }
            match effect {
                DelayedEffect::HidePanel => {
                    state.show_progress_panel = false;
                    StoreEvent::PanelHidden
                }
                DelayedEffect::ClearActive => {
                    state.active = None;
                    state.show_progress_panel = false;
                    StoreEvent::ActiveCleared(tag.task_id.clone())
                }
            }
        };
        self.emit(event);
    }
}
