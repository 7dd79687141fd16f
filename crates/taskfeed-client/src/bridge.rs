//! Wiring from connection callbacks into a [`TaskProgressStore`].

use tracing::{debug, warn};

use taskfeed_core::{FeedError, ProgressUpdate, TaskId};
use taskfeed_store::TaskProgressStore;

use crate::handlers::ProgressHandlers;

/// Handlers that mirror channel events for `task_id` into `store`.
///
/// Events are dropped once the task no longer occupies the active slot, so a
/// late frame cannot touch a task the user has already moved past. Malformed
/// frames are logged only; the task keeps running.
pub fn store_handlers(store: TaskProgressStore, task_id: TaskId) -> ProgressHandlers {
    let on_progress = (store.clone(), task_id.clone());
    let on_complete = (store.clone(), task_id.clone());
    let on_error = (store, task_id);

    ProgressHandlers::new()
        .on_progress(move |progress| {
            let (store, task_id) = &on_progress;
            if store.is_active(task_id) {
                store.update_progress(ProgressUpdate::from(progress));
            }
        })
        .on_complete(move |completion| {
            let (store, task_id) = &on_complete;
            if store.is_active(task_id) {
                store.complete_download(completion.downloaded_count);
            }
        })
        .on_error(move |err| {
            let (store, task_id) = &on_error;
            match err {
                FeedError::Protocol(_) => {
                    debug!(task_id = %task_id, error = %err, "frame skipped");
                }
                _ if !store.is_active(task_id) => {
                    debug!(task_id = %task_id, error = %err, "error for inactive task ignored");
                }
                _ => {
                    warn!(task_id = %task_id, kind = err.error_kind(), "task failed");
                    store.fail_download(err.to_string());
                }
            }
        })
}
