//! Connection manager: one progress channel per task id, with bounded
//! fixed-delay reconnection.
//!
//! State machine:
//!
//! ```text
//! disconnected --connect--> connecting --"connected" frame--> connected
//!      ^                      ^    |                              |
//!      |                      |    | abnormal close,              | "complete" / "error" frame
//!      |                      +----+ attempts left                v
//!      +------------------ manual disconnect ---------------- disconnected | error
//! ```
//!
//! Each socket runs in its own reader task tagged with a generation number.
//! Opening a socket bumps the generation and cancels the previous reader, and
//! every event re-checks its generation under the state lock, so a superseded
//! socket can never touch current state.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use taskfeed_core::protocol::error_text;
use taskfeed_core::{channel_url, ConnectionState, DownloadProgress, FeedError, ServerMessage, TaskId};
use taskfeed_settings::FeedSettings;

use crate::handlers::{Completion, ProgressHandlers};
use crate::transport::{ChannelEvent, Connector, WsConnector, NORMAL_CLOSURE};

/// Configuration for one [`ConnectionManager`].
#[derive(Clone, Debug)]
pub struct ManagerConfig {
    /// REST base URL the channel URL is derived from.
    pub base_url: String,
    pub max_reconnect_attempts: u32,
    /// Fixed pause before each reconnect attempt.
    pub reconnect_delay: Duration,
    /// Delay between a `complete` frame and closing the socket.
    pub close_grace: Duration,
    /// Connect automatically whenever a live task is bound.
    pub auto_connect: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api".to_string(),
            max_reconnect_attempts: 5,
            reconnect_delay: Duration::from_secs(3),
            close_grace: Duration::from_secs(1),
            auto_connect: true,
        }
    }
}

impl ManagerConfig {
    pub fn from_settings(settings: &FeedSettings) -> Self {
        Self {
            base_url: settings.api.base_url.clone(),
            max_reconnect_attempts: settings.connection.max_reconnect_attempts,
            reconnect_delay: settings.connection.reconnect_delay(),
            close_grace: settings.connection.close_grace(),
            auto_connect: settings.connection.auto_connect,
        }
    }
}

#[derive(Default)]
struct Shared {
    task_id: Option<TaskId>,
    /// Completion flag as last passed to `bind`.
    completed: bool,
    /// Set by a `complete` frame. Survives re-binding the same task id.
    finished: bool,
    progress: Option<DownloadProgress>,
    /// Sticky: suppresses reconnection until the next `connect()`.
    manual_disconnect: bool,
    attempts: u32,
    generation: u64,
    /// Cancels the reader task of the current socket.
    link: Option<CancellationToken>,
    reconnect: Option<JoinHandle<()>>,
}

struct Inner {
    config: ManagerConfig,
    connector: Arc<dyn Connector>,
    runtime: Option<Handle>,
    shared: Mutex<Shared>,
    state: watch::Sender<ConnectionState>,
    handlers: RwLock<Arc<ProgressHandlers>>,
}

/// Owns the progress subscription for a single task.
///
/// Dropping the manager is equivalent to [`disconnect`](Self::disconnect):
/// no socket outlives its owner.
///
/// One manager tracks one task. Binding a different task id closes the
/// previous socket; subscriptions are never multiplexed.
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    /// Create a manager on the current tokio runtime.
    ///
    /// Outside a runtime no socket can be opened: `connect` logs a warning
    /// and the manager stays disconnected.
    pub fn new(config: ManagerConfig, connector: Arc<dyn Connector>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                config,
                connector,
                runtime: Handle::try_current().ok(),
                shared: Mutex::new(Shared::default()),
                state,
                handlers: RwLock::new(Arc::new(ProgressHandlers::default())),
            }),
        }
    }

    /// Create a manager that opens real WebSocket connections.
    pub fn with_websocket(config: ManagerConfig) -> Self {
        Self::new(config, Arc::new(WsConnector::default()))
    }

    pub fn with_handlers(self, handlers: ProgressHandlers) -> Self {
        self.set_handlers(handlers);
        self
    }

    /// Replace the callbacks. Applies from the next dispatched event on.
    pub fn set_handlers(&self, handlers: ProgressHandlers) {
        *self.inner.handlers.write() = Arc::new(handlers);
    }

    /// Point the manager at a task.
    ///
    /// A change of task id or completion flag disconnects the current socket;
    /// afterwards, with auto-connect on and a live task bound, a new socket is
    /// opened. Binding the same values again does nothing, and a task the
    /// server already reported complete is never reopened.
    pub fn bind(&self, task_id: Option<TaskId>, completed: bool) {
        let task_id = task_id.filter(|id| !id.is_empty());
        let same_task = {
            let shared = self.inner.shared.lock();
            let same_task = shared.task_id == task_id;
            if same_task && shared.completed == completed {
                return;
            }
            same_task
        };

        self.inner.disconnect();

        {
            let mut shared = self.inner.shared.lock();
            if !same_task {
                shared.progress = None;
                shared.attempts = 0;
                shared.finished = false;
            }
            debug!(task_id = ?task_id.as_ref().map(TaskId::as_str), completed, "task bound");
            shared.task_id = task_id;
            shared.completed = completed;
        }

        if self.inner.config.auto_connect {
            self.inner.connect();
        }
    }

    /// Open the channel if a live task is bound and no socket is active.
    pub fn connect(&self) {
        self.inner.connect();
    }

    /// Close the channel and stop reconnecting. Idempotent.
    pub fn disconnect(&self) {
        self.inner.disconnect();
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Latest progress frame for the bound task.
    pub fn progress(&self) -> Option<DownloadProgress> {
        self.inner.shared.lock().progress.clone()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.shared.lock().attempts
    }

    pub fn task_id(&self) -> Option<TaskId> {
        self.inner.shared.lock().task_id.clone()
    }

    pub fn is_manually_disconnected(&self) -> bool {
        self.inner.shared.lock().manual_disconnect
    }

    /// Channel URL for the bound task.
    pub fn channel_url(&self) -> Option<String> {
        self.task_id()
            .map(|id| channel_url(&self.inner.config.base_url, &id))
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.inner.disconnect();
    }
}

impl Inner {
    fn set_state(&self, next: ConnectionState) {
        let _ = self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    fn current_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn handlers(&self) -> Arc<ProgressHandlers> {
        Arc::clone(&self.handlers.read())
    }

    fn connect(self: &Arc<Self>) {
        let mut shared = self.shared.lock();
        let Some(task_id) = shared.task_id.clone() else {
            debug!("connect skipped: no task bound");
            return;
        };
        if shared.completed || shared.finished {
            debug!(task_id = %task_id, "connect skipped: task already complete");
            return;
        }
        let state = self.current_state();
        if state.is_active() {
            debug!(task_id = %task_id, %state, "connect skipped: already active");
            return;
        }

        if let Some(stray) = shared.link.take() {
            stray.cancel();
        }
        if let Some(timer) = shared.reconnect.take() {
            timer.abort();
        }
        shared.manual_disconnect = false;
        self.set_state(ConnectionState::Connecting);
        self.open_link(&mut shared, &task_id);
    }

    fn disconnect(&self) {
        let mut shared = self.shared.lock();
        shared.manual_disconnect = true;
        if let Some(timer) = shared.reconnect.take() {
            timer.abort();
        }
        if let Some(link) = shared.link.take() {
            link.cancel();
            debug!(generation = shared.generation, "channel closed by caller");
        }
        // Detach anything still in flight from the old socket.
        shared.generation += 1;
        self.set_state(ConnectionState::Disconnected);
    }

    /// Spawn a reader task for a fresh socket. Caller holds the state lock.
    fn open_link(self: &Arc<Self>, shared: &mut Shared, task_id: &TaskId) {
        shared.generation += 1;
        let generation = shared.generation;
        let url = channel_url(&self.config.base_url, task_id);
        let cancel = CancellationToken::new();
        shared.link = Some(cancel.clone());

        info!(task_id = %task_id, generation, url = %url, "opening progress channel");
        if self
            .spawn(run_link(Arc::clone(self), generation, url, cancel))
            .is_none()
        {
            shared.link = None;
            self.set_state(ConnectionState::Disconnected);
        }
    }

    fn spawn<F>(&self, future: F) -> Option<JoinHandle<()>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match self.runtime.clone().or_else(|| Handle::try_current().ok()) {
            Some(runtime) => Some(runtime.spawn(future)),
            None => {
                warn!("no async runtime, background task not spawned");
                None
            }
        }
    }

    fn on_frame(self: &Arc<Self>, generation: u64, text: &str) {
        let message = match ServerMessage::decode(text) {
            Ok(message) => message,
            Err(err) => {
                if self.shared.lock().generation != generation {
                    return;
                }
                warn!(generation, error = %err, "malformed frame");
                self.handlers().error(&err);
                return;
            }
        };

        match message {
            ServerMessage::Connected => {
                {
                    let mut shared = self.shared.lock();
                    if shared.generation != generation {
                        return;
                    }
                    shared.attempts = 0;
                    self.set_state(ConnectionState::Connected);
                }
                info!(generation, "progress channel ready");
                self.handlers().connected();
            }
            ServerMessage::Progress(progress) => {
                {
                    let mut shared = self.shared.lock();
                    if shared.generation != generation {
                        return;
                    }
                    shared.progress = Some(progress.clone());
                }
                debug!(
                    generation,
                    progress = progress.progress,
                    downloaded = progress.downloaded_count,
                    "progress"
                );
                self.handlers().progress(&progress);
            }
            ServerMessage::Complete {
                downloaded_count,
                message,
            } => {
                {
                    let mut shared = self.shared.lock();
                    if shared.generation != generation {
                        return;
                    }
                    shared.finished = true;
                    shared.manual_disconnect = true;
                }
                info!(generation, downloaded_count, "task complete");
                self.handlers().complete(&Completion {
                    downloaded_count,
                    message,
                });
                self.close_after_grace(generation);
            }
            ServerMessage::Error { error, message } => {
                let text = error_text(error.as_deref(), message.as_deref());
                {
                    let mut shared = self.shared.lock();
                    if shared.generation != generation {
                        return;
                    }
                    shared.manual_disconnect = true;
                    self.set_state(ConnectionState::Error);
                }
                warn!(generation, error = %text, "task reported error");
                self.handlers().error(&FeedError::Application(text));
            }
            ServerMessage::Unknown => {
                debug!(generation, "unknown frame type ignored");
            }
        }
    }

    /// Close the socket a little after completion so the final update lands.
    fn close_after_grace(self: &Arc<Self>, generation: u64) {
        let inner = Arc::clone(self);
        let grace = self.config.close_grace;
        let _ = self.spawn(async move {
            tokio::time::sleep(grace).await;
            let mut shared = inner.shared.lock();
            if shared.generation != generation {
                return;
            }
            if let Some(link) = shared.link.take() {
                link.cancel();
            }
            if inner.current_state() != ConnectionState::Error {
                inner.set_state(ConnectionState::Disconnected);
            }
            debug!(generation, "channel closed after completion");
        });
    }

    fn on_closed(self: &Arc<Self>, generation: u64, code: Option<u16>) {
        let attempts = {
            let mut shared = self.shared.lock();
            if shared.generation != generation {
                debug!(generation, ?code, "close from superseded socket ignored");
                return;
            }
            shared.link = None;

            if shared.manual_disconnect || shared.finished || code == Some(NORMAL_CLOSURE) {
                if self.current_state() != ConnectionState::Error {
                    self.set_state(ConnectionState::Disconnected);
                }
                info!(generation, ?code, "progress channel closed");
                return;
            }

            if shared.attempts < self.config.max_reconnect_attempts {
                shared.attempts += 1;
                let delay = self.config.reconnect_delay;
                warn!(
                    generation,
                    ?code,
                    attempt = shared.attempts,
                    max_attempts = self.config.max_reconnect_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "progress channel dropped, reconnecting"
                );
                self.set_state(ConnectionState::Connecting);

                let inner = Arc::clone(self);
                shared.reconnect = self.spawn(async move {
                    tokio::time::sleep(delay).await;
                    inner.reconnect(generation);
                });
                return;
            }

            self.set_state(ConnectionState::Error);
            shared.attempts
        };

        let err = FeedError::ReconnectExhausted { attempts };
        error!(generation, attempts, "giving up on progress channel");
        self.handlers().error(&err);
    }

    fn reconnect(self: &Arc<Self>, generation: u64) {
        let mut shared = self.shared.lock();
        if shared.generation != generation || shared.manual_disconnect {
            return;
        }
        shared.reconnect = None;
        let Some(task_id) = shared.task_id.clone() else {
            return;
        };
        debug!(task_id = %task_id, attempt = shared.attempts, "reconnect timer fired");
        self.open_link(&mut shared, &task_id);
    }
}

/// Reader loop for one socket generation.
async fn run_link(inner: Arc<Inner>, generation: u64, url: String, cancel: CancellationToken) {
    let connecting = inner.connector.connect(&url);
    let mut channel = tokio::select! {
        biased;
        () = cancel.cancelled() => {
            debug!(generation, "connect abandoned");
            return;
        }
        result = connecting => match result {
            Ok(channel) => channel,
            Err(e) => {
                warn!(generation, error = %e, "connect failed");
                inner.on_closed(generation, None);
                return;
            }
        },
    };
    debug!(generation, "socket open, awaiting handshake");

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                channel.close().await;
                return;
            }
            event = channel.recv() => match event {
                Some(ChannelEvent::Text(text)) => inner.on_frame(generation, &text),
                Some(ChannelEvent::Error(reason)) => {
                    warn!(generation, error = %reason, "socket error");
                }
                Some(ChannelEvent::Closed { code }) => {
                    inner.on_closed(generation, code);
                    return;
                }
                None => {
                    inner.on_closed(generation, None);
                    return;
                }
            },
        }
    }
}
