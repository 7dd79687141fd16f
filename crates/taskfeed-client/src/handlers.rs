use std::fmt;
use std::sync::Arc;

use taskfeed_core::{DownloadProgress, FeedError};

/// Payload of a `complete` frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Completion {
    pub downloaded_count: u64,
    pub message: Option<String>,
}

type ConnectedFn = Arc<dyn Fn() + Send + Sync>;
type ProgressFn = Arc<dyn Fn(&DownloadProgress) + Send + Sync>;
type CompleteFn = Arc<dyn Fn(&Completion) + Send + Sync>;
type ErrorFn = Arc<dyn Fn(&FeedError) + Send + Sync>;

/// Caller callbacks for one subscription. Every field is optional.
///
/// The manager looks up its current handler set each time it dispatches,
/// so replacing handlers takes effect for the very next frame.
#[derive(Clone, Default)]
pub struct ProgressHandlers {
    on_connected: Option<ConnectedFn>,
    on_progress: Option<ProgressFn>,
    on_complete: Option<CompleteFn>,
    on_error: Option<ErrorFn>,
}

impl ProgressHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_connected(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_connected = Some(Arc::new(f));
        self
    }

    pub fn on_progress(mut self, f: impl Fn(&DownloadProgress) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(f));
        self
    }

    pub fn on_complete(mut self, f: impl Fn(&Completion) + Send + Sync + 'static) -> Self {
        self.on_complete = Some(Arc::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&FeedError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Run `self`'s callbacks, then `next`'s, for every event.
    pub fn and_then(self, next: ProgressHandlers) -> Self {
        Self {
            on_connected: chain(self.on_connected, next.on_connected, |a, b| {
                Arc::new(move || {
                    a();
                    b();
                })
            }),
            on_progress: chain(self.on_progress, next.on_progress, |a, b| {
                Arc::new(move |p: &DownloadProgress| {
                    a(p);
                    b(p);
                })
            }),
            on_complete: chain(self.on_complete, next.on_complete, |a, b| {
                Arc::new(move |c: &Completion| {
                    a(c);
                    b(c);
                })
            }),
            on_error: chain(self.on_error, next.on_error, |a, b| {
                Arc::new(move |e: &FeedError| {
                    a(e);
                    b(e);
                })
            }),
        }
    }

    pub(crate) fn connected(&self) {
        if let Some(f) = &self.on_connected {
            f();
        }
    }

    pub(crate) fn progress(&self, progress: &DownloadProgress) {
        if let Some(f) = &self.on_progress {
            f(progress);
        }
    }

    pub(crate) fn complete(&self, completion: &Completion) {
        if let Some(f) = &self.on_complete {
            f(completion);
        }
    }

    pub(crate) fn error(&self, error: &FeedError) {
        if let Some(f) = &self.on_error {
            f(error);
        }
    }
}

fn chain<T: ?Sized>(
    first: Option<Arc<T>>,
    second: Option<Arc<T>>,
    both: impl FnOnce(Arc<T>, Arc<T>) -> Arc<T>,
) -> Option<Arc<T>> {
    match (first, second) {
        (Some(a), Some(b)) => Some(both(a, b)),
        (a, b) => a.or(b),
    }
}

impl fmt::Debug for ProgressHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressHandlers")
            .field("on_connected", &self.on_connected.is_some())
            .field("on_progress", &self.on_progress.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}
