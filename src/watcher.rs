//! File Watcher — observes one file for append events and emits a
//! coalesceable change signal. Native notification via `notify`, same as
//! `tail.rs`'s `FileTail::watch`: watch the parent directory and filter
//! events down to the target path. Falls back to polling (mirroring the
//! teacher's separate `PollingFileTail`) when native construction fails.

use crate::error::TailError;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

fn is_relevant_event(event: &Event, path: &Path) -> bool {
    match event.kind {
        EventKind::Modify(_) | EventKind::Create(_) => {
            event.paths.iter().any(|p| p == path)
        }
        _ => false,
    }
}

enum Backend {
    Native {
        _watcher: RecommendedWatcher,
    },
    Polling {
        task: JoinHandle<()>,
    },
}

impl Drop for Backend {
    fn drop(&mut self) {
        // The native watcher's own Drop unregisters it. The polling
        // fallback is a detached tokio task and must be aborted
        // explicitly, or it would poll forever after the stream that
        // owns it is torn down.
        if let Backend::Polling { task } = self {
            task.abort();
        }
    }
}

/// A single watcher on one file. Dropping it releases the native watcher
/// or aborts the polling task; release is therefore idempotent (it is
/// just a drop).
pub struct ChangeWatcher {
    signal: Arc<Notify>,
    _backend: Backend,
}

impl ChangeWatcher {
    pub fn new(path: &Path, poll_interval: Duration, force_native: bool) -> Result<Self, TailError> {
        let signal = Arc::new(Notify::new());

        match Self::try_native(path, poll_interval, signal.clone()) {
            Ok(watcher) => Ok(Self {
                signal,
                _backend: Backend::Native { _watcher: watcher },
            }),
            Err(e) => {
                if force_native {
                    return Err(e);
                }
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "native file watcher unavailable, falling back to polling"
                );
                let task = Self::spawn_polling(poll_interval, signal.clone());
                Ok(Self {
                    signal,
                    _backend: Backend::Polling { task },
                })
            }
        }
    }

    fn try_native(
        path: &Path,
        poll_interval: Duration,
        signal: Arc<Notify>,
    ) -> Result<RecommendedWatcher, TailError> {
        let target = path.to_path_buf();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                if let Ok(event) = res {
                    if is_relevant_event(&event, &target) {
                        signal.notify_one();
                    }
                }
            },
            Config::default().with_poll_interval(poll_interval),
        )
        .map_err(|_| TailError::WatchUnavailable(path.to_path_buf()))?;

        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        watcher
            .watch(parent, RecursiveMode::NonRecursive)
            .map_err(|e| classify_watch_error(path, e))?;

        Ok(watcher)
    }

    fn spawn_polling(interval: Duration, signal: Arc<Notify>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                signal.notify_one();
            }
        })
    }

    /// Wait for the next coalesced change signal. Multiple signals that
    /// arrive before this is polled collapse into a single wakeup.
    pub async fn changed(&self) {
        self.signal.notified().await;
    }
}

fn classify_watch_error(path: &Path, e: notify::Error) -> TailError {
    match e.kind {
        notify::ErrorKind::PathNotFound => TailError::NotFound(path.to_path_buf()),
        _ => TailError::WatchUnavailable(path.to_path_buf()),
    }
}
