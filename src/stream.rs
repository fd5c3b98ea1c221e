//! Per-File Stream — owns a watcher and the last-known offset for one
//! path, and fans change events out to every subscribed session.

use crate::config::EngineConfig;
use crate::error::TailError;
use crate::reader;
use crate::session::SessionId;
use crate::watcher::ChangeWatcher;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;

struct StreamState {
    offset: u64,
    subscribers: HashMap<SessionId, Sender<Vec<u8>>>,
}

/// The shared, reference-counted stream for one file. `state` is guarded
/// by its own lock, distinct from the Registry's, and is never held
/// across a transport write (spec.md §5) — `std::sync::Mutex` is safe
/// here because no `.await` point ever occurs while it's held.
pub struct PerFileStream {
    path: PathBuf,
    state: Mutex<StreamState>,
}

/// Everything the Registry needs to track one live stream: the stream
/// itself plus the handle to its background change-handling task, so
/// teardown can cancel it.
pub struct StreamHandle {
    pub stream: Arc<PerFileStream>,
    pub task: JoinHandle<()>,
}

impl PerFileStream {
    /// Initialization protocol for the first subscriber of `path`
    /// (spec.md §4.C): backfill, status notice, offset install, watcher
    /// acquisition, and spawning the change-handling loop.
    pub fn init(
        path: PathBuf,
        first_session: SessionId,
        first_sender: Sender<Vec<u8>>,
        config: &EngineConfig,
    ) -> Result<StreamHandle, TailError> {
        let (lines, end_offset) = reader::last_lines(&path, config.backfill_lines, config.read_block_size)?;

        let watcher = ChangeWatcher::new(&path, config.watch_poll_interval, config.force_native_watcher)?;

        for line in &lines {
            crate::session::deliver_line(&first_sender, &path, line);
        }
        crate::session::deliver_status(&first_sender, &format!("Now watching {}", path.display()));

        let mut subscribers = HashMap::new();
        subscribers.insert(first_session, first_sender);
        let stream = Arc::new(PerFileStream {
            path: path.clone(),
            state: Mutex::new(StreamState {
                offset: end_offset,
                subscribers,
            }),
        });

        let loop_stream = stream.clone();
        let block_size = config.read_block_size;
        let task = tokio::spawn(async move {
            Self::run_loop(loop_stream, watcher, block_size).await;
        });

        Ok(StreamHandle { stream, task })
    }

    /// Additional-subscriber protocol (spec.md §4.C): backfill just for
    /// this subscriber, without resetting the stream's stored offset.
    pub fn add_subscriber(&self, session: SessionId, sender: Sender<Vec<u8>>, config: &EngineConfig) {
        {
            let mut state = self.state.lock().unwrap();
            state.subscribers.insert(session, sender.clone());
        }
        match reader::last_lines(&self.path, config.backfill_lines, config.read_block_size) {
            Ok((lines, _end_offset)) => {
                for line in &lines {
                    crate::session::deliver_line(&sender, &self.path, line);
                }
                crate::session::deliver_status(&sender, &format!("Now watching {}", self.path.display()));
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "backfill read failed for late subscriber");
                crate::session::deliver_error(&sender, &e.notice());
            }
        }
    }

    /// Removes `session` from the subscriber set. Returns `true` if the
    /// stream now has no subscribers and should be torn down by the
    /// Registry.
    pub fn remove_subscriber(&self, session: SessionId) -> bool {
        let mut state = self.state.lock().unwrap();
        state.subscribers.remove(&session);
        state.subscribers.is_empty()
    }

    /// Change-signal handling loop (spec.md §4.C): on each coalesced
    /// wakeup, read lines appended since the stored offset and forward
    /// each to every currently-subscribed, writable session.
    async fn run_loop(stream: Arc<PerFileStream>, watcher: ChangeWatcher, block_size: usize) {
        loop {
            watcher.changed().await;

            let (lines, subscribers) = {
                let mut state = stream.state.lock().unwrap();
                if state.subscribers.is_empty() {
                    return;
                }
                match reader::lines_since(&stream.path, state.offset, block_size) {
                    Ok((lines, new_offset)) => {
                        state.offset = new_offset;
                        let subs: Vec<Sender<Vec<u8>>> = state.subscribers.values().cloned().collect();
                        (lines, subs)
                    }
                    Err(TailError::Io { path, source }) => {
                        tracing::warn!(path = %path.display(), error = %source, "skipping change cycle after read error");
                        continue;
                    }
                    Err(TailError::NotFound(path)) => {
                        tracing::warn!(path = %path.display(), "file missing during tail, retaining offset and retrying");
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "unexpected error reading change cycle");
                        continue;
                    }
                }
            };

            for line in &lines {
                for sender in &subscribers {
                    crate::session::deliver_line(sender, &stream.path, line);
                }
            }
        }
    }
}
