//! Subscription Registry — the single coordinator of the (session ↔
//! path) graph and of Per-File Stream lifecycles. Modeled on
//! `asayers-tailsrv`'s `Librarian`: a path→stream map and a
//! session→watched-paths map kept consistent under one short critical
//! section, with streams created and torn down by reference count.

use crate::config::EngineConfig;
use crate::session::{ClientSession, SessionId};
use crate::stream::{PerFileStream, StreamHandle};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

struct RegistryState {
    streams: HashMap<PathBuf, StreamHandle>,
    sessions: HashMap<SessionId, HashSet<PathBuf>>,
}

/// Guarded by one `std::sync::Mutex`, never held across an `.await` —
/// registry mutations are non-blocking by construction (spec.md §5).
pub struct Registry {
    state: Mutex<RegistryState>,
    config: EngineConfig,
}

impl Registry {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            state: Mutex::new(RegistryState {
                streams: HashMap::new(),
                sessions: HashMap::new(),
            }),
            config,
        }
    }

    /// `attach(session, path)` per spec.md §4.D. Held under one lock
    /// acquisition for its whole check-then-act: a concurrent `attach` on
    /// the same new path cannot create a second stream, and a concurrent
    /// `detach`/`disconnect` cannot tear a stream down between the
    /// existence check and this session joining its subscriber set.
    pub fn attach(&self, session: &ClientSession, path: PathBuf) {
        let mut state = self.state.lock().unwrap();

        if let Some(handle) = state.streams.get(&path) {
            let stream = handle.stream.clone();
            stream.add_subscriber(session.id(), session.outbound(), &self.config);
            state.sessions.entry(session.id()).or_default().insert(path);
            return;
        }

        match PerFileStream::init(path.clone(), session.id(), session.outbound(), &self.config) {
            Ok(handle) => {
                state.streams.insert(path.clone(), handle);
                state.sessions.entry(session.id()).or_default().insert(path);
            }
            Err(e) => {
                drop(state);
                tracing::info!(path = %path.display(), error = %e, "attach failed");
                session.send_error(&e.notice());
            }
        }
    }

    /// `detach(session, path)` per spec.md §4.D. Idempotent: a session
    /// not subscribed to `path` is simply a no-op.
    pub fn detach(&self, session: &ClientSession, path: &Path) {
        let stream = {
            let mut state = self.state.lock().unwrap();
            if let Some(paths) = state.sessions.get_mut(&session.id()) {
                paths.remove(path);
            }
            state.streams.get(path).map(|h| h.stream.clone())
        };
        let Some(stream) = stream else { return };
        self.drop_subscriber(path, &stream, session.id());
    }

    /// `disconnect(session)` per spec.md §4.D: detach from every watched
    /// path, then remove the session entirely.
    pub fn disconnect(&self, session: &ClientSession) {
        let paths: Vec<PathBuf> = {
            let mut state = self.state.lock().unwrap();
            state
                .sessions
                .remove(&session.id())
                .map(|s| s.into_iter().collect())
                .unwrap_or_default()
        };
        for path in paths {
            let stream = {
                let state = self.state.lock().unwrap();
                state.streams.get(&path).map(|h| h.stream.clone())
            };
            if let Some(stream) = stream {
                self.drop_subscriber(&path, &stream, session.id());
            }
        }
    }

    fn drop_subscriber(&self, path: &Path, stream: &Arc<PerFileStream>, session: SessionId) {
        let now_empty = stream.remove_subscriber(session);
        if now_empty {
            let mut state = self.state.lock().unwrap();
            if let Some(handle) = state.streams.remove(path) {
                handle.task.abort();
                tracing::info!(path = %path.display(), "released watcher, last subscriber departed");
            }
        }
    }

    /// Cancels every live watcher task and drops all sessions without
    /// sending further events. Idempotent.
    pub fn shutdown(&self) {
        let mut state = self.state.lock().unwrap();
        for (_, handle) in state.streams.drain() {
            handle.task.abort();
        }
        state.sessions.clear();
    }

    #[cfg(test)]
    pub fn stream_count(&self) -> usize {
        self.state.lock().unwrap().streams.len()
    }

    #[cfg(test)]
    pub fn session_path_count(&self, session: SessionId) -> usize {
        self.state
            .lock()
            .unwrap()
            .sessions
            .get(&session)
            .map(|s| s.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn write_file(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    fn new_session() -> (ClientSession, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(16);
        (ClientSession::new(SessionId::next(), tx), rx)
    }

    async fn recv(rx: &mut mpsc::Receiver<Vec<u8>>) -> serde_json::Value {
        let bytes = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out")
            .expect("channel closed");
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn second_subscriber_keeps_receiving_after_first_detaches() {
        let file = write_file("one\n");
        let registry = Registry::new(EngineConfig::default());
        let (session_a, mut rx_a) = new_session();
        let (session_b, mut rx_b) = new_session();

        registry.attach(&session_a, file.path().to_path_buf());
        recv(&mut rx_a).await; // backfill line
        recv(&mut rx_a).await; // status

        registry.attach(&session_b, file.path().to_path_buf());
        recv(&mut rx_b).await;
        recv(&mut rx_b).await;
        assert_eq!(registry.stream_count(), 1);

        registry.detach(&session_a, file.path());
        assert_eq!(registry.stream_count(), 1);

        let mut appender = std::fs::OpenOptions::new().append(true).open(file.path()).unwrap();
        appender.write_all(b"two\n").unwrap();
        drop(appender);

        let msg = recv(&mut rx_b).await;
        assert_eq!(msg["type"], "line");
        assert_eq!(msg["data"], "two");

        assert!(
            tokio::time::timeout(Duration::from_millis(300), rx_a.recv()).await.is_err(),
            "a detached session must not keep receiving lines from the stream"
        );
    }

    #[tokio::test]
    async fn detaching_a_never_attached_path_is_a_no_op() {
        let file = write_file("one\n");
        let registry = Registry::new(EngineConfig::default());
        let (session, _rx) = new_session();

        registry.detach(&session, file.path());
        assert_eq!(registry.stream_count(), 0);
        assert_eq!(registry.session_path_count(session.id()), 0);
    }

    #[tokio::test]
    async fn last_subscriber_departing_tears_down_the_stream() {
        let file = write_file("one\n");
        let registry = Registry::new(EngineConfig::default());
        let (session, mut rx) = new_session();

        registry.attach(&session, file.path().to_path_buf());
        recv(&mut rx).await;
        recv(&mut rx).await;
        assert_eq!(registry.stream_count(), 1);

        registry.detach(&session, file.path());
        assert_eq!(registry.stream_count(), 0);
    }
}
