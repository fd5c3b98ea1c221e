//! Tail engine — the core subsystem of a real-time log tailing service.
//!
//! Extracts the last N lines of an arbitrarily large file, tracks
//! per-file byte offsets to stream only newly-appended content, fans a
//! single file watcher out to many subscribers, and maintains the
//! client/file subscription graph across concurrent attach/detach and
//! disconnect events — all under a bounded memory footprint.
//!
//! The outward transport, HTTP surface, and process bootstrap are
//! external collaborators; this crate exposes only the core-facing API
//! (`Engine`) they call into.

pub mod config;
pub mod error;
pub mod protocol;
mod reader;
mod registry;
mod session;
mod stream;
mod watcher;

pub use config::EngineConfig;
pub use error::TailError;
pub use protocol::{InboundMessage, OutboundMessage};
pub use session::{ClientSession, SessionId};

use registry::Registry;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::Sender;

/// The core-facing API exposed to the surrounding HTTP/WebSocket layer
/// (spec.md §6). One `Engine` owns the whole subscription graph; clone
/// the `Arc` to share it across connection handlers.
pub struct Engine {
    registry: Registry,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Arc<Self> {
        Arc::new(Self {
            registry: Registry::new(config),
        })
    }

    /// Mint a new session bound to `outbound`, the transport's sink for
    /// this session's encoded `OutboundMessage`s.
    pub fn new_session(&self, outbound: Sender<Vec<u8>>) -> ClientSession {
        ClientSession::new(SessionId::next(), outbound)
    }

    pub fn attach(&self, session: &ClientSession, path: PathBuf) {
        self.registry.attach(session, path);
    }

    pub fn detach(&self, session: &ClientSession, path: &std::path::Path) {
        self.registry.detach(session, path);
    }

    pub fn disconnect(&self, session: &ClientSession) {
        self.registry.disconnect(session);
    }

    /// Parses and dispatches one control message. Unparseable input
    /// produces no state change and is only logged (spec.md §6, §7).
    pub fn handle_inbound(&self, session: &ClientSession, raw_bytes: &[u8]) {
        match serde_json::from_slice::<InboundMessage>(raw_bytes) {
            Ok(InboundMessage::Watch { file_path }) => self.attach(session, file_path),
            Ok(InboundMessage::Unwatch { file_path }) => self.detach(session, &file_path),
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed control message");
            }
        }
    }

    /// Cancels all watchers and drops all sessions without sending
    /// further events. Idempotent.
    pub fn shutdown(&self) {
        self.registry.shutdown();
    }

    #[cfg(test)]
    pub(crate) fn registry(&self) -> &Registry {
        &self.registry
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

    async fn recv_message(rx: &mut mpsc::Receiver<Vec<u8>>) -> OutboundMessage {
        let bytes = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for message")
            .expect("channel closed");
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn attach_delivers_backfill_then_status() {
        let file = write_file("one\ntwo\nthree\n");
        let engine = Engine::new(EngineConfig::default());
        let (tx, mut rx) = mpsc::channel(16);
        let session = engine.new_session(tx);

        engine.attach(&session, file.path().to_path_buf());

        for expected in ["one", "two", "three"] {
            match recv_message(&mut rx).await {
                OutboundMessage::Line { data, .. } => assert_eq!(data, expected),
                other => panic!("expected line, got {other:?}"),
            }
        }
        match recv_message(&mut rx).await {
            OutboundMessage::Status { message } => assert!(message.contains("Now watching")),
            other => panic!("expected status, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn attach_to_missing_file_sends_error_and_no_status() {
        let engine = Engine::new(EngineConfig::default());
        let (tx, mut rx) = mpsc::channel(16);
        let session = engine.new_session(tx);

        engine.attach(&session, PathBuf::from("/nonexistent/does-not-exist.log"));

        match recv_message(&mut rx).await {
            OutboundMessage::Error { message } => assert!(message.contains("File not found")),
            other => panic!("expected error, got {other:?}"),
        }
        assert_eq!(engine.registry().stream_count(), 0);
    }

    #[tokio::test]
    async fn disconnect_detaches_every_watched_path() {
        let file_a = write_file("a\n");
        let file_b = write_file("b\n");
        let engine = Engine::new(EngineConfig::default());
        let (tx, mut rx) = mpsc::channel(16);
        let session = engine.new_session(tx);

        engine.attach(&session, file_a.path().to_path_buf());
        engine.attach(&session, file_b.path().to_path_buf());
        // Drain backfill/status for both.
        for _ in 0..4 {
            recv_message(&mut rx).await;
        }
        assert_eq!(engine.registry().session_path_count(session.id()), 2);

        engine.disconnect(&session);
        assert_eq!(engine.registry().stream_count(), 0);
        assert_eq!(engine.registry().session_path_count(session.id()), 0);
    }

    #[test]
    fn handle_inbound_ignores_malformed_json() {
        let engine = Engine::new(EngineConfig::default());
        let (tx, _rx) = mpsc::channel(16);
        let session = engine.new_session(tx);
        engine.handle_inbound(&session, b"not json at all");
        assert_eq!(engine.registry().stream_count(), 0);
    }
}
