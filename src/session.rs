//! Client Session — per-transport state that converts inbound control
//! messages into registry calls, and delivery events into transport
//! writes. One `ClientSession` per connected transport endpoint.

use crate::protocol::OutboundMessage;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::Sender;

/// Opaque session identifier, minted by the engine (`Engine::new_session`)
/// rather than chosen by the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

impl SessionId {
    pub(crate) fn next() -> Self {
        SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A session's transport handle is a bounded byte-sink channel — the same
/// raw-bytes-over-channel shape `tail.rs` already uses for its
/// `tokio_mpsc::Sender<Vec<u8>>`. Each message is one JSON object,
/// already encoded; framing those onto the wire is the transport's job.
pub struct ClientSession {
    id: SessionId,
    outbound: Sender<Vec<u8>>,
}

impl ClientSession {
    pub(crate) fn new(id: SessionId, outbound: Sender<Vec<u8>>) -> Self {
        Self { id, outbound }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub(crate) fn outbound(&self) -> Sender<Vec<u8>> {
        self.outbound.clone()
    }

    /// Best-effort error notice for an attach/add-subscriber attempt
    /// that failed outright — every `TailError` variant is reported
    /// this way (see `TailError::notice`).
    pub fn send_error(&self, message: &str) {
        deliver_error(&self.outbound, message);
    }
}

/// Deliver one line to a subscriber. Best-effort: if the channel is full
/// or the session has disconnected, the line is dropped for this
/// delivery — no per-session buffering beyond the channel's own capacity
/// (spec.md §4.E, §5).
pub(crate) fn deliver_line(sender: &Sender<Vec<u8>>, path: &Path, data: &str) {
    let msg = OutboundMessage::Line {
        data: data.to_owned(),
        file_path: path.display().to_string(),
    };
    try_deliver(sender, msg);
}

pub(crate) fn deliver_status(sender: &Sender<Vec<u8>>, message: &str) {
    try_deliver(sender, OutboundMessage::Status { message: message.to_owned() });
}

pub(crate) fn deliver_error(sender: &Sender<Vec<u8>>, message: &str) {
    try_deliver(sender, OutboundMessage::Error { message: message.to_owned() });
}

fn try_deliver(sender: &Sender<Vec<u8>>, msg: OutboundMessage) {
    if sender.try_send(msg.encode()).is_err() {
        tracing::debug!("dropping delivery: session transport not writable");
    }
}
