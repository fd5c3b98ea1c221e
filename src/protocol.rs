//! Wire protocol — JSON control and event messages exchanged with the
//! surrounding transport, as specified in spec.md §6. Shaped with serde
//! tagged enums the way the teacher's `protocol.rs` wraps its sub-payloads
//! (`HandshakePayload`) in serde, just JSON end-to-end here instead of a
//! length-prefixed binary frame — the core has no framing opinion, that's
//! left to the transport.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Inbound control messages, parsed from the raw bytes a transport hands
/// to `Engine::handle_inbound`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InboundMessage {
    Watch {
        #[serde(rename = "filePath")]
        file_path: PathBuf,
    },
    Unwatch {
        #[serde(rename = "filePath")]
        file_path: PathBuf,
    },
}

/// Outbound event messages, delivered to a session's transport handle.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutboundMessage {
    Line {
        data: String,
        #[serde(rename = "filePath")]
        file_path: String,
    },
    Status {
        message: String,
    },
    Error {
        message: String,
    },
}

impl OutboundMessage {
    /// Encode to the bytes handed to a session's outbound channel. A
    /// failure here would mean a non-UTF8-safe value snuck into a
    /// message, which never happens given how these are constructed.
    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("OutboundMessage always serializes")
    }
}
