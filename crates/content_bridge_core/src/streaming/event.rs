//! Push events and acknowledgments exchanged with the caller.

use serde::Serialize;

/// Session identifier carried by every event of one stream.
pub type SessionId = u64;

/// Event pushed across the boundary for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum StreamEvent {
    /// One chunk; the caller must acknowledge it before the next is sent.
    Data {
        id: SessionId,
        offset: u64,
        data: Vec<u8>,
    },
    /// Terminal success; no acknowledgment expected.
    Close {
        id: SessionId,
        #[serde(rename = "totalSize")]
        total_size: u64,
    },
    /// Terminal failure after zero or more chunks.
    Abort {
        id: SessionId,
        offset: u64,
        cause: String,
    },
}

impl StreamEvent {
    pub fn id(&self) -> SessionId {
        match self {
            Self::Data { id, .. } | Self::Close { id, .. } | Self::Abort { id, .. } => *id,
        }
    }

    /// Boundary event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Data { .. } => "data",
            Self::Close { .. } => "close",
            Self::Abort { .. } => "abort",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Data { .. })
    }
}

/// Caller acknowledgment of the chunk starting at `offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Acknowledgement {
    pub offset: u64,
}
