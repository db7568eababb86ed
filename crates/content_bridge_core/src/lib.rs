//! Core content bridge between a managed UI runtime and host content storage.
//! This crate owns buffer lifetimes, transfer semantics and stream sessions.

pub mod arena;
pub mod config;
pub mod content;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod streaming;
pub mod transfer;

pub use arena::{ArenaStats, BufferHandle, NativeBuffer, NativeBufferArena, PendingBuffer};
pub use config::{BridgeConfig, ConfigError};
pub use content::{
    ContentAccessor, ContentHandle, ContentMetadata, ContentResolver, FileContentResolver,
    MemoryContentResolver, WriteMode,
};
pub use dispatch::{CallValue, MethodCall, MethodResponse, RequestDispatcher, Route};
pub use error::{
    AllocationError, BridgeError, BridgeResult, ErrorKind, ProtocolError, ResolutionError,
    TransferError,
};
pub use logging::{default_log_level, init_logging, logging_status, LogLevel, LoggingStatus};
pub use streaming::{
    event_channel, ChannelEventSink, EventSink, SessionId, SessionOutcome, StreamEvent,
    StreamTask, StreamingProtocol,
};
pub use transfer::{BulkTransfer, FetchedContent};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
