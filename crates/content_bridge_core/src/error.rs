//! Error taxonomy for cross-boundary content operations.
//!
//! # Responsibility
//! - Define one error family per failure kind (resolution, allocation,
//!   transfer, protocol).
//! - Unify them in `BridgeError` so the dispatcher can normalize every failure
//!   into a single error channel.
//!
//! # Invariants
//! - Fine-grained kinds stay available through `BridgeError::kind()` and
//!   `Error::source()` for diagnostics even though the boundary only reports a
//!   generic code.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;

pub type BridgeResult<T> = Result<T, BridgeError>;

/// Handle could not be opened or queried through the host resolver.
#[derive(Debug)]
pub enum ResolutionError {
    InvalidHandle(String),
    NotFound { uri: String },
    PermissionDenied { uri: String },
    UnsupportedScheme { uri: String },
    Host { uri: String, source: io::Error },
}

impl ResolutionError {
    /// Translates a host resolver I/O error for `uri` into a resolution kind.
    pub fn from_host(uri: &str, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound {
                uri: uri.to_string(),
            },
            io::ErrorKind::PermissionDenied => Self::PermissionDenied {
                uri: uri.to_string(),
            },
            io::ErrorKind::Unsupported => Self::UnsupportedScheme {
                uri: uri.to_string(),
            },
            _ => Self::Host {
                uri: uri.to_string(),
                source: err,
            },
        }
    }
}

impl Display for ResolutionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidHandle(message) => write!(f, "invalid content handle: {message}"),
            Self::NotFound { uri } => write!(f, "content not found: {uri}"),
            Self::PermissionDenied { uri } => write!(f, "permission denied for content: {uri}"),
            Self::UnsupportedScheme { uri } => {
                write!(f, "content handle scheme is not supported: {uri}")
            }
            Self::Host { uri, source } => write!(f, "host failed to resolve `{uri}`: {source}"),
        }
    }
}

impl Error for ResolutionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Host { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Native memory could not be provided, or an address is not live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocationError {
    OutOfMemory {
        requested: usize,
    },
    LimitExceeded {
        requested: usize,
        live_bytes: usize,
        limit: usize,
    },
    SizeMismatch {
        address: u64,
        expected: usize,
        actual: usize,
    },
    NotLive {
        address: u64,
    },
    StaleHandle {
        address: u64,
        generation: u64,
        live_generation: u64,
    },
}

impl Display for AllocationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutOfMemory { requested } => {
                write!(f, "native allocation of {requested} bytes failed")
            }
            Self::LimitExceeded {
                requested,
                live_bytes,
                limit,
            } => write!(
                f,
                "native allocation of {requested} bytes exceeds arena limit {limit} ({live_bytes} bytes live)"
            ),
            Self::SizeMismatch {
                address,
                expected,
                actual,
            } => write!(
                f,
                "buffer {address:#x} holds {expected} bytes, refusing to fill with {actual}"
            ),
            Self::NotLive { address } => write!(f, "buffer address {address:#x} is not live"),
            Self::StaleHandle {
                address,
                generation,
                live_generation,
            } => write!(
                f,
                "buffer handle {address:#x}@{generation} is stale (live generation {live_generation})"
            ),
        }
    }
}

impl Error for AllocationError {}

/// I/O failure while copying content.
#[derive(Debug)]
pub enum TransferError {
    Read(io::Error),
    Write(io::Error),
    TooLarge { limit: usize },
    LocalFile { path: String, source: io::Error },
}

impl Display for TransferError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read(err) => write!(f, "content read failed: {err}"),
            Self::Write(err) => write!(f, "content write failed: {err}"),
            Self::TooLarge { limit } => write!(
                f,
                "content exceeds bulk transfer limit of {limit} bytes; use streaming"
            ),
            Self::LocalFile { path, source } => {
                write!(f, "local file `{path}` could not be written: {source}")
            }
        }
    }
}

impl Error for TransferError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Read(err) | Self::Write(err) => Some(err),
            Self::LocalFile { source, .. } => Some(source),
            Self::TooLarge { .. } => None,
        }
    }
}

/// Push or acknowledgment failure on the boundary channel.
#[derive(Debug)]
pub enum ProtocolError {
    ChannelClosed,
    AckTimeout { offset: u64, timeout_ms: u128 },
    UnexpectedAck { expected: u64, received: u64 },
    AckBacklog { session_id: u64 },
    SessionNotFound(u64),
    SessionIdInUse(u64),
    Spawn(io::Error),
    WorkerPanicked(u64),
}

impl Display for ProtocolError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ChannelClosed => write!(f, "boundary channel is closed"),
            Self::AckTimeout { offset, timeout_ms } => write!(
                f,
                "no acknowledgment for chunk at offset {offset} within {timeout_ms} ms"
            ),
            Self::UnexpectedAck { expected, received } => write!(
                f,
                "acknowledgment for offset {received} does not match in-flight chunk at offset {expected}"
            ),
            Self::AckBacklog { session_id } => write!(
                f,
                "session {session_id} already has a pending acknowledgment"
            ),
            Self::SessionNotFound(id) => write!(f, "stream session not found: {id}"),
            Self::SessionIdInUse(id) => write!(f, "stream session id already in use: {id}"),
            Self::Spawn(err) => write!(f, "failed to start stream worker: {err}"),
            Self::WorkerPanicked(id) => write!(f, "stream worker for session {id} panicked"),
        }
    }
}

impl Error for ProtocolError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Spawn(err) => Some(err),
            _ => None,
        }
    }
}

/// Coarse failure classification, kept for diagnostics and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Resolution,
    Allocation,
    Transfer,
    Protocol,
    InvalidArgument,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Resolution => "resolution",
            Self::Allocation => "allocation",
            Self::Transfer => "transfer",
            Self::Protocol => "protocol",
            Self::InvalidArgument => "invalid_argument",
        }
    }
}

/// Unified error for every bridge operation.
#[derive(Debug)]
pub enum BridgeError {
    Resolution(ResolutionError),
    Allocation(AllocationError),
    Transfer(TransferError),
    Protocol(ProtocolError),
    InvalidArgument(String),
}

impl BridgeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Resolution(_) => ErrorKind::Resolution,
            Self::Allocation(_) => ErrorKind::Allocation,
            Self::Transfer(_) => ErrorKind::Transfer,
            Self::Protocol(_) => ErrorKind::Protocol,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
        }
    }
}

impl Display for BridgeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Resolution(err) => write!(f, "{err}"),
            Self::Allocation(err) => write!(f, "{err}"),
            Self::Transfer(err) => write!(f, "{err}"),
            Self::Protocol(err) => write!(f, "{err}"),
            Self::InvalidArgument(message) => write!(f, "invalid argument: {message}"),
        }
    }
}

impl Error for BridgeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Resolution(err) => Some(err),
            Self::Allocation(err) => Some(err),
            Self::Transfer(err) => Some(err),
            Self::Protocol(err) => Some(err),
            Self::InvalidArgument(_) => None,
        }
    }
}

impl From<ResolutionError> for BridgeError {
    fn from(value: ResolutionError) -> Self {
        Self::Resolution(value)
    }
}

impl From<AllocationError> for BridgeError {
    fn from(value: AllocationError) -> Self {
        Self::Allocation(value)
    }
}

impl From<TransferError> for BridgeError {
    fn from(value: TransferError) -> Self {
        Self::Transfer(value)
    }
}

impl From<ProtocolError> for BridgeError {
    fn from(value: ProtocolError) -> Self {
        Self::Protocol(value)
    }
}

#[cfg(test)]
mod tests {
    use super::{BridgeError, ErrorKind, ResolutionError};
    use std::error::Error;
    use std::io;

    #[test]
    fn host_errors_map_to_resolution_kinds() {
        let not_found = ResolutionError::from_host(
            "content://a",
            io::Error::new(io::ErrorKind::NotFound, "gone"),
        );
        assert!(matches!(not_found, ResolutionError::NotFound { .. }));

        let denied = ResolutionError::from_host(
            "content://a",
            io::Error::new(io::ErrorKind::PermissionDenied, "nope"),
        );
        assert!(matches!(denied, ResolutionError::PermissionDenied { .. }));

        let other = ResolutionError::from_host("content://a", io::Error::other("boom"));
        assert!(other.source().is_some());
    }

    #[test]
    fn bridge_error_keeps_kind_and_source() {
        let err = BridgeError::from(ResolutionError::NotFound {
            uri: "content://missing".to_string(),
        });
        assert_eq!(err.kind(), ErrorKind::Resolution);
        assert!(err.source().is_some());
        assert!(err.to_string().contains("content://missing"));
    }
}
