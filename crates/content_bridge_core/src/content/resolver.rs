//! Host content-resolution collaborator contract.

use super::handle::ContentHandle;
use std::io::{self, Read, Write};

pub type HostReader = Box<dyn Read + Send>;
pub type HostWriter = Box<dyn Write + Send>;

/// Open mode for write streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Truncate,
    Append,
}

impl WriteMode {
    /// Parses either a descriptor mode string (`w`, `wt`, `rwt`, `wa`) or a
    /// named mode (`truncate`, `append`).
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "w" | "wt" | "rwt" | "truncate" => Some(Self::Truncate),
            "wa" | "append" => Some(Self::Append),
            _ => None,
        }
    }

    /// Descriptor mode string passed to hosts that speak file modes.
    pub fn as_host_mode(self) -> &'static str {
        match self {
            Self::Truncate => "wt",
            Self::Append => "wa",
        }
    }
}

/// Host platform facility that resolves handles to streams and metadata.
///
/// Implementations report failures as `io::Error`; the accessor maps
/// `NotFound`, `PermissionDenied` and `Unsupported` kinds to dedicated
/// resolution errors.
pub trait ContentResolver: Send + Sync {
    fn open_read(&self, handle: &ContentHandle) -> io::Result<HostReader>;
    fn open_write(&self, handle: &ContentHandle, mode: WriteMode) -> io::Result<HostWriter>;
    /// MIME type, or `None` when the host has no answer.
    fn mime_type(&self, handle: &ContentHandle) -> io::Result<Option<String>>;
    /// Display name, or `None` when the host has no answer.
    fn display_name(&self, handle: &ContentHandle) -> io::Result<Option<String>>;
}
