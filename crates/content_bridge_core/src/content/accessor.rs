//! Stream and metadata access over a host resolver.

use super::handle::ContentHandle;
use super::resolver::{ContentResolver, HostReader, HostWriter, WriteMode};
use crate::error::ResolutionError;
use crate::logging::sanitize_for_log;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::sync::Arc;

/// MIME type and display name of one handle; both independently optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentMetadata {
    pub mime_type: Option<String>,
    pub file_name: Option<String>,
}

/// Buffered readable stream over one host resource.
///
/// Dropping the stream closes the host resource.
pub struct ByteStream {
    inner: BufReader<HostReader>,
}

impl ByteStream {
    fn new(reader: HostReader) -> Self {
        Self {
            inner: BufReader::new(reader),
        }
    }
}

impl Read for ByteStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

/// Buffered writable sink over one host resource.
///
/// `finish` flushes and surfaces write errors; dropping without `finish`
/// still closes the resource but discards flush errors.
pub struct ByteSink {
    inner: BufWriter<HostWriter>,
}

impl ByteSink {
    fn new(writer: HostWriter) -> Self {
        Self {
            inner: BufWriter::new(writer),
        }
    }

    pub fn finish(mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl Write for ByteSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Content accessor shared by the bulk and streaming paths.
#[derive(Clone)]
pub struct ContentAccessor {
    resolver: Arc<dyn ContentResolver>,
}

impl ContentAccessor {
    pub fn new(resolver: Arc<dyn ContentResolver>) -> Self {
        Self { resolver }
    }

    /// Opens a buffered read stream for `handle`.
    pub fn open_read_stream(&self, handle: &ContentHandle) -> Result<ByteStream, ResolutionError> {
        match self.resolver.open_read(handle) {
            Ok(reader) => {
                debug!(
                    "event=stream_open module=content status=ok direction=read uri={}",
                    sanitize_for_log(handle.as_str())
                );
                Ok(ByteStream::new(reader))
            }
            Err(err) => Err(log_resolution_failure(handle, "read", err)),
        }
    }

    /// Opens a buffered write stream for `handle` under `mode`.
    pub fn open_write_stream(
        &self,
        handle: &ContentHandle,
        mode: WriteMode,
    ) -> Result<ByteSink, ResolutionError> {
        match self.resolver.open_write(handle, mode) {
            Ok(writer) => {
                debug!(
                    "event=stream_open module=content status=ok direction=write mode={} uri={}",
                    mode.as_host_mode(),
                    sanitize_for_log(handle.as_str())
                );
                Ok(ByteSink::new(writer))
            }
            Err(err) => Err(log_resolution_failure(handle, "write", err)),
        }
    }

    /// Queries MIME type and display name.
    ///
    /// A host without an answer yields an absent field, not an error.
    pub fn query_metadata(&self, handle: &ContentHandle) -> Result<ContentMetadata, ResolutionError> {
        let mime_type = self
            .resolver
            .mime_type(handle)
            .map_err(|err| log_resolution_failure(handle, "mime_type", err))?;
        let file_name = self
            .resolver
            .display_name(handle)
            .map_err(|err| log_resolution_failure(handle, "display_name", err))?;
        Ok(ContentMetadata {
            mime_type,
            file_name,
        })
    }
}

fn log_resolution_failure(handle: &ContentHandle, op: &str, err: io::Error) -> ResolutionError {
    warn!(
        "event=content_resolve module=content status=error op={op} uri={} error={err}",
        sanitize_for_log(handle.as_str())
    );
    ResolutionError::from_host(handle.as_str(), err)
}
