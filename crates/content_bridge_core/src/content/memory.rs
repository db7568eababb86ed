//! In-process resolver backed by a URI map.

use super::handle::ContentHandle;
use super::resolver::{ContentResolver, HostReader, HostWriter, WriteMode};
use std::collections::BTreeMap;
use std::io::{self, Cursor, Write};
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Clone, Default)]
struct MemoryEntry {
    bytes: Vec<u8>,
    mime_type: Option<String>,
    display_name: Option<String>,
}

type EntryMap = Arc<RwLock<BTreeMap<String, MemoryEntry>>>;

/// Resolver over an in-memory map of URI to bytes and metadata.
///
/// Writes to an unknown URI create the entry.
#[derive(Debug, Default)]
pub struct MemoryContentResolver {
    entries: EntryMap,
}

impl MemoryContentResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, uri: &str, bytes: Vec<u8>) {
        self.insert_with_metadata(uri, bytes, None, None);
    }

    pub fn insert_with_metadata(
        &self,
        uri: &str,
        bytes: Vec<u8>,
        mime_type: Option<&str>,
        display_name: Option<&str>,
    ) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(
            uri.to_string(),
            MemoryEntry {
                bytes,
                mime_type: mime_type.map(str::to_string),
                display_name: display_name.map(str::to_string),
            },
        );
    }

    /// Drops `uri`; open writers for it fail from then on.
    pub fn remove(&self, uri: &str) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(uri).is_some()
    }

    /// Current bytes stored for `uri`.
    pub fn bytes(&self, uri: &str) -> Option<Vec<u8>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(uri).map(|entry| entry.bytes.clone())
    }

    fn with_entry<T>(
        &self,
        handle: &ContentHandle,
        f: impl FnOnce(&MemoryEntry) -> T,
    ) -> io::Result<T> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(handle.as_str())
            .map(f)
            .ok_or_else(|| not_found(handle))
    }
}

impl ContentResolver for MemoryContentResolver {
    fn open_read(&self, handle: &ContentHandle) -> io::Result<HostReader> {
        let bytes = self.with_entry(handle, |entry| entry.bytes.clone())?;
        Ok(Box::new(Cursor::new(bytes)))
    }

    fn open_write(&self, handle: &ContentHandle, mode: WriteMode) -> io::Result<HostWriter> {
        {
            let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            let entry = entries.entry(handle.as_str().to_string()).or_default();
            if mode == WriteMode::Truncate {
                entry.bytes.clear();
            }
        }
        Ok(Box::new(MemoryWriter {
            entries: Arc::clone(&self.entries),
            uri: handle.as_str().to_string(),
        }))
    }

    fn mime_type(&self, handle: &ContentHandle) -> io::Result<Option<String>> {
        self.with_entry(handle, |entry| entry.mime_type.clone())
    }

    fn display_name(&self, handle: &ContentHandle) -> io::Result<Option<String>> {
        self.with_entry(handle, |entry| entry.display_name.clone())
    }
}

struct MemoryWriter {
    entries: EntryMap,
    uri: String,
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.get_mut(&self.uri).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("content removed while writing: {}", self.uri),
            )
        })?;
        entry.bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn not_found(handle: &ContentHandle) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("no content registered for {handle}"),
    )
}
