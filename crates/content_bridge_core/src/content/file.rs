//! Resolver for `file://` handles on the local filesystem.

use super::handle::ContentHandle;
use super::resolver::{ContentResolver, HostReader, HostWriter, WriteMode};
use std::fs::{File, OpenOptions};
use std::io;
use std::path::PathBuf;
use url::Url;

const FILE_SCHEME: &str = "file";

/// Host resolver for `file:` URIs.
///
/// Only absolute paths without `..` components are accepted. Percent-encoded
/// octets in the path are decoded. MIME type is derived from the file
/// extension; display name is the last path segment.
#[derive(Debug, Clone, Default)]
pub struct FileContentResolver;

impl FileContentResolver {
    pub fn new() -> Self {
        Self
    }

    /// Maps a `file:` handle to a local path.
    pub fn resolve_path(&self, handle: &ContentHandle) -> io::Result<PathBuf> {
        if handle.scheme() != FILE_SCHEME {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("scheme `{}` is not served by the file resolver", handle.scheme()),
            ));
        }

        let rest = handle.scheme_specific_part();
        let path_part = match rest.strip_prefix("//") {
            Some(authority_and_path) => {
                let slash = authority_and_path.find('/').unwrap_or(authority_and_path.len());
                let (authority, path) = authority_and_path.split_at(slash);
                if !authority.is_empty() && !authority.eq_ignore_ascii_case("localhost") {
                    return Err(invalid_input(format!(
                        "remote file authority `{authority}` is not supported"
                    )));
                }
                path
            }
            None => rest,
        };

        if !path_part.starts_with('/') {
            return Err(invalid_input(format!(
                "file handle must name an absolute path, got `{path_part}`"
            )));
        }
        if path_part.split('/').any(is_parent_segment) {
            return Err(invalid_input(format!(
                "file handle must not contain `..`, got `{path_part}`"
            )));
        }

        let url = Url::parse(handle.as_str())
            .map_err(|err| invalid_input(format!("malformed file handle `{handle}`: {err}")))?;
        url.to_file_path()
            .map_err(|()| invalid_input(format!("file handle `{handle}` has no local path")))
    }
}

/// `..` in raw or percent-encoded form (`.%2e`, `%2E%2E`, ...).
fn is_parent_segment(segment: &str) -> bool {
    segment.to_ascii_lowercase().replace("%2e", ".") == ".."
}

impl ContentResolver for FileContentResolver {
    fn open_read(&self, handle: &ContentHandle) -> io::Result<HostReader> {
        let path = self.resolve_path(handle)?;
        Ok(Box::new(File::open(path)?))
    }

    fn open_write(&self, handle: &ContentHandle, mode: WriteMode) -> io::Result<HostWriter> {
        let path = self.resolve_path(handle)?;
        let mut options = OpenOptions::new();
        options.create(true);
        match mode {
            WriteMode::Truncate => options.write(true).truncate(true),
            WriteMode::Append => options.append(true),
        };
        Ok(Box::new(options.open(path)?))
    }

    fn mime_type(&self, handle: &ContentHandle) -> io::Result<Option<String>> {
        let path = self.resolve_path(handle)?;
        Ok(path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(mime_for_extension)
            .map(str::to_string))
    }

    fn display_name(&self, handle: &ContentHandle) -> io::Result<Option<String>> {
        let path = self.resolve_path(handle)?;
        Ok(path
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string))
    }
}

fn mime_for_extension(ext: &str) -> Option<&'static str> {
    let mime = match ext.to_ascii_lowercase().as_str() {
        "txt" | "log" => "text/plain",
        "md" => "text/markdown",
        "html" | "htm" => "text/html",
        "csv" => "text/csv",
        "json" => "application/json",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "mp4" => "video/mp4",
        "bin" => "application/octet-stream",
        _ => return None,
    };
    Some(mime)
}

fn invalid_input(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, message)
}
