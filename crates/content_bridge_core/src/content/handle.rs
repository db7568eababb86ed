//! Opaque content handle.

use crate::error::ResolutionError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt::{Display, Formatter};
use url::Url;

static URI_SCHEME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z][A-Za-z0-9+.\-]*):").expect("valid uri scheme regex"));

/// URI naming one piece of host-resolved content.
///
/// Not a file path: the host decides what it resolves to. The value is kept
/// verbatim; only the presence of a scheme is checked. A bare absolute path
/// is accepted and stored as the equivalent percent-encoded `file:` URI.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHandle(String);

impl ContentHandle {
    /// Parses a raw URI string.
    ///
    /// # Errors
    /// - `InvalidHandle` when the value is blank, or has no scheme and is not
    ///   an absolute path.
    pub fn parse(raw: impl Into<String>) -> Result<Self, ResolutionError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(ResolutionError::InvalidHandle(
                "content handle cannot be empty".to_string(),
            ));
        }
        if raw.starts_with('/') {
            return Url::from_file_path(&raw)
                .map(|url| Self(url.into()))
                .map_err(|()| {
                    ResolutionError::InvalidHandle(format!(
                        "content handle path is not absolute: `{raw}`"
                    ))
                });
        }
        if !URI_SCHEME_RE.is_match(&raw) {
            return Err(ResolutionError::InvalidHandle(format!(
                "content handle must be a URI with a scheme, got `{raw}`"
            )));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Lower-cased URI scheme.
    pub fn scheme(&self) -> String {
        URI_SCHEME_RE
            .captures(&self.0)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_ascii_lowercase())
            .unwrap_or_default()
    }

    /// Everything after `scheme:`.
    pub fn scheme_specific_part(&self) -> &str {
        match self.0.find(':') {
            Some(index) => &self.0[index + 1..],
            None => "",
        }
    }
}

impl Display for ContentHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::ContentHandle;
    use crate::error::ResolutionError;

    #[test]
    fn parses_uri_and_exposes_scheme() {
        let handle = ContentHandle::parse("Content://media/external/images/42")
            .expect("content URI should parse");
        assert_eq!(handle.scheme(), "content");
        assert_eq!(handle.scheme_specific_part(), "//media/external/images/42");
        assert_eq!(handle.as_str(), "Content://media/external/images/42");
    }

    #[test]
    fn absolute_paths_become_encoded_file_uris() {
        let handle = ContentHandle::parse("/sdcard/My Docs/100%.txt").expect("path should parse");
        assert_eq!(handle.scheme(), "file");
        assert_eq!(handle.as_str(), "file:///sdcard/My%20Docs/100%25.txt");
    }

    #[test]
    fn rejects_blank_and_schemeless_values() {
        for raw in ["", "   ", "sdcard/file.txt", "1abc:foo"] {
            let err = ContentHandle::parse(raw).expect_err("invalid handle must be rejected");
            assert!(matches!(err, ResolutionError::InvalidHandle(_)), "{raw}");
        }
    }
}
