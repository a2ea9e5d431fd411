//! Remote URI parsing

use crate::error::{RemoteError, Result};
use std::fmt;

/// A parsed `<scheme>://segment/segment/...` address inside a remote store
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteUri {
    scheme: String,
    segments: Vec<String>,
}

impl RemoteUri {
    /// Parse a URI, requiring the given scheme
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::InvalidUri`] if the scheme differs, the path is
    /// empty, or a segment is `.`/`..`.
    pub fn parse(uri: &str, scheme: &str) -> Result<Self> {
        let Some((found, rest)) = uri.split_once("://") else {
            return Err(RemoteError::invalid_uri(uri, "missing '://'"));
        };
        if found != scheme {
            return Err(RemoteError::invalid_uri(
                uri,
                format!("expected scheme '{scheme}', found '{found}'"),
            ));
        }

        let segments: Vec<String> = rest
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if segments.is_empty() {
            return Err(RemoteError::invalid_uri(uri, "path is empty"));
        }
        if segments.iter().any(|s| s == "." || s == "..") {
            return Err(RemoteError::invalid_uri(uri, "relative segments are not allowed"));
        }

        Ok(Self {
            scheme: scheme.to_string(),
            segments,
        })
    }

    /// Append a relative path (split on `/`) to this URI
    #[must_use]
    pub fn join(&self, relative: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.extend(
            relative
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        );
        Self {
            scheme: self.scheme.clone(),
            segments,
        }
    }

    /// The URI scheme
    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Path segments, in order
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Path without the scheme, segments joined by `/`
    #[must_use]
    pub fn path(&self) -> String {
        self.segments.join("/")
    }
}

impl fmt::Display for RemoteUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.path())
    }
}
