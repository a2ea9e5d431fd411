//! Storage backends for memo files
//!
//! A memo lives at `<base>/<key>/<fingerprint>.pickle`, or
//! `<base>/<fingerprint>.pickle` when no grouping key is given. The base is
//! either a local directory or a remote URI; which backend handles it is
//! decided once, when the base path is configured.

mod local;
mod pointer;
mod remote;

pub use local::LocalBackend;
pub use pointer::{Materializer, POINTER_MAGIC};
pub use remote::RemoteBackend;

use crate::config::MemoConfig;
use crate::fingerprint::Fingerprint;
use crate::{Error, Result};
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// File extension of persisted memos
pub const MEMO_EXTENSION: &str = "pickle";

/// Where a memo lives relative to the backend's base path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    key: Option<String>,
    fingerprint: Fingerprint,
}

impl Location {
    /// Build a location from a fingerprint and optional grouping key
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the key is empty or is not a
    /// single plain path segment.
    pub fn new(fingerprint: Fingerprint, key: Option<&str>) -> Result<Self> {
        if let Some(key) = key {
            validate_key(key)?;
        }
        Ok(Self {
            key: key.map(str::to_string),
            fingerprint,
        })
    }

    /// The grouping key, if any
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// The input fingerprint
    #[must_use]
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// File name of the memo
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}.{MEMO_EXTENSION}", self.fingerprint)
    }

    /// `/`-separated path relative to the base
    #[must_use]
    pub fn relative(&self) -> String {
        match &self.key {
            Some(key) => format!("{key}/{}", self.file_name()),
            None => self.file_name(),
        }
    }

    /// Filesystem path under a local base directory
    #[must_use]
    pub fn under(&self, base: &Path) -> PathBuf {
        match &self.key {
            Some(key) => base.join(key).join(self.file_name()),
            None => base.join(self.file_name()),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.relative())
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.trim().is_empty() {
        return Err(Error::configuration("grouping key must not be empty"));
    }
    if key.contains(['/', '\\']) {
        return Err(Error::configuration(format!(
            "grouping key '{key}' must not contain path separators"
        )));
    }
    let mut components = Path::new(key).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(Error::configuration(format!(
            "grouping key '{key}' is not a plain name"
        ))),
    }
}

/// Byte-level access to memo storage
pub trait StoreBackend {
    /// Read a memo. A missing memo is `Ok(None)`.
    fn read(&self, location: &Location) -> Result<Option<Vec<u8>>>;

    /// Write a memo so that readers never observe a partial file.
    /// Missing directories are created.
    fn write(&self, location: &Location, bytes: &[u8]) -> Result<()>;

    /// Whether writes go through an explicit transaction
    fn supports_transaction(&self) -> bool;

    /// Full path or URI of a location, for diagnostics
    fn resolve(&self, location: &Location) -> String;
}

/// The storage backends memokit can use
#[derive(Debug)]
pub enum Backend {
    /// Local filesystem directory
    Local(LocalBackend),
    /// Remote object store addressed by URI
    Remote(RemoteBackend),
}

impl Backend {
    /// Select a backend for `config.base_path` by its URI scheme
    ///
    /// # Errors
    ///
    /// Returns an error if the base path is empty or the remote URI or client
    /// configuration is invalid.
    pub fn from_config(config: &MemoConfig) -> Result<Self> {
        let base = config.base_path.trim();
        if base.is_empty() {
            return Err(Error::configuration("memo base path must not be empty"));
        }
        if config.remote.matches(base) {
            Ok(Self::Remote(RemoteBackend::connect(base, &config.remote)?))
        } else {
            Ok(Self::Local(LocalBackend::new(
                base,
                config.materializer.clone(),
            )))
        }
    }

    fn inner(&self) -> &dyn StoreBackend {
        match self {
            Self::Local(local) => local,
            Self::Remote(remote) => remote,
        }
    }
}

impl StoreBackend for Backend {
    fn read(&self, location: &Location) -> Result<Option<Vec<u8>>> {
        self.inner().read(location)
    }

    fn write(&self, location: &Location, bytes: &[u8]) -> Result<()> {
        self.inner().write(location, bytes)
    }

    fn supports_transaction(&self) -> bool {
        self.inner().supports_transaction()
    }

    fn resolve(&self, location: &Location) -> String {
        self.inner().resolve(location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::fingerprint;

    fn fp() -> Fingerprint {
        fingerprint(&("location", 1)).unwrap()
    }

    #[test]
    fn test_location_without_key() {
        let loc = Location::new(fp(), None).unwrap();
        assert_eq!(loc.relative(), format!("{}.pickle", fp()));
        assert_eq!(loc.under(Path::new("/memo")), PathBuf::from(format!("/memo/{}.pickle", fp())));
    }

    #[test]
    fn test_location_with_key() {
        let loc = Location::new(fp(), Some("experiment1")).unwrap();
        assert_eq!(loc.key(), Some("experiment1"));
        assert_eq!(loc.relative(), format!("experiment1/{}.pickle", fp()));
        assert_eq!(
            loc.under(Path::new("/memo")),
            PathBuf::from(format!("/memo/experiment1/{}.pickle", fp()))
        );
    }

    #[test]
    fn test_keyed_and_unkeyed_locations_differ() {
        let keyed = Location::new(fp(), Some("k")).unwrap();
        let plain = Location::new(fp(), None).unwrap();
        assert_ne!(keyed, plain);
        assert_ne!(keyed.relative(), plain.relative());
    }

    #[test]
    fn test_invalid_keys_rejected() {
        for key in ["", "  ", "..", ".", "a/b", "a\\b", "/abs"] {
            assert!(
                Location::new(fp(), Some(key)).is_err(),
                "key {key:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_backend_selection_by_scheme() {
        let local = MemoConfig {
            base_path: "/tmp/memo".to_string(),
            ..MemoConfig::default()
        };
        assert!(matches!(Backend::from_config(&local).unwrap(), Backend::Local(_)));

        let remote = MemoConfig {
            base_path: "xet://alice/proj_cache/main".to_string(),
            ..MemoConfig::default()
        };
        let backend = Backend::from_config(&remote).unwrap();
        assert!(matches!(backend, Backend::Remote(_)));
        assert!(backend.supports_transaction());
    }

    #[test]
    fn test_empty_base_path_rejected() {
        let config = MemoConfig {
            base_path: "   ".to_string(),
            ..MemoConfig::default()
        };
        assert!(Backend::from_config(&config).is_err());
    }
}
