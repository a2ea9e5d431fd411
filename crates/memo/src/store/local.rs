//! Local filesystem backend

use super::{Location, Materializer, StoreBackend};
use crate::{Error, Result};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Memo storage rooted at a local directory
#[derive(Debug, Clone)]
pub struct LocalBackend {
    root: PathBuf,
    materializer: Materializer,
}

impl LocalBackend {
    /// Create a backend rooted at `root`. The directory is created lazily on
    /// first write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, materializer: Materializer) -> Self {
        Self {
            root: root.into(),
            materializer,
        }
    }

    /// The root directory
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl StoreBackend for LocalBackend {
    fn read(&self, location: &Location) -> Result<Option<Vec<u8>>> {
        let path = location.under(&self.root);
        match fs::metadata(&path) {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Err(Error::configuration(format!("{} is not a file", path.display()))),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::io(e, &path, "metadata")),
        }

        if Materializer::is_pointer_file(&path) {
            self.materializer.materialize(&path)?;
        }

        fs::read(&path)
            .map(Some)
            .map_err(|e| Error::io(e, &path, "read"))
    }

    fn write(&self, location: &Location, bytes: &[u8]) -> Result<()> {
        let path = location.under(&self.root);
        let dir = path
            .parent()
            .ok_or_else(|| Error::configuration(format!("{} has no parent", path.display())))?;
        fs::create_dir_all(dir).map_err(|e| Error::io(e, dir, "create_dir_all"))?;

        // Stage next to the target so the rename stays on one filesystem
        let mut staged =
            tempfile::NamedTempFile::new_in(dir).map_err(|e| Error::io(e, dir, "create"))?;
        staged
            .write_all(bytes)
            .map_err(|e| Error::io(e, staged.path(), "write"))?;
        staged
            .as_file()
            .sync_all()
            .map_err(|e| Error::io(e, staged.path(), "sync"))?;
        staged
            .persist(&path)
            .map_err(|e| Error::io(e.error, &path, "rename"))?;

        debug!(path = %path.display(), size = bytes.len(), "Memo file written");
        Ok(())
    }

    fn supports_transaction(&self) -> bool {
        false
    }

    fn resolve(&self, location: &Location) -> String {
        location.under(&self.root).display().to_string()
    }
}
