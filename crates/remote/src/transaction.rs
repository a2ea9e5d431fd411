//! Scoped write transactions
//!
//! Writes are staged in memory and only uploaded on [`Transaction::commit`].
//! Dropping a transaction without committing discards everything staged, so
//! an aborted write never leaves a partial object behind.

use crate::error::{RemoteError, Result};
use crate::store::ObjectStore;
use crate::uri::RemoteUri;
use tracing::debug;

/// A batch of writes that becomes visible on commit
pub struct Transaction<'a> {
    store: &'a dyn ObjectStore,
    staged: Vec<(RemoteUri, Vec<u8>)>,
    committed: bool,
}

impl<'a> Transaction<'a> {
    /// Open a transaction against a store
    #[must_use]
    pub fn begin(store: &'a dyn ObjectStore) -> Self {
        Self {
            store,
            staged: Vec::new(),
            committed: false,
        }
    }

    /// Stage an object for upload
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::TransactionClosed`] after commit.
    pub fn stage(&mut self, uri: RemoteUri, bytes: Vec<u8>) -> Result<()> {
        if self.committed {
            return Err(RemoteError::TransactionClosed);
        }
        self.staged.push((uri, bytes));
        Ok(())
    }

    /// Number of staged objects
    #[must_use]
    pub fn len(&self) -> usize {
        self.staged.len()
    }

    /// Whether nothing is staged
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// Upload every staged object, returning how many were written
    ///
    /// # Errors
    ///
    /// Returns the first upload failure, or [`RemoteError::TransactionClosed`]
    /// if the transaction was already committed.
    pub fn commit(&mut self) -> Result<usize> {
        if self.committed {
            return Err(RemoteError::TransactionClosed);
        }
        self.committed = true;
        let staged = std::mem::take(&mut self.staged);
        let count = staged.len();
        for (uri, bytes) in staged {
            self.store.put(&uri, bytes)?;
        }
        Ok(count)
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.committed && !self.staged.is_empty() {
            debug!(
                discarded = self.staged.len(),
                "Transaction dropped without commit"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        objects: Mutex<BTreeMap<String, Vec<u8>>>,
    }

    impl ObjectStore for MemoryStore {
        fn get(&self, uri: &RemoteUri) -> Result<Option<Vec<u8>>> {
            Ok(self.objects.lock().unwrap().get(&uri.to_string()).cloned())
        }

        fn put(&self, uri: &RemoteUri, bytes: Vec<u8>) -> Result<()> {
            self.objects.lock().unwrap().insert(uri.to_string(), bytes);
            Ok(())
        }
    }

    fn uri(s: &str) -> RemoteUri {
        RemoteUri::parse(s, "xet").unwrap()
    }

    #[test]
    fn test_nothing_visible_before_commit() {
        let store = MemoryStore::default();
        let target = uri("xet://alice/cache/main/a.pickle");
        {
            let mut tx = Transaction::begin(&store);
            tx.stage(target.clone(), b"data".to_vec()).unwrap();
            assert_eq!(tx.len(), 1);
            assert!(store.get(&target).unwrap().is_none());
            assert_eq!(tx.commit().unwrap(), 1);
        }
        assert_eq!(store.get(&target).unwrap(), Some(b"data".to_vec()));
    }

    #[test]
    fn test_drop_without_commit_discards() {
        let store = MemoryStore::default();
        let target = uri("xet://alice/cache/main/b.pickle");
        {
            let mut tx = Transaction::begin(&store);
            tx.stage(target.clone(), b"data".to_vec()).unwrap();
        }
        assert!(store.get(&target).unwrap().is_none());
    }

    #[test]
    fn test_commit_twice_fails() {
        let store = MemoryStore::default();
        let mut tx = Transaction::begin(&store);
        tx.stage(uri("xet://alice/cache/main/c.pickle"), vec![1]).unwrap();
        tx.commit().unwrap();
        assert!(matches!(tx.commit(), Err(RemoteError::TransactionClosed)));
        assert!(matches!(
            tx.stage(uri("xet://alice/cache/main/d.pickle"), vec![2]),
            Err(RemoteError::TransactionClosed)
        ));
    }

    #[test]
    fn test_empty_commit() {
        let store = MemoryStore::default();
        let mut tx = Transaction::begin(&store);
        assert!(tx.is_empty());
        assert_eq!(tx.commit().unwrap(), 0);
    }
}
