//! Remote object-store client for memokit
//!
//! Memo files can live in a remote store addressed by URI
//! (`xet://owner/repo/branch/...` by default). This crate provides:
//! - [`RemoteUri`] parsing and joining
//! - the [`ObjectStore`] trait with a blocking HTTP implementation
//! - [`Transaction`], a scoped write batch that is uploaded on commit
//!
//! Every request is a single attempt. There is no retry policy; callers
//! decide how to downgrade failures.

pub mod config;
pub mod error;
pub mod store;
pub mod transaction;
pub mod uri;

pub use config::RemoteConfig;
pub use error::{RemoteError, Result};
pub use store::{HttpObjectStore, ObjectStore};
pub use transaction::Transaction;
pub use uri::RemoteUri;
