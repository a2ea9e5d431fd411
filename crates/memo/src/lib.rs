//! Persistent function-level memoization for interactive workflows
//!
//! memokit stores the result of an expensive computation keyed by a
//! fingerprint of its inputs, and returns the stored result when the same
//! inputs come back, in this process or a later one.
//!
//! # Overview
//!
//! - [`fingerprint`]: SHA-256 of the canonical pickle form of the inputs,
//!   optionally including the identity of the callable
//! - [`store`]: where memo files live, on a local directory or a remote
//!   object store selected by URI scheme
//! - [`memo`]: the probe/store protocol over a backend
//! - [`policy`]: when a result is worth storing (forced, or slower than the
//!   runtime threshold)
//! - [`adapters`]: wrapper and direct-call forms; [`cell`]: the notebook cell
//!   boundary
//!
//! # Failure policy
//!
//! A broken memo never breaks the computation it guards. Lookup failures
//! are treated as misses and write failures are logged; only failing to
//! fingerprint the inputs is returned to the caller, since then hit and miss
//! cannot be told apart.
//!
//! # Storage layout
//!
//! ```text
//! <base>/<fingerprint>.pickle          no grouping key
//! <base>/<key>/<fingerprint>.pickle    with grouping key
//! ```

pub mod adapters;
pub mod cell;
pub mod config;
mod error;
pub mod fingerprint;
pub mod memo;
pub mod policy;
pub mod store;

// Re-export error types at crate root
pub use error::{Error, Result};

// Re-export main types
pub use adapters::{
    MemoOptions, Memoized, MemoizeWith, eval, eval_always, eval_with_key, eval_with_options,
    memoize, memoize_with_options,
};
pub use cell::{CellProbe, CellRequest, PendingCell};
pub use config::{IdentityMode, MemoConfig, MemoContext};
pub use fingerprint::{CallableIdentity, Fingerprint, Kwargs, fingerprint_call};
pub use memo::{MemoRecord, Probe, ProbeFailure, ProbeFailureKind, RETVAL, StoreOutcome};
pub use policy::{Outcome, should_store};
pub use store::{Backend, LocalBackend, Location, Materializer, RemoteBackend, StoreBackend};
