//! When to use a memo, and when to write one
//!
//! Every adapter runs the same state machine:
//!
//! ```text
//! START -> PROBE -> HIT  -> RETURN
//!                -> MISS -> EXECUTE -> (maybe) STORE -> RETURN
//! ```
//!
//! A result is stored when caching is forced or when the computation took
//! strictly longer than the runtime threshold. The threshold is read after
//! the computation finishes, so a change made while it runs still applies.

use crate::config::MemoContext;
use crate::memo::{self, MemoRecord, Probe, ProbeFailure, ProbeFailureKind, RETVAL, StoreOutcome};
use crate::store::Location;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Whether a computation that took `elapsed` is eligible for storage
#[must_use]
pub fn should_store(always: bool, elapsed: Duration, threshold: Duration) -> bool {
    always || elapsed > threshold
}

/// What a memoized call did
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<R> {
    /// The value came from a memo; the computation did not run
    Cached {
        /// The stored value
        value: R,
    },
    /// The computation ran
    Computed {
        /// The fresh value
        value: R,
        /// Wall time of the computation
        elapsed: Duration,
        /// Why the memo was not used, if the probe failed rather than missed
        probe_failure: Option<ProbeFailure>,
        /// What happened when storing the result
        store: StoreOutcome,
    },
}

impl<R> Outcome<R> {
    /// The returned value
    #[must_use]
    pub fn value(&self) -> &R {
        match self {
            Self::Cached { value } | Self::Computed { value, .. } => value,
        }
    }

    /// Consume into the returned value
    #[must_use]
    pub fn into_value(self) -> R {
        match self {
            Self::Cached { value } | Self::Computed { value, .. } => value,
        }
    }

    /// Whether the value came from a memo
    #[must_use]
    pub const fn is_cached(&self) -> bool {
        matches!(self, Self::Cached { .. })
    }

    /// Store outcome, for computed values
    #[must_use]
    pub const fn store_outcome(&self) -> Option<&StoreOutcome> {
        match self {
            Self::Cached { .. } => None,
            Self::Computed { store, .. } => Some(store),
        }
    }
}

/// Run `compute` under the memo policy for a single return value
///
/// Never fails: probe and store problems are logged and reflected in the
/// returned [`Outcome`].
pub fn run<R, F>(ctx: &MemoContext, location: &Location, always: bool, compute: F) -> Outcome<R>
where
    R: Serialize + DeserializeOwned,
    F: FnOnce() -> R,
{
    let backend = ctx.backend();

    let probe_failure = match memo::probe(backend.as_ref(), location) {
        Probe::Hit(record) => match record.decode::<R>(RETVAL) {
            Some(Ok(value)) => return Outcome::Cached { value },
            Some(Err(err)) => {
                warn!(%location, error = %err, "Stored value unusable, executing normally");
                Some(ProbeFailure {
                    kind: ProbeFailureKind::Deserialize,
                    message: err.to_string(),
                })
            }
            None => {
                debug!(%location, "Memo has no return value, executing normally");
                None
            }
        },
        Probe::Miss => None,
        Probe::Failed(failure) => Some(failure),
    };

    let start = Instant::now();
    let value = compute();
    let elapsed = start.elapsed();

    let threshold = ctx.runtime_threshold();
    let store = if should_store(always, elapsed, threshold) {
        match MemoRecord::retval(&value) {
            Ok(record) => memo::persist(backend.as_ref(), location, &record, Some(elapsed)),
            Err(err) => {
                warn!(%location, error = %err, "Unable to write memo");
                StoreOutcome::Failed(memo::StoreFailure {
                    message: err.to_string(),
                })
            }
        }
    } else {
        debug!(
            %location,
            elapsed_ms = elapsed.as_millis(),
            threshold_ms = threshold.as_millis(),
            "Below runtime threshold, not memoizing"
        );
        StoreOutcome::Skipped
    };

    Outcome::Computed {
        value,
        elapsed,
        probe_failure,
        store,
    }
}
