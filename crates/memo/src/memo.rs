//! The probe/store protocol
//!
//! A memo file is a pickle: a small envelope dict around a [`MemoRecord`],
//! a map from output name to value. Probing never fails outward: anything that goes
//! wrong while looking up a memo becomes [`Probe::Failed`], which callers
//! treat as a miss. Storing reports errors, and [`persist`] downgrades them
//! to a logged [`StoreOutcome::Failed`].

use crate::store::{Location, StoreBackend};
use crate::{Error, Result};
use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_pickle::{DeOptions, HashableValue, SerOptions, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Output name used by the function-call forms
pub const RETVAL: &str = "RETVAL";

/// Version of the on-disk envelope
pub const FORMAT_VERSION: i64 = 1;

/// Named values persisted for one cache entry
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoRecord(BTreeMap<String, Value>);

impl MemoRecord {
    /// An empty record
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A record holding a single function return value under [`RETVAL`]
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if the value cannot be serialized.
    pub fn retval(value: &impl Serialize) -> Result<Self> {
        let mut record = Self::new();
        record.insert_value(RETVAL, value)?;
        Ok(record)
    }

    /// Insert an already-serialized value
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.0.insert(name.into(), value);
    }

    /// Serialize and insert a value
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if the value cannot be serialized.
    pub fn insert_value(&mut self, name: impl Into<String>, value: &impl Serialize) -> Result<()> {
        let name = name.into();
        let value = serde_pickle::to_value(value)
            .map_err(|e| Error::serialization(format!("output '{name}' is not serializable: {e}")))?;
        self.0.insert(name, value);
        Ok(())
    }

    /// Look up a value
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Deserialize a value into `T`. `None` if the name is absent.
    #[must_use]
    pub fn decode<T: DeserializeOwned>(&self, name: &str) -> Option<Result<T>> {
        self.0.get(name).map(|value| {
            serde_pickle::from_value(value.clone()).map_err(|e| {
                Error::serialization(format!("stored '{name}' has an unexpected shape: {e}"))
            })
        })
    }

    /// Whether a value exists under `name`
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Names of all stored values, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Number of stored values
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the record is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consume into the underlying map
    #[must_use]
    pub fn into_inner(self) -> BTreeMap<String, Value> {
        self.0
    }
}

impl FromIterator<(String, Value)> for MemoRecord {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for MemoRecord {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

fn key(name: &str) -> HashableValue {
    HashableValue::String(name.to_string())
}

/// Serialize a record into memo file bytes
///
/// The envelope is `{"format", "created_at", "elapsed_ms", "values"}`.
///
/// # Errors
///
/// Returns [`Error::Serialization`] if the record cannot be encoded.
pub fn encode(record: &MemoRecord, elapsed: Option<Duration>) -> Result<Vec<u8>> {
    let values = record
        .0
        .iter()
        .map(|(name, value)| (key(name), value.clone()))
        .collect();
    let elapsed_ms = elapsed.map_or(Value::None, |d| {
        Value::I64(i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
    });

    let mut file = BTreeMap::new();
    file.insert(key("format"), Value::I64(FORMAT_VERSION));
    file.insert(key("created_at"), Value::String(Utc::now().to_rfc3339()));
    file.insert(key("elapsed_ms"), elapsed_ms);
    file.insert(key("values"), Value::Dict(values));

    serde_pickle::value_to_vec(&Value::Dict(file), SerOptions::new())
        .map_err(|e| Error::serialization(format!("Failed to serialize memo: {e}")))
}

/// Parse memo file bytes back into a record
///
/// # Errors
///
/// Returns [`Error::Serialization`] if the bytes are not a memo of the
/// current format version.
pub fn decode(bytes: &[u8]) -> Result<MemoRecord> {
    let value = serde_pickle::value_from_slice(bytes, DeOptions::new())
        .map_err(|e| Error::serialization(format!("Failed to parse memo: {e}")))?;
    let Value::Dict(mut file) = value else {
        return Err(Error::serialization("Memo is not a dict"));
    };

    match file.get(&key("format")) {
        Some(Value::I64(FORMAT_VERSION)) => {}
        other => {
            return Err(Error::serialization(format!(
                "Unsupported memo format {other:?} (expected {FORMAT_VERSION})"
            )));
        }
    }

    let Some(Value::Dict(values)) = file.remove(&key("values")) else {
        return Err(Error::serialization("Memo has no values dict"));
    };
    values
        .into_iter()
        .map(|(name, value)| match name {
            HashableValue::String(name) => Ok((name, value)),
            other => Err(Error::serialization(format!(
                "Memo value name {other:?} is not a string"
            ))),
        })
        .collect()
}

/// Why a probe could not produce a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeFailureKind {
    /// The backend could not be read (I/O, remote error)
    Backend,
    /// The memo exists but could not be decoded
    Deserialize,
    /// A pointer file could not be materialized
    Materialization,
}

/// A downgraded probe error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeFailure {
    /// Failure category
    pub kind: ProbeFailureKind,
    /// Human-readable description
    pub message: String,
}

impl ProbeFailure {
    /// Classify an error raised while probing
    #[must_use]
    pub fn from_error(err: &Error) -> Self {
        let kind = match err {
            Error::Materialization { .. } => ProbeFailureKind::Materialization,
            Error::Serialization { .. } => ProbeFailureKind::Deserialize,
            _ => ProbeFailureKind::Backend,
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }
}

impl fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Result of looking up a memo
#[derive(Debug, Clone, PartialEq)]
pub enum Probe {
    /// A memo was found and decoded
    Hit(MemoRecord),
    /// No memo exists
    Miss,
    /// Lookup failed; treat as a miss
    Failed(ProbeFailure),
}

impl Probe {
    /// The record on a hit
    #[must_use]
    pub fn into_record(self) -> Option<MemoRecord> {
        match self {
            Self::Hit(record) => Some(record),
            Self::Miss | Self::Failed(_) => None,
        }
    }

    /// Whether this is a hit
    #[must_use]
    pub const fn is_hit(&self) -> bool {
        matches!(self, Self::Hit(_))
    }
}

/// Look up the memo at `location`
///
/// Never returns an error: failures are logged and reported as
/// [`Probe::Failed`].
pub fn probe(backend: &dyn StoreBackend, location: &Location) -> Probe {
    let resolved = backend.resolve(location);
    let bytes = match backend.read(location) {
        Ok(Some(bytes)) => bytes,
        Ok(None) => {
            debug!(location = %resolved, "No memo");
            return Probe::Miss;
        }
        Err(err) => {
            warn!(location = %resolved, error = %err, "Unable to load memo, executing normally");
            return Probe::Failed(ProbeFailure::from_error(&err));
        }
    };

    match decode(&bytes) {
        Ok(record) => {
            info!(location = %resolved, "Loading memo");
            Probe::Hit(record)
        }
        Err(err) => {
            warn!(location = %resolved, error = %err, "Unable to load memo, executing normally");
            Probe::Failed(ProbeFailure::from_error(&err))
        }
    }
}

/// Persist a record at `location`
///
/// # Errors
///
/// Returns an error if the record cannot be encoded or written.
pub fn store(
    backend: &dyn StoreBackend,
    location: &Location,
    record: &MemoRecord,
    elapsed: Option<Duration>,
) -> Result<()> {
    let bytes = encode(record, elapsed)?;
    info!(location = %backend.resolve(location), "Writing memo");
    backend.write(location, &bytes)
}

/// A downgraded store error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreFailure {
    /// Human-readable description
    pub message: String,
}

/// What happened to a computed result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOutcome {
    /// The memo was written
    Stored,
    /// The result was not eligible for storage
    Skipped,
    /// Writing failed; the result was still returned
    Failed(StoreFailure),
}

impl StoreOutcome {
    /// Whether the memo was written
    #[must_use]
    pub const fn is_stored(&self) -> bool {
        matches!(self, Self::Stored)
    }
}

/// Best-effort [`store`]: failures are logged, never returned
pub fn persist(
    backend: &dyn StoreBackend,
    location: &Location,
    record: &MemoRecord,
    elapsed: Option<Duration>,
) -> StoreOutcome {
    match store(backend, location, record, elapsed) {
        Ok(()) => StoreOutcome::Stored,
        Err(err) => {
            warn!(location = %backend.resolve(location), error = %err, "Unable to write memo");
            StoreOutcome::Failed(StoreFailure {
                message: err.to_string(),
            })
        }
    }
}
