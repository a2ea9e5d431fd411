//! Deterministic fingerprints of call inputs
//!
//! A fingerprint is the SHA-256 of the pickled call inputs. Inputs are first
//! converted to pickle values, whose dicts and sets are ordered, so keyword
//! order and map insertion order never change the result. Pickle keeps
//! floats bit-exact, so `NaN`, the infinities and `None` stay distinct.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_pickle::{HashableValue, SerOptions, Value as PickleValue};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// A 64-character lowercase hex SHA-256 digest identifying a set of inputs
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Digest raw bytes
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(bytes)))
    }

    /// Create from a hex string (validation)
    ///
    /// # Errors
    ///
    /// Returns error if the string is not 64 lowercase hex characters
    pub fn from_hex(hex: impl Into<String>) -> Result<Self> {
        let s = hex.into();
        if s.len() != 64 {
            return Err(Error::configuration(format!(
                "Fingerprint must be 64 hex characters, got {}",
                s.len()
            )));
        }
        if !s.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')) {
            return Err(Error::configuration(
                "Fingerprint must contain only lowercase hex digits",
            ));
        }
        Ok(Self(s))
    }

    /// The hex representation
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Keyword arguments, ordered by name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Kwargs(BTreeMap<String, PickleValue>);

impl Kwargs {
    /// No keyword arguments
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Kwargs::insert`]
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if the value cannot be serialized.
    pub fn with(mut self, name: impl Into<String>, value: impl Serialize) -> Result<Self> {
        self.insert(name, value)?;
        Ok(self)
    }

    /// Set a keyword argument, replacing any previous value
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if the value cannot be serialized.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Serialize) -> Result<()> {
        let name = name.into();
        let value = serde_pickle::to_value(&value).map_err(|e| {
            Error::serialization(format!("keyword argument '{name}' is not serializable: {e}"))
        })?;
        self.0.insert(name, value);
        Ok(())
    }

    /// Look up a keyword argument
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PickleValue> {
        self.0.get(name)
    }

    /// Deserialize a keyword argument into `T`. `None` if it is absent.
    #[must_use]
    pub fn decode<T: serde::de::DeserializeOwned>(&self, name: &str) -> Option<Result<T>> {
        self.0.get(name).map(|value| {
            serde_pickle::from_value(value.clone()).map_err(|e| {
                Error::serialization(format!(
                    "keyword argument '{name}' has an unexpected shape: {e}"
                ))
            })
        })
    }

    fn to_pickle(&self) -> PickleValue {
        PickleValue::Dict(
            self.0
                .iter()
                .map(|(name, value)| (HashableValue::String(name.clone()), value.clone()))
                .collect(),
        )
    }

    /// Number of keyword arguments
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no keyword arguments
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Identity of the callable being memoized
///
/// Including an identity in the fingerprint makes a change to the callable
/// invalidate old entries. Two callables with identical source text and no
/// captured state share an identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CallableIdentity {
    /// Serialized form of the callable and its captured state
    Serialized(Value),
    /// Source text of the callable
    Source(String),
}

impl CallableIdentity {
    /// Identity from source text
    #[must_use]
    pub fn source(text: impl Into<String>) -> Self {
        Self::Source(text.into())
    }

    /// Identity from a serializable description of the callable
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if the value cannot be serialized.
    pub fn serialized(value: &impl Serialize) -> Result<Self> {
        serde_json::to_value(value)
            .map(Self::Serialized)
            .map_err(|e| Error::serialization(format!("callable is not serializable: {e}")))
    }

    /// Serialize the callable, falling back to its source text
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] when serialization fails and no source
    /// text is available.
    pub fn resolve<S, E>(serialize: S, source: impl FnOnce() -> Option<String>) -> Result<Self>
    where
        S: FnOnce() -> std::result::Result<Value, E>,
        E: fmt::Display,
    {
        match serialize() {
            Ok(value) => Ok(Self::Serialized(value)),
            Err(err) => {
                debug!(error = %err, "Callable not serializable, using source text");
                source().map(Self::Source).ok_or_else(|| {
                    Error::serialization(format!(
                        "callable is not serializable ({err}) and its source is unavailable"
                    ))
                })
            }
        }
    }
}

fn to_pickle<T: Serialize>(value: &T, what: &str) -> Result<PickleValue> {
    serde_pickle::to_value(value)
        .map_err(|e| Error::serialization(format!("{what} not serializable: {e}")))
}

fn pickle_bytes(value: &PickleValue) -> Result<Vec<u8>> {
    serde_pickle::value_to_vec(value, SerOptions::new())
        .map_err(|e| Error::serialization(format!("Failed to serialize inputs: {e}")))
}

/// Canonical bytes that a fingerprint is computed over
///
/// # Errors
///
/// Returns [`Error::Serialization`] if the value cannot be pickled (its
/// `Serialize` impl fails, or a map key is unhashable).
pub fn canonical_bytes<T: Serialize>(parts: &T) -> Result<Vec<u8>> {
    pickle_bytes(&to_pickle(parts, "inputs are")?)
}

/// Fingerprint an arbitrary serializable value
///
/// # Errors
///
/// Returns [`Error::Serialization`] if the value cannot be serialized.
pub fn fingerprint<T: Serialize>(parts: &T) -> Result<Fingerprint> {
    Ok(Fingerprint::from_bytes(&canonical_bytes(parts)?))
}

/// Fingerprint a function call
///
/// The hashed sequence is `[args, kwargs]`, prefixed by the callable identity
/// when one is given.
///
/// # Errors
///
/// Returns [`Error::Serialization`] if any part cannot be serialized.
pub fn fingerprint_call<A: Serialize>(
    identity: Option<&CallableIdentity>,
    args: &A,
    kwargs: &Kwargs,
) -> Result<Fingerprint> {
    let mut parts = Vec::with_capacity(3);
    if let Some(identity) = identity {
        parts.push(to_pickle(identity, "callable identity is")?);
    }
    parts.push(to_pickle(args, "arguments are")?);
    parts.push(kwargs.to_pickle());
    Ok(Fingerprint::from_bytes(&pickle_bytes(&PickleValue::List(parts))?))
}

/// Fingerprint a notebook cell: its command line, its source and the
/// fingerprints of its input variables
///
/// Each piece is hashed on its own, then the list of hashes is hashed.
///
/// # Errors
///
/// Returns [`Error::Serialization`] if hashing fails.
pub fn fingerprint_cell(line: &str, source: &str, inputs: &[Fingerprint]) -> Result<Fingerprint> {
    let mut hashes = Vec::with_capacity(inputs.len() + 2);
    hashes.push(fingerprint(&line)?);
    hashes.push(fingerprint(&source)?);
    hashes.extend(inputs.iter().cloned());
    fingerprint(&hashes)
}
