//! Boundary for notebook-cell memoization
//!
//! A notebook front end parses its own command line and runs cells; this
//! module only decides whether a cell can be skipped. The front end builds a
//! [`CellRequest`] from the cell text and the values of its input variables,
//! calls [`begin`], and then either applies the returned bindings
//! ([`CellProbe::Hit`]) or runs the cell and hands the resulting namespace
//! to [`PendingCell::finish`].

use crate::config::MemoContext;
use crate::fingerprint::{Fingerprint, fingerprint, fingerprint_cell};
use crate::memo::{self, MemoRecord, Probe, StoreOutcome};
use crate::policy::should_store;
use crate::store::Location;
use crate::{Error, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Everything that identifies one execution of a cell
#[derive(Debug, Clone, Default)]
pub struct CellRequest {
    line: String,
    source: String,
    input_hashes: Vec<Fingerprint>,
    outputs: Vec<String>,
    key: Option<String>,
    always: bool,
}

impl CellRequest {
    /// A request for the cell `source`, invoked with command line `line`
    #[must_use]
    pub fn new(line: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            source: source.into(),
            ..Self::default()
        }
    }

    /// Add an input variable by value
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] naming the variable if its value
    /// cannot be hashed.
    pub fn input(mut self, name: &str, value: &impl Serialize) -> Result<Self> {
        let hash = fingerprint(value).map_err(|e| {
            Error::serialization(format!("Unable to hash variable {name}: {e}"))
        })?;
        self.input_hashes.push(hash);
        Ok(self)
    }

    /// Add an input variable by its precomputed fingerprint
    #[must_use]
    pub fn input_hash(mut self, hash: Fingerprint) -> Self {
        self.input_hashes.push(hash);
        self
    }

    /// Name an output variable to persist
    #[must_use]
    pub fn output(mut self, name: impl Into<String>) -> Self {
        self.outputs.push(name.into());
        self
    }

    /// Set the grouping key
    #[must_use]
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Store regardless of run time
    #[must_use]
    pub fn always(mut self, always: bool) -> Self {
        self.always = always;
        self
    }

    /// Fingerprint of line, source and inputs
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if hashing fails.
    pub fn fingerprint(&self) -> Result<Fingerprint> {
        fingerprint_cell(&self.line, &self.source, &self.input_hashes)
    }
}

/// Result of [`begin`]
#[derive(Debug)]
pub enum CellProbe {
    /// Skip the cell and bind these names
    Hit(MemoRecord),
    /// Run the cell, then call [`PendingCell::finish`]
    Miss(PendingCell),
}

/// A cell that must run before its outputs can be stored
#[derive(Debug, Clone)]
pub struct PendingCell {
    location: Location,
    outputs: Vec<String>,
    always: bool,
}

impl PendingCell {
    /// Where the outputs will be stored
    #[must_use]
    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Store the requested outputs from the cell's namespace
    ///
    /// Nothing is stored if the cell failed, ran too briefly, or any requested
    /// output is missing from `namespace`.
    pub fn finish<V: Serialize>(
        self,
        ctx: &MemoContext,
        success: bool,
        elapsed: Duration,
        namespace: &BTreeMap<String, V>,
    ) -> StoreOutcome {
        if !success {
            debug!(location = %self.location, "Cell failed, not memoizing");
            return StoreOutcome::Skipped;
        }
        if !should_store(self.always, elapsed, ctx.runtime_threshold()) {
            debug!(location = %self.location, "Below runtime threshold, not memoizing");
            return StoreOutcome::Skipped;
        }

        let mut record = MemoRecord::new();
        for name in &self.outputs {
            let Some(value) = namespace.get(name) else {
                warn!(variable = %name, "Output not found in scope, not memoizing");
                return StoreOutcome::Skipped;
            };
            if let Err(err) = record.insert_value(name.clone(), value) {
                warn!(variable = %name, error = %err, "Unable to write memo");
                return StoreOutcome::Failed(memo::StoreFailure {
                    message: err.to_string(),
                });
            }
        }

        let backend = ctx.backend();
        memo::persist(backend.as_ref(), &self.location, &record, Some(elapsed))
    }
}

/// Probe the memo for a cell
///
/// # Errors
///
/// Returns an error if the request cannot be fingerprinted or its key is
/// invalid. Memo read problems are a miss.
pub fn begin(ctx: &MemoContext, request: &CellRequest) -> Result<CellProbe> {
    let location = Location::new(request.fingerprint()?, request.key.as_deref())?;
    let backend = ctx.backend();

    match memo::probe(backend.as_ref(), &location) {
        Probe::Hit(record) => {
            let missing: Vec<&str> = request
                .outputs
                .iter()
                .map(String::as_str)
                .filter(|name| !record.contains(name))
                .collect();
            if missing.is_empty() {
                info!(variables = ?record.names().collect::<Vec<_>>(), "Retrieving variables");
                return Ok(CellProbe::Hit(record));
            }
            debug!(%location, ?missing, "Memo lacks requested outputs, executing normally");
        }
        Probe::Miss | Probe::Failed(_) => {}
    }

    Ok(CellProbe::Miss(PendingCell {
        location,
        outputs: request.outputs.clone(),
        always: request.always,
    }))
}
