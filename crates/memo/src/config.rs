//! Memo configuration and the runtime context threaded through every call
//!
//! [`MemoConfig`] is plain data, loaded from defaults, an optional TOML file
//! and environment variables. [`MemoContext`] holds the live settings:
//! the base path (and the backend chosen for it) and the runtime threshold.
//! Both can be changed at any time and are read fresh on every invocation.

use crate::store::{Backend, Materializer};
use crate::{Error, Result};
use memokit_remote::RemoteConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tracing::{debug, info};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "MEMOKIT_CONFIG";
/// Environment variable overriding the base memo path
pub const PATH_ENV: &str = "MEMOKIT_PATH";
/// Environment variable overriding the runtime threshold (seconds)
pub const THRESHOLD_ENV: &str = "MEMOKIT_RUNTIME_THRESHOLD";
/// Environment variable overriding the remote endpoint
pub const REMOTE_ENDPOINT_ENV: &str = "MEMOKIT_REMOTE_ENDPOINT";
/// Environment variable carrying the remote bearer token
pub const REMOTE_TOKEN_ENV: &str = "MEMOKIT_REMOTE_TOKEN";

/// Whether the callable's identity is part of the fingerprint
///
/// With `Include`, editing a memoized function invalidates its old entries,
/// but every call must supply an identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityMode {
    /// Fingerprint inputs only
    #[default]
    Ignore,
    /// Fingerprint the callable identity as well
    Include,
}

/// Memoization settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemoConfig {
    /// Local directory or remote URI memos are written under
    #[serde(default = "default_base_path")]
    pub base_path: String,

    /// Minimum run time before a result is stored
    #[serde(default = "default_runtime_threshold_secs")]
    pub runtime_threshold_secs: f64,

    /// Callable identity handling
    #[serde(default)]
    pub identity: IdentityMode,

    /// Pointer file materialization command
    #[serde(default)]
    pub materializer: Materializer,

    /// Remote store settings
    #[serde(default)]
    pub remote: RemoteConfig,
}

impl Default for MemoConfig {
    fn default() -> Self {
        Self {
            base_path: default_base_path(),
            runtime_threshold_secs: default_runtime_threshold_secs(),
            identity: IdentityMode::default(),
            materializer: Materializer::default(),
            remote: RemoteConfig::default(),
        }
    }
}

impl MemoConfig {
    /// Read a TOML config file; absent fields take their defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::io(e, path, "read"))?;
        toml::from_str(&content).map_err(|e| {
            Error::configuration(format!("Failed to parse {}: {e}", path.display()))
        })
    }

    /// Defaults, then the config file (if any), then environment overrides
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but is invalid, or an
    /// environment override cannot be parsed.
    pub fn discover() -> Result<Self> {
        let explicit = std::env::var(CONFIG_ENV)
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);
        let mut config = match config_file_from_inputs(explicit, dirs::config_dir()) {
            Some(path) => {
                debug!(path = %path.display(), "Loading memo config");
                Self::load(&path)?
            }
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides using `lookup` to read variables
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the threshold is not a number.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let var = |name: &str| lookup(name).filter(|s| !s.trim().is_empty());

        if let Some(path) = var(PATH_ENV) {
            self.base_path = path;
        }
        if let Some(raw) = var(THRESHOLD_ENV) {
            self.runtime_threshold_secs = raw.trim().parse().map_err(|e| {
                Error::configuration(format!("{THRESHOLD_ENV}='{raw}' is not a number: {e}"))
            })?;
        }
        if let Some(endpoint) = var(REMOTE_ENDPOINT_ENV) {
            self.remote.endpoint = endpoint;
        }
        if let Some(token) = var(REMOTE_TOKEN_ENV) {
            self.remote.token = Some(token);
        }
        Ok(())
    }

    /// The runtime threshold as a duration
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the threshold is negative or not
    /// finite.
    pub fn runtime_threshold(&self) -> Result<Duration> {
        threshold_from_secs(self.runtime_threshold_secs)
    }

    /// Check that the settings are usable
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.base_path.trim().is_empty() {
            return Err(Error::configuration("base_path must not be empty"));
        }
        self.runtime_threshold()?;
        if self.remote.scheme.is_empty() {
            return Err(Error::configuration("remote.scheme must not be empty"));
        }
        Ok(())
    }
}

fn threshold_from_secs(secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs).map_err(|e| {
        Error::configuration(format!("runtime threshold {secs} is not a valid duration: {e}"))
    })
}

fn config_file_from_inputs(explicit: Option<PathBuf>, config_dir: Option<PathBuf>) -> Option<PathBuf> {
    // An explicit file is used even if missing so the load error surfaces
    if explicit.is_some() {
        return explicit;
    }
    config_dir
        .map(|dir| dir.join("memokit").join("config.toml"))
        .filter(|path| path.is_file())
}

fn default_base_path() -> String {
    std::env::current_dir()
        .map(|dir| dir.join("memo"))
        .unwrap_or_else(|_| PathBuf::from("memo"))
        .to_string_lossy()
        .into_owned()
}

fn default_runtime_threshold_secs() -> f64 {
    3.0
}

#[derive(Debug)]
struct ContextState {
    config: MemoConfig,
    threshold: Duration,
    backend: Arc<Backend>,
}

/// Live memoization settings shared by every adapter built from it
///
/// Cloning is cheap and clones share state: a threshold or base path change
/// is seen by every wrapper on its next call. Last writer wins.
#[derive(Debug, Clone)]
pub struct MemoContext {
    state: Arc<RwLock<ContextState>>,
}

impl MemoContext {
    /// Validate `config` and select the backend for its base path
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: MemoConfig) -> Result<Self> {
        let backend = Backend::from_config(&config)?;
        Self::with_backend(config, backend)
    }

    /// Use an explicit backend instead of the one implied by the base path
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_backend(config: MemoConfig, backend: Backend) -> Result<Self> {
        config.validate()?;
        let threshold = config.runtime_threshold()?;
        info!(base_path = %config.base_path, "Memoizing to base path");
        Ok(Self {
            state: Arc::new(RwLock::new(ContextState {
                config,
                threshold,
                backend: Arc::new(backend),
            })),
        })
    }

    /// Context built from [`MemoConfig::discover`]
    ///
    /// # Errors
    ///
    /// Returns an error if discovery or validation fails.
    pub fn discover() -> Result<Self> {
        Self::new(MemoConfig::discover()?)
    }

    fn read(&self) -> RwLockReadGuard<'_, ContextState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ContextState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current base path
    #[must_use]
    pub fn base_path(&self) -> String {
        self.read().config.base_path.clone()
    }

    /// Change the base path and select its backend
    ///
    /// On error the previous base path stays in effect.
    ///
    /// # Errors
    ///
    /// Returns an error if no backend can be built for `path`.
    pub fn set_base_path(&self, path: impl Into<String>) -> Result<()> {
        let mut config = self.read().config.clone();
        config.base_path = path.into();
        let backend = Backend::from_config(&config)?;

        let mut state = self.write();
        info!(base_path = %config.base_path, "Memoizing to base path");
        state.config = config;
        state.backend = Arc::new(backend);
        Ok(())
    }

    /// Current runtime threshold
    #[must_use]
    pub fn runtime_threshold(&self) -> Duration {
        self.read().threshold
    }

    /// Change the runtime threshold
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `secs` is negative or not finite.
    pub fn set_runtime_threshold(&self, secs: f64) -> Result<()> {
        let threshold = threshold_from_secs(secs)?;
        let mut state = self.write();
        state.config.runtime_threshold_secs = secs;
        state.threshold = threshold;
        Ok(())
    }

    /// Current identity mode
    #[must_use]
    pub fn identity_mode(&self) -> IdentityMode {
        self.read().config.identity
    }

    /// Change the identity mode
    pub fn set_identity_mode(&self, mode: IdentityMode) {
        self.write().config.identity = mode;
    }

    /// The backend for the current base path
    #[must_use]
    pub fn backend(&self) -> Arc<Backend> {
        Arc::clone(&self.read().backend)
    }

    /// Snapshot of the current settings
    #[must_use]
    pub fn config(&self) -> MemoConfig {
        self.read().config.clone()
    }
}
