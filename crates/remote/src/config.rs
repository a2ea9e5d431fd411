//! Configuration types for the remote object-store client

use serde::{Deserialize, Serialize};

/// Configuration for the remote memo store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RemoteConfig {
    /// URI scheme that marks a base path as remote (e.g. `xet` for `xet://...`)
    #[serde(default = "default_scheme")]
    pub scheme: String,

    /// HTTP endpoint objects are served from
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Bearer token sent with every request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            scheme: default_scheme(),
            endpoint: default_endpoint(),
            token: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl RemoteConfig {
    /// Whether `path` is a URI addressed to this remote store
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        path.strip_prefix(self.scheme.as_str())
            .is_some_and(|rest| rest.starts_with("://"))
    }
}

fn default_scheme() -> String {
    "xet".to_string()
}

fn default_endpoint() -> String {
    "https://hub.xethub.com".to_string()
}

fn default_timeout_secs() -> u64 {
    600 // 10 minutes
}
