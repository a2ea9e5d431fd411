//! Object-store access over HTTP

use crate::config::RemoteConfig;
use crate::error::{RemoteError, Result};
use crate::uri::RemoteUri;
use reqwest::blocking::Client;
use reqwest::{StatusCode, Url};
use std::time::Duration;
use tracing::debug;

/// Byte-level access to a remote object store
///
/// Implementations make a single attempt per call; callers decide how to
/// treat failures.
pub trait ObjectStore: Send + Sync {
    /// Fetch an object. A missing object is `Ok(None)`, not an error.
    fn get(&self, uri: &RemoteUri) -> Result<Option<Vec<u8>>>;

    /// Upload an object. The object becomes visible only once complete.
    fn put(&self, uri: &RemoteUri, bytes: Vec<u8>) -> Result<()>;
}

/// [`ObjectStore`] speaking plain `GET`/`PUT {endpoint}/{path}`
///
/// Each URI segment is percent-encoded on its own, so a `#`, `?` or `%`
/// inside a key stays part of the object path.
#[derive(Debug, Clone)]
pub struct HttpObjectStore {
    client: Client,
    endpoint: Url,
    token: Option<String>,
}

impl HttpObjectStore {
    /// Build a client from configuration
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Configuration`] if the endpoint is empty, is not
    /// a hierarchical URL, or the HTTP client cannot be constructed.
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let trimmed = config.endpoint.trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(RemoteError::configuration("remote endpoint is empty"));
        }
        let endpoint = Url::parse(trimmed).map_err(|e| {
            RemoteError::configuration(format!("invalid remote endpoint '{trimmed}': {e}"))
        })?;
        if endpoint.cannot_be_a_base() {
            return Err(RemoteError::configuration(format!(
                "remote endpoint '{trimmed}' cannot hold object paths"
            )));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RemoteError::configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            token: config.token.clone(),
        })
    }

    /// URL an object is served from
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Configuration`] if the endpoint cannot hold a
    /// path.
    pub fn url_for(&self, uri: &RemoteUri) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|()| RemoteError::configuration("remote endpoint cannot hold object paths"))?
            .pop_if_empty()
            .extend(uri.segments());
        Ok(url)
    }

    fn authorize(
        &self,
        request: reqwest::blocking::RequestBuilder,
    ) -> reqwest::blocking::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

impl ObjectStore for HttpObjectStore {
    fn get(&self, uri: &RemoteUri) -> Result<Option<Vec<u8>>> {
        let url = self.url_for(uri)?;
        debug!(%url, "GET object");
        let response = self
            .authorize(self.client.get(url.clone()))
            .send()
            .map_err(|source| RemoteError::Http {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(RemoteError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        // Read the whole body at once; many tiny reads are slow on remote stores
        let bytes = response
            .bytes()
            .map_err(|source| RemoteError::Http {
                url: url.to_string(),
                source,
            })?;
        Ok(Some(bytes.to_vec()))
    }

    fn put(&self, uri: &RemoteUri, bytes: Vec<u8>) -> Result<()> {
        let url = self.url_for(uri)?;
        debug!(%url, size = bytes.len(), "PUT object");
        let response = self
            .authorize(self.client.put(url.clone()))
            .body(bytes)
            .send()
            .map_err(|source| RemoteError::Http {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uri(s: &str) -> RemoteUri {
        RemoteUri::parse(s, "xet").unwrap()
    }

    #[test]
    fn test_url_for_strips_trailing_slash() {
        let config = RemoteConfig {
            endpoint: "http://localhost:9000/".to_string(),
            ..Default::default()
        };
        let store = HttpObjectStore::new(&config).unwrap();
        assert_eq!(
            store
                .url_for(&uri("xet://alice/cache/main/abc.pickle"))
                .unwrap()
                .as_str(),
            "http://localhost:9000/alice/cache/main/abc.pickle"
        );
    }

    #[test]
    fn test_url_for_keeps_endpoint_base_path() {
        let config = RemoteConfig {
            endpoint: "http://localhost:9000/objects/".to_string(),
            ..Default::default()
        };
        let store = HttpObjectStore::new(&config).unwrap();
        assert_eq!(
            store.url_for(&uri("xet://alice/abc.pickle")).unwrap().as_str(),
            "http://localhost:9000/objects/alice/abc.pickle"
        );
    }

    #[test]
    fn test_url_for_encodes_reserved_characters() {
        let config = RemoteConfig {
            endpoint: "http://localhost:9000".to_string(),
            ..Default::default()
        };
        let store = HttpObjectStore::new(&config).unwrap();
        let first = store.url_for(&uri("xet://cache/exp#1/aaaa.pickle")).unwrap();
        let second = store.url_for(&uri("xet://cache/exp#2/aaaa.pickle")).unwrap();
        assert_ne!(first, second);
        assert_eq!(first.path(), "/cache/exp%231/aaaa.pickle");
        assert_eq!(first.fragment(), None);

        let query = store.url_for(&uri("xet://cache/run?v=1/aaaa.pickle")).unwrap();
        assert_eq!(query.path(), "/cache/run%3Fv=1/aaaa.pickle");
        assert_eq!(query.query(), None);
    }

    #[test]
    fn test_non_url_endpoint_rejected() {
        let config = RemoteConfig {
            endpoint: "localhost:9000".to_string(),
            ..Default::default()
        };
        let err = HttpObjectStore::new(&config).unwrap_err();
        assert!(matches!(err, RemoteError::Configuration { .. }));
    }

    #[test]
    fn test_empty_endpoint_rejected() {
        let config = RemoteConfig {
            endpoint: "/".to_string(),
            ..Default::default()
        };
        let err = HttpObjectStore::new(&config).unwrap_err();
        assert!(matches!(err, RemoteError::Configuration { .. }));
    }

    #[test]
    fn test_unreachable_endpoint_is_http_error() {
        // Port 9 (discard) on localhost is not expected to serve HTTP
        let config = RemoteConfig {
            endpoint: "http://127.0.0.1:9".to_string(),
            timeout_secs: 2,
            ..Default::default()
        };
        let store = HttpObjectStore::new(&config).unwrap();
        let result = store.get(&uri("xet://alice/cache/main/missing.pickle"));
        assert!(matches!(result, Err(RemoteError::Http { .. })));
    }
}
