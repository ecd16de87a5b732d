//! Backing Store
//!
//! The durable home of cached objects. The cache reads through to it on a
//! miss and the leader writes committed changes to it.

use std::time::Duration;
use bytes::Bytes;
use reqwest::StatusCode;

use crate::error::{Error, Result};

/// Byte content keyed by object name
#[async_trait::async_trait]
pub trait BackingStore: Send + Sync {
    /// Fetch an object; `Error::NotFound` if it does not exist
    async fn get(&self, key: &str) -> Result<Bytes>;

    /// Create or replace an object
    async fn put(&self, key: &str, content: Bytes) -> Result<()>;

    /// Remove an object; `Error::NotFound` if it does not exist
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Backing store served by a data server over HTTP
pub struct HttpDataStore {
    /// Base URL objects are resolved against
    base_url: String,
    client: reqwest::Client,
}

impl HttpDataStore {
    /// Create a store for the data server at `base_url`
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }

    /// URL of an object on the data server
    pub fn object_url(&self, key: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            key.trim_start_matches('/')
        )
    }

    fn check(key: &str, status: StatusCode) -> Result<()> {
        if status.is_success() {
            Ok(())
        } else if status == StatusCode::NOT_FOUND {
            Err(Error::NotFound(key.to_string()))
        } else {
            Err(Error::Store(format!("data server returned {} for {}", status, key)))
        }
    }
}

fn transport_error(key: &str, e: reqwest::Error) -> Error {
    Error::Store(format!("request for {} failed: {}", key, e))
}

#[async_trait::async_trait]
impl BackingStore for HttpDataStore {
    async fn get(&self, key: &str) -> Result<Bytes> {
        let response = self
            .client
            .get(self.object_url(key))
            .send()
            .await
            .map_err(|e| transport_error(key, e))?;

        Self::check(key, response.status())?;
        response.bytes().await.map_err(|e| transport_error(key, e))
    }

    async fn put(&self, key: &str, content: Bytes) -> Result<()> {
        let response = self
            .client
            .put(self.object_url(key))
            .body(content)
            .send()
            .await
            .map_err(|e| transport_error(key, e))?;

        Self::check(key, response.status())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.object_url(key))
            .send()
            .await
            .map_err(|e| transport_error(key, e))?;

        Self::check(key, response.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_url() {
        let store = HttpDataStore::new("http://data:8081/", Duration::from_secs(1)).unwrap();
        assert_eq!(store.object_url("a/b.txt"), "http://data:8081/a/b.txt");
        assert_eq!(store.object_url("/a"), "http://data:8081/a");
    }

    #[test]
    fn test_status_mapping() {
        assert!(HttpDataStore::check("k", StatusCode::OK).is_ok());
        assert!(HttpDataStore::check("k", StatusCode::NOT_FOUND)
            .unwrap_err()
            .is_not_found());
        assert!(matches!(
            HttpDataStore::check("k", StatusCode::INTERNAL_SERVER_ERROR),
            Err(Error::Store(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_store_error() {
        let store = HttpDataStore::new("http://127.0.0.1:9", Duration::from_millis(200)).unwrap();
        assert!(matches!(store.get("k").await, Err(Error::Store(_))));
    }
}
