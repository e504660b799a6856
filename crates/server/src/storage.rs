use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use opsgate_core::config::StorageConfig;
use opsgate_core::UpstreamError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl StoredObject {
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Narrow seam over the object store: write bytes under a key, read them
/// back. Missing keys are `Ok(None)`, not errors — the boundary maps absence
/// to 404.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), UpstreamError>;

    async fn get(&self, key: &str) -> Result<Option<StoredObject>, UpstreamError>;
}

/// HTTP client for an S3-compatible bucket endpoint: `PUT {base}/{key}` and
/// `GET {base}/{key}` with a bearer credential.
pub struct HttpObjectStore {
    http: reqwest::Client,
    base_url: String,
    access_token: SecretString,
    timeout: Duration,
}

impl HttpObjectStore {
    pub fn new(http: reqwest::Client, config: &StorageConfig) -> Self {
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), UpstreamError> {
        let response = self
            .http
            .put(format!("{}/{key}", self.base_url))
            .bearer_auth(self.access_token.expose_secret())
            .timeout(self.timeout)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|error| UpstreamError::transport("store", error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::new("store", Some(status.as_u16()), body));
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<StoredObject>, UpstreamError> {
        let response = self
            .http
            .get(format!("{}/{key}", self.base_url))
            .bearer_auth(self.access_token.expose_secret())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|error| UpstreamError::transport("store", error.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::new("store", Some(status.as_u16()), body));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = response
            .bytes()
            .await
            .map_err(|error| UpstreamError::transport("store", error.to_string()))?;

        Ok(Some(StoredObject { bytes: bytes.to_vec(), content_type }))
    }
}

/// In-memory store used by the integration suite.
#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: Mutex<HashMap<String, StoredObject>>,
}

impl InMemoryObjectStore {
    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().expect("objects lock").keys().cloned().collect()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), UpstreamError> {
        self.objects
            .lock()
            .expect("objects lock")
            .insert(key.to_string(), StoredObject { bytes, content_type: content_type.to_string() });
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<StoredObject>, UpstreamError> {
        Ok(self.objects.lock().expect("objects lock").get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::{InMemoryObjectStore, ObjectStore};

    #[tokio::test]
    async fn in_memory_store_round_trips_objects() {
        let store = InMemoryObjectStore::default();
        store.put("org=o1/owner=u1/intake/1-abc", b"hello".to_vec(), "text/plain").await.unwrap();

        let object = store.get("org=o1/owner=u1/intake/1-abc").await.unwrap().expect("present");
        assert_eq!(object.bytes, b"hello");
        assert_eq!(object.content_type, "text/plain");
        assert_eq!(object.size(), 5);

        assert!(store.get("org=o1/owner=u1/intake/2-def").await.unwrap().is_none());
    }
}
