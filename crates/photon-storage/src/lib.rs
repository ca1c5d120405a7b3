pub mod local_backend;
pub mod retry;
pub mod s3_backend;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use photon_types::{PhotonError, Result};

/// Short-lived object-storage credentials supplied by the auth collaborator.
///
/// Refreshing expired credentials is the collaborator's responsibility; this
/// layer only surfaces `Unauthorized` when a call is rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    #[serde(default)]
    pub session_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credentials {
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(at) => Utc::now() >= at,
            None => false,
        }
    }
}

/// Retry tuning for remote backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    500
}
fn default_retry_max_delay_ms() -> u64 {
    10_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

/// Backend-neutral storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Storage URL: bare path, `file://`, or `s3://bucket/root`.
    pub url: String,
    /// S3 region (default: us-east-1).
    #[serde(default)]
    pub region: Option<String>,
    /// Explicit S3 endpoint for non-AWS object stores.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub credentials: Option<Credentials>,
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Synchronous object-storage interface shared by local and remote backends.
///
/// Keys are `/`-separated and relative to the backend root. `get` returns
/// `None` for a missing object; absence is a normal outcome, not an error.
pub trait StorageBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn put(&self, key: &str, data: &[u8]) -> Result<()>;
    fn delete(&self, key: &str) -> Result<()>;
    fn exists(&self, key: &str) -> Result<bool>;
    fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Build a storage backend from configuration, dispatching on the URL scheme.
pub fn backend_from_config(cfg: &StorageConfig) -> Result<Box<dyn StorageBackend>> {
    if let Some(rest) = cfg.url.strip_prefix("s3://") {
        let (bucket, root) = match rest.split_once('/') {
            Some((b, r)) => (b, r),
            None => (rest, ""),
        };
        if bucket.is_empty() {
            return Err(PhotonError::Config(format!(
                "invalid S3 URL '{}': missing bucket",
                cfg.url
            )));
        }
        let endpoint = cfg.endpoint.as_deref().ok_or_else(|| {
            PhotonError::Config("S3 storage requires an explicit endpoint".into())
        })?;
        let region = cfg.region.as_deref().unwrap_or("us-east-1");
        let creds = cfg.credentials.as_ref().ok_or_else(|| {
            PhotonError::Config("S3 storage requires credentials".into())
        })?;
        if creds.is_expired() {
            // Refresh is the auth collaborator's job; calls made with these
            // credentials will come back Unauthorized.
            tracing::warn!("storage credentials are already expired");
        }
        let backend = s3_backend::S3Backend::new(
            bucket,
            region,
            root,
            endpoint,
            creds.clone(),
            cfg.retry.clone(),
        )?;
        return Ok(Box::new(backend));
    }

    let path = cfg.url.strip_prefix("file://").unwrap_or(&cfg.url);
    Ok(Box::new(local_backend::LocalBackend::new(path)?))
}
