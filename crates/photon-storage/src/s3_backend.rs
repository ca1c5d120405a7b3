use std::io::Read;
use std::time::Duration;

use rusty_s3::actions::{ListObjectsV2, S3Action};
use rusty_s3::{Bucket, UrlStyle};

use photon_types::{PhotonError, Result};

use crate::retry::{with_backoff, TransferError};
use crate::{Credentials, RetryConfig, StorageBackend};

/// Validity window for presigned request URLs.
const PRESIGN_FOR: Duration = Duration::from_secs(3600);

/// S3-compatible backend: every operation is a presigned request issued
/// over a blocking HTTP agent, retried on transient failures.
pub struct S3Backend {
    bucket: Bucket,
    signing: rusty_s3::Credentials,
    agent: ureq::Agent,
    retry: RetryConfig,
    root: String,
}

impl S3Backend {
    pub fn new(
        bucket_name: &str,
        region: &str,
        root: &str,
        endpoint: &str,
        credentials: Credentials,
        retry: RetryConfig,
    ) -> Result<Self> {
        let endpoint_url = endpoint.parse().map_err(|e| {
            PhotonError::Config(format!("invalid S3 endpoint URL '{endpoint}': {e}"))
        })?;
        // The endpoint is always explicit (self-hosted stores included), so
        // path-style addressing is the safe choice.
        let bucket = Bucket::new(
            endpoint_url,
            UrlStyle::Path,
            bucket_name.to_string(),
            region.to_string(),
        )
        .map_err(|e| PhotonError::Config(format!("S3 bucket '{bucket_name}': {e}")))?;

        // Short-lived credentials from the auth collaborator may carry a
        // session token that has to ride along on every signature.
        let signing = match &credentials.session_token {
            Some(token) => rusty_s3::Credentials::new_with_token(
                &credentials.access_key_id,
                &credentials.secret_access_key,
                token,
            ),
            None => rusty_s3::Credentials::new(
                &credentials.access_key_id,
                &credentials.secret_access_key,
            ),
        };

        Ok(Self {
            bucket,
            signing,
            agent: ureq::AgentBuilder::new()
                .timeout_connect(Duration::from_secs(30))
                .timeout_read(Duration::from_secs(300))
                .timeout_write(Duration::from_secs(300))
                .build(),
            retry,
            root: root.trim_matches('/').to_string(),
        })
    }

    fn object_name(&self, key: &str) -> String {
        if self.root.is_empty() {
            key.to_string()
        } else {
            format!("{}/{key}", self.root)
        }
    }

    fn read_body(resp: ureq::Response) -> std::result::Result<Vec<u8>, TransferError> {
        let mut body = Vec::new();
        resp.into_reader()
            .read_to_end(&mut body)
            .map_err(TransferError::Read)?;
        Ok(body)
    }

    /// Convert a transfer failure that survived retries into the
    /// application taxonomy: rejected credentials are `Unauthorized`,
    /// anything else still failing at this point is a network problem.
    fn give_up(op: &str, key: &str, e: TransferError) -> PhotonError {
        match e.status() {
            Some(401) | Some(403) => PhotonError::Unauthorized,
            _ => PhotonError::Network(format!("S3 {op} {key}: {e}")),
        }
    }
}

impl StorageBackend for S3Backend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let url = self
            .bucket
            .get_object(Some(&self.signing), &self.object_name(key))
            .sign(PRESIGN_FOR);
        with_backoff(&self.retry, "S3 GET", || {
            match self.agent.get(url.as_str()).call() {
                Ok(resp) => Ok(Some(Self::read_body(resp)?)),
                // A missing object is an answer, not a failure.
                Err(ureq::Error::Status(404, _)) => Ok(None),
                Err(e) => Err(TransferError::http(e)),
            }
        })
        .map_err(|e| Self::give_up("GET", key, e))
    }

    fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let url = self
            .bucket
            .put_object(Some(&self.signing), &self.object_name(key))
            .sign(PRESIGN_FOR);
        with_backoff(&self.retry, "S3 PUT", || {
            self.agent
                .put(url.as_str())
                .send_bytes(data)
                .map(|_| ())
                .map_err(TransferError::http)
        })
        .map_err(|e| Self::give_up("PUT", key, e))
    }

    fn delete(&self, key: &str) -> Result<()> {
        let url = self
            .bucket
            .delete_object(Some(&self.signing), &self.object_name(key))
            .sign(PRESIGN_FOR);
        with_backoff(&self.retry, "S3 DELETE", || {
            match self.agent.delete(url.as_str()).call() {
                // Deleting what is already gone counts as done.
                Ok(_) | Err(ureq::Error::Status(404, _)) => Ok(()),
                Err(e) => Err(TransferError::http(e)),
            }
        })
        .map_err(|e| Self::give_up("DELETE", key, e))
    }

    fn exists(&self, key: &str) -> Result<bool> {
        let url = self
            .bucket
            .head_object(Some(&self.signing), &self.object_name(key))
            .sign(PRESIGN_FOR);
        with_backoff(&self.retry, "S3 HEAD", || {
            match self.agent.head(url.as_str()).call() {
                Ok(_) => Ok(true),
                Err(ureq::Error::Status(404, _)) => Ok(false),
                Err(e) => Err(TransferError::http(e)),
            }
        })
        .map_err(|e| Self::give_up("HEAD", key, e))
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let wanted = self.object_name(prefix);
        let strip = if self.root.is_empty() {
            String::new()
        } else {
            format!("{}/", self.root)
        };

        let mut keys = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut action = self.bucket.list_objects_v2(Some(&self.signing));
            action.query_mut().insert("prefix", &wanted);
            if let Some(ref token) = cursor {
                action.query_mut().insert("continuation-token", token);
            }
            let url = action.sign(PRESIGN_FOR);

            let page = with_backoff(&self.retry, "S3 LIST", || {
                let resp = self
                    .agent
                    .get(url.as_str())
                    .call()
                    .map_err(TransferError::http)?;
                let body = Self::read_body(resp)?;
                let text = std::str::from_utf8(&body)
                    .map_err(|e| TransferError::Fatal(format!("non-UTF-8 LIST response: {e}")))?;
                ListObjectsV2::parse_response(text)
                    .map_err(|e| TransferError::Fatal(format!("unparseable LIST response: {e}")))
            })
            .map_err(|e| Self::give_up("LIST", prefix, e))?;

            for object in &page.contents {
                // Directory markers are not objects of ours.
                if object.key.ends_with('/') {
                    continue;
                }
                match object.key.strip_prefix(&strip) {
                    Some(rel) if !rel.is_empty() => keys.push(rel.to_string()),
                    _ => keys.push(object.key.clone()),
                }
            }

            cursor = page.next_continuation_token;
            if cursor.is_none() {
                break;
            }
        }
        Ok(keys)
    }
}
