use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use photon_storage::StorageBackend;
use photon_types::{PhotoDigest, PhotonError, Result, SHARD_COUNT};

use crate::cache::{CacheKind, CacheStore};
use crate::cancel::Cancel;
use crate::catalog::{pointer_key, shard_key, CatalogDb, CatalogManifest};

/// Bound on concurrently fetched thumbnails for a visible window.
pub const DEFAULT_PREFETCH_LIMIT: usize = 10;

/// Object key for a photo's original bytes.
pub fn photo_object_key(user_id: &str, digest: &PhotoDigest) -> String {
    format!("photos/{user_id}/{}.dat", digest.to_hex())
}

/// Object key for a photo's PTM-256 preview.
pub fn thumbnail_object_key(user_id: &str, digest: &PhotoDigest) -> String {
    format!("thumbnails/{user_id}/{}.jpg", digest.to_hex())
}

/// Object key mapping an external login to an internal account id. The
/// auth collaborator writes these records; the key shape lives here so
/// the whole storage namespace is defined in one place.
pub fn identity_mapping_key(provider: &str, provider_profile_id: &str) -> String {
    format!("identities/{provider}:{provider_profile_id}")
}

/// The remote catalog pointer as last fetched: its digest (the pointer
/// value), the manifest it parses to, and the raw bytes that produced it.
pub struct RemotePointer {
    pub pointer: PhotoDigest,
    pub manifest: CatalogManifest,
    pub bytes: Vec<u8>,
}

/// Uploads/downloads catalog shards, thumbnails and originals under a
/// per-user namespace in object storage.
///
/// Catalog sync cost is proportional to change size, not catalog size:
/// readers compare pointers and re-fetch only shards whose digest moved.
#[derive(Clone)]
pub struct CloudSync {
    storage: Arc<dyn StorageBackend>,
    user_id: String,
    prefetch_limit: usize,
}

impl CloudSync {
    pub fn new(storage: Arc<dyn StorageBackend>, user_id: &str) -> Self {
        Self {
            storage,
            user_id: user_id.to_string(),
            prefetch_limit: DEFAULT_PREFETCH_LIMIT,
        }
    }

    pub fn with_prefetch_limit(mut self, limit: usize) -> Self {
        self.prefetch_limit = limit.max(1);
        self
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Fetch the remote catalog pointer. A fresh account with nothing
    /// uploaded yet resolves to `None` — an empty catalog, not an error.
    pub fn download_pointer(&self) -> Result<Option<RemotePointer>> {
        let Some(bytes) = self.storage.get(&pointer_key(&self.user_id))? else {
            return Ok(None);
        };
        let manifest = CatalogManifest::from_bytes(&bytes)?;
        let pointer = CatalogManifest::pointer_of(&bytes);
        Ok(Some(RemotePointer {
            pointer,
            manifest,
            bytes,
        }))
    }

    /// Download the given shards, verifying each against the manifest
    /// digest. A mismatch is treated as a torn read and re-fetched once;
    /// a second mismatch is corruption and fails the sync.
    pub fn download_catalog_shards(
        &self,
        manifest: &CatalogManifest,
        indices: &[usize],
    ) -> Result<Vec<(usize, Vec<u8>)>> {
        let mut out = Vec::with_capacity(indices.len());
        for &index in indices {
            out.push((index, self.download_shard_verified(manifest, index)?));
        }
        Ok(out)
    }

    fn download_shard_verified(
        &self,
        manifest: &CatalogManifest,
        index: usize,
    ) -> Result<Vec<u8>> {
        let expected = &manifest.shard_digests[index];
        let empty = PhotoDigest::compute(b"").to_hex();
        for attempt in 0..2 {
            let bytes = match self.storage.get(&shard_key(&self.user_id, index))? {
                Some(bytes) => bytes,
                None if *expected == empty => Vec::new(),
                None => {
                    return Err(PhotonError::Integrity(format!(
                        "remote shard {index:x} missing but manifest expects {expected}"
                    )))
                }
            };
            let actual = PhotoDigest::compute(&bytes).to_hex();
            if actual == *expected {
                return Ok(bytes);
            }
            if attempt == 0 {
                warn!("shard {index:x} digest mismatch ({actual} != {expected}), re-fetching");
            }
        }
        Err(PhotonError::Integrity(format!(
            "remote shard {index:x} digest mismatch persists after re-fetch"
        )))
    }

    /// Upload one shard's serialized rows; returns its content digest.
    pub fn upload_catalog_shard(&self, index: usize, bytes: &[u8]) -> Result<PhotoDigest> {
        self.storage.put(&shard_key(&self.user_id, index), bytes)?;
        Ok(PhotoDigest::compute(bytes))
    }

    /// Swap the remote pointer by writing the manifest. Callers must have
    /// written every referenced shard first.
    pub fn publish_pointer(&self, manifest_bytes: &[u8]) -> Result<PhotoDigest> {
        self.storage.put(&pointer_key(&self.user_id), manifest_bytes)?;
        Ok(CatalogManifest::pointer_of(manifest_bytes))
    }

    /// Upload a photo's original bytes. Objects are keyed by content, so
    /// an already-present object is skipped; returns whether bytes were
    /// actually sent.
    pub fn upload_photo(&self, digest: &PhotoDigest, bytes: &[u8]) -> Result<bool> {
        let key = photo_object_key(&self.user_id, digest);
        if self.storage.exists(&key)? {
            debug!("photo {digest} already uploaded, skipping");
            return Ok(false);
        }
        self.storage.put(&key, bytes)?;
        Ok(true)
    }

    pub fn download_photo(&self, digest: &PhotoDigest) -> Result<Vec<u8>> {
        self.storage
            .get(&photo_object_key(&self.user_id, digest))?
            .ok_or_else(|| PhotonError::NotFound(format!("photo {digest}")))
    }

    pub fn upload_thumbnail(&self, digest: &PhotoDigest, bytes: &[u8]) -> Result<bool> {
        let key = thumbnail_object_key(&self.user_id, digest);
        if self.storage.exists(&key)? {
            return Ok(false);
        }
        self.storage.put(&key, bytes)?;
        Ok(true)
    }

    pub fn download_thumbnail(&self, digest: &PhotoDigest) -> Result<Vec<u8>> {
        self.storage
            .get(&thumbnail_object_key(&self.user_id, digest))?
            .ok_or_else(|| PhotonError::NotFound(format!("thumbnail {digest}")))
    }

    /// Delete a photo's cloud objects. Used by explicit removal only.
    pub fn delete_photo_objects(&self, digest: &PhotoDigest) -> Result<()> {
        self.storage.delete(&photo_object_key(&self.user_id, digest))?;
        self.storage
            .delete(&thumbnail_object_key(&self.user_id, digest))?;
        Ok(())
    }

    /// Pull a newer remote catalog into the local database. Fetches only
    /// shards whose digest differs from the local manifest, reusing
    /// locally cached shard content by digest. Returns the number of
    /// shards that changed, or `None` when the local catalog was already
    /// current (including the fresh-account case).
    pub fn sync_down(&self, db: &mut CatalogDb, cache: &CacheStore) -> Result<Option<usize>> {
        let Some(remote) = self.download_pointer()? else {
            return Ok(None);
        };
        if remote.pointer == db.current_version() {
            return Ok(None);
        }

        let indices = db.manifest().changed_shards(&remote.manifest);
        let mut changed = Vec::with_capacity(indices.len());
        for index in indices {
            let digest_hex = &remote.manifest.shard_digests[index];
            let shard_digest = PhotoDigest::from_hex(digest_hex).ok_or_else(|| {
                PhotonError::InvalidFormat(format!("manifest shard digest '{digest_hex}'"))
            })?;
            let bytes = match cache.get(CacheKind::CatalogArtifact, &shard_digest)? {
                Some(bytes) => bytes,
                None => {
                    let bytes = self.download_shard_verified(&remote.manifest, index)?;
                    cache.put(CacheKind::CatalogArtifact, &shard_digest, &bytes)?;
                    bytes
                }
            };
            changed.push((index, bytes));
        }

        let count = changed.len();
        db.adopt_remote(remote.manifest, &remote.bytes, changed)?;
        debug!(shards = count, "adopted remote catalog");
        Ok(Some(count))
    }

    /// Push the local catalog to the remote store: shards whose digest
    /// differs remotely, then the pointer. Latest catalog wins.
    pub fn sync_up(&self, db: &CatalogDb) -> Result<bool> {
        let local_pointer = db.current_version();
        let remote = self.download_pointer()?;
        if let Some(ref r) = remote {
            if r.pointer == local_pointer {
                return Ok(false);
            }
        }

        let indices: Vec<usize> = match &remote {
            Some(r) => r.manifest.changed_shards(db.manifest()),
            None => (0..SHARD_COUNT).collect(),
        };
        for index in indices {
            let bytes = db.shard_bytes(index);
            // A fresh remote needs no objects for still-empty shards; the
            // reader treats a missing shard with the empty digest as empty.
            if bytes.is_empty() && remote.is_none() {
                continue;
            }
            self.storage.put(&shard_key(&self.user_id, index), &bytes)?;
        }
        self.publish_pointer(&db.manifest().to_bytes()?)?;
        Ok(true)
    }

    /// Fetch thumbnails for a visible window of identities, at most
    /// `prefetch_limit` concurrently, through the cache's single-flight
    /// path. Nothing beyond the window is started speculatively. Returns
    /// how many thumbnails are now locally available.
    pub fn prefetch_thumbnails(
        &self,
        window: &[PhotoDigest],
        cache: &CacheStore,
        cancel: &dyn Cancel,
    ) -> usize {
        let workers = self.prefetch_limit.min(window.len());
        if workers == 0 {
            return 0;
        }
        let fetched = AtomicUsize::new(0);
        let (work_tx, work_rx) = crossbeam_channel::bounded::<PhotoDigest>(window.len());
        for digest in window {
            // Window is bounded by the caller; queue it all up front.
            let _ = work_tx.send(*digest);
        }
        drop(work_tx);

        std::thread::scope(|s| {
            for _ in 0..workers {
                let work_rx = work_rx.clone();
                let fetched = &fetched;
                s.spawn(move || {
                    for digest in work_rx.iter() {
                        if cancel.is_cancelled() {
                            break;
                        }
                        let result = cache.get_or_fetch(
                            CacheKind::Thumbnail,
                            &digest,
                            cancel,
                            |c| {
                                c.check()?;
                                self.download_thumbnail(&digest)
                            },
                        );
                        match result {
                            Ok(_) => {
                                fetched.fetch_add(1, Ordering::SeqCst);
                            }
                            Err(PhotonError::Cancelled) => break,
                            Err(e) => warn!("thumbnail prefetch {digest}: {e}"),
                        }
                    }
                });
            }
        });
        fetched.into_inner()
    }
}
