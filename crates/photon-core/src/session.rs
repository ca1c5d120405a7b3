use std::sync::{Arc, Mutex};

use crossbeam_channel::Receiver;
use tracing::{debug, warn};

use photon_storage::{local_backend::LocalBackend, StorageBackend};
use photon_types::{PhotoDigest, Result};

use crate::cache::{CacheKind, CacheStore};
use crate::cancel::Cancel;
use crate::catalog::{CatalogDb, CatalogEntry};
use crate::config::{self, EngineConfig};
use crate::events::{EngineEvent, EventBus};
use crate::queue::{BackupQueue, DrainStats, FailureKind};
use crate::source::PhotoSource;
use crate::sync::CloudSync;

/// One account's engine instance: explicitly constructed services wired
/// together, with lifetime tied to the account session. The UI layer holds
/// a `Session` and nothing else — there are no process-wide singletons.
pub struct Session {
    config: EngineConfig,
    catalog: Mutex<CatalogDb>,
    cache: CacheStore,
    sync: CloudSync,
    queue: BackupQueue,
    events: EventBus,
}

impl Session {
    /// Open a session using the configured remote storage backend.
    pub fn open(config: EngineConfig) -> Result<Self> {
        let remote = photon_storage::backend_from_config(&config.storage)?;
        Self::open_with_backend(config, Arc::from(remote))
    }

    /// Open a session over an explicit remote backend (tests, offline).
    pub fn open_with_backend(
        config: EngineConfig,
        remote: Arc<dyn StorageBackend>,
    ) -> Result<Self> {
        let cache_dir = config::resolve_cache_dir(&config);

        let catalog_store = LocalBackend::new(&cache_dir.join("catalog").to_string_lossy())?;
        let mut catalog = CatalogDb::open(Arc::new(catalog_store), &config.user_id)?;

        let queue = BackupQueue::new(config.upload_concurrency);
        let requeued = queue.restore_pending(&mut catalog);
        if requeued > 0 {
            debug!("session open: {requeued} interrupted uploads re-queued");
        }

        let cache =
            CacheStore::with_memory_entries(cache_dir.join("blobs"), config.memory_cache_entries);
        let sync = CloudSync::new(remote, &config.user_id)
            .with_prefetch_limit(config.prefetch_limit);

        Ok(Self {
            config,
            catalog: Mutex::new(catalog),
            cache,
            sync,
            queue,
            events: EventBus::new(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn sync_service(&self) -> &CloudSync {
        &self.sync
    }

    /// Subscribe to engine events. Fire-and-forget from the engine's side.
    pub fn subscribe(&self) -> Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// A snapshot of all catalog entries, in shard order.
    pub fn load_catalog(&self) -> Vec<CatalogEntry> {
        self.catalog.lock().unwrap().entries().cloned().collect()
    }

    pub fn current_version(&self) -> PhotoDigest {
        self.catalog.lock().unwrap().current_version()
    }

    /// Thumbnail bytes for a resolved photo: local cache first, then the
    /// cloud, under single-flight so a grid view never issues duplicate
    /// downloads for one identity.
    pub fn load_thumbnail(&self, digest: &PhotoDigest, cancel: &dyn Cancel) -> Result<Vec<u8>> {
        self.cache
            .get_or_fetch(CacheKind::Thumbnail, digest, cancel, |c| {
                c.check()?;
                let bytes = self.sync.download_thumbnail(digest)?;
                self.events
                    .publish(EngineEvent::ThumbnailReady { digest: *digest });
                Ok(bytes)
            })
    }

    /// Full original bytes for a resolved photo, cached on disk after the
    /// first download.
    pub fn load_full_image(&self, digest: &PhotoDigest, cancel: &dyn Cancel) -> Result<Vec<u8>> {
        self.cache
            .get_or_fetch(CacheKind::Original, digest, cancel, |c| {
                c.check()?;
                self.sync.download_photo(digest)
            })
    }

    /// Fetch thumbnails for the visible window, bounded concurrency, no
    /// speculation beyond the window.
    pub fn prefetch_thumbnails(&self, window: &[PhotoDigest], cancel: &dyn Cancel) -> usize {
        self.sync.prefetch_thumbnails(window, &self.cache, cancel)
    }

    /// Scan a source and queue every photo not yet known to the catalog.
    /// Returns the number newly queued. One unreadable photo never aborts
    /// the scan.
    pub fn import(&self, source: &dyn PhotoSource) -> Result<usize> {
        let identities = source.list_photos()?;
        let mut queued = 0;
        let mut catalog = self.catalog.lock().unwrap();
        for identity in identities {
            let meta = match source.metadata(&identity) {
                Ok(meta) => meta,
                Err(e) => {
                    warn!("skipping {}: {e}", identity.photo_key());
                    continue;
                }
            };
            let entry =
                CatalogEntry::provisional(identity.fast_key, meta.format, meta.photo_date);
            if self.queue.enqueue(&mut catalog, entry, &self.events) {
                queued += 1;
            }
        }
        if queued > 0 {
            // `queued` is a persisted state: publish so a restart resumes
            // the backlog.
            let pointer = catalog.publish()?;
            self.events.publish(EngineEvent::CatalogPublished {
                version: catalog.manifest().version,
                pointer,
            });
        }
        Ok(queued)
    }

    /// Drain the backup queue against a source of photo bytes.
    pub fn process_queue(&self, source: &dyn PhotoSource, cancel: &dyn Cancel) -> Result<DrainStats> {
        self.queue.process_queue(
            &self.catalog,
            &self.sync,
            &self.cache,
            source,
            &self.events,
            cancel,
        )
    }

    /// Re-queue a failed item.
    pub fn retry(&self, photo_key: &str) -> bool {
        let mut catalog = self.catalog.lock().unwrap();
        self.queue.retry(&mut catalog, photo_key, &self.events)
    }

    /// Failure class for a failed item, if known this session.
    pub fn failure_of(&self, photo_key: &str) -> Option<FailureKind> {
        self.queue.failure_of(photo_key)
    }

    /// Pull a newer remote catalog, if any. Returns the changed shard
    /// count, or `None` when already current.
    pub fn sync_down(&self) -> Result<Option<usize>> {
        let mut catalog = self.catalog.lock().unwrap();
        let changed = self.sync.sync_down(&mut catalog, &self.cache)?;
        if let Some(count) = changed {
            self.events.publish(EngineEvent::CatalogSynced {
                pointer: catalog.current_version(),
                changed_shards: count,
            });
        }
        Ok(changed)
    }

    /// Push the local catalog to the remote store.
    pub fn push_catalog(&self) -> Result<bool> {
        let catalog = self.catalog.lock().unwrap();
        self.sync.sync_up(&catalog)
    }

    /// Remove a photo from the catalog and request deletion of its cloud
    /// objects. Explicit user action; never happens automatically.
    pub fn remove(&self, digest: &PhotoDigest) -> Result<bool> {
        let removed = {
            let mut catalog = self.catalog.lock().unwrap();
            let Some(entry) = catalog.get_by_key(&digest.to_hex()).cloned() else {
                return Ok(false);
            };
            let removed = catalog.remove(&entry.identity()).is_some();
            catalog.publish()?;
            removed
        };
        if removed {
            // Best-effort: the catalog row is gone either way; orphaned
            // objects are reclaimable by an explicit maintenance sweep.
            if let Err(e) = self.sync.delete_photo_objects(digest) {
                warn!("cloud object deletion for {digest} failed: {e}");
            }
            let _ = std::fs::remove_file(self.cache.disk_path(CacheKind::Thumbnail, digest));
            let _ = std::fs::remove_file(self.cache.disk_path(CacheKind::Original, digest));
        }
        Ok(removed)
    }
}
