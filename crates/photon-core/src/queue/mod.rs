use std::collections::HashMap;
use std::sync::Mutex;

use tracing::{debug, warn};

use photon_types::{PhotoDigest, PhotoIdentity, PhotonError, Result};

use crate::cache::{CacheKind, CacheStore};
use crate::cancel::Cancel;
use crate::catalog::{BackupState, CatalogDb, CatalogEntry};
use crate::events::{EngineEvent, EventBus};
use crate::identity;
use crate::source::PhotoSource;
use crate::sync::CloudSync;
use crate::thumb;

/// Default number of concurrent upload workers for a queue drain.
pub const DEFAULT_UPLOAD_CONCURRENCY: usize = 4;

/// Why an item sits in the `failed` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Network-level; eligible for manual or scheduled retry.
    Transient,
    /// Source/content-level (unreadable file, undecodable image); not
    /// retried automatically, surfaced for a user decision.
    Permanent,
}

/// Result of one queue drain.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainStats {
    pub uploaded: usize,
    pub failed: usize,
    pub requeued: usize,
}

struct UploadOutcome {
    full_digest: PhotoDigest,
    format: photon_types::PhotoFormat,
}

/// Orchestrates outstanding upload work: the only component that mutates
/// an entry's backup state.
///
/// State machine per identity:
/// `none -enqueue-> queued -start-> uploading -success-> uploaded`;
/// `uploading -error-> failed`; `failed -retry-> queued`.
pub struct BackupQueue {
    concurrency: usize,
    /// photo_key → failure class for items failed in this session.
    failures: Mutex<HashMap<String, FailureKind>>,
}

impl BackupQueue {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Queue a photo for backup. Idempotent: an identity already queued,
    /// uploading, or uploaded is a no-op. Returns whether the item was
    /// newly queued.
    pub fn enqueue(
        &self,
        db: &mut CatalogDb,
        entry: CatalogEntry,
        events: &EventBus,
    ) -> bool {
        let identity = entry.identity();
        if let Some(existing) = db.get(&identity) {
            match existing.backup_state {
                BackupState::Queued | BackupState::Uploading | BackupState::Uploaded => {
                    return false
                }
                // `failed` only leaves through an explicit retry.
                BackupState::Failed => return false,
                BackupState::None => {}
            }
        }
        let photo_key = identity.photo_key();
        let mut entry = entry;
        entry.backup_state = BackupState::Queued;
        db.upsert(entry);
        events.publish(EngineEvent::BackupStateChanged {
            photo_key,
            state: BackupState::Queued,
        });
        true
    }

    /// Re-queue a failed item. Returns false if the key is not in the
    /// failed state.
    pub fn retry(&self, db: &mut CatalogDb, photo_key: &str, events: &EventBus) -> bool {
        let Some(entry) = db.get_by_key(photo_key) else {
            return false;
        };
        if entry.backup_state != BackupState::Failed {
            return false;
        }
        let identity = entry.identity();
        db.set_backup_state(&identity, BackupState::Queued);
        self.failures.lock().unwrap().remove(photo_key);
        events.publish(EngineEvent::BackupStateChanged {
            photo_key: photo_key.to_string(),
            state: BackupState::Queued,
        });
        true
    }

    /// Failure class for an item in the failed state, if known this session.
    pub fn failure_of(&self, photo_key: &str) -> Option<FailureKind> {
        self.failures.lock().unwrap().get(photo_key).copied()
    }

    /// Crash recovery at session open: a persisted `uploading` state means
    /// the process died mid-upload. Demote to `queued`; re-driving the
    /// upload is safe because objects are content-keyed.
    pub fn restore_pending(&self, db: &mut CatalogDb) -> usize {
        let stuck: Vec<PhotoIdentity> = db
            .entries()
            .filter(|e| e.backup_state == BackupState::Uploading)
            .map(|e| e.identity())
            .collect();
        for identity in &stuck {
            db.set_backup_state(identity, BackupState::Queued);
        }
        if !stuck.is_empty() {
            debug!("re-queued {} interrupted uploads", stuck.len());
        }
        stuck.len()
    }

    /// Drain queued items over a bounded worker pool. Per item, in order:
    /// resolve the full digest (if unknown), upload original bytes, encode
    /// and upload the thumbnail, then promote the catalog entry to
    /// `uploaded` — so a crash mid-sequence never marks an entry uploaded
    /// without the bytes actually present remotely. One bad item never
    /// aborts the drain. Ends with a catalog publish and a remote push.
    pub fn process_queue(
        &self,
        db: &Mutex<CatalogDb>,
        sync: &CloudSync,
        cache: &CacheStore,
        source: &dyn PhotoSource,
        events: &EventBus,
        cancel: &dyn Cancel,
    ) -> Result<DrainStats> {
        let queued: Vec<PhotoIdentity> = {
            let mut db = db.lock().unwrap();
            let queued: Vec<PhotoIdentity> = db
                .entries()
                .filter(|e| e.backup_state == BackupState::Queued)
                .map(|e| e.identity())
                .collect();
            for identity in &queued {
                db.set_backup_state(identity, BackupState::Uploading);
                events.publish(EngineEvent::BackupStateChanged {
                    photo_key: identity.photo_key(),
                    state: BackupState::Uploading,
                });
            }
            queued
        };

        let mut stats = DrainStats::default();
        if queued.is_empty() {
            return Ok(stats);
        }

        let workers = self.concurrency.min(queued.len());
        let (work_tx, work_rx) = crossbeam_channel::bounded::<PhotoIdentity>(workers * 2);
        let (result_tx, result_rx) =
            crossbeam_channel::bounded::<(PhotoIdentity, Result<UploadOutcome>)>(workers * 2);

        std::thread::scope(|s| {
            for _ in 0..workers {
                let work_rx = work_rx.clone();
                let result_tx = result_tx.clone();
                s.spawn(move || {
                    for item in work_rx.iter() {
                        let result = upload_one(&item, source, sync, cache, cancel);
                        if result_tx.send((item, result)).is_err() {
                            break;
                        }
                    }
                });
            }
            // Drop originals so channels close when the feeder and workers
            // are done.
            drop(work_rx);
            drop(result_tx);

            // Feed every marked item even under cancellation: workers
            // short-circuit cancelled items, and the consumer re-queues
            // them, so nothing is left stuck in `uploading`.
            s.spawn(move || {
                for item in queued {
                    if work_tx.send(item).is_err() {
                        break;
                    }
                }
            });

            for (identity, result) in result_rx.iter() {
                self.record_result(db, identity, result, events, &mut stats);
            }
        });

        {
            let mut db = db.lock().unwrap();
            let pointer = db.publish()?;
            events.publish(EngineEvent::CatalogPublished {
                version: db.manifest().version,
                pointer,
            });
            sync.sync_up(&db)?;
        }
        debug!(?stats, "queue drain complete");
        Ok(stats)
    }

    fn record_result(
        &self,
        db: &Mutex<CatalogDb>,
        identity: PhotoIdentity,
        result: Result<UploadOutcome>,
        events: &EventBus,
        stats: &mut DrainStats,
    ) {
        let mut db = db.lock().unwrap();
        match result {
            Ok(outcome) => {
                let mut promoted = match db.get(&identity) {
                    Some(existing) => existing.promoted(outcome.full_digest),
                    None => CatalogEntry::resolved(
                        identity.fast_key,
                        outcome.full_digest,
                        outcome.format,
                        chrono::Utc::now(),
                    ),
                };
                promoted.format = outcome.format;
                promoted.backup_state = BackupState::Uploaded;
                let photo_key = promoted.photo_key.clone();
                db.upsert(promoted);
                events.publish(EngineEvent::BackupStateChanged {
                    photo_key,
                    state: BackupState::Uploaded,
                });
                events.publish(EngineEvent::ThumbnailReady {
                    digest: outcome.full_digest,
                });
                stats.uploaded += 1;
            }
            Err(PhotonError::Cancelled) => {
                // Interrupted, not failed: back to queued for the next drain.
                db.set_backup_state(&identity, BackupState::Queued);
                stats.requeued += 1;
            }
            Err(e) => {
                let kind = if e.is_transient() {
                    FailureKind::Transient
                } else {
                    FailureKind::Permanent
                };
                let photo_key = identity.photo_key();
                warn!("upload of {photo_key} failed ({kind:?}): {e}");
                db.set_backup_state(&identity, BackupState::Failed);
                self.failures.lock().unwrap().insert(photo_key.clone(), kind);
                events.publish(EngineEvent::BackupStateChanged {
                    photo_key: photo_key.clone(),
                    state: BackupState::Failed,
                });
                events.publish(EngineEvent::UploadFailed {
                    photo_key,
                    transient: kind == FailureKind::Transient,
                });
                stats.failed += 1;
            }
        }
    }
}

/// One item's upload sequence, run on a worker thread.
fn upload_one(
    identity: &PhotoIdentity,
    source: &dyn PhotoSource,
    sync: &CloudSync,
    cache: &CacheStore,
    cancel: &dyn Cancel,
) -> Result<UploadOutcome> {
    cancel.check()?;
    let bytes = source.load_full_image(identity, cancel)?;

    let full_digest = identity
        .full_digest
        .unwrap_or_else(|| identity::full_digest_of_bytes(&bytes));
    let format = identity::detect_format(&bytes[..bytes.len().min(identity::HEAD_BYTES)]);

    cancel.check()?;
    sync.upload_photo(&full_digest, &bytes)?;

    cancel.check()?;
    let preview = thumb::encode_preview(&bytes)?;
    sync.upload_thumbnail(&full_digest, &preview)?;

    // Warm the local cache; a failure here is not an upload failure.
    if let Err(e) = cache.put(CacheKind::Thumbnail, &full_digest, &preview) {
        warn!("local thumbnail cache write for {full_digest} failed: {e}");
    }

    Ok(UploadOutcome {
        full_digest,
        format,
    })
}
