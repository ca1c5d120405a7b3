pub mod entry;
pub mod manifest;

pub use entry::{BackupState, CatalogEntry};
pub use manifest::CatalogManifest;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::debug;

use photon_storage::StorageBackend;
use photon_types::{FastKey, PhotoDigest, PhotoIdentity, PhotonError, Result, SHARD_COUNT};

/// Storage key of the manifest/pointer record for a user's catalog.
pub fn pointer_key(user_id: &str) -> String {
    format!("catalogs/{user_id}/.catalog")
}

/// Object-storage key of one catalog shard, by first-nibble index. Remote
/// shards live at fixed keys; the digest recorded in the manifest names
/// the version a reader must verify against.
pub fn shard_key(user_id: &str, index: usize) -> String {
    format!("catalogs/{user_id}/.catalog#{index:x}")
}

/// Working-store key of one shard version, by content digest. The local
/// copy keeps shard versions content-addressed so an interrupted publish
/// never clobbers the version the current pointer references.
fn local_shard_key(user_id: &str, digest_hex: &str) -> String {
    format!("catalogs/{user_id}/shards/{digest_hex}")
}

#[derive(Default)]
struct Shard {
    entries: BTreeMap<String, CatalogEntry>,
    dirty: bool,
}

impl Shard {
    /// Delimited rows in key order. An empty shard serializes to zero
    /// bytes, which is also what the empty manifest's digests describe.
    fn serialize_rows(&self) -> Vec<u8> {
        let mut out = String::new();
        for entry in self.entries.values() {
            out.push_str(&entry.to_row());
            out.push('\n');
        }
        out.into_bytes()
    }

    fn parse(bytes: &[u8]) -> Result<BTreeMap<String, CatalogEntry>> {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| PhotonError::InvalidFormat("catalog shard is not UTF-8".into()))?;
        let mut entries = BTreeMap::new();
        for line in text.lines() {
            if line.is_empty() {
                continue;
            }
            let entry = CatalogEntry::parse_row(line)?;
            entries.insert(entry.photo_key.clone(), entry);
        }
        Ok(entries)
    }
}

/// The authoritative mapping of identity → metadata → backup state,
/// persisted as 16 independently readable shard files behind a versioned
/// manifest/pointer.
///
/// Single-writer: all mutation goes through `&mut self`, and the owning
/// session serializes access. Concurrent writers from two processes are
/// not supported — one authoritative writer per user account.
pub struct CatalogDb {
    storage: Arc<dyn StorageBackend>,
    user_id: String,
    shards: Vec<Shard>,
    manifest: CatalogManifest,
    pointer: PhotoDigest,
    /// fast-key serialization → photo_key of the row carrying it, for
    /// provisional lookup and promotion-time reconciliation.
    fast_index: HashMap<String, String>,
}

impl std::fmt::Debug for CatalogDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogDb")
            .field("user_id", &self.user_id)
            .field("pointer", &self.pointer)
            .field("entries", &self.fast_index.len())
            .finish_non_exhaustive()
    }
}

impl CatalogDb {
    /// Open the catalog from its working store. A store with no pointer is
    /// a fresh account: that resolves to an empty catalog, not an error.
    pub fn open(storage: Arc<dyn StorageBackend>, user_id: &str) -> Result<Self> {
        let mut db = Self {
            storage,
            user_id: user_id.to_string(),
            shards: (0..SHARD_COUNT).map(|_| Shard::default()).collect(),
            manifest: CatalogManifest::empty(),
            pointer: PhotoDigest::compute(b""),
            fast_index: HashMap::new(),
        };
        db.pointer = CatalogManifest::pointer_of(&db.manifest.to_bytes()?);

        let Some(manifest_bytes) = db.storage.get(&pointer_key(user_id))? else {
            debug!("no catalog pointer for {user_id}: starting empty");
            return Ok(db);
        };
        let manifest = CatalogManifest::from_bytes(&manifest_bytes)?;

        let empty_digest = PhotoDigest::compute(b"").to_hex();
        for index in 0..SHARD_COUNT {
            let expected = &manifest.shard_digests[index];
            let bytes = match db.storage.get(&local_shard_key(user_id, expected))? {
                Some(bytes) => bytes,
                None if *expected == empty_digest => Vec::new(),
                None => {
                    return Err(PhotonError::Integrity(format!(
                        "catalog shard {index:x} missing but manifest expects {expected}"
                    )))
                }
            };
            let actual = PhotoDigest::compute(&bytes).to_hex();
            if actual != *expected {
                return Err(PhotonError::Integrity(format!(
                    "catalog shard {index:x} digest mismatch: expected {expected}, got {actual}"
                )));
            }
            db.shards[index].entries = Shard::parse(&bytes)?;
        }

        db.manifest = manifest;
        db.pointer = CatalogManifest::pointer_of(&manifest_bytes);
        db.rebuild_fast_index();
        debug!(
            version = db.manifest.version,
            entries = db.len(),
            "catalog opened"
        );
        Ok(db)
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// The current pointer value. Readers compare pointers, never shard
    /// contents, to detect staleness.
    pub fn current_version(&self) -> PhotoDigest {
        self.pointer
    }

    pub fn manifest(&self) -> &CatalogManifest {
        &self.manifest
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.entries.is_empty())
    }

    /// All entries in shard order. Lazy and restartable: each call yields
    /// a fresh iterator from the first shard.
    pub fn entries(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.shards.iter().flat_map(|s| s.entries.values())
    }

    pub fn get(&self, identity: &PhotoIdentity) -> Option<&CatalogEntry> {
        if let Some(digest) = identity.full_digest {
            let key = digest.to_hex();
            if let Some(entry) = self.shards[digest.shard_index()].entries.get(&key) {
                return Some(entry);
            }
        }
        let fast = identity.fast_key.serialize_key();
        let key = self.fast_index.get(&fast)?;
        self.get_by_key(key)
    }

    pub fn get_by_key(&self, key: &str) -> Option<&CatalogEntry> {
        let shard = Self::shard_of_key(key)?;
        self.shards[shard].entries.get(key)
    }

    /// Insert or merge an entry. Resolved entries reconcile away any stale
    /// provisional row recorded under the same fast key; full-digest
    /// equality is the sole merge criterion, fast keys are only hints.
    pub fn upsert(&mut self, entry: CatalogEntry) {
        match entry.full_digest {
            Some(digest) => self.upsert_resolved(entry, digest),
            None => self.upsert_provisional(entry),
        }
    }

    /// Set an entry's backup state. Transition authority belongs to the
    /// backup queue manager; the catalog only persists the field. Returns
    /// false when no row exists for the identity.
    pub fn set_backup_state(&mut self, identity: &PhotoIdentity, state: BackupState) -> bool {
        let key = match identity.full_digest {
            Some(digest) => {
                let key = digest.to_hex();
                if self.shards[digest.shard_index()].entries.contains_key(&key) {
                    key
                } else {
                    match self.fast_index.get(&identity.fast_key.serialize_key()) {
                        Some(k) => k.clone(),
                        None => return false,
                    }
                }
            }
            None => match self.fast_index.get(&identity.fast_key.serialize_key()) {
                Some(k) => k.clone(),
                None => return false,
            },
        };
        let Some(shard) = Self::shard_of_key(&key) else {
            return false;
        };
        match self.shards[shard].entries.get_mut(&key) {
            Some(entry) => {
                if entry.backup_state != state {
                    entry.backup_state = state;
                    self.shards[shard].dirty = true;
                }
                true
            }
            None => false,
        }
    }

    /// Remove an entry. Explicit user action only; the catalog never drops
    /// rows on its own.
    pub fn remove(&mut self, identity: &PhotoIdentity) -> Option<CatalogEntry> {
        let key = match identity.full_digest {
            Some(digest) => digest.to_hex(),
            None => self
                .fast_index
                .get(&identity.fast_key.serialize_key())
                .cloned()?,
        };
        let shard = Self::shard_of_key(&key)?;
        let removed = self.shards[shard].entries.remove(&key)?;
        self.shards[shard].dirty = true;
        self.fast_index.remove(&removed.fast_key().serialize_key());
        Some(removed)
    }

    /// Serialized rows of one shard, for upload.
    pub fn shard_bytes(&self, index: usize) -> Vec<u8> {
        self.shards[index].serialize_rows()
    }

    /// Publish pending mutations: serialize dirty shards to new immutable
    /// content, write them, then swap the pointer by writing the new
    /// manifest last. A failure anywhere leaves the previous pointer
    /// authoritative — readers never observe a half-written catalog.
    pub fn publish(&mut self) -> Result<PhotoDigest> {
        let mut new_digests = self.manifest.shard_digests.clone();
        let mut to_write: Vec<(usize, Vec<u8>)> = Vec::new();
        for (index, shard) in self.shards.iter().enumerate() {
            if !shard.dirty {
                continue;
            }
            let bytes = shard.serialize_rows();
            let digest = PhotoDigest::compute(&bytes).to_hex();
            if digest != new_digests[index] {
                new_digests[index] = digest;
                to_write.push((index, bytes));
            }
        }

        if to_write.is_empty() {
            for shard in &mut self.shards {
                shard.dirty = false;
            }
            return Ok(self.pointer);
        }

        // New shard versions land at their own content-addressed keys;
        // the versions the current pointer references stay intact until
        // the swap below succeeds.
        for (index, bytes) in &to_write {
            if bytes.is_empty() {
                continue;
            }
            self.storage
                .put(&local_shard_key(&self.user_id, &new_digests[*index]), bytes)?;
        }

        let manifest = CatalogManifest {
            version: self.manifest.version + 1,
            timestamp: chrono::Utc::now(),
            shard_digests: new_digests,
        };
        let manifest_bytes = manifest.to_bytes()?;
        self.storage.put(&pointer_key(&self.user_id), &manifest_bytes)?;

        let old_digests =
            std::mem::replace(&mut self.manifest.shard_digests, Vec::new());
        self.pointer = CatalogManifest::pointer_of(&manifest_bytes);
        self.manifest = manifest;
        for shard in &mut self.shards {
            shard.dirty = false;
        }
        self.sweep_unreferenced(&old_digests);
        debug!(
            version = self.manifest.version,
            shards = to_write.len(),
            "catalog published"
        );
        Ok(self.pointer)
    }

    /// Best-effort removal of shard versions no longer referenced by the
    /// current manifest. Failure only leaves garbage behind.
    fn sweep_unreferenced(&self, old_digests: &[String]) {
        let empty_digest = PhotoDigest::compute(b"").to_hex();
        for old in old_digests {
            if *old == empty_digest || self.manifest.shard_digests.contains(old) {
                continue;
            }
            if let Err(e) = self.storage.delete(&local_shard_key(&self.user_id, old)) {
                debug!("could not sweep old shard version {old}: {e}");
            }
        }
    }

    /// Replace local state with a newer remote catalog ("latest catalog
    /// wins"). `changed` carries the shards whose digests differ from the
    /// local manifest; every shard is digest-verified before anything is
    /// installed, and the working store is rewritten shards-first,
    /// pointer-last.
    pub fn adopt_remote(
        &mut self,
        manifest: CatalogManifest,
        manifest_bytes: &[u8],
        changed: Vec<(usize, Vec<u8>)>,
    ) -> Result<()> {
        let mut parsed = Vec::with_capacity(changed.len());
        for (index, bytes) in &changed {
            let expected = &manifest.shard_digests[*index];
            let actual = PhotoDigest::compute(bytes).to_hex();
            if actual != *expected {
                return Err(PhotonError::Integrity(format!(
                    "remote shard {index:x} digest mismatch: expected {expected}, got {actual}"
                )));
            }
            parsed.push((*index, Shard::parse(bytes)?));
        }

        for (index, bytes) in &changed {
            if bytes.is_empty() {
                continue;
            }
            self.storage.put(
                &local_shard_key(&self.user_id, &manifest.shard_digests[*index]),
                bytes,
            )?;
        }
        self.storage
            .put(&pointer_key(&self.user_id), manifest_bytes)?;

        for (index, entries) in parsed {
            self.shards[index].entries = entries;
            self.shards[index].dirty = false;
        }
        let old_digests =
            std::mem::replace(&mut self.manifest.shard_digests, Vec::new());
        self.pointer = CatalogManifest::pointer_of(manifest_bytes);
        self.manifest = manifest;
        self.rebuild_fast_index();
        self.sweep_unreferenced(&old_digests);
        Ok(())
    }

    fn upsert_resolved(&mut self, mut entry: CatalogEntry, digest: PhotoDigest) {
        let key = entry.photo_key.clone();
        let fast = entry.fast_key().serialize_key();

        // Promotion reconciliation: a provisional row under the same fast
        // key is the same suspected file — fold its state in and drop it.
        // A row already resolved to a *different* digest is a fast-key
        // collision between distinct files; it stays untouched.
        if let Some(prior_key) = self.fast_index.get(&fast).cloned() {
            if prior_key != key {
                if let Some(shard) = Self::shard_of_key(&prior_key) {
                    let is_stale_provisional = self.shards[shard]
                        .entries
                        .get(&prior_key)
                        .is_some_and(|row| !row.is_resolved());
                    if is_stale_provisional {
                        let stale = self.shards[shard].entries.remove(&prior_key).unwrap();
                        self.shards[shard].dirty = true;
                        entry.backup_state = entry.backup_state.merged_with(stale.backup_state);
                    }
                }
            }
        }

        let shard = digest.shard_index();
        match self.shards[shard].entries.get_mut(&key) {
            Some(existing) => existing.merge_from(&entry),
            None => {
                self.shards[shard].entries.insert(key.clone(), entry);
            }
        }
        self.shards[shard].dirty = true;
        self.fast_index.insert(fast, key);
    }

    fn upsert_provisional(&mut self, entry: CatalogEntry) {
        let fast = entry.photo_key.clone();

        // An existing row for this fast key (provisional or already
        // resolved) absorbs the observation instead of duplicating it.
        if let Some(existing_key) = self.fast_index.get(&fast).cloned() {
            if let Some(shard) = Self::shard_of_key(&existing_key) {
                if let Some(existing) = self.shards[shard].entries.get_mut(&existing_key) {
                    existing.merge_from(&entry);
                    self.shards[shard].dirty = true;
                    return;
                }
            }
        }

        let shard = entry.shard_index();
        self.shards[shard].entries.insert(fast.clone(), entry);
        self.shards[shard].dirty = true;
        self.fast_index.insert(fast.clone(), fast);
    }

    fn shard_of_key(key: &str) -> Option<usize> {
        if let Some(digest) = PhotoDigest::from_hex(key) {
            return Some(digest.shard_index());
        }
        FastKey::parse_key(key).map(|fk| fk.head_digest.shard_index())
    }

    fn rebuild_fast_index(&mut self) {
        self.fast_index.clear();
        for shard in &self.shards {
            for entry in shard.entries.values() {
                self.fast_index
                    .insert(entry.fast_key().serialize_key(), entry.photo_key.clone());
            }
        }
    }
}
