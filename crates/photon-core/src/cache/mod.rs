pub mod single_flight;

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use photon_types::{PhotoDigest, Result};

use crate::cancel::Cancel;
use self::single_flight::FlightTable;

/// Default bound on the in-memory cache layer, in entries.
pub const DEFAULT_MEMORY_ENTRIES: usize = 50;

/// What a cached blob is, which picks its directory and extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    Thumbnail,
    CatalogArtifact,
    Original,
}

impl CacheKind {
    fn dir(&self) -> &'static str {
        match self {
            CacheKind::Thumbnail => "thumbs",
            CacheKind::CatalogArtifact => "catalog",
            CacheKind::Original => "originals",
        }
    }

    fn ext(&self) -> &'static str {
        match self {
            CacheKind::Thumbnail => "jpg",
            CacheKind::CatalogArtifact => "dat",
            CacheKind::Original => "dat",
        }
    }
}

pub(crate) type CacheKey = (CacheKind, PhotoDigest);

/// Strict-LRU cache bounded by entry count. Recency is updated on both
/// hit and insert.
struct MemoryCache {
    entries: HashMap<CacheKey, Vec<u8>>,
    order: VecDeque<CacheKey>,
    max_entries: usize,
}

impl MemoryCache {
    fn new(max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            max_entries,
        }
    }

    fn touch(&mut self, key: &CacheKey) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
        self.order.push_back(*key);
    }

    fn get(&mut self, key: &CacheKey) -> Option<Vec<u8>> {
        let data = self.entries.get(key).cloned()?;
        self.touch(key);
        Some(data)
    }

    fn insert(&mut self, key: CacheKey, data: Vec<u8>) {
        if self.max_entries == 0 {
            return;
        }
        if self.entries.insert(key, data).is_none() {
            while self.entries.len() > self.max_entries {
                if let Some(evicted) = self.order.pop_front() {
                    self.entries.remove(&evicted);
                } else {
                    break;
                }
            }
        }
        self.touch(&key);
    }
}

/// Two-level cache: a bounded LRU memory layer in front of an unbounded
/// content-addressed disk layer.
///
/// Disk paths are `root/<kind>/<2-hex-shard>/<digest>.<ext>`, bounding
/// per-directory fan-out to roughly `count/256` files. The disk layer is
/// never evicted automatically: it is content-addressed, so its size is
/// bounded by distinct content, not access count.
pub struct CacheStore {
    root: PathBuf,
    memory: Mutex<MemoryCache>,
    flights: FlightTable,
}

impl CacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_memory_entries(root, DEFAULT_MEMORY_ENTRIES)
    }

    pub fn with_memory_entries(root: impl Into<PathBuf>, max_entries: usize) -> Self {
        Self {
            root: root.into(),
            memory: Mutex::new(MemoryCache::new(max_entries)),
            flights: FlightTable::new(),
        }
    }

    /// Deterministic disk location for an identity's cached bytes.
    pub fn disk_path(&self, kind: CacheKind, digest: &PhotoDigest) -> PathBuf {
        self.root
            .join(kind.dir())
            .join(digest.shard_prefix())
            .join(format!("{}.{}", digest.to_hex(), kind.ext()))
    }

    /// Look up cached bytes: memory first, then disk (warming memory on a
    /// disk hit). Returns `None` on a miss.
    pub fn get(&self, kind: CacheKind, digest: &PhotoDigest) -> Result<Option<Vec<u8>>> {
        let key = (kind, *digest);
        if let Some(data) = self.memory.lock().unwrap().get(&key) {
            return Ok(Some(data));
        }
        let path = self.disk_path(kind, digest);
        match fs::read(&path) {
            Ok(data) => {
                self.memory.lock().unwrap().insert(key, data.clone());
                Ok(Some(data))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Store bytes in both layers. The disk write is atomic (temp file +
    /// rename) so readers never observe a partial blob.
    pub fn put(&self, kind: CacheKind, digest: &PhotoDigest, data: &[u8]) -> Result<()> {
        let path = self.disk_path(kind, digest);
        // Same bytes may already be present (content-addressed): skip the
        // rewrite but still warm the memory layer.
        if !path.exists() {
            self.atomic_write(&path, data)?;
        }
        self.memory
            .lock()
            .unwrap()
            .insert((kind, *digest), data.to_vec());
        Ok(())
    }

    /// Whether the disk layer holds this identity.
    pub fn contains_on_disk(&self, kind: CacheKind, digest: &PhotoDigest) -> bool {
        self.disk_path(kind, digest).exists()
    }

    /// Single-flight lookup: on a miss, run `fetch` exactly once no matter
    /// how many callers ask concurrently; late callers join the in-flight
    /// fetch. A joiner's cancellation abandons only that caller — the fetch
    /// itself is cancelled only when every interested caller is gone.
    pub fn get_or_fetch(
        &self,
        kind: CacheKind,
        digest: &PhotoDigest,
        cancel: &dyn Cancel,
        fetch: impl FnOnce(&dyn Cancel) -> Result<Vec<u8>>,
    ) -> Result<Vec<u8>> {
        if let Some(data) = self.get(kind, digest)? {
            return Ok(data);
        }
        let key = (kind, *digest);
        self.flights.run(key, cancel, fetch, |data| {
            if let Err(e) = self.put(kind, digest, data) {
                debug!("cache write-back failed for {digest}: {e}");
            }
        })
    }

    /// Explicit disk maintenance: drop cached blobs of one kind entirely.
    /// Never invoked automatically.
    pub fn maintenance_sweep(&self, kind: CacheKind) -> Result<()> {
        let dir = self.root.join(kind.dir());
        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn atomic_write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let parent = path.parent().expect("cache paths always have a parent");
        fs::create_dir_all(parent)?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        tmp.write_all(data)?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}
