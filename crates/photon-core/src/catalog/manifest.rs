use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use photon_types::{PhotoDigest, PhotonError, Result, SHARD_COUNT};

/// The manifest — the current authoritative set of shard digests.
///
/// Stored as small JSON at the `.catalog` pointer key. Its content digest
/// is the catalog *pointer*: readers compare pointers to detect staleness
/// instead of diffing shard contents, and resolve every read through it,
/// so a half-written shard set is never observable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogManifest {
    pub version: u64,
    pub timestamp: DateTime<Utc>,
    /// Hex content digests of the 16 shards, indexed by first nibble.
    pub shard_digests: Vec<String>,
}

impl CatalogManifest {
    /// The manifest of a catalog with nothing in it. Deterministic so every
    /// fresh account starts from the same pointer.
    pub fn empty() -> Self {
        Self {
            version: 0,
            timestamp: DateTime::from_timestamp(0, 0).expect("epoch is representable"),
            shard_digests: vec![PhotoDigest::compute(b"").to_hex(); SHARD_COUNT],
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| PhotonError::Other(format!("manifest serialize: {e}")))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let manifest: CatalogManifest = serde_json::from_slice(bytes)
            .map_err(|e| PhotonError::InvalidFormat(format!("manifest parse: {e}")))?;
        if manifest.shard_digests.len() != SHARD_COUNT {
            return Err(PhotonError::InvalidFormat(format!(
                "manifest has {} shard digests, expected {SHARD_COUNT}",
                manifest.shard_digests.len()
            )));
        }
        Ok(manifest)
    }

    /// The pointer value for a serialized manifest.
    pub fn pointer_of(bytes: &[u8]) -> PhotoDigest {
        PhotoDigest::compute(bytes)
    }

    /// Indices of shards whose digest differs from `other`'s.
    pub fn changed_shards(&self, other: &CatalogManifest) -> Vec<usize> {
        self.shard_digests
            .iter()
            .zip(other.shard_digests.iter())
            .enumerate()
            .filter(|(_, (a, b))| a != b)
            .map(|(i, _)| i)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_manifest_is_deterministic() {
        let a = CatalogManifest::empty();
        let b = CatalogManifest::empty();
        assert_eq!(
            CatalogManifest::pointer_of(&a.to_bytes().unwrap()),
            CatalogManifest::pointer_of(&b.to_bytes().unwrap())
        );
    }

    #[test]
    fn bytes_round_trip() {
        let mut m = CatalogManifest::empty();
        m.version = 7;
        m.shard_digests[3] = PhotoDigest::compute(b"shard three").to_hex();
        let bytes = m.to_bytes().unwrap();
        assert_eq!(CatalogManifest::from_bytes(&bytes).unwrap(), m);
    }

    #[test]
    fn from_bytes_rejects_wrong_shard_count() {
        let mut m = CatalogManifest::empty();
        m.shard_digests.pop();
        let bytes = serde_json::to_vec(&m).unwrap();
        assert!(CatalogManifest::from_bytes(&bytes).is_err());
    }

    #[test]
    fn from_bytes_rejects_garbage() {
        assert!(CatalogManifest::from_bytes(b"{not json").is_err());
    }

    #[test]
    fn changed_shards_finds_exactly_the_delta() {
        let a = CatalogManifest::empty();
        let mut b = a.clone();
        assert!(a.changed_shards(&b).is_empty());
        b.shard_digests[0] = PhotoDigest::compute(b"x").to_hex();
        b.shard_digests[9] = PhotoDigest::compute(b"y").to_hex();
        assert_eq!(a.changed_shards(&b), vec![0, 9]);
    }
}
