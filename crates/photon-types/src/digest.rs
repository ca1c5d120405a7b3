use blake2::digest::consts::U16;
use blake2::{Blake2b, Digest};
use serde::{Deserialize, Serialize};
use std::fmt;

type Blake2b128 = Blake2b<U16>;

/// Number of catalog shards, selected by the first hex nibble of a digest.
pub const SHARD_COUNT: usize = 16;

/// A 16-byte content digest computed as BLAKE2b-128.
///
/// Two photos with equal digests are the same photo system-wide, regardless
/// of path, filename, or source.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PhotoDigest(pub [u8; 16]);

impl PhotoDigest {
    /// Compute the digest of a byte slice in one shot.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Blake2b128::new();
        hasher.update(data);
        Self::from_hasher(hasher)
    }

    fn from_hasher(hasher: Blake2b128) -> Self {
        let result = hasher.finalize();
        let mut out = [0u8; 16];
        out.copy_from_slice(&result);
        PhotoDigest(out)
    }

    /// Hex-encode the full digest for use as a storage key.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a 32-char hex string back into a digest.
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let arr: [u8; 16] = bytes.try_into().ok()?;
        Some(PhotoDigest(arr))
    }

    /// Catalog shard index: the first hex nibble (0-15).
    pub fn shard_index(&self) -> usize {
        (self.0[0] >> 4) as usize
    }

    /// First byte as a two-char hex string, used for cache shard directories.
    pub fn shard_prefix(&self) -> String {
        hex::encode(&self.0[..1])
    }
}

impl fmt::Debug for PhotoDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhotoDigest({})", &self.to_hex()[..12])
    }
}

impl fmt::Display for PhotoDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..12])
    }
}

/// Incremental digest over streamed content, for files too large to hold
/// in memory.
pub struct DigestHasher(Blake2b128);

impl DigestHasher {
    pub fn new() -> Self {
        Self(Blake2b128::new())
    }

    pub fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    pub fn finalize(self) -> PhotoDigest {
        PhotoDigest::from_hasher(self.0)
    }
}

impl Default for DigestHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Cheap provisional identity: digest of a bounded head prefix plus the
/// file size. Computable without reading the whole file; used for quick
/// duplicate suspicion and as a provisional catalog key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FastKey {
    pub head_digest: PhotoDigest,
    pub file_size: u64,
}

impl FastKey {
    /// Serialize for use as a provisional catalog key.
    pub fn serialize_key(&self) -> String {
        format!("{}:{}", self.head_digest.to_hex(), self.file_size)
    }

    /// Parse a provisional catalog key back into a fast key.
    pub fn parse_key(s: &str) -> Option<Self> {
        let (head, size) = s.split_once(':')?;
        Some(FastKey {
            head_digest: PhotoDigest::from_hex(head)?,
            file_size: size.parse().ok()?,
        })
    }
}

impl fmt::Debug for FastKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FastKey({}, {} bytes)", self.head_digest, self.file_size)
    }
}

/// The stable content key for a photo: a fast key always, and the
/// authoritative full digest once it has been computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhotoIdentity {
    pub fast_key: FastKey,
    pub full_digest: Option<PhotoDigest>,
}

impl PhotoIdentity {
    pub fn provisional(fast_key: FastKey) -> Self {
        Self {
            fast_key,
            full_digest: None,
        }
    }

    pub fn resolved(fast_key: FastKey, full_digest: PhotoDigest) -> Self {
        Self {
            fast_key,
            full_digest: Some(full_digest),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.full_digest.is_some()
    }

    /// The catalog key: full digest hex when resolved, otherwise the
    /// fast-key serialization.
    pub fn photo_key(&self) -> String {
        match self.full_digest {
            Some(d) => d.to_hex(),
            None => self.fast_key.serialize_key(),
        }
    }

    /// Shard assignment: by full digest when resolved, by head digest for
    /// provisional entries.
    pub fn shard_index(&self) -> usize {
        match self.full_digest {
            Some(d) => d.shard_index(),
            None => self.fast_key.head_digest.shard_index(),
        }
    }
}
