use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use photon_types::{FastKey, PhotoDigest, PhotoFormat, PhotoIdentity, PhotonError, Result};

/// Backup lifecycle of a catalog entry. Only the backup queue manager
/// mutates this; the catalog merely persists it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackupState {
    None,
    Queued,
    Uploading,
    Uploaded,
    Failed,
}

impl BackupState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupState::None => "none",
            BackupState::Queued => "queued",
            BackupState::Uploading => "uploading",
            BackupState::Uploaded => "uploaded",
            BackupState::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(BackupState::None),
            "queued" => Some(BackupState::Queued),
            "uploading" => Some(BackupState::Uploading),
            "uploaded" => Some(BackupState::Uploaded),
            "failed" => Some(BackupState::Failed),
            _ => None,
        }
    }

    /// Progression rank used to merge states order-independently when two
    /// sources resolve to the same photo.
    fn rank(&self) -> u8 {
        match self {
            BackupState::None => 0,
            BackupState::Queued => 1,
            BackupState::Uploading => 2,
            BackupState::Failed => 3,
            BackupState::Uploaded => 4,
        }
    }

    /// The further-progressed of two states.
    pub fn merged_with(self, other: BackupState) -> BackupState {
        if other.rank() > self.rank() {
            other
        } else {
            self
        }
    }
}

/// One row per known photo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    /// Full digest hex when resolved, fast-key serialization otherwise.
    pub photo_key: String,
    pub head_digest: PhotoDigest,
    pub full_digest: Option<PhotoDigest>,
    pub format: PhotoFormat,
    pub file_size: u64,
    pub photo_date: DateTime<Utc>,
    pub backup_state: BackupState,
}

impl CatalogEntry {
    /// Entry observed only through its fast key; reconciled once the full
    /// digest is computed.
    pub fn provisional(fast_key: FastKey, format: PhotoFormat, photo_date: DateTime<Utc>) -> Self {
        Self {
            photo_key: fast_key.serialize_key(),
            head_digest: fast_key.head_digest,
            full_digest: None,
            format,
            file_size: fast_key.file_size,
            photo_date,
            backup_state: BackupState::None,
        }
    }

    /// Entry with its authoritative identity already known.
    pub fn resolved(
        fast_key: FastKey,
        full_digest: PhotoDigest,
        format: PhotoFormat,
        photo_date: DateTime<Utc>,
    ) -> Self {
        Self {
            photo_key: full_digest.to_hex(),
            head_digest: fast_key.head_digest,
            full_digest: Some(full_digest),
            format,
            file_size: fast_key.file_size,
            photo_date,
            backup_state: BackupState::None,
        }
    }

    pub fn fast_key(&self) -> FastKey {
        FastKey {
            head_digest: self.head_digest,
            file_size: self.file_size,
        }
    }

    pub fn identity(&self) -> PhotoIdentity {
        PhotoIdentity {
            fast_key: self.fast_key(),
            full_digest: self.full_digest,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.full_digest.is_some()
    }

    /// Shard assignment: full digest when resolved, head digest otherwise.
    pub fn shard_index(&self) -> usize {
        self.identity().shard_index()
    }

    /// A copy of this entry promoted to its resolved identity.
    pub fn promoted(&self, full_digest: PhotoDigest) -> CatalogEntry {
        let mut entry = self.clone();
        entry.full_digest = Some(full_digest);
        entry.photo_key = full_digest.to_hex();
        entry
    }

    /// Merge another observation of the same photo into this row.
    /// Identity fields never change; mutable metadata is last-writer-wins;
    /// backup state merges by progression rank so replay order does not
    /// matter.
    pub fn merge_from(&mut self, other: &CatalogEntry) {
        self.format = other.format;
        self.photo_date = other.photo_date;
        self.backup_state = self.backup_state.merged_with(other.backup_state);
    }

    /// Serialize as one delimited shard row:
    /// `photo_key,head_digest,full_digest?,format,file_size,photo_date_epoch,backup_state`
    pub fn to_row(&self) -> String {
        format!(
            "{},{},{},{},{},{},{}",
            self.photo_key,
            self.head_digest.to_hex(),
            self.full_digest.map(|d| d.to_hex()).unwrap_or_default(),
            self.format.as_str(),
            self.file_size,
            self.photo_date.timestamp(),
            self.backup_state.as_str(),
        )
    }

    /// Parse one shard row. Any malformed field is a format error for the
    /// row; shards are digest-verified, so a torn row means corruption.
    pub fn parse_row(line: &str) -> Result<Self> {
        let bad = |what: &str| PhotonError::InvalidFormat(format!("catalog row {what}: '{line}'"));

        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() != 7 {
            return Err(bad("field count"));
        }
        let head_digest = PhotoDigest::from_hex(fields[1]).ok_or_else(|| bad("head digest"))?;
        let full_digest = if fields[2].is_empty() {
            None
        } else {
            Some(PhotoDigest::from_hex(fields[2]).ok_or_else(|| bad("full digest"))?)
        };
        let format = PhotoFormat::parse(fields[3]).ok_or_else(|| bad("format"))?;
        let file_size: u64 = fields[4].parse().map_err(|_| bad("file size"))?;
        let epoch: i64 = fields[5].parse().map_err(|_| bad("photo date"))?;
        let photo_date = DateTime::<Utc>::from_timestamp(epoch, 0).ok_or_else(|| bad("photo date"))?;
        let backup_state = BackupState::parse(fields[6]).ok_or_else(|| bad("backup state"))?;

        Ok(Self {
            photo_key: fields[0].to_string(),
            head_digest,
            full_digest,
            format,
            file_size,
            photo_date,
            backup_state,
        })
    }
}
