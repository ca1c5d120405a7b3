use photon_types::{PhotoIdentity, PhotonError, Result};

use crate::cancel::Cancel;
use crate::catalog::CatalogEntry;
use crate::sync::CloudSync;

use super::{PhotoSource, SourceMetadata};

/// Photos already backed up: a snapshot of resolved catalog entries served
/// from object storage. Browsing a synced library on a device that never
/// held the originals goes through this source.
pub struct RemoteCatalogSource {
    sync: CloudSync,
    entries: Vec<CatalogEntry>,
}

impl RemoteCatalogSource {
    /// Build from a catalog snapshot. Only resolved entries are servable;
    /// provisional rows have no remote objects yet.
    pub fn new(sync: CloudSync, entries: impl IntoIterator<Item = CatalogEntry>) -> Self {
        Self {
            sync,
            entries: entries.into_iter().filter(|e| e.is_resolved()).collect(),
        }
    }

    fn entry_of(&self, identity: &PhotoIdentity) -> Result<(&CatalogEntry, photon_types::PhotoDigest)> {
        let digest = identity.full_digest.ok_or_else(|| {
            PhotonError::NotFound("remote source serves resolved identities only".into())
        })?;
        let entry = self
            .entries
            .iter()
            .find(|e| e.full_digest == Some(digest))
            .ok_or_else(|| PhotonError::NotFound(format!("photo {digest}")))?;
        Ok((entry, digest))
    }
}

impl PhotoSource for RemoteCatalogSource {
    fn list_photos(&self) -> Result<Vec<PhotoIdentity>> {
        Ok(self.entries.iter().map(|e| e.identity()).collect())
    }

    fn metadata(&self, identity: &PhotoIdentity) -> Result<SourceMetadata> {
        let (entry, _) = self.entry_of(identity)?;
        Ok(SourceMetadata {
            format: entry.format,
            file_size: entry.file_size,
            photo_date: entry.photo_date,
        })
    }

    fn load_thumbnail(&self, identity: &PhotoIdentity, cancel: &dyn Cancel) -> Result<Vec<u8>> {
        let (_, digest) = self.entry_of(identity)?;
        cancel.check()?;
        self.sync.download_thumbnail(&digest)
    }

    fn load_full_image(&self, identity: &PhotoIdentity, cancel: &dyn Cancel) -> Result<Vec<u8>> {
        let (_, digest) = self.entry_of(identity)?;
        cancel.check()?;
        self.sync.download_photo(&digest)
    }
}
