pub mod local;
pub mod remote;

pub use local::LocalSource;
pub use remote::RemoteCatalogSource;

use chrono::{DateTime, Utc};

use photon_types::{PhotoFormat, PhotoIdentity, Result};

use crate::cancel::Cancel;

/// Metadata a source knows about a photo without reading all its bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceMetadata {
    pub format: PhotoFormat,
    pub file_size: u64,
    pub photo_date: DateTime<Utc>,
}

/// A place photos come from: the local filesystem, the remote catalog, or
/// a platform photo library. One interface, dispatched dynamically — no
/// inheritance.
pub trait PhotoSource: Send + Sync {
    /// Enumerate the photos this source can currently provide.
    fn list_photos(&self) -> Result<Vec<PhotoIdentity>>;

    /// Cheap metadata for one photo.
    fn metadata(&self, identity: &PhotoIdentity) -> Result<SourceMetadata>;

    /// Preview bytes for one photo, derived or fetched as the source
    /// prefers.
    fn load_thumbnail(&self, identity: &PhotoIdentity, cancel: &dyn Cancel) -> Result<Vec<u8>>;

    /// The photo's full original bytes.
    fn load_full_image(&self, identity: &PhotoIdentity, cancel: &dyn Cancel) -> Result<Vec<u8>>;
}
