use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tracing::debug;
use walkdir::WalkDir;

use photon_types::{PhotoFormat, PhotoIdentity, PhotonError, Result};

use crate::cancel::Cancel;
use crate::identity;
use crate::scoped::ScopedFile;

use super::{PhotoSource, SourceMetadata};

/// Photos on the local filesystem under a root directory.
///
/// `list_photos` walks the tree once, fast-keying every image file and
/// recording a fast-key → path index so later byte loads can resolve an
/// identity without a re-walk. Identities stay provisional here; full
/// digests are the backup pipeline's job.
pub struct LocalSource {
    root: PathBuf,
    index: Mutex<HashMap<String, PathBuf>>,
}

impl LocalSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            index: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, identity: &PhotoIdentity) -> Result<PathBuf> {
        let key = identity.fast_key.serialize_key();
        self.index
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or_else(|| PhotonError::NotFound(format!("no local file for {key}")))
    }

    fn head_of(path: &Path) -> Result<Vec<u8>> {
        let mut handle = ScopedFile::open(path)?;
        let mut head = vec![0u8; identity::HEAD_BYTES];
        let mut filled = 0;
        while filled < head.len() {
            match handle.file.read(&mut head[filled..])? {
                0 => break,
                n => filled += n,
            }
        }
        head.truncate(filled);
        Ok(head)
    }
}

impl PhotoSource for LocalSource {
    fn list_photos(&self) -> Result<Vec<PhotoIdentity>> {
        let mut found = Vec::new();
        let mut index = HashMap::new();
        for entry in WalkDir::new(&self.root).follow_links(false) {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    // One unreadable directory never aborts the scan.
                    debug!("scan skipping unreadable entry: {e}");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let head = match Self::head_of(path) {
                Ok(head) => head,
                Err(e) => {
                    debug!("scan skipping {}: {e}", path.display());
                    continue;
                }
            };
            if identity::detect_format(&head) == PhotoFormat::Unknown {
                continue;
            }
            let fast_key = match identity::fast_key(path) {
                Ok(k) => k,
                Err(e) => {
                    debug!("scan skipping {}: {e}", path.display());
                    continue;
                }
            };
            index.insert(fast_key.serialize_key(), path.to_path_buf());
            found.push(PhotoIdentity::provisional(fast_key));
        }
        debug!("scanned {} photos under {}", found.len(), self.root.display());
        *self.index.lock().unwrap() = index;
        Ok(found)
    }

    fn metadata(&self, identity: &PhotoIdentity) -> Result<SourceMetadata> {
        let path = self.path_of(identity)?;
        let meta = std::fs::metadata(&path)?;
        let head = Self::head_of(&path)?;
        let photo_date = meta
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        Ok(SourceMetadata {
            format: identity::detect_format(&head),
            file_size: meta.len(),
            photo_date,
        })
    }

    fn load_thumbnail(&self, identity: &PhotoIdentity, cancel: &dyn Cancel) -> Result<Vec<u8>> {
        let bytes = self.load_full_image(identity, cancel)?;
        cancel.check()?;
        crate::thumb::encode_preview(&bytes)
    }

    fn load_full_image(&self, identity: &PhotoIdentity, cancel: &dyn Cancel) -> Result<Vec<u8>> {
        cancel.check()?;
        let path = self.path_of(identity)?;
        let mut handle = ScopedFile::open(&path)?;
        let mut bytes = Vec::new();
        handle.file.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}
