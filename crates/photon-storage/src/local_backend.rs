use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use photon_types::{PhotonError, Result};

use crate::StorageBackend;

/// Storage backend over a plain directory tree.
///
/// Serves two roles: the catalog's local working store, and an object-store
/// stand-in for tests and offline operation. Writes go through a temp file
/// plus rename, so a reader never sees a torn object.
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    pub fn new(root: &str) -> Result<Self> {
        let root = PathBuf::from(root);
        // An existing root is canonicalized so symlinked roots still
        // strip_prefix correctly when listing.
        let root = match fs::canonicalize(&root) {
            Ok(resolved) => resolved,
            Err(_) => root,
        };
        Ok(Self { root })
    }

    /// Map a `/`-separated storage key to a path under the root, rejecting
    /// anything that could escape it.
    fn locate(&self, key: &str) -> Result<PathBuf> {
        let unsafe_key =
            |why: &str| PhotonError::InvalidFormat(format!("unsafe storage key ({why}): '{key}'"));

        if key.is_empty() {
            return Err(unsafe_key("empty"));
        }
        if key.starts_with('/') || key.contains('\\') {
            return Err(unsafe_key("absolute or backslashed"));
        }
        let mut path = self.root.clone();
        for part in key.split('/') {
            if part.is_empty() || part == "." || part == ".." {
                return Err(unsafe_key("traversal"));
            }
            path.push(part);
        }
        Ok(path)
    }
}

impl StorageBackend for LocalBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.locate(key)?) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let path = self.locate(key)?;
        let parent = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(parent)?;
        // Stage in the destination directory so the rename stays on one
        // filesystem and is atomic.
        let mut staged = tempfile::NamedTempFile::new_in(parent)?;
        staged.write_all(data)?;
        staged.persist(&path).map_err(|e| e.error)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.locate(key)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&self, key: &str) -> Result<bool> {
        match fs::metadata(self.locate(key)?) {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let start = if prefix.is_empty() {
            self.root.clone()
        } else {
            self.locate(prefix)?
        };
        match fs::metadata(&start) {
            Ok(meta) if meta.is_dir() => {}
            // A missing or non-directory prefix has nothing under it.
            _ => return Ok(Vec::new()),
        }
        let mut keys = Vec::new();
        let mut pending = vec![start];
        while let Some(dir) = pending.pop() {
            for entry in fs::read_dir(&dir)? {
                let entry = entry?;
                let kind = entry.file_type()?;
                if kind.is_dir() {
                    pending.push(entry.path());
                } else if kind.is_file() {
                    if let Some(key) = self.key_of(&entry.path()) {
                        keys.push(key);
                    }
                }
            }
        }
        Ok(keys)
    }
}

impl LocalBackend {
    /// The `/`-separated key of a file path under the root.
    fn key_of(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<_> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect();
        Some(parts.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> (tempfile::TempDir, LocalBackend) {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(dir.path().to_str().unwrap()).unwrap();
        (dir, backend)
    }

    #[test]
    fn escaping_keys_are_rejected_everywhere() {
        let (_dir, backend) = backend();
        for key in [
            "",
            "/etc/passwd",
            "..",
            "../sibling",
            "photos/../../escape",
            "photos\\u1\\a.dat",
            "photos//double",
        ] {
            assert!(backend.get(key).is_err(), "get accepted '{key}'");
            assert!(backend.put(key, b"x").is_err(), "put accepted '{key}'");
            assert!(backend.delete(key).is_err(), "delete accepted '{key}'");
        }
    }

    #[test]
    fn namespace_keys_resolve() {
        let (_dir, backend) = backend();
        for key in [
            "catalogs/u1/.catalog",
            "catalogs/u1/.catalog#a",
            "photos/u1/deadbeef.dat",
            "thumbnails/u1/deadbeef.jpg",
        ] {
            backend.put(key, b"content").unwrap();
            assert_eq!(backend.get(key).unwrap().unwrap(), b"content");
        }
    }

    #[test]
    fn absent_objects_read_as_none_not_error() {
        let (_dir, backend) = backend();
        assert_eq!(backend.get("nothing").unwrap(), None);
        assert!(!backend.exists("nothing").unwrap());
    }

    #[test]
    fn put_creates_directories_and_overwrites() {
        let (_dir, backend) = backend();
        backend.put("catalogs/u1/.catalog", b"v1").unwrap();
        backend.put("catalogs/u1/.catalog", b"v2").unwrap();
        assert_eq!(backend.get("catalogs/u1/.catalog").unwrap().unwrap(), b"v2");
    }

    #[test]
    fn delete_twice_is_fine() {
        let (_dir, backend) = backend();
        backend.put("victim", b"x").unwrap();
        backend.delete("victim").unwrap();
        backend.delete("victim").unwrap();
        assert!(!backend.exists("victim").unwrap());
    }

    #[test]
    fn exists_is_false_for_directories() {
        let (_dir, backend) = backend();
        backend.put("photos/u1/a.dat", b"1").unwrap();
        assert!(!backend.exists("photos/u1").unwrap());
        assert!(backend.exists("photos/u1/a.dat").unwrap());
    }

    #[test]
    fn list_walks_the_prefix_subtree() {
        let (_dir, backend) = backend();
        backend.put("photos/u1/a.dat", b"1").unwrap();
        backend.put("photos/u1/b.dat", b"2").unwrap();
        backend.put("thumbnails/u1/a.jpg", b"3").unwrap();

        let mut under_photos = backend.list("photos").unwrap();
        under_photos.sort();
        assert_eq!(under_photos, vec!["photos/u1/a.dat", "photos/u1/b.dat"]);

        assert!(backend.list("absent/prefix").unwrap().is_empty());

        let everything = backend.list("").unwrap();
        assert_eq!(everything.len(), 3);
    }

    #[test]
    fn racing_writers_never_tear_an_object() {
        use std::sync::{Arc, Barrier};

        let (_dir, backend) = backend();
        let backend = Arc::new(backend);
        backend.put("pointer", b"seed").unwrap();

        let versions = [vec![0x11u8; 32 * 1024], vec![0x22u8; 32 * 1024]];
        let gate = Arc::new(Barrier::new(versions.len()));
        let writers: Vec<_> = versions
            .iter()
            .cloned()
            .map(|payload| {
                let backend = Arc::clone(&backend);
                let gate = Arc::clone(&gate);
                std::thread::spawn(move || {
                    gate.wait();
                    backend.put("pointer", &payload).unwrap();
                })
            })
            .collect();
        for w in writers {
            w.join().unwrap();
        }

        let survivor = backend.get("pointer").unwrap().unwrap();
        assert!(
            versions.iter().any(|v| *v == survivor),
            "object must be one full version, never a mixture"
        );
    }
}
