use std::fs::File;
use std::path::Path;

use photon_types::Result;

/// Scoped-acquisition token for a resolved source handle.
///
/// On sandboxed hosts, reading a user-picked file requires holding a
/// security scope for the duration of the access; the scope MUST be
/// released on every exit path, including cancellation and error. The
/// release action runs exactly once, on drop.
pub struct AccessScope {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl AccessScope {
    /// Scope with an explicit release action.
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Scope for sources that need no release (plain filesystem paths).
    pub fn unscoped() -> Self {
        Self { release: None }
    }
}

impl Drop for AccessScope {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

/// An open source file paired with its access scope. The scope outlives
/// every read and is released when the handle is dropped, whichever way
/// the caller exits.
pub struct ScopedFile {
    pub file: File,
    _scope: AccessScope,
}

impl ScopedFile {
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_scope(path, AccessScope::unscoped())
    }

    pub fn open_with_scope(path: &Path, scope: AccessScope) -> Result<Self> {
        // Acquire the scope first: if open fails, dropping the scope here
        // still releases it.
        let file = File::open(path)?;
        Ok(Self {
            file,
            _scope: scope,
        })
    }
}
