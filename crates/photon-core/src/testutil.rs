use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, Mutex};

use photon_storage::StorageBackend;
use photon_types::Result;

/// In-memory storage backend for testing. Thread-safe via Mutex.
pub struct MemoryBackend {
    data: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            data: Mutex::new(HashMap::new()),
        }
    }
}

impl StorageBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.data.lock().unwrap().get(key).cloned())
    }

    fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        self.data
            .lock()
            .unwrap()
            .insert(key.to_string(), data.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.data.lock().unwrap().remove(key);
        Ok(())
    }

    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.data.lock().unwrap().contains_key(key))
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .data
            .lock()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

/// Shared handle to inspect the operations a backend saw.
#[derive(Clone)]
pub struct OpLog(Arc<Mutex<Vec<(String, String)>>>);

impl OpLog {
    fn new() -> Self {
        Self(Arc::new(Mutex::new(Vec::new())))
    }

    /// All recorded `(operation, key)` pairs since the last `clear()`.
    pub fn entries(&self) -> Vec<(String, String)> {
        self.0.lock().unwrap().clone()
    }

    /// Keys recorded for one operation kind, in order.
    pub fn keys_of(&self, op: &str) -> Vec<String> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|(o, _)| o == op)
            .map(|(_, k)| k.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }

    fn record(&self, op: &str, key: &str) {
        self.0.lock().unwrap().push((op.to_string(), key.to_string()));
    }
}

/// Storage wrapper that records which keys each operation touched.
/// Delegates everything to an inner `MemoryBackend`.
pub struct RecordingBackend {
    inner: MemoryBackend,
    log: OpLog,
}

impl RecordingBackend {
    pub fn new() -> (Self, OpLog) {
        let log = OpLog::new();
        (
            Self {
                inner: MemoryBackend::new(),
                log: log.clone(),
            },
            log,
        )
    }
}

impl StorageBackend for RecordingBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.log.record("GET", key);
        self.inner.get(key)
    }
    fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        self.log.record("PUT", key);
        self.inner.put(key, data)
    }
    fn delete(&self, key: &str) -> Result<()> {
        self.log.record("DELETE", key);
        self.inner.delete(key)
    }
    fn exists(&self, key: &str) -> Result<bool> {
        self.log.record("HEAD", key);
        self.inner.exists(key)
    }
    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        self.inner.list(prefix)
    }
}

enum KeyMatch {
    Substring(String),
    Exact(String),
}

/// Backend that fails matching `put` calls with a network error: the
/// first `skip` matches succeed, the next `failures` fail, then it
/// behaves normally. For transient-failure and publish-atomicity tests.
pub struct FlakyBackend {
    inner: MemoryBackend,
    matcher: KeyMatch,
    state: Mutex<(u32, u32)>, // (skips remaining, failures remaining)
}

impl FlakyBackend {
    pub fn failing_puts(key_substring: &str, failures: u32) -> Self {
        Self {
            inner: MemoryBackend::new(),
            matcher: KeyMatch::Substring(key_substring.to_string()),
            state: Mutex::new((0, failures)),
        }
    }

    pub fn failing_puts_exact(key: &str, skip: u32, failures: u32) -> Self {
        Self {
            inner: MemoryBackend::new(),
            matcher: KeyMatch::Exact(key.to_string()),
            state: Mutex::new((skip, failures)),
        }
    }

    fn maybe_fail(&self, key: &str) -> Result<()> {
        let matched = match &self.matcher {
            KeyMatch::Substring(s) => key.contains(s),
            KeyMatch::Exact(s) => key == s,
        };
        if !matched {
            return Ok(());
        }
        let mut state = self.state.lock().unwrap();
        if state.0 > 0 {
            state.0 -= 1;
            return Ok(());
        }
        if state.1 > 0 {
            state.1 -= 1;
            return Err(photon_types::PhotonError::Network(format!(
                "injected failure for {key}"
            )));
        }
        Ok(())
    }
}

impl StorageBackend for FlakyBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.inner.get(key)
    }
    fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        self.maybe_fail(key)?;
        self.inner.put(key, data)
    }
    fn delete(&self, key: &str) -> Result<()> {
        self.inner.delete(key)
    }
    fn exists(&self, key: &str) -> Result<bool> {
        self.inner.exists(key)
    }
    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        self.inner.list(prefix)
    }
}

/// A decodable fixture image of the given dimensions, encoded as PNG.
pub fn fixture_image(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    let mut out = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
        .unwrap();
    out
}
