use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use photon_storage::StorageConfig;
use photon_types::{PhotonError, Result};

use crate::cache::DEFAULT_MEMORY_ENTRIES;
use crate::queue::DEFAULT_UPLOAD_CONCURRENCY;
use crate::sync::DEFAULT_PREFETCH_LIMIT;

/// Engine configuration, loaded from a YAML document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Account namespace under which all cloud objects live.
    pub user_id: String,
    /// Remote object-storage configuration.
    pub storage: StorageConfig,
    /// Root of the local photo library, for scan/backup.
    #[serde(default)]
    pub library_root: Option<String>,
    /// Root directory for the local cache and catalog working copy.
    /// Default: platform cache dir + `photon/<user_id>`.
    #[serde(default)]
    pub cache_dir: Option<String>,
    #[serde(default = "default_memory_cache_entries")]
    pub memory_cache_entries: usize,
    #[serde(default = "default_prefetch_limit")]
    pub prefetch_limit: usize,
    #[serde(default = "default_upload_concurrency")]
    pub upload_concurrency: usize,
}

fn default_memory_cache_entries() -> usize {
    DEFAULT_MEMORY_ENTRIES
}
fn default_prefetch_limit() -> usize {
    DEFAULT_PREFETCH_LIMIT
}
fn default_upload_concurrency() -> usize {
    DEFAULT_UPLOAD_CONCURRENCY
}

/// Parse a configuration file.
pub fn load_config(path: &Path) -> Result<EngineConfig> {
    let text = std::fs::read_to_string(path)?;
    let config: EngineConfig = serde_yaml::from_str(&text)
        .map_err(|e| PhotonError::Config(format!("{}: {e}", path.display())))?;
    if config.user_id.is_empty() {
        return Err(PhotonError::Config("user_id must not be empty".into()));
    }
    Ok(config)
}

/// Resolve the configuration file path:
/// explicit flag, then `$PHOTON_CONFIG`, then `./photon.yaml`, then the
/// platform user config dir (`photon/config.yaml`).
pub fn resolve_config_path(explicit: Option<&str>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(PathBuf::from(path));
    }
    if let Some(env) = std::env::var_os("PHOTON_CONFIG") {
        if !env.is_empty() {
            return Some(PathBuf::from(env));
        }
    }
    let project = PathBuf::from("photon.yaml");
    if project.exists() {
        return Some(project);
    }
    dirs::config_dir()
        .map(|base| base.join("photon").join("config.yaml"))
        .filter(|p| p.exists())
}

/// Where this account's cache and catalog working copy live.
pub fn resolve_cache_dir(config: &EngineConfig) -> PathBuf {
    match &config.cache_dir {
        Some(dir) => PathBuf::from(dir),
        None => dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("photon")
            .join(&config.user_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(dir: &Path, text: &str) -> PathBuf {
        let path = dir.join("photon.yaml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(text.as_bytes()).unwrap();
        path
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            "user_id: u1\nstorage:\n  url: /tmp/photon-remote\n",
        );
        let config = load_config(&path).unwrap();
        assert_eq!(config.user_id, "u1");
        assert_eq!(config.memory_cache_entries, DEFAULT_MEMORY_ENTRIES);
        assert_eq!(config.prefetch_limit, DEFAULT_PREFETCH_LIMIT);
        assert_eq!(config.upload_concurrency, DEFAULT_UPLOAD_CONCURRENCY);
        assert!(config.cache_dir.is_none());
    }

    #[test]
    fn overrides_are_honored() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            "user_id: u1\n\
             storage:\n  url: s3://bucket/photos\n  region: eu-central-1\n  endpoint: https://s3.example.com\n\
             cache_dir: /var/cache/photon\n\
             memory_cache_entries: 10\n\
             prefetch_limit: 4\n\
             upload_concurrency: 2\n",
        );
        let config = load_config(&path).unwrap();
        assert_eq!(config.memory_cache_entries, 10);
        assert_eq!(config.prefetch_limit, 4);
        assert_eq!(config.upload_concurrency, 2);
        assert_eq!(resolve_cache_dir(&config), PathBuf::from("/var/cache/photon"));
    }

    #[test]
    fn empty_user_id_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "user_id: ''\nstorage:\n  url: /tmp/r\n");
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn malformed_yaml_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "user_id: [unclosed\n");
        assert!(matches!(
            load_config(&path),
            Err(PhotonError::Config(_))
        ));
    }

    #[test]
    fn default_cache_dir_is_per_user() {
        let config = EngineConfig {
            user_id: "someone".into(),
            storage: StorageConfig {
                url: "/tmp/r".into(),
                region: None,
                endpoint: None,
                credentials: None,
                retry: Default::default(),
            },
            library_root: None,
            cache_dir: None,
            memory_cache_entries: DEFAULT_MEMORY_ENTRIES,
            prefetch_limit: DEFAULT_PREFETCH_LIMIT,
            upload_concurrency: DEFAULT_UPLOAD_CONCURRENCY,
        };
        let dir = resolve_cache_dir(&config);
        assert!(dir.ends_with(PathBuf::from("photon").join("someone")));
    }
}
