pub mod backup;
pub mod retry;
pub mod rm;
pub mod scan;
pub mod status;
pub mod sync;

use photon_core::session::Session;
use photon_core::source::LocalSource;
use photon_types::{PhotonError, Result};

/// Build the local photo source from the flag or the configured root.
pub(crate) fn local_source(session: &Session, path: Option<&str>) -> Result<LocalSource> {
    let root = match path {
        Some(p) => p.to_string(),
        None => session
            .config()
            .library_root
            .clone()
            .ok_or_else(|| {
                PhotonError::Config(
                    "no library path given and no library_root configured".into(),
                )
            })?,
    };
    Ok(LocalSource::new(root))
}
