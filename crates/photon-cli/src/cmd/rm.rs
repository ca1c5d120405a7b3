use photon_core::session::Session;
use photon_types::{PhotoDigest, PhotonError, Result};

pub(crate) fn run(session: &Session, digest: &str) -> Result<()> {
    let digest = PhotoDigest::from_hex(digest).ok_or_else(|| {
        PhotonError::InvalidFormat(format!("'{digest}' is not a 32-char hex digest"))
    })?;
    if session.remove(&digest)? {
        println!("Removed {digest} and requested cloud object deletion.");
    } else {
        println!("No catalog entry for {digest}.");
    }
    Ok(())
}
