use std::fs;
use std::sync::Arc;

use chrono::DateTime;

use photon_types::{PhotoIdentity, PhotonError};

use crate::cancel::NeverCancel;
use crate::catalog::CatalogEntry;
use crate::identity;
use crate::source::{LocalSource, PhotoSource, RemoteCatalogSource};
use crate::sync::CloudSync;
use crate::testutil::{fixture_image, MemoryBackend};
use crate::thumb;

#[test]
fn local_source_lists_only_decodable_images() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("photo.png"), fixture_image(64, 48)).unwrap();
    fs::write(dir.path().join("notes.txt"), b"not an image at all").unwrap();
    fs::create_dir(dir.path().join("nested")).unwrap();
    fs::write(dir.path().join("nested").join("deep.png"), fixture_image(32, 32)).unwrap();

    let source = LocalSource::new(dir.path());
    let photos = source.list_photos().unwrap();
    assert_eq!(photos.len(), 2);
    assert!(photos.iter().all(|p| !p.is_resolved()));
}

#[test]
fn local_source_serves_bytes_and_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let image = fixture_image(300, 200);
    fs::write(dir.path().join("photo.png"), &image).unwrap();

    let source = LocalSource::new(dir.path());
    let identity = source.list_photos().unwrap().remove(0);

    let meta = source.metadata(&identity).unwrap();
    assert_eq!(meta.file_size, image.len() as u64);
    assert_eq!(meta.format, photon_types::PhotoFormat::Png);

    assert_eq!(source.load_full_image(&identity, &NeverCancel).unwrap(), image);
    let preview = source.load_thumbnail(&identity, &NeverCancel).unwrap();
    assert!(image::load_from_memory(&preview).is_ok());
}

#[test]
fn local_source_unknown_identity_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let source = LocalSource::new(dir.path());
    source.list_photos().unwrap();

    let stranger = PhotoIdentity::provisional(identity::fast_key_of_bytes(b"never scanned"));
    assert!(matches!(
        source.load_full_image(&stranger, &NeverCancel),
        Err(PhotonError::NotFound(_))
    ));
}

/// Build a remote source over objects already backed up: the catalog rows
/// plus photo/thumbnail objects under their content keys.
fn remote_with(images: &[Vec<u8>]) -> (RemoteCatalogSource, Vec<PhotoIdentity>) {
    let sync = CloudSync::new(Arc::new(MemoryBackend::new()), "u1");
    let mut entries = Vec::new();
    let mut identities = Vec::new();
    for bytes in images {
        let fast = identity::fast_key_of_bytes(bytes);
        let digest = identity::full_digest_of_bytes(bytes);
        sync.upload_photo(&digest, bytes).unwrap();
        sync.upload_thumbnail(&digest, &thumb::encode_preview(bytes).unwrap())
            .unwrap();
        entries.push(CatalogEntry::resolved(
            fast,
            digest,
            photon_types::PhotoFormat::Png,
            DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        ));
        identities.push(PhotoIdentity::resolved(fast, digest));
    }
    (RemoteCatalogSource::new(sync, entries), identities)
}

#[test]
fn remote_source_round_trips_backed_up_photos() {
    let image = fixture_image(400, 300);
    let (source, identities) = remote_with(&[image.clone()]);

    assert_eq!(source.list_photos().unwrap(), identities);
    let identity = identities[0];

    let meta = source.metadata(&identity).unwrap();
    assert_eq!(meta.file_size, image.len() as u64);

    assert_eq!(source.load_full_image(&identity, &NeverCancel).unwrap(), image);
    let preview = source.load_thumbnail(&identity, &NeverCancel).unwrap();
    let decoded = image::load_from_memory(&preview).unwrap();
    assert_eq!(decoded.width().min(decoded.height()), 256);
}

#[test]
fn remote_source_rejects_provisional_identities() {
    let (source, _) = remote_with(&[fixture_image(64, 64)]);
    let provisional = PhotoIdentity::provisional(identity::fast_key_of_bytes(b"no digest yet"));
    assert!(matches!(
        source.load_thumbnail(&provisional, &NeverCancel),
        Err(PhotonError::NotFound(_))
    ));
}

#[test]
fn sources_interchange_behind_the_trait() {
    let dir = tempfile::tempdir().unwrap();
    let image = fixture_image(128, 128);
    fs::write(dir.path().join("p.png"), &image).unwrap();
    let local = LocalSource::new(dir.path());
    let (remote, _) = remote_with(&[image.clone()]);

    // Both variants answer the same four operations through one interface.
    let sources: Vec<Box<dyn PhotoSource>> = vec![Box::new(local), Box::new(remote)];
    for source in &sources {
        let identity = source.list_photos().unwrap().remove(0);
        assert_eq!(
            source.load_full_image(&identity, &NeverCancel).unwrap(),
            image
        );
    }
}
