use std::fs;
use std::path::Path;
use std::sync::Arc;

use photon_core::cancel::NeverCancel;
use photon_core::catalog::BackupState;
use photon_core::config::EngineConfig;
use photon_core::session::Session;
use photon_core::source::LocalSource;
use photon_core::thumb;
use photon_storage::local_backend::LocalBackend;
use photon_storage::{StorageBackend, StorageConfig};
use photon_types::PhotoDigest;

fn remote_backend(dir: &Path) -> Arc<dyn StorageBackend> {
    Arc::new(LocalBackend::new(&dir.to_string_lossy()).unwrap())
}

fn session_config(cache_dir: &Path) -> EngineConfig {
    EngineConfig {
        user_id: "u1".into(),
        storage: StorageConfig {
            url: "unused-by-open_with_backend".into(),
            region: None,
            endpoint: None,
            credentials: None,
            retry: Default::default(),
        },
        library_root: None,
        cache_dir: Some(cache_dir.to_string_lossy().into_owned()),
        memory_cache_entries: 50,
        prefetch_limit: 10,
        upload_concurrency: 2,
    }
}

fn fixture_image(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x * y) % 256) as u8])
    });
    let mut out = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
        .unwrap();
    out
}

fn library_with(root: &Path, files: &[(&str, &[u8])]) -> LocalSource {
    fs::create_dir_all(root).unwrap();
    for (name, bytes) in files {
        fs::write(root.join(name), bytes).unwrap();
    }
    LocalSource::new(root)
}

#[test]
fn backup_new_photo_end_to_end() {
    let tmp = tempfile::tempdir().unwrap();
    let remote_dir = tmp.path().join("remote");
    let session = Session::open_with_backend(
        session_config(&tmp.path().join("cache")),
        remote_backend(&remote_dir),
    )
    .unwrap();

    let image = fixture_image(800, 600);
    let source = library_with(&tmp.path().join("library"), &[("shot.png", &image)]);

    assert_eq!(session.import(&source).unwrap(), 1);
    let stats = session.process_queue(&source, &NeverCancel).unwrap();
    assert_eq!(stats.uploaded, 1);

    let entries = session.load_catalog();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].backup_state, BackupState::Uploaded);
    let digest = entries[0].full_digest.unwrap();

    // The original object landed at its content-addressed key.
    let photo_path = remote_dir
        .join("photos")
        .join("u1")
        .join(format!("{}.dat", digest.to_hex()));
    assert_eq!(fs::read(photo_path).unwrap(), image);
}

#[test]
fn fresh_account_reads_as_empty_catalog() {
    let tmp = tempfile::tempdir().unwrap();
    let session = Session::open_with_backend(
        session_config(&tmp.path().join("cache")),
        remote_backend(&tmp.path().join("remote")),
    )
    .unwrap();

    assert!(session.load_catalog().is_empty());
    // No remote catalog yet: sync resolves to "already current", never an error.
    assert_eq!(session.sync_down().unwrap(), None);
}

#[test]
fn same_content_from_two_devices_stores_one_object() {
    let tmp = tempfile::tempdir().unwrap();
    let remote_dir = tmp.path().join("remote");
    let image = fixture_image(640, 480);

    // Device one backs up the photo under one filename.
    {
        let session = Session::open_with_backend(
            session_config(&tmp.path().join("cache-one")),
            remote_backend(&remote_dir),
        )
        .unwrap();
        let source = library_with(&tmp.path().join("lib-one"), &[("holiday.png", &image)]);
        session.import(&source).unwrap();
        assert_eq!(session.process_queue(&source, &NeverCancel).unwrap().uploaded, 1);
    }

    // Device two backs up the identical bytes under a different name.
    {
        let session = Session::open_with_backend(
            session_config(&tmp.path().join("cache-two")),
            remote_backend(&remote_dir),
        )
        .unwrap();
        let source = library_with(&tmp.path().join("lib-two"), &[("renamed.png", &image)]);
        session.import(&source).unwrap();
        assert_eq!(session.process_queue(&source, &NeverCancel).unwrap().uploaded, 1);
    }

    // Exactly one uploaded photo object exists for the shared digest.
    let photos: Vec<_> = walk_files(&remote_dir.join("photos"));
    assert_eq!(photos.len(), 1);
    let digest = PhotoDigest::compute(&image);
    assert!(photos[0].ends_with(&format!("{}.dat", digest.to_hex())));
}

#[test]
fn second_device_browses_synced_catalog() {
    let tmp = tempfile::tempdir().unwrap();
    let remote_dir = tmp.path().join("remote");
    let image = fixture_image(1024, 768);

    let digest = {
        let session = Session::open_with_backend(
            session_config(&tmp.path().join("cache-writer")),
            remote_backend(&remote_dir),
        )
        .unwrap();
        let source = library_with(&tmp.path().join("library"), &[("shot.png", &image)]);
        session.import(&source).unwrap();
        session.process_queue(&source, &NeverCancel).unwrap();
        session.load_catalog()[0].full_digest.unwrap()
    };

    // A second device with a cold cache pulls the catalog delta and reads
    // bytes back through the cache.
    let session = Session::open_with_backend(
        session_config(&tmp.path().join("cache-reader")),
        remote_backend(&remote_dir),
    )
    .unwrap();
    assert!(session.sync_down().unwrap().is_some());

    let entries = session.load_catalog();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].full_digest, Some(digest));

    let thumb = session.load_thumbnail(&digest, &NeverCancel).unwrap();
    let decoded = image::load_from_memory(&thumb).unwrap();
    assert_eq!(decoded.width().min(decoded.height()), thumb::SHORT_EDGE_TARGET);

    let full = session.load_full_image(&digest, &NeverCancel).unwrap();
    assert_eq!(full, image);

    // Re-syncing an unchanged catalog is a no-op.
    assert_eq!(session.sync_down().unwrap(), None);
}

#[test]
fn portrait_thumbnail_is_top_weighted() {
    // A portrait source scaled below the long-edge clamp still crops, and
    // the crop window sits above a pure center crop.
    let plan = thumb::plan(900, 2400);
    assert!(plan.scaled_height > plan.out_height, "must need a vertical crop");
    let center = (plan.scaled_height - plan.out_height) / 2;
    assert!(plan.crop_y < center);

    // And the encoded result honors the PTM-256 envelope.
    let bytes = thumb::encode_preview(&fixture_image(900, 2400)).unwrap();
    let decoded = image::load_from_memory(&bytes).unwrap();
    assert_eq!(decoded.width(), thumb::SHORT_EDGE_TARGET);
    assert_eq!(decoded.height(), thumb::LONG_EDGE_MAX);
}

#[test]
fn remove_drops_row_and_cloud_objects() {
    let tmp = tempfile::tempdir().unwrap();
    let remote_dir = tmp.path().join("remote");
    let session = Session::open_with_backend(
        session_config(&tmp.path().join("cache")),
        remote_backend(&remote_dir),
    )
    .unwrap();
    let image = fixture_image(320, 240);
    let source = library_with(&tmp.path().join("library"), &[("gone.png", &image)]);
    session.import(&source).unwrap();
    session.process_queue(&source, &NeverCancel).unwrap();
    let digest = session.load_catalog()[0].full_digest.unwrap();

    assert!(session.remove(&digest).unwrap());
    assert!(session.load_catalog().is_empty());
    assert!(walk_files(&remote_dir.join("photos")).is_empty());
    assert!(walk_files(&remote_dir.join("thumbnails")).is_empty());
    // Removing again is a clean no-op.
    assert!(!session.remove(&digest).unwrap());
}

fn walk_files(root: &Path) -> Vec<String> {
    let mut out = Vec::new();
    if !root.exists() {
        return out;
    }
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(dir).unwrap() {
            let entry = entry.unwrap();
            if entry.file_type().unwrap().is_dir() {
                stack.push(entry.path());
            } else {
                out.push(entry.path().to_string_lossy().into_owned());
            }
        }
    }
    out
}
