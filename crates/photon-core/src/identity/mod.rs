use std::fs::File;
use std::io::Read;
use std::path::Path;

use photon_types::{DigestHasher, FastKey, PhotoDigest, PhotoFormat, Result};

use crate::cancel::Cancel;

/// How much of a file's head the fast key digests. Enough to cover every
/// image container's header region while staying a single cheap read.
pub const HEAD_BYTES: usize = 64 * 1024;

/// Read chunk size for streaming full-digest computation.
const STREAM_CHUNK: usize = 256 * 1024;

/// Compute a file's fast key: digest of the first `HEAD_BYTES` plus the
/// file size. Reads only the bounded prefix, never the whole file.
pub fn fast_key(path: &Path) -> Result<FastKey> {
    let mut file = File::open(path)?;
    let file_size = file.metadata()?.len();
    let mut head = vec![0u8; HEAD_BYTES];
    let mut filled = 0;
    while filled < head.len() {
        match file.read(&mut head[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    head.truncate(filled);
    Ok(FastKey {
        head_digest: PhotoDigest::compute(&head),
        file_size,
    })
}

/// Fast key for content already in memory.
pub fn fast_key_of_bytes(data: &[u8]) -> FastKey {
    let head_len = data.len().min(HEAD_BYTES);
    FastKey {
        head_digest: PhotoDigest::compute(&data[..head_len]),
        file_size: data.len() as u64,
    }
}

/// Stream a file's entire content through the digest. The only identity
/// operation permitted to be slow; cancellable between read chunks.
pub fn full_digest(path: &Path, cancel: &dyn Cancel) -> Result<PhotoDigest> {
    let mut file = File::open(path)?;
    let mut hasher = DigestHasher::new();
    let mut buf = vec![0u8; STREAM_CHUNK];
    loop {
        cancel.check()?;
        match file.read(&mut buf)? {
            0 => break,
            n => hasher.update(&buf[..n]),
        }
    }
    Ok(hasher.finalize())
}

/// Full digest for content already in memory.
pub fn full_digest_of_bytes(data: &[u8]) -> PhotoDigest {
    PhotoDigest::compute(data)
}

/// Detect the image container type from head bytes.
///
/// HEIC is recognized by its ftyp box brand since the decoder stack does
/// not handle it; everything else defers to the decoder's own sniffing.
pub fn detect_format(head: &[u8]) -> PhotoFormat {
    if is_heic(head) {
        return PhotoFormat::Heic;
    }
    match image::guess_format(head) {
        Ok(image::ImageFormat::Jpeg) => PhotoFormat::Jpeg,
        Ok(image::ImageFormat::Png) => PhotoFormat::Png,
        Ok(image::ImageFormat::Gif) => PhotoFormat::Gif,
        Ok(image::ImageFormat::WebP) => PhotoFormat::Webp,
        Ok(image::ImageFormat::Tiff) => PhotoFormat::Tiff,
        Ok(image::ImageFormat::Bmp) => PhotoFormat::Bmp,
        _ => PhotoFormat::Unknown,
    }
}

fn is_heic(head: &[u8]) -> bool {
    // ISO-BMFF: size(4) + "ftyp"(4) + major brand(4).
    if head.len() < 12 || &head[4..8] != b"ftyp" {
        return false;
    }
    matches!(&head[8..12], b"heic" | b"heix" | b"hevc" | b"mif1")
}
