use serde::{Deserialize, Serialize};
use std::fmt;

/// Detected image container type, persisted as a catalog row attribute.
///
/// Detection is by magic bytes, never by filename extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhotoFormat {
    Jpeg,
    Png,
    Gif,
    Webp,
    Tiff,
    Bmp,
    Heic,
    Unknown,
}

impl PhotoFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhotoFormat::Jpeg => "jpeg",
            PhotoFormat::Png => "png",
            PhotoFormat::Gif => "gif",
            PhotoFormat::Webp => "webp",
            PhotoFormat::Tiff => "tiff",
            PhotoFormat::Bmp => "bmp",
            PhotoFormat::Heic => "heic",
            PhotoFormat::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "jpeg" => Some(PhotoFormat::Jpeg),
            "png" => Some(PhotoFormat::Png),
            "gif" => Some(PhotoFormat::Gif),
            "webp" => Some(PhotoFormat::Webp),
            "tiff" => Some(PhotoFormat::Tiff),
            "bmp" => Some(PhotoFormat::Bmp),
            "heic" => Some(PhotoFormat::Heic),
            "unknown" => Some(PhotoFormat::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for PhotoFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
