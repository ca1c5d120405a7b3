use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;

use photon_types::{PhotonError, Result};

/// Thumbnail short-edge target in pixels.
pub const SHORT_EDGE_TARGET: u32 = 256;
/// Independent clamp applied to both scaled edges.
pub const LONG_EDGE_MAX: u32 = 512;
/// JPEG quality for encoded previews.
const JPEG_QUALITY: u8 = 85;

/// Geometry of a planned thumbnail: the scaled source dimensions and the
/// crop window that produces the final output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThumbPlan {
    pub scaled_width: u32,
    pub scaled_height: u32,
    pub crop_x: u32,
    pub crop_y: u32,
    pub out_width: u32,
    pub out_height: u32,
}

/// Plan the preview geometry for a source of the given dimensions.
///
/// Scale so the short edge hits the target (no upscaling), then clamp both
/// edges to the long-edge maximum independently. The crop window is
/// centered horizontally; for portrait sources the vertical window is
/// shifted up by 40% of the overflow, never below center, so faces in the
/// upper half survive the crop.
pub fn plan(width: u32, height: u32) -> ThumbPlan {
    let short = width.min(height).max(1);
    let scale = if short > SHORT_EDGE_TARGET {
        f64::from(SHORT_EDGE_TARGET) / f64::from(short)
    } else {
        1.0
    };
    let scaled_width = ((f64::from(width) * scale).round() as u32).max(1);
    let scaled_height = ((f64::from(height) * scale).round() as u32).max(1);

    let out_width = scaled_width.min(LONG_EDGE_MAX);
    let out_height = scaled_height.min(LONG_EDGE_MAX);

    let overflow_x = scaled_width - out_width;
    let overflow_y = scaled_height - out_height;

    let crop_x = overflow_x / 2;
    let center_y = overflow_y / 2;
    let crop_y = if height > width {
        // Portrait: bias the window upward by 40% of the overflow.
        center_y.saturating_sub(overflow_y * 2 / 5)
    } else {
        center_y
    };

    ThumbPlan {
        scaled_width,
        scaled_height,
        crop_x,
        crop_y,
        out_width,
        out_height,
    }
}

/// Encode a PTM-256 preview from full source image bytes.
///
/// Output is always JPEG, whatever the source container; decode failure is
/// permanent for the given bytes — callers substitute a placeholder and
/// never retry.
pub fn encode_preview(source: &[u8]) -> Result<Vec<u8>> {
    let img = image::load_from_memory(source)
        .map_err(|e| PhotonError::Decode(e.to_string()))?;

    let p = plan(img.width(), img.height());
    let scaled = img.resize_exact(p.scaled_width, p.scaled_height, FilterType::Lanczos3);
    let cropped = scaled.crop_imm(p.crop_x, p.crop_y, p.out_width, p.out_height);

    let mut out = Vec::new();
    let encoder = JpegEncoder::new_with_quality(Cursor::new(&mut out), JPEG_QUALITY);
    cropped
        .to_rgb8()
        .write_with_encoder(encoder)
        .map_err(|e| PhotonError::Decode(format!("thumbnail encode: {e}")))?;
    Ok(out)
}
