//! Thumbnail previews for analysis records.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use serde::{Serialize, Serializer};
use std::io::Cursor;

/// Bounding box for previews, in pixels
pub const PREVIEW_MAX_SIZE: u32 = 200;

/// A PNG-encoded thumbnail
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Preview {
    pub width: u32,
    pub height: u32,
    #[serde(rename = "png_base64", serialize_with = "serialize_base64")]
    pub png: Vec<u8>,
}

impl Preview {
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.png)
    }
}

fn serialize_base64<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&STANDARD.encode(bytes))
}

/// Downsample to fit within 200x200 and encode as PNG.
///
/// Images already inside the box are encoded at their own size.
pub fn render_preview(img: &DynamicImage) -> Option<Preview> {
    if img.width() == 0 || img.height() == 0 {
        return None;
    }

    let thumb = if img.width() > PREVIEW_MAX_SIZE || img.height() > PREVIEW_MAX_SIZE {
        img.resize(PREVIEW_MAX_SIZE, PREVIEW_MAX_SIZE, FilterType::Lanczos3)
    } else {
        img.clone()
    };

    let mut png = Vec::new();
    if let Err(e) = thumb.write_to(&mut Cursor::new(&mut png), ImageFormat::Png) {
        tracing::warn!("could not encode preview: {}", e);
        return None;
    }

    Some(Preview {
        width: thumb.width(),
        height: thumb.height(),
        png,
    })
}
