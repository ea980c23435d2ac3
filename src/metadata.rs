//! DPI hints embedded in compressed image payloads.
//!
//! These are byte scanners, not decoders: each one looks for the first
//! occurrence of a marker and reads fixed-offset fields after it. Chunk CRCs
//! and container structure are not validated.

use serde::Serialize;
use std::fmt;

const JFIF_MARKER: &[u8] = b"JFIF";
const PHYS_CHUNK: &[u8] = b"pHYs";
const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";
const INCHES_PER_METER: f64 = 39.3701;
const CM_PER_INCH: f64 = 2.54;

/// Encoding of an image payload as stored in the PDF
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Tiff,
    Jpx,
    Jbig2,
    Fax,
}

impl ImageFormat {
    /// Map a PDF stream filter name to the payload format.
    ///
    /// Anything that is not a dedicated image codec is losslessly compressed
    /// sample data, which is reported as PNG.
    pub fn from_filter(filter: Option<&str>) -> Self {
        match filter {
            Some("DCTDecode") | Some("DCT") => ImageFormat::Jpeg,
            Some("JPXDecode") => ImageFormat::Jpx,
            Some("JBIG2Decode") => ImageFormat::Jbig2,
            Some("CCITTFaxDecode") | Some("CCF") => ImageFormat::Fax,
            _ => ImageFormat::Png,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "JPEG",
            ImageFormat::Png => "PNG",
            ImageFormat::Tiff => "TIFF",
            ImageFormat::Jpx => "JPX",
            ImageFormat::Jbig2 => "JBIG2",
            ImageFormat::Fax => "FAX",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Extract the horizontal DPI recorded in an image payload, if any.
///
/// A recorded density of zero is treated as absent.
pub fn extract_dpi(payload: &[u8], format: ImageFormat) -> Option<u32> {
    let dpi = match format {
        ImageFormat::Jpeg => extract_jpeg_dpi(payload),
        ImageFormat::Png => extract_png_dpi(payload),
        ImageFormat::Tiff => extract_tiff_dpi(payload),
        ImageFormat::Jpx | ImageFormat::Jbig2 | ImageFormat::Fax => None,
    };
    dpi.filter(|&d| d > 0)
}

/// JFIF APP0 density: units byte 7 bytes after the marker, then a
/// big-endian u16 X density.
pub fn extract_jpeg_dpi(data: &[u8]) -> Option<u32> {
    let pos = find(data, JFIF_MARKER)?;
    let density_pos = pos + 7;
    if density_pos + 4 >= data.len() {
        return None;
    }

    let units = data[density_pos];
    let x_density = u16::from_be_bytes([data[density_pos + 1], data[density_pos + 2]]);

    match units {
        1 => Some(u32::from(x_density)),
        2 => Some((f64::from(x_density) * CM_PER_INCH).round() as u32),
        _ => None,
    }
}

/// PNG pHYs chunk: big-endian u32 pixels-per-unit X, then Y, then the unit
/// specifier (1 = meter).
///
/// Only payloads carrying the PNG file signature are scanned. PDF sample
/// streams reported as PNG hold raw pixels, where a `pHYs` match is noise.
pub fn extract_png_dpi(data: &[u8]) -> Option<u32> {
    if !data.starts_with(PNG_SIGNATURE) {
        return None;
    }
    let pos = find(data, PHYS_CHUNK)?;
    let data_pos = pos + 4;
    if data_pos + 8 >= data.len() {
        return None;
    }

    let ppu = u32::from_be_bytes([
        data[data_pos],
        data[data_pos + 1],
        data[data_pos + 2],
        data[data_pos + 3],
    ]);
    let unit = data[data_pos + 8];

    if unit == 1 {
        Some((f64::from(ppu) / INCHES_PER_METER).round() as u32)
    } else {
        None
    }
}

/// TIFF resolution tags are not read; callers fall back to estimation.
pub fn extract_tiff_dpi(_data: &[u8]) -> Option<u32> {
    None
}

/// Coarse DPI guess from the total pixel count. Breakpoints are strict.
pub fn estimate_dpi(width: u32, height: u32) -> u32 {
    let pixel_count = u64::from(width) * u64::from(height);

    if pixel_count > 6_000_000 {
        300
    } else if pixel_count > 2_000_000 {
        240
    } else if pixel_count > 1_000_000 {
        180
    } else if pixel_count > 500_000 {
        150
    } else {
        72
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
