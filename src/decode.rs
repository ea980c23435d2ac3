//! Decoding image XObject streams into pixel buffers.

use crate::error::{AnalysisError, Result};
use crate::image_object::{codec_filter, ImageObject};
use flate2::read::ZlibDecoder;
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage, RgbaImage};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::collections::HashMap;
use std::io::Read;

/// Decoded pixels, memoized per image object for one analysis pass
#[derive(Default)]
pub struct PixelCache {
    decoded: HashMap<ObjectId, Option<DynamicImage>>,
}

impl PixelCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode an image once; later calls for the same object reuse the result.
    pub fn get_or_decode(
        &mut self,
        image: &ImageObject<'_>,
        stream: &Stream,
        doc: &Document,
    ) -> Option<&DynamicImage> {
        self.decoded
            .entry(image.id)
            .or_insert_with(|| match decode_image(image, stream, doc) {
                Ok(img) => Some(img),
                Err(e) => {
                    tracing::warn!(id = ?image.id, "could not decode image pixels: {}", e);
                    None
                }
            })
            .as_ref()
    }

    pub fn len(&self) -> usize {
        self.decoded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoded.is_empty()
    }
}

/// Decode an image XObject, merging its soft mask as alpha when present.
pub fn decode_image(image: &ImageObject<'_>, stream: &Stream, doc: &Document) -> Result<DynamicImage> {
    let img = decode_image_stream(stream, image.width, image.height, &image.color_space, image.bits_per_component)?;

    let smask = match stream.dict.get(b"SMask") {
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Stream(s)) => Some(s),
            _ => None,
        },
        _ => None,
    };

    let Some(smask) = smask else {
        return Ok(img);
    };

    match decode_smask_stream(smask, image.width, image.height) {
        Ok(alpha) => {
            let rgb = img.to_rgb8();
            let mut rgba_data = Vec::with_capacity(alpha.len() * 4);
            for (pixel, a) in rgb.pixels().zip(alpha.iter()) {
                rgba_data.extend_from_slice(&[pixel[0], pixel[1], pixel[2], *a]);
            }
            Ok(RgbaImage::from_raw(image.width, image.height, rgba_data)
                .map(DynamicImage::ImageRgba8)
                .unwrap_or(img))
        }
        Err(e) => {
            tracing::debug!(id = ?image.id, "ignoring soft mask: {}", e);
            Ok(img)
        }
    }
}

/// `/DecodeParms` is a dictionary, or an array paired with a `/Filter` array.
fn uses_predictor(dict: &Dictionary) -> bool {
    let has_predictor = |obj: &Object| match obj {
        Object::Dictionary(parms) => {
            matches!(parms.get(b"Predictor"), Ok(Object::Integer(p)) if *p > 1)
        }
        _ => false,
    };

    match dict.get(b"DecodeParms") {
        Ok(Object::Array(parms)) => parms.iter().any(has_predictor),
        Ok(parms) => has_predictor(parms),
        Err(_) => false,
    }
}

/// Undo a Flate filter; any other filter is an error.
fn inflate(stream: &Stream) -> Result<Vec<u8>> {
    if uses_predictor(&stream.dict) {
        return Err(AnalysisError::Decode("predictors are not supported".to_string()));
    }

    match codec_filter(&stream.dict).as_deref() {
        Some("FlateDecode") | Some("Fl") => {
            let mut decoder = ZlibDecoder::new(&stream.content[..]);
            let mut decoded = Vec::new();
            decoder
                .read_to_end(&mut decoded)
                .map_err(|e| AnalysisError::Decode(e.to_string()))?;
            Ok(decoded)
        }
        None => Ok(stream.content.clone()),
        Some(other) => Err(AnalysisError::Decode(format!("unsupported filter: {}", other))),
    }
}

/// Decode an SMask stream (grayscale alpha channel)
fn decode_smask_stream(stream: &Stream, width: u32, height: u32) -> Result<Vec<u8>> {
    let decoded = inflate(stream)?;
    let expected_size = width as usize * height as usize;
    if decoded.len() >= expected_size {
        Ok(decoded[..expected_size].to_vec())
    } else {
        Err(AnalysisError::Decode(format!(
            "SMask data size mismatch: got {} expected {}",
            decoded.len(),
            expected_size
        )))
    }
}

/// Decode a PDF image stream into raw pixel data
fn decode_image_stream(
    stream: &Stream,
    width: u32,
    height: u32,
    color_space: &str,
    bits_per_component: u32,
) -> Result<DynamicImage> {
    match codec_filter(&stream.dict).as_deref() {
        Some("DCTDecode") | Some("DCT") => {
            return image::load_from_memory_with_format(&stream.content, ImageFormat::Jpeg)
                .map_err(|e| AnalysisError::Decode(format!("JPEG: {}", e)));
        }
        Some("JPXDecode") => {
            return image::load_from_memory(&stream.content)
                .map_err(|e| AnalysisError::Decode(format!("JPEG2000: {}", e)));
        }
        _ => {}
    }

    let data = inflate(stream)?;
    let pixels = width as usize * height as usize;

    match (color_space, bits_per_component) {
        ("DeviceGray" | "G" | "CalGray" | "ImageMask" | "Separation", 1) => {
            let row_bytes = (width as usize).div_ceil(8);
            if data.len() < row_bytes * height as usize {
                return Err(size_mismatch("1-bit gray", data.len(), row_bytes * height as usize));
            }
            let mut gray = Vec::with_capacity(pixels);
            for row in data.chunks(row_bytes).take(height as usize) {
                for x in 0..width as usize {
                    let bit = (row[x / 8] >> (7 - (x % 8))) & 1;
                    gray.push(if bit == 1 { 255 } else { 0 });
                }
            }
            gray_image(width, height, gray)
        }
        ("DeviceGray" | "G" | "CalGray" | "Separation", 8) => {
            if data.len() < pixels {
                return Err(size_mismatch("gray", data.len(), pixels));
            }
            gray_image(width, height, data[..pixels].to_vec())
        }
        ("DeviceRGB" | "RGB" | "CalRGB", 8) => {
            if data.len() < pixels * 3 {
                return Err(size_mismatch("RGB", data.len(), pixels * 3));
            }
            rgb_image(width, height, data[..pixels * 3].to_vec())
        }
        ("DeviceCMYK" | "CMYK", 8) => {
            if data.len() < pixels * 4 {
                return Err(size_mismatch("CMYK", data.len(), pixels * 4));
            }
            let mut rgb_data = Vec::with_capacity(pixels * 3);
            for chunk in data[..pixels * 4].chunks(4) {
                let c = chunk[0] as f32 / 255.0;
                let m = chunk[1] as f32 / 255.0;
                let y = chunk[2] as f32 / 255.0;
                let k = chunk[3] as f32 / 255.0;

                rgb_data.push(((1.0 - c) * (1.0 - k) * 255.0) as u8);
                rgb_data.push(((1.0 - m) * (1.0 - k) * 255.0) as u8);
                rgb_data.push(((1.0 - y) * (1.0 - k) * 255.0) as u8);
            }
            rgb_image(width, height, rgb_data)
        }
        ("ICCBased", 8) => {
            // Guess the layout from the data size
            if data.len() >= pixels * 3 {
                rgb_image(width, height, data[..pixels * 3].to_vec())
            } else if data.len() >= pixels {
                gray_image(width, height, data[..pixels].to_vec())
            } else {
                Err(AnalysisError::Decode(
                    "could not determine ICCBased layout".to_string(),
                ))
            }
        }
        (cs, bits) => Err(AnalysisError::Decode(format!(
            "unsupported color space {} at {} bits",
            cs, bits
        ))),
    }
}

fn size_mismatch(kind: &str, got: usize, expected: usize) -> AnalysisError {
    AnalysisError::Decode(format!(
        "{} data size mismatch: got {} expected {}",
        kind, got, expected
    ))
}

fn gray_image(width: u32, height: u32, data: Vec<u8>) -> Result<DynamicImage> {
    GrayImage::from_raw(width, height, data)
        .map(DynamicImage::ImageLuma8)
        .ok_or_else(|| AnalysisError::Decode("failed to create grayscale image".to_string()))
}

fn rgb_image(width: u32, height: u32, data: Vec<u8>) -> Result<DynamicImage> {
    RgbImage::from_raw(width, height, data)
        .map(DynamicImage::ImageRgb8)
        .ok_or_else(|| AnalysisError::Decode("failed to create RGB image".to_string()))
}
