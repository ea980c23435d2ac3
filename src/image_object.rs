//! Image XObject properties: native size, channel layout and color mode.

use crate::error::{AnalysisError, Result};
use crate::metadata::ImageFormat;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use serde::{Serialize, Serializer};
use std::fmt;

/// Limit for following references and nested color space arrays
const MAX_COLOR_SPACE_DEPTH: usize = 8;

/// Color encoding of an image, classified from its channel layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorMode {
    Grayscale,
    GrayscaleAlpha,
    Rgb,
    Rgba,
    Cmyk,
    Channels(u32),
}

impl ColorMode {
    pub fn label(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ColorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColorMode::Grayscale => f.write_str("Grayscale"),
            ColorMode::GrayscaleAlpha => f.write_str("Grayscale+Alpha"),
            ColorMode::Rgb => f.write_str("RGB"),
            ColorMode::Rgba => f.write_str("RGBA"),
            ColorMode::Cmyk => f.write_str("CMYK"),
            ColorMode::Channels(n) => write!(f, "{}-channel", n),
        }
    }
}

impl Serialize for ColorMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Classify a pixel layout. Defined for every channel count.
pub fn classify_color_mode(channels: u32, has_alpha: bool) -> ColorMode {
    match (channels, has_alpha) {
        (1, _) => ColorMode::Grayscale,
        (2, _) => ColorMode::GrayscaleAlpha,
        (3, _) => ColorMode::Rgb,
        (4, true) => ColorMode::Rgba,
        (4, false) => ColorMode::Cmyk,
        (n, _) => ColorMode::Channels(n),
    }
}

/// One distinct raster resource in a document
#[derive(Debug, Clone)]
pub struct ImageObject<'a> {
    pub id: ObjectId,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Color components plus one if the image carries alpha
    pub channels: u32,
    pub has_alpha: bool,
    pub bits_per_component: u32,
    /// PDF color space family name (e.g. "DeviceRGB", "ICCBased")
    pub color_space: String,
    pub format: ImageFormat,
    /// Stream content exactly as stored in the file
    pub payload: &'a [u8],
}

impl<'a> ImageObject<'a> {
    /// Read an image XObject's properties from its stream dictionary.
    pub fn from_stream(id: ObjectId, stream: &'a Stream, doc: &Document) -> Result<Self> {
        let dict = &stream.dict;
        let width = dimension(dict, b"Width", doc)?;
        let height = dimension(dict, b"Height", doc)?;

        let filter = codec_filter(dict);
        let format = ImageFormat::from_filter(filter.as_deref());

        let is_mask = matches!(dict.get(b"ImageMask"), Ok(Object::Boolean(true)));
        let (color_space, components) = if is_mask {
            ("ImageMask".to_string(), 1)
        } else {
            match dict.get(b"ColorSpace") {
                Ok(cs) => resolve_color_space(cs, doc, 0)?,
                // JPX streams may carry their own color space
                Err(_) if format == ImageFormat::Jpx => ("JPX".to_string(), 3),
                Err(_) => {
                    return Err(AnalysisError::InvalidImage(format!(
                        "image {:?} has no /ColorSpace",
                        id
                    )))
                }
            }
        };

        let bits_per_component = if is_mask {
            1
        } else {
            integer(dict.get(b"BitsPerComponent").ok(), doc)
                .filter(|&b| b > 0)
                .unwrap_or(8) as u32
        };

        let has_alpha = has_soft_mask(dict);
        let channels = components + u32::from(has_alpha);

        Ok(ImageObject {
            id,
            width,
            height,
            channels,
            has_alpha,
            bits_per_component,
            color_space,
            format,
            payload: &stream.content,
        })
    }

    pub fn color_mode(&self) -> ColorMode {
        classify_color_mode(self.channels, self.has_alpha)
    }

    pub fn pixel_count(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    pub fn file_size(&self) -> usize {
        self.payload.len()
    }
}

/// True if the dictionary describes an image XObject
pub fn is_image_xobject(dict: &Dictionary) -> bool {
    matches!(dict.get(b"Subtype"), Ok(Object::Name(n)) if n == b"Image")
}

/// Name of the last filter in the chain, which is the image codec when one
/// is present.
pub fn codec_filter(dict: &Dictionary) -> Option<String> {
    dict.get(b"Filter").ok().and_then(|f| match f {
        Object::Name(n) => Some(String::from_utf8_lossy(n).to_string()),
        Object::Array(arr) => arr.last().and_then(|f| match f {
            Object::Name(n) => Some(String::from_utf8_lossy(n).to_string()),
            _ => None,
        }),
        _ => None,
    })
}

fn dimension(dict: &Dictionary, key: &[u8], doc: &Document) -> Result<u32> {
    let value = integer(dict.get(key).ok(), doc).ok_or_else(|| {
        AnalysisError::InvalidImage(format!("missing /{}", String::from_utf8_lossy(key)))
    })?;
    if value <= 0 || value > i64::from(u32::MAX) {
        return Err(AnalysisError::InvalidImage(format!(
            "invalid /{} {}",
            String::from_utf8_lossy(key),
            value
        )));
    }
    Ok(value as u32)
}

fn integer(obj: Option<&Object>, doc: &Document) -> Option<i64> {
    match obj? {
        Object::Integer(n) => Some(*n),
        Object::Real(r) => Some(*r as i64),
        Object::Reference(id) => integer(doc.get_object(*id).ok(), doc),
        _ => None,
    }
}

fn has_soft_mask(dict: &Dictionary) -> bool {
    let smask = matches!(
        dict.get(b"SMask"),
        Ok(Object::Reference(_)) | Ok(Object::Stream(_))
    );
    let smask_in_data = matches!(dict.get(b"SMaskInData"), Ok(Object::Integer(n)) if *n > 0);
    smask || smask_in_data
}

/// Resolve a color space to its family name and component count.
fn resolve_color_space(obj: &Object, doc: &Document, depth: usize) -> Result<(String, u32)> {
    if depth > MAX_COLOR_SPACE_DEPTH {
        return Err(AnalysisError::InvalidImage(
            "color space nesting too deep".to_string(),
        ));
    }

    match obj {
        Object::Name(name) => {
            let name = String::from_utf8_lossy(name).to_string();
            let components = match name.as_str() {
                "DeviceGray" | "G" | "CalGray" => 1,
                "DeviceRGB" | "RGB" | "CalRGB" | "Lab" => 3,
                "DeviceCMYK" | "CMYK" => 4,
                _ => {
                    return Err(AnalysisError::InvalidImage(format!(
                        "unsupported color space {}",
                        name
                    )))
                }
            };
            Ok((name, components))
        }
        Object::Array(arr) => {
            let family = match arr.first() {
                Some(Object::Name(n)) => String::from_utf8_lossy(n).to_string(),
                _ => {
                    return Err(AnalysisError::InvalidImage(
                        "malformed color space array".to_string(),
                    ))
                }
            };
            let components = match family.as_str() {
                "ICCBased" => icc_components(arr.get(1), doc, depth)?,
                // Indexed images are reported in their base space
                "Indexed" | "I" => match arr.get(1) {
                    Some(base) => resolve_color_space(base, doc, depth + 1)?.1,
                    None => {
                        return Err(AnalysisError::InvalidImage(
                            "Indexed color space without base".to_string(),
                        ))
                    }
                },
                "Separation" => 1,
                "DeviceN" => match arr.get(1).map(|names| deref(names, doc)) {
                    Some(Some(Object::Array(names))) if !names.is_empty() => names.len() as u32,
                    _ => {
                        return Err(AnalysisError::InvalidImage(
                            "DeviceN color space without colorants".to_string(),
                        ))
                    }
                },
                _ => {
                    let name = Object::Name(family.clone().into_bytes());
                    resolve_color_space(&name, doc, depth + 1)?.1
                }
            };
            Ok((family, components))
        }
        Object::Reference(id) => {
            let resolved = doc.get_object(*id).map_err(|e| {
                AnalysisError::InvalidImage(format!("unresolvable color space {:?}: {}", id, e))
            })?;
            resolve_color_space(resolved, doc, depth + 1)
        }
        _ => Err(AnalysisError::InvalidImage(
            "unsupported color space object".to_string(),
        )),
    }
}

fn icc_components(profile: Option<&Object>, doc: &Document, depth: usize) -> Result<u32> {
    let dict = match profile.and_then(|p| deref(p, doc)) {
        Some(Object::Stream(s)) => &s.dict,
        Some(Object::Dictionary(d)) => d,
        _ => {
            return Err(AnalysisError::InvalidImage(
                "ICCBased color space without profile".to_string(),
            ))
        }
    };

    if let Some(n) = integer(dict.get(b"N").ok(), doc).filter(|&n| n > 0) {
        return Ok(n as u32);
    }
    match dict.get(b"Alternate") {
        Ok(alt) => Ok(resolve_color_space(alt, doc, depth + 1)?.1),
        Err(_) => Err(AnalysisError::InvalidImage(
            "ICCBased profile without /N".to_string(),
        )),
    }
}

fn deref<'a>(obj: &'a Object, doc: &'a Document) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        _ => Some(obj),
    }
}
