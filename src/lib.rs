//! PDF Image Print-Resolution Analyzer Library
//!
//! Finds every raster image drawn in a PDF, measures the size each one is
//! placed at, and reports the resolution a printer actually gets (visible
//! DPI) together with its color mode and any DPI recorded in the image data.
//!
//! Parses page content streams (including nested Form XObjects) to find each
//! placement, then analyzes placements one by one so a broken image never
//! aborts the whole document.

pub mod analyzer;
pub mod decode;
pub mod error;
pub mod image_object;
pub mod metadata;
pub mod preview;
pub mod report;
pub mod scanner;

pub use analyzer::{analyze_placement, AnalysisRecord, DpiSource, QualityBand, Verdict};
pub use error::AnalysisError;
pub use image_object::{classify_color_mode, ColorMode, ImageObject};
pub use metadata::{estimate_dpi, extract_dpi, ImageFormat};
pub use preview::{render_preview, Preview};
pub use scanner::{Placement, Rect};

use decode::PixelCache;
use lopdf::{Document, Object};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Options for PDF image analysis
#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    /// Minimum visible DPI for an image to pass
    pub min_dpi: f64,
    /// Color mode labels that pass the color check (e.g. "CMYK")
    pub acceptable_color_modes: Vec<String>,
    /// Attach a PNG thumbnail to each record
    pub render_previews: bool,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            min_dpi: 300.0,
            acceptable_color_modes: vec!["CMYK".to_string(), "Grayscale".to_string()],
            render_previews: false,
        }
    }
}

impl AnalysisOptions {
    pub fn accepts_color_mode(&self, mode: ColorMode) -> bool {
        let label = mode.to_string();
        self.acceptable_color_modes.iter().any(|m| *m == label)
    }
}

/// Result of analyzing one document
#[derive(Debug, Clone, Default, Serialize)]
pub struct DocumentAnalysis {
    pub total_pages: usize,
    /// Distinct image objects drawn at least once
    pub total_images: usize,
    /// Number of placements, one record each
    pub total_placements: usize,
    /// Ordered by page, then first appearance of the image on the page,
    /// then placement ordinal
    pub records: Vec<AnalysisRecord>,
    /// Set when the document itself could not be loaded
    pub error: Option<String>,
}

impl DocumentAnalysis {
    pub fn failed(error: impl Into<String>) -> Self {
        DocumentAnalysis {
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Analyze every image placement in a loaded document.
pub fn analyze_document(doc: &Document, options: &AnalysisOptions) -> DocumentAnalysis {
    let pages = scanner::scan_pages(doc);
    let mut cache = PixelCache::new();
    let mut unique: HashSet<lopdf::ObjectId> = HashSet::new();
    let mut records = Vec::new();

    for page in &pages {
        for drawn in &page.images {
            unique.insert(drawn.id);

            let stream = match doc.get_object(drawn.id) {
                Ok(Object::Stream(s)) => s,
                _ => {
                    warn!(page = page.page_number, id = ?drawn.id, "image object is not a stream");
                    records.extend(
                        drawn
                            .placements
                            .iter()
                            .map(|p| AnalysisRecord::failed(drawn.id, p, "image object is not a stream")),
                    );
                    continue;
                }
            };

            let image = match ImageObject::from_stream(drawn.id, stream, doc) {
                Ok(image) => image,
                Err(e) => {
                    warn!(page = page.page_number, id = ?drawn.id, "could not analyze image: {}", e);
                    let message = e.to_string();
                    records.extend(
                        drawn
                            .placements
                            .iter()
                            .map(|p| AnalysisRecord::failed(drawn.id, p, message.clone())),
                    );
                    continue;
                }
            };

            for placement in &drawn.placements {
                let mut record = analyze_placement(&image, placement, options);
                if options.render_previews {
                    record.preview = cache
                        .get_or_decode(&image, stream, doc)
                        .and_then(render_preview);
                }
                records.push(record);
            }
        }
    }

    info!(
        pages = pages.len(),
        images = unique.len(),
        placements = records.len(),
        decoded = cache.len(),
        "analysis complete"
    );

    DocumentAnalysis {
        total_pages: pages.len(),
        total_images: unique.len(),
        total_placements: records.len(),
        records,
        error: None,
    }
}

/// Analyze a PDF held in memory.
///
/// Load failures are reported in [`DocumentAnalysis::error`] with zeroed
/// totals rather than as an `Err`.
pub fn analyze_pdf_bytes(pdf_bytes: &[u8], options: &AnalysisOptions) -> DocumentAnalysis {
    match Document::load_mem(pdf_bytes) {
        Ok(doc) => {
            debug!(bytes = pdf_bytes.len(), "loaded PDF");
            analyze_document(&doc, options)
        }
        Err(e) => {
            let err = AnalysisError::Load(e.to_string());
            warn!("{}", err);
            DocumentAnalysis::failed(err.to_string())
        }
    }
}

pub mod file_ops {
    use super::*;
    use std::path::Path;

    /// Analyze a PDF file on disk.
    pub fn analyze_pdf_file(input_path: &Path, options: &AnalysisOptions) -> DocumentAnalysis {
        match std::fs::read(input_path) {
            Ok(bytes) => analyze_pdf_bytes(&bytes, options),
            Err(e) => {
                let err = AnalysisError::Io(e);
                warn!(path = ?input_path, "{}", err);
                DocumentAnalysis::failed(format!("{:?}: {}", input_path, err))
            }
        }
    }
}
