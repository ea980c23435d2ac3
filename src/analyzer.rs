//! Effective resolution of an image at each place it is drawn.

use crate::image_object::{ColorMode, ImageObject};
use crate::metadata::{estimate_dpi, extract_dpi, ImageFormat};
use crate::preview::Preview;
use crate::scanner::{Placement, Rect};
use crate::AnalysisOptions;
use lopdf::ObjectId;
use serde::Serialize;
use std::fmt;

pub const POINTS_PER_INCH: f64 = 72.0;

/// Slack for floating point error when comparing against a DPI threshold
const DPI_EPSILON: f64 = 1e-6;

/// Where the metadata DPI came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DpiSource {
    Extracted,
    Estimated,
}

/// Display banding of visible DPI
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum QualityBand {
    Poor,
    Acceptable,
    Good,
    Excellent,
}

impl QualityBand {
    pub fn from_dpi(visible_dpi: Option<f64>) -> Self {
        match visible_dpi {
            Some(dpi) if dpi >= 300.0 => QualityBand::Excellent,
            Some(dpi) if dpi >= 250.0 => QualityBand::Good,
            Some(dpi) if dpi >= 150.0 => QualityBand::Acceptable,
            _ => QualityBand::Poor,
        }
    }
}

impl fmt::Display for QualityBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            QualityBand::Excellent => "Excellent",
            QualityBand::Good => "Good",
            QualityBand::Acceptable => "Acceptable",
            QualityBand::Poor => "Poor",
        };
        f.write_str(label)
    }
}

/// Pass/fail against the caller's thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub dpi_pass: bool,
    pub color_pass: bool,
    pub overall: bool,
}

impl Verdict {
    pub fn evaluate(
        visible_dpi: Option<f64>,
        color_mode: Option<ColorMode>,
        options: &AnalysisOptions,
    ) -> Self {
        let dpi_pass = visible_dpi.is_some_and(|dpi| dpi + DPI_EPSILON >= options.min_dpi);
        let color_pass = color_mode.is_some_and(|mode| options.accepts_color_mode(mode));
        Verdict {
            dpi_pass,
            color_pass,
            overall: dpi_pass && color_pass,
        }
    }
}

/// Analysis of one image placement
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisRecord {
    /// 1-based page number
    pub page: u32,
    /// Object id (number, generation)
    pub object_id: (u32, u16),
    /// 1-based ordinal among this image's placements on the page
    pub placement_index: usize,
    pub placement_count: usize,
    /// Bounding box on the page, in points
    pub rect: Rect,
    /// Native width in pixels
    pub width: u32,
    /// Native height in pixels
    pub height: u32,
    pub channels: u32,
    pub bits_per_component: u32,
    /// PDF color space family
    pub color_space: Option<String>,
    pub color_mode: Option<ColorMode>,
    pub format: Option<ImageFormat>,
    /// Size of the compressed payload in bytes
    pub file_size: usize,
    pub megapixels: f64,
    pub print_width_in: Option<f64>,
    pub print_height_in: Option<f64>,
    pub effective_ppi_x: Option<f64>,
    pub effective_ppi_y: Option<f64>,
    /// Lower of the two effective PPI values
    pub visible_dpi: Option<f64>,
    /// DPI recorded in the payload, or an estimate from the pixel count
    pub metadata_dpi: Option<u32>,
    pub dpi_source: Option<DpiSource>,
    pub quality: QualityBand,
    pub verdict: Verdict,
    pub preview: Option<Preview>,
    pub error: Option<String>,
}

impl AnalysisRecord {
    /// Record for a placement whose image could not be analyzed
    pub fn failed(object_id: ObjectId, placement: &Placement, error: impl Into<String>) -> Self {
        AnalysisRecord {
            page: placement.page,
            object_id,
            placement_index: placement.index,
            placement_count: placement.count,
            rect: placement.rect,
            width: 0,
            height: 0,
            channels: 0,
            bits_per_component: 0,
            color_space: None,
            color_mode: None,
            format: None,
            file_size: 0,
            megapixels: 0.0,
            print_width_in: None,
            print_height_in: None,
            effective_ppi_x: None,
            effective_ppi_y: None,
            visible_dpi: None,
            metadata_dpi: None,
            dpi_source: None,
            quality: QualityBand::Poor,
            verdict: Verdict {
                dpi_pass: false,
                color_pass: false,
                overall: false,
            },
            preview: None,
            error: Some(error.into()),
        }
    }

    /// Re-evaluate pass/fail with different thresholds.
    pub fn verdict_for(&self, options: &AnalysisOptions) -> Verdict {
        Verdict::evaluate(self.visible_dpi, self.color_mode, options)
    }

    pub fn color_mode_label(&self) -> String {
        self.color_mode
            .map(|mode| mode.to_string())
            .unwrap_or_else(|| "Unknown".to_string())
    }

    /// Placed size as `W.WW" × H.HH"`
    pub fn print_size(&self) -> String {
        match (self.print_width_in, self.print_height_in) {
            (Some(w), Some(h)) => format!("{:.2}\" × {:.2}\"", w, h),
            _ => "Unknown".to_string(),
        }
    }
}

fn positive_inches(points: f64) -> Option<f64> {
    let inches = points / POINTS_PER_INCH;
    (inches.is_finite() && inches > 0.0).then_some(inches)
}

/// Analyze one placement of an image.
pub fn analyze_placement(
    image: &ImageObject<'_>,
    placement: &Placement,
    options: &AnalysisOptions,
) -> AnalysisRecord {
    let print_width_in = positive_inches(placement.width_pt);
    let print_height_in = positive_inches(placement.height_pt);

    let (effective_ppi_x, effective_ppi_y, visible_dpi) = match (print_width_in, print_height_in) {
        (Some(w), Some(h)) => {
            let x = f64::from(image.width) / w;
            let y = f64::from(image.height) / h;
            (Some(x), Some(y), Some(x.min(y)))
        }
        _ => (None, None, None),
    };

    let (metadata_dpi, dpi_source) = match extract_dpi(image.payload, image.format) {
        Some(dpi) => (dpi, DpiSource::Extracted),
        None => (estimate_dpi(image.width, image.height), DpiSource::Estimated),
    };

    let color_mode = image.color_mode();

    tracing::debug!(
        page = placement.page,
        id = ?image.id,
        "{}x{} px over {:.1}x{:.1} pt: visible {:?} DPI, metadata {} DPI ({:?})",
        image.width,
        image.height,
        placement.width_pt,
        placement.height_pt,
        visible_dpi,
        metadata_dpi,
        dpi_source
    );

    AnalysisRecord {
        page: placement.page,
        object_id: image.id,
        placement_index: placement.index,
        placement_count: placement.count,
        rect: placement.rect,
        width: image.width,
        height: image.height,
        channels: image.channels,
        bits_per_component: image.bits_per_component,
        color_space: Some(image.color_space.clone()),
        color_mode: Some(color_mode),
        format: Some(image.format),
        file_size: image.file_size(),
        megapixels: image.pixel_count() as f64 / 1_000_000.0,
        print_width_in,
        print_height_in,
        effective_ppi_x,
        effective_ppi_y,
        visible_dpi,
        metadata_dpi: Some(metadata_dpi),
        dpi_source: Some(dpi_source),
        quality: QualityBand::from_dpi(visible_dpi),
        verdict: Verdict::evaluate(visible_dpi, Some(color_mode), options),
        preview: None,
        error: None,
    }
}
