//! Document-level summaries of analysis records.

use crate::analyzer::AnalysisRecord;
use crate::{AnalysisOptions, DocumentAnalysis};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Pixel count above which an image may slow down print workflows
const VERY_LARGE_PIXELS: u64 = 10_000_000;

/// Pass/fail statistics over a set of records
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualitySummary {
    pub total: usize,
    pub pass_count: usize,
    pub fail_count: usize,
    /// Percentage of passing records
    pub pass_rate: f64,
    /// Records at 300 visible DPI or more
    pub high_quality_count: usize,
    /// Mean visible DPI over records that have one
    pub average_dpi: Option<f64>,
}

pub fn summarize(records: &[AnalysisRecord], options: &AnalysisOptions) -> QualitySummary {
    let total = records.len();
    let pass_count = records
        .iter()
        .filter(|r| r.verdict_for(options).overall)
        .count();
    let high_quality_count = records
        .iter()
        .filter(|r| r.visible_dpi.is_some_and(|dpi| dpi >= 300.0))
        .count();

    let dpis: Vec<f64> = records.iter().filter_map(|r| r.visible_dpi).collect();
    let average_dpi = if dpis.is_empty() {
        None
    } else {
        Some(dpis.iter().sum::<f64>() / dpis.len() as f64)
    };

    let pass_rate = if total > 0 {
        pass_count as f64 / total as f64 * 100.0
    } else {
        0.0
    };

    QualitySummary {
        total,
        pass_count,
        fail_count: total - pass_count,
        pass_rate,
        high_quality_count,
        average_dpi,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColorModeShare {
    pub count: usize,
    pub percentage: f64,
}

/// Count of records per color mode label
pub fn color_mode_distribution(records: &[AnalysisRecord]) -> BTreeMap<String, ColorModeShare> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for record in records {
        *counts.entry(record.color_mode_label()).or_default() += 1;
    }

    let total = records.len();
    counts
        .into_iter()
        .map(|(label, count)| {
            let percentage = if total > 0 {
                count as f64 / total as f64 * 100.0
            } else {
                0.0
            };
            (label, ColorModeShare { count, percentage })
        })
        .collect()
}

/// A print-readiness problem and what to do about it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub issue: String,
    pub recommendation: String,
}

pub fn print_readiness(records: &[AnalysisRecord], options: &AnalysisOptions) -> Vec<Finding> {
    let mut findings = Vec::new();

    if records.is_empty() {
        findings.push(Finding {
            issue: "No images found in PDF".to_string(),
            recommendation: "Ensure the PDF contains embedded images".to_string(),
        });
        return findings;
    }

    let low_dpi = records
        .iter()
        .filter(|r| r.visible_dpi.is_some() && !r.verdict_for(options).dpi_pass)
        .count();
    if low_dpi > 0 {
        findings.push(Finding {
            issue: format!("{} image(s) have DPI below {}", low_dpi, options.min_dpi),
            recommendation: format!(
                "Increase image resolution to at least {} DPI at the placed size",
                options.min_dpi
            ),
        });
    }

    let wrong_modes: Vec<String> = records
        .iter()
        .filter_map(|r| r.color_mode)
        .filter(|mode| !options.accepts_color_mode(*mode))
        .map(|mode| mode.to_string())
        .collect();
    if !wrong_modes.is_empty() {
        let distinct: BTreeSet<&str> = wrong_modes.iter().map(String::as_str).collect();
        findings.push(Finding {
            issue: format!(
                "{} image(s) use non-preferred color spaces: {}",
                wrong_modes.len(),
                distinct.into_iter().collect::<Vec<_>>().join(", ")
            ),
            recommendation: format!(
                "Convert images to preferred color spaces: {}",
                options.acceptable_color_modes.join(", ")
            ),
        });
    }

    let large = records
        .iter()
        .filter(|r| u64::from(r.width) * u64::from(r.height) > VERY_LARGE_PIXELS)
        .count();
    if large > 0 {
        findings.push(Finding {
            issue: format!(
                "{} image(s) are very large and may cause printing delays",
                large
            ),
            recommendation: "Consider optimizing very large images for print workflow"
                .to_string(),
        });
    }

    let incomplete = records
        .iter()
        .filter(|r| r.error.is_some() || r.visible_dpi.is_none() || r.color_mode.is_none())
        .count();
    if incomplete > 0 {
        findings.push(Finding {
            issue: format!("{} image(s) could not be fully analyzed", incomplete),
            recommendation: "Check for corrupted or improperly embedded images".to_string(),
        });
    }

    findings
}

/// Verdict for a whole document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OverallStatus {
    Pass,
    Fail,
    NotApplicable,
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverallStatus::Pass => f.write_str("PASS"),
            OverallStatus::Fail => f.write_str("FAIL"),
            OverallStatus::NotApplicable => f.write_str("N/A"),
        }
    }
}

pub fn overall_status(analysis: &DocumentAnalysis, options: &AnalysisOptions) -> OverallStatus {
    if analysis.records.is_empty() {
        OverallStatus::NotApplicable
    } else if analysis
        .records
        .iter()
        .all(|r| r.verdict_for(options).overall)
    {
        OverallStatus::Pass
    } else {
        OverallStatus::Fail
    }
}

/// Human readable size with 1024-based units
pub fn format_file_size(size_bytes: usize) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    if size_bytes == 0 {
        return "0 B".to_string();
    }

    let mut size = size_bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} {}", size_bytes, UNITS[0])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}
