//! PDF Image Print-Resolution Analyzer CLI
//!
//! Command-line interface for checking placed image resolution in PDFs.

use clap::Parser;
use pdf_dpi_audit::file_ops::analyze_pdf_file;
use pdf_dpi_audit::report::{
    color_mode_distribution, format_file_size, overall_status, print_readiness, summarize,
};
use pdf_dpi_audit::{AnalysisOptions, DocumentAnalysis};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Check the effective print resolution and color mode of images in PDFs
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input PDF file paths
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Minimum visible DPI required for print
    #[arg(short = 'd', long, default_value = "300")]
    min_dpi: f64,

    /// Acceptable color mode (repeatable)
    #[arg(short = 'c', long = "color-mode", default_values = ["CMYK", "Grayscale"])]
    color_modes: Vec<String>,

    /// Print the analysis as JSON
    #[arg(long)]
    json: bool,

    /// Include base64 PNG thumbnails in JSON output
    #[arg(long, requires = "json")]
    previews: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Serialize)]
struct FileReport<'a> {
    path: &'a PathBuf,
    #[serde(flatten)]
    analysis: &'a DocumentAnalysis,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let options = AnalysisOptions {
        min_dpi: args.min_dpi,
        acceptable_color_modes: args.color_modes.clone(),
        render_previews: args.previews,
    };

    let results: Vec<(PathBuf, DocumentAnalysis)> = args
        .inputs
        .iter()
        .map(|path| (path.clone(), analyze_pdf_file(path, &options)))
        .collect();

    if args.json {
        let reports: Vec<FileReport> = results
            .iter()
            .map(|(path, analysis)| FileReport { path, analysis })
            .collect();
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for (path, analysis) in &results {
            print_text_report(path, analysis, &options);
        }
    }

    let failed = results.iter().filter(|(_, a)| !a.is_ok()).count();
    if failed > 0 {
        anyhow::bail!("{} of {} PDF(s) could not be analyzed", failed, results.len());
    }

    Ok(())
}

fn print_text_report(path: &Path, analysis: &DocumentAnalysis, options: &AnalysisOptions) {
    println!("{}", path.display());
    println!("{}", "=".repeat(path.display().to_string().chars().count()));

    if let Some(err) = &analysis.error {
        println!("Error: {}\n", err);
        return;
    }

    println!(
        "Pages: {}  Images: {}  Placements: {}  Status: {}",
        analysis.total_pages,
        analysis.total_images,
        analysis.total_placements,
        overall_status(analysis, options)
    );
    println!();

    if !analysis.records.is_empty() {
        println!(
            "{:>3}  {:>4}  {:>11}  {:>13}  {:>18}  {:>10}  {:<15}  {:<5}  {:>9}  {:<10}  {:<6}",
            "#", "Page", "Object", "Pixels", "Print size", "DPI", "Color", "Fmt", "Size", "Quality", "Status"
        );
    }

    for (i, record) in analysis.records.iter().enumerate() {
        let object = format!(
            "{} {} [{}/{}]",
            record.object_id.0, record.object_id.1, record.placement_index, record.placement_count
        );
        let pixels = if record.width > 0 && record.height > 0 {
            format!("{}x{}", record.width, record.height)
        } else {
            "Unknown".to_string()
        };
        let dpi = record
            .visible_dpi
            .map(|d| format!("{:.0}", d))
            .unwrap_or_else(|| "Unknown".to_string());
        let format = record
            .format
            .map(|f| f.label().to_string())
            .unwrap_or_else(|| "-".to_string());
        let status = if record.verdict_for(options).overall {
            "PASS"
        } else {
            "FAIL"
        };

        println!(
            "{:>3}  {:>4}  {:>11}  {:>13}  {:>18}  {:>10}  {:<15}  {:<5}  {:>9}  {:<10}  {:<6}",
            i + 1,
            record.page,
            object,
            pixels,
            record.print_size(),
            dpi,
            record.color_mode_label(),
            format,
            format_file_size(record.file_size),
            record.quality.to_string(),
            status
        );
        if let Some(err) = &record.error {
            println!("     error: {}", err);
        }
    }

    let summary = summarize(&analysis.records, options);
    println!();
    println!(
        "Passed: {}/{} ({:.0}%)  High quality (300+ DPI): {}  Average DPI: {}",
        summary.pass_count,
        summary.total,
        summary.pass_rate,
        summary.high_quality_count,
        summary
            .average_dpi
            .map(|d| format!("{:.0}", d))
            .unwrap_or_else(|| "N/A".to_string())
    );

    let distribution = color_mode_distribution(&analysis.records);
    if !distribution.is_empty() {
        let parts: Vec<String> = distribution
            .iter()
            .map(|(mode, share)| format!("{} {} ({:.0}%)", mode, share.count, share.percentage))
            .collect();
        println!("Color modes: {}", parts.join(", "));
    }

    let findings = print_readiness(&analysis.records, options);
    if findings.is_empty() {
        println!("All images meet the specified criteria.");
    } else {
        println!("\nIssues:");
        for finding in &findings {
            println!("  - {}", finding.issue);
        }
        println!("Recommendations:");
        for finding in &findings {
            println!("  - {}", finding.recommendation);
        }
    }
    println!();
}
