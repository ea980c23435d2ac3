mod common;

use common::{draw, image_stream, PdfBuilder};
use lopdf::content::Operation;
use lopdf::{dictionary, Object, Stream};
use pdf_dpi_audit::file_ops::analyze_pdf_file;
use pdf_dpi_audit::{analyze_pdf_bytes, AnalysisOptions, ColorMode, DpiSource, ImageFormat};

fn options(min_dpi: f64) -> AnalysisOptions {
    AnalysisOptions {
        min_dpi,
        ..AnalysisOptions::default()
    }
}

#[test]
fn image_at_ten_by_eight_inches_is_300_dpi() {
    let mut pdf = PdfBuilder::new();
    let img = pdf.add_image(3000, 2400, "DeviceCMYK");
    pdf.add_page(draw("Im1", 0, 0, 720, 576), vec![("Im1", img)]);

    let analysis = analyze_pdf_bytes(&pdf.build(), &options(300.0));
    assert!(analysis.is_ok());
    assert_eq!(analysis.total_pages, 1);
    assert_eq!(analysis.total_images, 1);
    assert_eq!(analysis.total_placements, 1);

    let record = &analysis.records[0];
    assert_eq!(record.page, 1);
    assert_eq!((record.width, record.height), (3000, 2400));
    assert_eq!(record.print_width_in, Some(10.0));
    assert_eq!(record.print_height_in, Some(8.0));
    assert_eq!(record.effective_ppi_x, Some(300.0));
    assert_eq!(record.effective_ppi_y, Some(300.0));
    assert_eq!(record.visible_dpi, Some(300.0));
    assert_eq!(record.color_mode, Some(ColorMode::Cmyk));
    assert!(record.verdict.overall);
}

#[test]
fn enlarged_image_fails_strict_threshold() {
    let mut pdf = PdfBuilder::new();
    let img = pdf.add_image(3000, 2400, "DeviceCMYK");
    pdf.add_page(draw("Im1", 0, 0, 1440, 1152), vec![("Im1", img)]);
    let bytes = pdf.build();

    let strict = analyze_pdf_bytes(&bytes, &options(300.0));
    assert_eq!(strict.records[0].visible_dpi, Some(150.0));
    assert!(!strict.records[0].verdict.dpi_pass);

    let lenient = analyze_pdf_bytes(&bytes, &options(150.0));
    assert!(lenient.records[0].verdict.dpi_pass);
}

#[test]
fn repeated_image_yields_one_record_per_placement() {
    let mut pdf = PdfBuilder::new();
    let img = pdf.add_image(1200, 1200, "DeviceGray");
    let mut ops = draw("Im1", 0, 0, 288, 288);
    ops.extend(draw("Im1", 300, 300, 144, 144));
    pdf.add_page(ops, vec![("Im1", img)]);

    let analysis = analyze_pdf_bytes(&pdf.build(), &options(300.0));
    assert_eq!(analysis.total_images, 1);
    assert_eq!(analysis.total_placements, 2);

    let first = &analysis.records[0];
    let second = &analysis.records[1];
    assert_eq!((first.placement_index, first.placement_count), (1, 2));
    assert_eq!((second.placement_index, second.placement_count), (2, 2));
    assert_eq!(first.visible_dpi, Some(300.0));
    assert_eq!(second.visible_dpi, Some(600.0));
    assert_eq!(second.rect.x0, 300.0);
}

#[test]
fn records_follow_page_order() {
    let mut pdf = PdfBuilder::new();
    let a = pdf.add_image(100, 100, "DeviceRGB");
    let b = pdf.add_image(200, 200, "DeviceRGB");
    let mut ops = draw("B", 0, 0, 72, 72);
    ops.extend(draw("A", 0, 0, 72, 72));
    ops.extend(draw("B", 100, 0, 72, 72));
    pdf.add_page(ops, vec![("A", a), ("B", b)]);
    pdf.add_page(draw("A", 0, 0, 36, 36), vec![("A", a)]);

    let analysis = analyze_pdf_bytes(&pdf.build(), &options(300.0));
    let order: Vec<(u32, (u32, u16), usize)> = analysis
        .records
        .iter()
        .map(|r| (r.page, r.object_id, r.placement_index))
        .collect();
    assert_eq!(order, vec![(1, b, 1), (1, b, 2), (1, a, 1), (2, a, 1)]);
    assert_eq!(analysis.total_images, 2);
    assert_eq!(analysis.total_placements, 4);
}

#[test]
fn pages_without_images() {
    let mut pdf = PdfBuilder::new();
    for _ in 0..3 {
        pdf.add_page(vec![Operation::new("q", vec![]), Operation::new("Q", vec![])], vec![]);
    }

    let analysis = analyze_pdf_bytes(&pdf.build(), &AnalysisOptions::default());
    assert!(analysis.is_ok());
    assert_eq!(analysis.total_pages, 3);
    assert_eq!(analysis.total_images, 0);
    assert!(analysis.records.is_empty());
}

#[test]
fn undrawn_images_are_skipped_and_flat_ones_have_unknown_dpi() {
    let mut pdf = PdfBuilder::new();
    let drawn = pdf.add_image(300, 300, "DeviceGray");
    let flat = pdf.add_image(300, 300, "DeviceGray");
    let unused = pdf.add_image(300, 300, "DeviceGray");
    let mut ops = draw("Im1", 0, 0, 72, 72);
    ops.extend(draw("Flat", 0, 0, 0, 72));
    pdf.add_page(ops, vec![("Im1", drawn), ("Flat", flat), ("Unused", unused)]);

    let analysis = analyze_pdf_bytes(&pdf.build(), &options(300.0));
    assert_eq!(analysis.total_images, 2);
    assert_eq!(analysis.records.len(), 2);
    assert_eq!(analysis.records[0].object_id, drawn);
    assert_eq!(analysis.records[0].visible_dpi, Some(300.0));

    let flat_record = &analysis.records[1];
    assert_eq!(flat_record.object_id, flat);
    assert_eq!(flat_record.visible_dpi, None);
    assert!(flat_record.error.is_none());
    assert!(!flat_record.verdict.overall);
}

#[test]
fn sample_bytes_spelling_phys_are_not_a_recorded_dpi() {
    let mut samples = b"pHYs".to_vec();
    samples.extend_from_slice(&11811u32.to_be_bytes());
    samples.extend_from_slice(&11811u32.to_be_bytes());
    samples.extend_from_slice(&[1, 0, 0, 0]);
    assert_eq!(samples.len(), 20);

    let mut pdf = PdfBuilder::new();
    let img = pdf.add_image_stream(image_stream(20, 1, "DeviceGray", samples));
    pdf.add_page(draw("Im1", 0, 0, 72, 72), vec![("Im1", img)]);

    let analysis = analyze_pdf_bytes(&pdf.build(), &options(300.0));
    let record = &analysis.records[0];
    assert_eq!(record.format, Some(ImageFormat::Png));
    assert_eq!(record.metadata_dpi, Some(72));
    assert_eq!(record.dpi_source, Some(DpiSource::Estimated));
}

#[test]
fn broken_image_does_not_abort_the_document() {
    let mut pdf = PdfBuilder::new();
    let broken = pdf.add_image_stream(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => 100,
            "ColorSpace" => "DeviceRGB",
        },
        vec![],
    ));
    let good = pdf.add_image(300, 300, "DeviceGray");
    let mut ops = draw("Bad", 0, 0, 72, 72);
    ops.extend(draw("Good", 0, 0, 72, 72));
    pdf.add_page(ops, vec![("Bad", broken), ("Good", good)]);

    let analysis = analyze_pdf_bytes(&pdf.build(), &options(300.0));
    assert!(analysis.is_ok());
    assert_eq!(analysis.records.len(), 2);

    let bad = &analysis.records[0];
    assert!(bad.error.as_deref().unwrap().contains("Height"));
    assert_eq!(bad.visible_dpi, None);
    assert!(!bad.verdict.overall);

    let good = &analysis.records[1];
    assert!(good.error.is_none());
    assert_eq!(good.visible_dpi, Some(300.0));
}

#[test]
fn form_xobjects_apply_their_matrix() {
    let mut pdf = PdfBuilder::new();
    let img = pdf.add_image(600, 600, "DeviceGray");
    // The form draws the image at one inch square and scales itself by 2
    let form = pdf.add_form(
        draw("Im1", 0, 0, 72, 72),
        vec![("Im1", img)],
        Some([2, 0, 0, 2, 0, 0]),
    );
    let mut ops = vec![
        Operation::new("q", vec![]),
        Operation::new("cm", vec![1.into(), 0.into(), 0.into(), 1.into(), 50.into(), 50.into()]),
        Operation::new("Do", vec![Object::Name(b"Fm1".to_vec())]),
        Operation::new("Q", vec![]),
    ];
    ops.push(Operation::new("Do", vec![Object::Name(b"Fm1".to_vec())]));
    pdf.add_page(ops, vec![("Fm1", form)]);

    let analysis = analyze_pdf_bytes(&pdf.build(), &options(150.0));
    assert_eq!(analysis.total_images, 1);
    assert_eq!(analysis.records.len(), 2);

    let first = &analysis.records[0];
    assert_eq!(first.visible_dpi, Some(300.0));
    assert_eq!((first.rect.x0, first.rect.y0), (50.0, 50.0));
    assert_eq!((first.rect.x1, first.rect.y1), (194.0, 194.0));
    assert_eq!(analysis.records[1].rect.x0, 0.0);
}

#[test]
fn jpeg_density_is_extracted_and_previewed() {
    let (width, height) = (400u16, 300u16);
    let pixels = vec![128u8; width as usize * height as usize * 3];
    let mut jpeg = Vec::new();
    let mut encoder = jpeg_encoder::Encoder::new(&mut jpeg, 90);
    encoder.set_density(jpeg_encoder::PixelDensity {
        density: (300, 300),
        unit: jpeg_encoder::PixelDensityUnit::Inches,
    });
    encoder
        .encode(&pixels, width, height, jpeg_encoder::ColorType::Rgb)
        .expect("encode JPEG");

    let mut stream = image_stream(width.into(), height.into(), "DeviceRGB", jpeg);
    stream.dict.set("Filter", Object::Name(b"DCTDecode".to_vec()));

    let mut pdf = PdfBuilder::new();
    let img = pdf.add_image_stream(stream);
    pdf.add_page(draw("Im1", 0, 0, 144, 108), vec![("Im1", img)]);

    let opts = AnalysisOptions {
        render_previews: true,
        acceptable_color_modes: vec!["RGB".to_string()],
        ..options(200.0)
    };
    let analysis = analyze_pdf_bytes(&pdf.build(), &opts);
    let record = &analysis.records[0];

    assert_eq!(record.format, Some(ImageFormat::Jpeg));
    assert_eq!(record.metadata_dpi, Some(300));
    assert_eq!(record.dpi_source, Some(DpiSource::Extracted));
    assert_eq!(record.visible_dpi, Some(200.0));
    assert!(record.verdict.overall);
    assert!(record.file_size > 0);

    let preview = record.preview.as_ref().expect("preview rendered");
    assert_eq!((preview.width, preview.height), (200, 150));
}

#[test]
fn undecodable_pixels_only_lose_the_preview() {
    let mut pdf = PdfBuilder::new();
    let mut stream = image_stream(640, 480, "DeviceRGB", b"not a jpeg".to_vec());
    stream.dict.set("Filter", Object::Name(b"DCTDecode".to_vec()));
    let img = pdf.add_image_stream(stream);
    pdf.add_page(draw("Im1", 0, 0, 72, 72), vec![("Im1", img)]);

    let opts = AnalysisOptions {
        render_previews: true,
        ..options(300.0)
    };
    let analysis = analyze_pdf_bytes(&pdf.build(), &opts);
    let record = &analysis.records[0];

    assert!(record.preview.is_none());
    assert!(record.error.is_none());
    assert_eq!(record.metadata_dpi, Some(72));
    assert_eq!(record.dpi_source, Some(DpiSource::Estimated));
    assert_eq!(record.effective_ppi_x, Some(640.0));
    assert_eq!(record.visible_dpi, Some(480.0));
}

#[test]
fn analyze_from_file() {
    let mut pdf = PdfBuilder::new();
    let img = pdf.add_image(300, 300, "DeviceGray");
    pdf.add_page(draw("Im1", 0, 0, 72, 72), vec![("Im1", img)]);

    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("input.pdf");
    std::fs::write(&path, pdf.build()).expect("write PDF");

    let analysis = analyze_pdf_file(&path, &AnalysisOptions::default());
    assert!(analysis.is_ok());
    assert_eq!(analysis.records.len(), 1);

    let missing = analyze_pdf_file(&dir.path().join("missing.pdf"), &AnalysisOptions::default());
    assert!(!missing.is_ok());
    assert_eq!(missing.total_pages, 0);
}

#[test]
fn analysis_serializes_to_json() {
    let mut pdf = PdfBuilder::new();
    let img = pdf.add_image(300, 300, "DeviceGray");
    pdf.add_page(draw("Im1", 0, 0, 0, 0), vec![]);
    pdf.add_page(draw("Im1", 0, 0, 72, 72), vec![("Im1", img)]);

    let analysis = analyze_pdf_bytes(&pdf.build(), &AnalysisOptions::default());
    let json = serde_json::to_value(&analysis).expect("serialize");

    assert_eq!(json["total_pages"], 2);
    assert_eq!(json["records"][0]["page"], 2);
    assert_eq!(json["records"][0]["color_mode"], "Grayscale");
    assert_eq!(json["records"][0]["dpi_source"], "estimated");
    assert_eq!(json["records"][0]["quality"], "Excellent");
    assert!(json["error"].is_null());
}
