//! End-to-end export scenarios against the report fixture

use signalcraft_export::{
    CaptureOptions, DirectorySink, Error, ExportConfig, Exporter, HtmlSurface, MemorySink, Surface,
};
use std::fs;

const FIXTURE: &str = "tests/fixtures/report.html";

fn surface() -> HtmlSurface {
    HtmlSurface::from_file(FIXTURE).expect("read fixture")
}

fn memory_exporter() -> Exporter<HtmlSurface, MemorySink> {
    Exporter::new(surface(), MemorySink::new(), &ExportConfig::default()).expect("exporter")
}

#[test]
fn missing_element_rejects_before_delivery() {
    let exporter = memory_exporter();
    let err = exporter.export_pdf("does-not-exist", "Report.pdf").unwrap_err();
    assert!(matches!(err, Error::TargetNotFound(ref id) if id == "does-not-exist"));
    let err = exporter.export_image("does-not-exist", "Report.png").unwrap_err();
    assert!(matches!(err, Error::TargetNotFound(_)));
    assert!(exporter.sink().is_empty());
}

#[test]
fn missing_element_writes_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let exporter = Exporter::new(surface(), DirectorySink::new(dir.path()), &ExportConfig::default()).unwrap();
    assert!(exporter.export_image("does-not-exist", "Report.png").is_err());
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn image_export_uses_exact_filename_and_png_content_type() {
    let exporter = memory_exporter();
    let report = exporter.export_image("report-content", "Report_2026-01-15.png").unwrap();
    let deliveries = exporter.sink().deliveries();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].filename, "Report_2026-01-15.png");
    assert_eq!(deliveries[0].content_type, "image/png");
    assert_eq!(&deliveries[0].bytes[0..8], b"\x89PNG\r\n\x1a\n");

    let decoded = image::load_from_memory(&deliveries[0].bytes).unwrap().to_rgba8();
    assert_eq!(decoded.dimensions(), report.pixel_size);
    assert_eq!(decoded.width(), 390 * 2);
    assert!(decoded.pixels().all(|p| p.0[3] == 255), "snapshot must be opaque");
}

#[test]
fn capture_covers_full_scroll_height() {
    let s = surface();
    let full = s.capture("report-content", &CaptureOptions::default()).unwrap();
    let clipped = s
        .capture(
            "report-content",
            &CaptureOptions { full_height: false, viewport_height: 200, ..Default::default() },
        )
        .unwrap();
    assert!(full.css_height > 200);
    assert_eq!(clipped.css_height, 200);
    assert_eq!(full.height(), full.css_height * 2);
}

#[test]
fn fixed_height_scroll_pane_is_captured_in_full() {
    let rows = "<p>Sensor reading within range.</p>".repeat(100);
    let free = HtmlSurface::from_html(format!("<div id=\"pane\">{}</div>", rows));
    let boxed = HtmlSurface::from_html(format!(
        "<div id=\"pane\" style=\"height:120px; overflow-y:auto\">{}</div>",
        rows
    ));
    let opts = CaptureOptions::default();
    let free = free.capture("pane", &opts).unwrap();
    let snap = boxed.capture("pane", &opts).unwrap();
    assert!(snap.css_height > 120, "capture clipped to declared height");
    assert!(snap.css_height >= free.css_height);
    assert_eq!(snap.height(), snap.css_height * 2);
}

#[test]
fn transformed_element_is_captured_in_flow_position() {
    let s = surface();
    let bg = image::Rgba([0xf8, 0xfa, 0xfc, 255]);

    let natural = s.capture("offscreen", &CaptureOptions::default()).unwrap();
    assert!(natural.image.pixels().any(|p| *p != bg), "expected visible content");

    let animated = s
        .capture("offscreen", &CaptureOptions { neutralize_transforms: false, ..Default::default() })
        .unwrap();
    assert!(animated.image.pixels().all(|p| *p == bg), "translated content should leave the frame");
}

#[test]
fn capture_is_idempotent_on_unchanged_surface() {
    let s = surface();
    let opts = CaptureOptions::default();
    let a = s.capture("report-content", &opts).unwrap();
    let b = s.capture("report-content", &opts).unwrap();
    assert_eq!(a.digest(), b.digest());
    assert_eq!(a.image.as_raw(), b.image.as_raw());
}

#[test]
fn pdf_export_pages_match_plan() {
    let exporter = memory_exporter();
    let report = exporter.export_pdf("report-content", "Report_2026-01-15.pdf").unwrap();
    let snapshot = exporter.capture("report-content").unwrap();
    let plan = signalcraft_export::plan_pages(snapshot.width(), snapshot.height(), exporter.page_format()).unwrap();
    assert_eq!(report.pages, plan.page_count());

    let delivered = &exporter.sink().deliveries()[0];
    assert_eq!(delivered.content_type, "application/pdf");
    let doc = lopdf::Document::load_mem(&delivered.bytes).unwrap();
    assert_eq!(doc.get_pages().len(), report.pages);
}

#[test]
fn long_report_spans_multiple_pages() {
    let cards = r#"<div style="background:#ffffff"><h3>Machine</h3><p>Health nominal. No anomalies.</p></div>"#.repeat(60);
    let html = format!("<main id=\"long\">{}</main>", cards);
    let exporter = Exporter::new(HtmlSurface::from_html(html), MemorySink::new(), &ExportConfig::default()).unwrap();
    let report = exporter.export_pdf("long", "long.pdf").unwrap();
    assert!(report.pages >= 3, "got {} pages", report.pages);
}

#[test]
fn empty_region_is_a_capture_failure() {
    let exporter = memory_exporter();
    let err = exporter.export_pdf("blank-region", "blank.pdf").unwrap_err();
    assert!(matches!(err, Error::CaptureFailed(_)));
    assert!(exporter.sink().is_empty());
}

#[test]
fn directory_delivery_writes_named_file() {
    let dir = tempfile::tempdir().unwrap();
    let exporter = Exporter::new(surface(), DirectorySink::new(dir.path()), &ExportConfig::default()).unwrap();
    exporter.export_pdf("summary", "Summary.pdf").unwrap();
    let bytes = fs::read(dir.path().join("Summary.pdf")).unwrap();
    assert!(bytes.starts_with(b"%PDF-"));
}

/// Per-page image widths, heights and the `cm` horizontal scale against the MediaBox width.
fn pdf_page_images(bytes: &[u8]) -> Vec<(i64, i64, f32, f32)> {
    let doc = lopdf::Document::load_mem(bytes).unwrap();
    let mut out = Vec::new();
    for (_, page_id) in doc.get_pages() {
        let page = doc.get_dictionary(page_id).unwrap();
        let media = page.get(b"MediaBox").unwrap().as_array().unwrap();
        let media_w = media[2].as_float().unwrap();

        let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
        let xobjects = resources.get(b"XObject").unwrap().as_dict().unwrap();
        let image_id = xobjects.get(b"Im0").unwrap().as_reference().unwrap();
        let image = doc.get_object(image_id).unwrap().as_stream().unwrap();
        let width = image.dict.get(b"Width").unwrap().as_i64().unwrap();
        let height = image.dict.get(b"Height").unwrap().as_i64().unwrap();

        let content = doc.get_and_decode_page_content(page_id).unwrap();
        let cm = content.operations.iter().find(|op| op.operator == "cm").expect("page places its image");
        let scale_x = cm.operands[0].as_float().unwrap();
        out.push((width, height, scale_x, media_w));
    }
    out
}

fn assert_pdf_slices_snapshot(snapshot: &signalcraft_export::Snapshot, bytes: &[u8]) {
    let pages = pdf_page_images(bytes);
    assert!(!pages.is_empty());
    for (k, (width, height, scale_x, media_w)) in pages.iter().enumerate() {
        assert_eq!(*width, snapshot.width() as i64, "page {} image width", k);
        assert!(*height > 0, "page {} embeds no rows", k);
        assert!((scale_x - media_w).abs() < 1e-2, "page {} scaled to {} of {}", k, scale_x, media_w);
    }
    let total: i64 = pages.iter().map(|p| p.1).sum();
    assert_eq!(total, snapshot.height() as i64, "rows lost or duplicated across pages");
}

#[test]
fn pdf_pages_slice_the_fixture_at_full_width() {
    let exporter = memory_exporter();
    exporter.export_pdf("report-content", "Report.pdf").unwrap();
    let snapshot = exporter.capture("report-content").unwrap();
    assert_pdf_slices_snapshot(&snapshot, &exporter.sink().deliveries()[0].bytes);
}

#[test]
fn pdf_pages_slice_a_tall_snapshot_without_blank_tail() {
    let image = image::RgbaImage::from_pixel(780, 4413, image::Rgba([248, 250, 252, 255]));
    let snapshot = signalcraft_export::Snapshot { image, css_width: 390, css_height: 2206, pixel_ratio: 2.0 };
    let doc = signalcraft_export::build_pdf(&snapshot, signalcraft_export::PageFormat::A4_PORTRAIT, "Tall").unwrap();
    assert_eq!(doc.page_count(), 5);
    assert_pdf_slices_snapshot(&snapshot, &doc.bytes);
}
