//! Pagination stage: slice a tall snapshot into portrait pages and build a PDF.
//!
//! All page math happens in millimetres. The snapshot is scaled so its width
//! equals the page width exactly; the scaled height follows from the aspect
//! ratio. Page `k` shows the window `[k * Ph, (k + 1) * Ph)` of the scaled
//! image, which is the same as placing the whole image at `-(k * Ph)` and
//! clipping to the page.
//!
//! Each PDF page embeds only the pixel rows of its own window, so a tall
//! capture is never duplicated once per page.

use crate::capture::Snapshot;
use crate::{Error, Result};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Remaining heights at or below this are treated as fully placed.
pub const HEIGHT_EPSILON_MM: f64 = 1e-6;

const PT_PER_MM: f64 = 72.0 / 25.4;

/// Physical paper size (portrait dimensions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaperSize {
    #[default]
    A4,
    Letter,
}

impl PaperSize {
    /// Portrait width and height in millimetres.
    pub fn dimensions_mm(&self) -> (f64, f64) {
        match self {
            PaperSize::A4 => (210.0, 297.0),
            PaperSize::Letter => (215.9, 279.4),
        }
    }
}

impl std::str::FromStr for PaperSize {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "a4" => Ok(PaperSize::A4),
            "letter" => Ok(PaperSize::Letter),
            other => Err(Error::ConfigError(format!("unknown paper size {:?}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

/// Target page geometry for pagination.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PageFormat {
    pub width_mm: f64,
    pub height_mm: f64,
}

impl PageFormat {
    pub const A4_PORTRAIT: PageFormat = PageFormat { width_mm: 210.0, height_mm: 297.0 };

    pub fn new(paper: PaperSize, orientation: Orientation) -> Self {
        let (w, h) = paper.dimensions_mm();
        match orientation {
            Orientation::Portrait => PageFormat { width_mm: w, height_mm: h },
            Orientation::Landscape => PageFormat { width_mm: h, height_mm: w },
        }
    }

    fn validate(&self) -> Result<()> {
        let ok = |v: f64| v.is_finite() && v > 0.0;
        if ok(self.width_mm) && ok(self.height_mm) {
            Ok(())
        } else {
            Err(Error::InvalidDimensions(format!(
                "page format {}x{} mm",
                self.width_mm, self.height_mm
            )))
        }
    }
}

impl Default for PageFormat {
    fn default() -> Self {
        Self::A4_PORTRAIT
    }
}

/// One page's vertical window onto the scaled snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageSegment {
    pub index: usize,
    /// Top of the window, `index * page_height`.
    pub offset_mm: f64,
    /// Height of real content on this page; less than the page height only on the last page.
    pub content_height_mm: f64,
    /// Where the top of the full image would sit relative to this page, `-offset_mm`.
    pub placement_y_mm: f64,
    /// Source pixel rows shown on this page (half-open).
    pub pixel_rows: Range<u32>,
}

impl PageSegment {
    /// Blank space left under the content on this page.
    pub fn trailing_blank_mm(&self, format: &PageFormat) -> f64 {
        (format.height_mm - self.content_height_mm).max(0.0)
    }
}

/// Ordered page windows for a snapshot of a given pixel size.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PagePlan {
    pub format: PageFormat,
    pub source_width_px: u32,
    pub source_height_px: u32,
    /// Always equal to `format.width_mm`.
    pub scaled_width_mm: f64,
    pub scaled_height_mm: f64,
    pub segments: Vec<PageSegment>,
}

impl PagePlan {
    pub fn page_count(&self) -> usize {
        self.segments.len()
    }

    /// Source pixels per millimetre of page.
    pub fn px_per_mm(&self) -> f64 {
        self.source_width_px as f64 / self.scaled_width_mm
    }
}

/// Plan the page windows for a `width_px` x `height_px` snapshot.
pub fn plan_pages(width_px: u32, height_px: u32, format: PageFormat) -> Result<PagePlan> {
    format.validate()?;
    if width_px == 0 || height_px == 0 {
        return Err(Error::InvalidDimensions(format!(
            "snapshot {}x{} px",
            width_px, height_px
        )));
    }

    let page_w = format.width_mm;
    let page_h = format.height_mm;
    let scaled_height = height_px as f64 * page_w / width_px as f64;
    let px_per_mm = width_px as f64 / page_w;
    // Boundaries round down so a boundary never lands past the content and
    // the final sliver keeps at least one row.
    let row_at = |mm: f64| ((mm * px_per_mm + 1e-9).floor() as u32).min(height_px);

    let mut segments = Vec::new();
    let mut height_left = scaled_height;
    loop {
        let index = segments.len();
        let offset = index as f64 * page_h;
        let content = (scaled_height - offset).min(page_h);
        height_left -= page_h;
        let last = height_left <= HEIGHT_EPSILON_MM;
        let start = row_at(offset).min(height_px - 1);
        let end = if last { height_px } else { row_at(offset + page_h) };
        segments.push(PageSegment {
            index,
            offset_mm: offset,
            content_height_mm: if last { content } else { page_h },
            placement_y_mm: -offset,
            pixel_rows: start..end.max(start),
        });
        if last {
            break;
        }
    }

    Ok(PagePlan {
        format,
        source_width_px: width_px,
        source_height_px: height_px,
        scaled_width_mm: page_w,
        scaled_height_mm: scaled_height,
        segments,
    })
}

/// A paginated PDF and the plan it was built from.
#[derive(Debug, Clone)]
pub struct PaginatedDocument {
    pub plan: PagePlan,
    pub bytes: Vec<u8>,
}

impl PaginatedDocument {
    pub fn page_count(&self) -> usize {
        self.plan.page_count()
    }
}

fn real(v: f64) -> Object {
    Object::Real(v as f32)
}

/// RGB bytes for the given rows of the snapshot (alpha dropped; snapshots are opaque).
fn rgb_rows(snapshot: &Snapshot, rows: &Range<u32>) -> Vec<u8> {
    let width = snapshot.width() as usize;
    let raw = snapshot.image.as_raw();
    let start = rows.start as usize * width * 4;
    let end = rows.end as usize * width * 4;
    let mut out = Vec::with_capacity((end - start) / 4 * 3);
    for px in raw[start..end].chunks_exact(4) {
        out.extend_from_slice(&px[..3]);
    }
    out
}

/// Slice `snapshot` into pages of `format` and assemble a PDF.
pub fn build_pdf(snapshot: &Snapshot, format: PageFormat, title: &str) -> Result<PaginatedDocument> {
    let plan = plan_pages(snapshot.width(), snapshot.height(), format)?;
    log::debug!(
        "paginating {}x{} px into {} page(s) of {}x{} mm (scaled height {:.2} mm)",
        plan.source_width_px,
        plan.source_height_px,
        plan.page_count(),
        format.width_mm,
        format.height_mm,
        plan.scaled_height_mm
    );

    let page_w_pt = format.width_mm * PT_PER_MM;
    let page_h_pt = format.height_mm * PT_PER_MM;

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids: Vec<Object> = Vec::with_capacity(plan.page_count());

    for segment in &plan.segments {
        let rows = segment.pixel_rows.end - segment.pixel_rows.start;
        let mut operations = Vec::new();
        let mut resources = dictionary! {};
        if rows > 0 {
            let image = Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => snapshot.width() as i64,
                    "Height" => rows as i64,
                    "ColorSpace" => "DeviceRGB",
                    "BitsPerComponent" => 8,
                },
                rgb_rows(snapshot, &segment.pixel_rows),
            );
            let image_id = doc.add_object(image);
            resources.set("XObject", dictionary! { "Im0" => image_id });

            // Slice height in page units keeps the uniform scale used for the width.
            let slice_h_pt = rows as f64 / plan.px_per_mm() * PT_PER_MM;
            operations.extend([
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![real(page_w_pt), real(0.0), real(0.0), real(slice_h_pt), real(0.0), real(page_h_pt - slice_h_pt)],
                ),
                Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
                Operation::new("Q", vec![]),
            ]);
        }
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![real(0.0), real(0.0), real(page_w_pt), real(page_h_pt)],
            "Contents" => content_id,
            "Resources" => resources,
        });
        kids.push(page_id.into());
    }

    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => plan.page_count() as i64,
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    let info_id = doc.add_object(dictionary! {
        "Title" => Object::string_literal(title),
        "Producer" => Object::string_literal(concat!("signalcraft-export ", env!("CARGO_PKG_VERSION"))),
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);
    doc.compress();

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)?;
    Ok(PaginatedDocument { plan, bytes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    fn snapshot(w: u32, h: u32) -> Snapshot {
        let mut image = RgbaImage::from_pixel(w, h, image::Rgba([248, 250, 252, 255]));
        for y in 0..h {
            image.put_pixel(0, y, image::Rgba([(y % 256) as u8, 0, 0, 255]));
        }
        Snapshot { image, css_width: w / 2, css_height: h / 2, pixel_ratio: 2.0 }
    }

    #[test]
    fn example_report_needs_four_pages() {
        let plan = plan_pages(1000, 4500, PageFormat::A4_PORTRAIT).unwrap();
        assert!((plan.scaled_height_mm - 945.0).abs() < 1e-9);
        assert_eq!(plan.page_count(), 4);
        assert_eq!(plan.segments[3].placement_y_mm, -891.0);
        assert!((plan.segments[3].content_height_mm - 54.0).abs() < 1e-9);
    }

    #[test]
    fn short_content_is_one_page() {
        let plan = plan_pages(1000, 100, PageFormat::A4_PORTRAIT).unwrap();
        assert_eq!(plan.page_count(), 1);
        assert_eq!(plan.segments[0].pixel_rows, 0..100);
    }

    #[test]
    fn exact_multiple_has_no_empty_trailing_page() {
        // 210 px wide => 1 px per mm, so 594 px is exactly two A4 pages
        let plan = plan_pages(210, 594, PageFormat::A4_PORTRAIT).unwrap();
        assert_eq!(plan.page_count(), 2);
        assert_eq!(plan.segments[1].content_height_mm, 297.0);
        assert_eq!(plan.segments[1].pixel_rows, 297..594);
    }

    #[test]
    fn thin_final_sliver_keeps_its_rows() {
        let plan = plan_pages(780, 4413, PageFormat::A4_PORTRAIT).unwrap();
        assert_eq!(plan.page_count(), 5);
        let last = plan.segments.last().unwrap();
        assert!(last.pixel_rows.end > last.pixel_rows.start, "last rows {:?}", last.pixel_rows);
        assert_eq!(last.pixel_rows.end, 4413);
        let page_rows = (PageFormat::A4_PORTRAIT.height_mm * plan.px_per_mm()).ceil() as u32;
        for seg in &plan.segments {
            assert!(seg.pixel_rows.len() as u32 <= page_rows, "page {} rows {:?}", seg.index, seg.pixel_rows);
        }
    }

    #[test]
    fn zero_dimensions_are_rejected() {
        assert!(matches!(plan_pages(0, 10, PageFormat::default()), Err(Error::InvalidDimensions(_))));
        assert!(matches!(plan_pages(10, 0, PageFormat::default()), Err(Error::InvalidDimensions(_))));
        let bad = PageFormat { width_mm: 0.0, height_mm: 297.0 };
        assert!(matches!(plan_pages(10, 10, bad), Err(Error::InvalidDimensions(_))));
    }

    #[test]
    fn landscape_swaps_sides() {
        let f = PageFormat::new(PaperSize::A4, Orientation::Landscape);
        assert_eq!((f.width_mm, f.height_mm), (297.0, 210.0));
        assert_eq!("Letter".parse::<PaperSize>().unwrap(), PaperSize::Letter);
        assert!("b5".parse::<PaperSize>().is_err());
    }

    #[test]
    fn pdf_has_one_page_per_segment() {
        let snap = snapshot(100, 400);
        let doc = build_pdf(&snap, PageFormat::A4_PORTRAIT, "Report").unwrap();
        assert!(doc.bytes.starts_with(b"%PDF-1.5"));
        let parsed = Document::load_mem(&doc.bytes).unwrap();
        assert_eq!(parsed.get_pages().len(), doc.page_count());
        assert_eq!(doc.page_count(), 3);
    }

    #[test]
    fn rgb_rows_drop_alpha_and_select_rows() {
        let snap = snapshot(3, 10);
        let rows = rgb_rows(&snap, &(4..6));
        assert_eq!(rows.len(), 3 * 2 * 3);
        assert_eq!(&rows[0..3], &[4, 0, 0]);
        assert_eq!(&rows[9..12], &[5, 0, 0]);
    }
}
