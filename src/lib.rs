//! SignalCraft report export
//!
//! Turns a rendered report region into a downloadable artifact: a single PNG
//! image, or a multi-page portrait PDF.
//!
//! # Pipeline
//!
//! - **Capture** ([`capture`], [`rendering`]): a [`Surface`] renders the
//!   element with a given id into an opaque [`Snapshot`] at its full scroll
//!   height and a pixel-density multiplier.
//! - **Pagination** ([`paginate`]): the snapshot is scaled to the page width
//!   and sliced into page-height windows, one PDF page each.
//! - **Delivery** ([`deliver`]): the artifact goes to a [`DownloadSink`] under
//!   the caller's filename.
//!
//! # Example
//!
//! ```no_run
//! use signalcraft_export::{DirectorySink, ExportConfig, Exporter, HtmlSurface};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let surface = HtmlSurface::from_file("report.html")?;
//! let exporter = Exporter::new(surface, DirectorySink::new("out"), &ExportConfig::default())?;
//! let report = exporter.export_pdf("report-content", "Report_2026-01-15.pdf")?;
//! println!("{} pages", report.pages);
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

pub mod error;
pub use error::{Error, Result};

pub mod capture;
pub mod deliver;
pub mod export;
pub mod paginate;
pub mod rendering;

// Async trigger facade (worker thread + oneshot replies)
pub mod async_api;

pub use async_api::ExportService;
pub use capture::{capture_with_retry, CaptureOptions, RetryPolicy, Snapshot, Surface};
pub use deliver::{Artifact, ArtifactKind, CollisionPolicy, DirectorySink, DownloadSink, MemorySink};
pub use export::{ExportReport, Exporter};
pub use paginate::{build_pdf, plan_pages, Orientation, PageFormat, PagePlan, PageSegment, PaperSize};
pub use rendering::HtmlSurface;

/// Configuration for the export pipeline
///
/// The defaults reproduce the dashboard's share action: a 390 px wide mobile
/// layout, captured at 2x on the slate-50 page background, paginated onto A4
/// portrait pages. Every field may be omitted from a JSON config file.
///
/// # Examples
///
/// ```
/// let cfg = signalcraft_export::ExportConfig::default();
/// assert_eq!(cfg.pixel_ratio, 2.0);
/// assert_eq!(cfg.background, "#f8fafc");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Layout viewport of the surface
    pub viewport: Viewport,
    /// Pixel-density multiplier applied at capture time
    pub pixel_ratio: f32,
    /// Opaque background substituted for transparency
    pub background: String,
    /// Capture the full scroll height instead of the viewport
    pub full_height: bool,
    /// Ignore CSS transforms on the captured subtree
    pub neutralize_transforms: bool,
    /// Paper size used for document export
    pub paper: PaperSize,
    /// Page orientation used for document export
    pub orientation: Orientation,
    /// Extra capture attempts on rendering failure (0 => disabled)
    pub capture_retries: u32,
    /// Delay before the first capture retry, doubled per attempt
    pub retry_backoff_ms: u64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            viewport: Viewport::default(),
            pixel_ratio: 2.0,
            background: "#f8fafc".to_string(),
            full_height: true,
            neutralize_transforms: true,
            paper: PaperSize::A4,
            orientation: Orientation::Portrait,
            capture_retries: 0,
            retry_backoff_ms: 100,
        }
    }
}

impl ExportConfig {
    /// Load a JSON config file; missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let cfg: ExportConfig = serde_json::from_str(&text)
            .map_err(|e| Error::ConfigError(format!("{}: {}", path.display(), e)))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.pixel_ratio.is_finite() && self.pixel_ratio > 0.0) {
            return Err(Error::ConfigError(format!("pixel_ratio must be positive, got {}", self.pixel_ratio)));
        }
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(Error::ConfigError("viewport must be non-empty".into()));
        }
        match rendering::paint::Rgba::parse(&self.background) {
            Some(_) => Ok(()),
            None => Err(Error::ConfigError(format!("unparsable background colour {:?}", self.background))),
        }
    }

    pub fn page_format(&self) -> PageFormat {
        PageFormat::new(self.paper, self.orientation)
    }
}

/// Viewport dimensions in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 390,
            height: 844,
        }
    }
}
