//! Export orchestration: capture, optionally paginate, then deliver.

use crate::capture::{capture_with_retry, CaptureOptions, RetryPolicy, Snapshot, Surface};
use crate::deliver::{Artifact, ArtifactKind, DownloadSink};
use crate::paginate::{build_pdf, PageFormat};
use crate::{ExportConfig, Result};
use serde::Serialize;
use std::time::Duration;

/// Summary of a delivered export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportReport {
    pub filename: String,
    pub kind: ArtifactKind,
    pub bytes: usize,
    /// Number of document pages; 1 for image exports.
    pub pages: usize,
    /// Snapshot size in device pixels.
    pub pixel_size: (u32, u32),
}

/// Runs the export pipeline against one surface and one download sink.
///
/// Every call captures a fresh snapshot; nothing is shared between exports.
pub struct Exporter<S, D> {
    surface: S,
    sink: D,
    capture: CaptureOptions,
    format: PageFormat,
    retry: RetryPolicy,
}

impl<S: Surface, D: DownloadSink> Exporter<S, D> {
    /// Create an exporter; fails if `config` is invalid.
    pub fn new(surface: S, sink: D, config: &ExportConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            surface,
            sink,
            capture: CaptureOptions::from_config(config)?,
            format: config.page_format(),
            retry: RetryPolicy {
                retries: config.capture_retries,
                backoff: Duration::from_millis(config.retry_backoff_ms),
            },
        })
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn sink(&self) -> &D {
        &self.sink
    }

    pub fn page_format(&self) -> PageFormat {
        self.format
    }

    /// Capture stage on its own.
    pub fn capture(&self, target_id: &str) -> Result<Snapshot> {
        capture_with_retry(&self.surface, target_id, &self.capture, self.retry)
    }

    /// Capture `target_id` and deliver it as a PNG named `filename`.
    pub fn export_image(&self, target_id: &str, filename: &str) -> Result<ExportReport> {
        self.run(ArtifactKind::Png, target_id, filename)
    }

    /// Capture `target_id`, paginate it and deliver it as a PDF named `filename`.
    pub fn export_pdf(&self, target_id: &str, filename: &str) -> Result<ExportReport> {
        self.run(ArtifactKind::Pdf, target_id, filename)
    }

    fn run(&self, kind: ArtifactKind, target_id: &str, filename: &str) -> Result<ExportReport> {
        let res = self.try_run(kind, target_id, filename);
        match &res {
            Ok(report) => log::info!(
                "exported #{} as {} ({} bytes, {} page(s))",
                target_id, report.filename, report.bytes, report.pages
            ),
            Err(e) => log::error!("{} export of #{} failed: {}", kind.extension().to_uppercase(), target_id, e),
        }
        res
    }

    fn try_run(&self, kind: ArtifactKind, target_id: &str, filename: &str) -> Result<ExportReport> {
        let snapshot = self.capture(target_id)?;
        log::debug!(
            "captured #{} at {}x{} px (ratio {})",
            target_id,
            snapshot.width(),
            snapshot.height(),
            snapshot.pixel_ratio
        );

        let (artifact, pages) = match kind {
            ArtifactKind::Png => (Artifact::png(snapshot.to_png()?), 1),
            ArtifactKind::Pdf => {
                let title = filename.rsplit_once('.').map_or(filename, |(stem, _)| stem);
                let doc = build_pdf(&snapshot, self.format, title)?;
                let pages = doc.page_count();
                (Artifact::pdf(doc.bytes), pages)
            }
        };

        self.sink.deliver(filename, &artifact)?;
        Ok(ExportReport {
            filename: filename.to_string(),
            kind,
            bytes: artifact.bytes.len(),
            pages,
            pixel_size: (snapshot.width(), snapshot.height()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deliver::MemorySink;
    use crate::rendering::HtmlSurface;
    use crate::Error;

    fn exporter(html: &str) -> Exporter<HtmlSurface, MemorySink> {
        Exporter::new(HtmlSurface::from_html(html), MemorySink::new(), &ExportConfig::default()).unwrap()
    }

    #[test]
    fn image_export_delivers_png() {
        let ex = exporter("<div id=r><h1>Report</h1><p>ok</p></div>");
        let report = ex.export_image("r", "r.png").unwrap();
        assert_eq!(report.pages, 1);
        let d = ex.sink().deliveries();
        assert_eq!(d.len(), 1);
        assert!(d[0].bytes.starts_with(b"\x89PNG\r\n\x1a\n"));
        assert_eq!(report.bytes, d[0].bytes.len());
    }

    #[test]
    fn pdf_export_reports_pages() {
        let rows = "<p>sensor reading within range</p>".repeat(120);
        let ex = exporter(&format!("<div id=r>{}</div>", rows));
        let report = ex.export_pdf("r", "r.pdf").unwrap();
        assert!(report.pages > 1);
        assert_eq!(ex.sink().deliveries()[0].content_type, "application/pdf");
    }

    #[test]
    fn failures_deliver_nothing() {
        let ex = exporter("<div id=r></div>");
        assert!(matches!(ex.export_pdf("missing", "x.pdf"), Err(Error::TargetNotFound(_))));
        assert!(matches!(ex.export_image("r", "x.png"), Err(Error::CaptureFailed(_))));
        assert!(ex.sink().is_empty());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let cfg = ExportConfig { pixel_ratio: 0.0, ..Default::default() };
        let res = Exporter::new(HtmlSurface::from_html(""), MemorySink::new(), &cfg);
        assert!(matches!(res, Err(Error::ConfigError(_))));
    }
}
