//! Capture stage: turn a region of a renderable surface into a raster snapshot.
//!
//! A [`Surface`] is anything that can render an element identified by a stable
//! id into pixels. The rest of the pipeline only ever sees the resulting
//! [`Snapshot`], so pagination and delivery do not depend on how the pixels
//! were produced.

use crate::rendering::paint::Rgba;
use crate::{Error, ExportConfig, Result};
use base64::Engine as _;
use image::RgbaImage;
use sha2::{Digest, Sha256};
use std::io::Cursor;
use std::time::Duration;

/// Options applied to a single capture.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureOptions {
    /// Layout width of the surface in CSS pixels.
    pub width: u32,
    /// Visible viewport height; only used when `full_height` is false.
    pub viewport_height: u32,
    /// Capture the full scroll height rather than the visible viewport.
    pub full_height: bool,
    /// Opaque fill substituted for transparency.
    pub background: Rgba,
    /// Pixel-density multiplier.
    pub pixel_ratio: f32,
    /// Ignore CSS transforms on the target and its descendants.
    pub neutralize_transforms: bool,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            width: 390,
            viewport_height: 844,
            full_height: true,
            background: Rgba(0xf8, 0xfa, 0xfc, 255),
            pixel_ratio: 2.0,
            neutralize_transforms: true,
        }
    }
}

impl CaptureOptions {
    /// Build capture options from a validated export configuration.
    pub fn from_config(config: &ExportConfig) -> Result<Self> {
        let background = Rgba::parse(&config.background)
            .ok_or_else(|| Error::ConfigError(format!("unparsable background colour {:?}", config.background)))?;
        Ok(Self {
            width: config.viewport.width,
            viewport_height: config.viewport.height,
            full_height: config.full_height,
            background: background.opaque(),
            pixel_ratio: config.pixel_ratio,
            neutralize_transforms: config.neutralize_transforms,
        })
    }
}

/// A raster snapshot of a captured region.
///
/// Every pixel is opaque. `image` has `ceil(css_width * pixel_ratio)` by
/// `ceil(css_height * pixel_ratio)` pixels.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub image: RgbaImage,
    pub css_width: u32,
    pub css_height: u32,
    pub pixel_ratio: f32,
}

impl Snapshot {
    /// Pixel width of the raster.
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Pixel height of the raster.
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Encode the raster as PNG.
    pub fn to_png(&self) -> Result<Vec<u8>> {
        let mut out = Cursor::new(Vec::new());
        self.image.write_to(&mut out, image::ImageFormat::Png)?;
        Ok(out.into_inner())
    }

    /// PNG payload as a `data:` URL, the form a browser download link expects.
    pub fn to_data_url(&self) -> Result<String> {
        let png = self.to_png()?;
        Ok(format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(png)
        ))
    }

    /// Hex SHA-256 of the raw pixels and dimensions.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.width().to_le_bytes());
        hasher.update(self.height().to_le_bytes());
        hasher.update(self.image.as_raw());
        hex::encode(hasher.finalize())
    }
}

/// A renderable surface holding capturable regions.
pub trait Surface {
    /// Render the element identified by `target_id` into a snapshot.
    ///
    /// Fails with [`Error::TargetNotFound`] when no element carries the id,
    /// before any rendering work is done.
    fn capture(&self, target_id: &str, options: &CaptureOptions) -> Result<Snapshot>;
}

impl<S: Surface + ?Sized> Surface for &S {
    fn capture(&self, target_id: &str, options: &CaptureOptions) -> Result<Snapshot> {
        (**self).capture(target_id, options)
    }
}

impl<S: Surface + ?Sized> Surface for Box<S> {
    fn capture(&self, target_id: &str, options: &CaptureOptions) -> Result<Snapshot> {
        (**self).capture(target_id, options)
    }
}

/// Retry policy for the capture stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first failure (0 => no retry).
    pub retries: u32,
    /// Delay before the first retry; doubles on each further attempt.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 0,
            backoff: Duration::from_millis(100),
        }
    }
}

/// Capture with exponential backoff on transient rendering failures.
///
/// Only [`Error::CaptureFailed`] is retried; every other error is returned
/// immediately.
pub fn capture_with_retry<S: Surface + ?Sized>(
    surface: &S,
    target_id: &str,
    options: &CaptureOptions,
    policy: RetryPolicy,
) -> Result<Snapshot> {
    let mut attempt = 0u32;
    loop {
        match surface.capture(target_id, options) {
            Ok(snapshot) => return Ok(snapshot),
            Err(e) if e.is_retryable() && attempt < policy.retries => {
                let delay = policy.backoff.saturating_mul(1u32 << attempt.min(16));
                attempt += 1;
                log::warn!(
                    "capture of #{} failed ({}); retry {}/{} in {:?}",
                    target_id, e, attempt, policy.retries, delay
                );
                std::thread::sleep(delay);
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    impl Surface for Flaky {
        fn capture(&self, target_id: &str, options: &CaptureOptions) -> Result<Snapshot> {
            if target_id != "report" {
                return Err(Error::TargetNotFound(target_id.to_string()));
            }
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                return Err(Error::CaptureFailed("transient".into()));
            }
            let bg = options.background;
            Ok(Snapshot {
                image: RgbaImage::from_pixel(2, 2, image::Rgba([bg.0, bg.1, bg.2, 255])),
                css_width: 1,
                css_height: 1,
                pixel_ratio: 2.0,
            })
        }
    }

    fn policy(retries: u32) -> RetryPolicy {
        RetryPolicy { retries, backoff: Duration::from_millis(1) }
    }

    #[test]
    fn retry_recovers_from_transient_failures() {
        let s = Flaky { failures: 2, calls: AtomicU32::new(0) };
        let snap = capture_with_retry(&s, "report", &CaptureOptions::default(), policy(2)).unwrap();
        assert_eq!(snap.width(), 2);
        assert_eq!(s.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn retry_gives_up_after_budget() {
        let s = Flaky { failures: 5, calls: AtomicU32::new(0) };
        let err = capture_with_retry(&s, "report", &CaptureOptions::default(), policy(1)).unwrap_err();
        assert!(matches!(err, Error::CaptureFailed(_)));
        assert_eq!(s.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn missing_target_is_not_retried() {
        let s = Flaky { failures: 0, calls: AtomicU32::new(0) };
        let err = capture_with_retry(&s, "nope", &CaptureOptions::default(), policy(3)).unwrap_err();
        assert!(matches!(err, Error::TargetNotFound(_)));
    }

    #[test]
    fn data_url_and_digest() {
        let s = Flaky { failures: 0, calls: AtomicU32::new(0) };
        let snap = s.capture("report", &CaptureOptions::default()).unwrap();
        assert!(snap.to_data_url().unwrap().starts_with("data:image/png;base64,iVBOR"));
        assert_eq!(snap.digest(), snap.clone().digest());
        assert_eq!(snap.digest().len(), 64);
    }

    #[test]
    fn options_from_config_rejects_bad_background() {
        let cfg = ExportConfig { background: "not-a-colour".into(), ..Default::default() };
        assert!(matches!(CaptureOptions::from_config(&cfg), Err(Error::ConfigError(_))));
        let ok = CaptureOptions::from_config(&ExportConfig::default()).unwrap();
        assert_eq!(ok, CaptureOptions::default());
    }
}
