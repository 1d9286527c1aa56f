//! HTML report surface: layout, paint and raster stages
//!
//! [`HtmlSurface`] holds a report document and renders any element carrying
//! an `id` attribute into a [`Snapshot`]. The document is parsed fresh for
//! every capture and never mutated.

pub mod layout;
pub mod paint;
pub mod raster;

use crate::capture::{CaptureOptions, Snapshot, Surface};
use crate::{Error, Result};
use layout::{layout_element, LayoutOptions};
use scraper::{ElementRef, Html};
use std::path::Path;

/// A report document rendered through the block layout pipeline.
#[derive(Debug, Clone)]
pub struct HtmlSurface {
    html: String,
}

impl HtmlSurface {
    pub fn from_html(html: impl Into<String>) -> Self {
        Self { html: html.into() }
    }

    /// Read a report document from disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let html = std::fs::read_to_string(path.as_ref())?;
        Ok(Self::from_html(html))
    }

    /// Fetch a report document over HTTP.
    #[cfg(feature = "fetch")]
    pub fn fetch(url: &str, timeout: std::time::Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Other(format!("Failed to build HTTP client: {}", e)))?;
        let resp = client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::Other(format!("Failed to fetch {}: {}", url, e)))?;
        let body = resp
            .text()
            .map_err(|e| Error::Other(format!("Failed to read response body: {}", e)))?;
        Ok(Self::from_html(body))
    }

    pub fn html(&self) -> &str {
        &self.html
    }

    /// Ids of every element that can be captured, in document order.
    pub fn capturable_ids(&self) -> Vec<String> {
        let document = Html::parse_document(&self.html);
        document
            .root_element()
            .descendants()
            .filter_map(ElementRef::wrap)
            .filter_map(|e| e.value().id().map(str::to_string))
            .collect()
    }
}

fn find_by_id<'a>(document: &'a Html, id: &str) -> Option<ElementRef<'a>> {
    document
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .find(|e| e.value().id() == Some(id))
}

impl Surface for HtmlSurface {
    fn capture(&self, target_id: &str, options: &CaptureOptions) -> Result<Snapshot> {
        let document = Html::parse_document(&self.html);
        let target = find_by_id(&document, target_id)
            .ok_or_else(|| Error::TargetNotFound(target_id.to_string()))?;

        let tree = layout_element(
            target,
            &LayoutOptions {
                width: options.width,
                neutralize_transforms: options.neutralize_transforms,
            },
        );
        let css_height = if options.full_height {
            tree.scroll_height
        } else {
            tree.scroll_height.min(options.viewport_height)
        };
        log::debug!(
            "laid out #{}: {} boxes, {}x{} css px (scroll height {})",
            target_id,
            tree.nodes.len(),
            tree.width,
            css_height,
            tree.scroll_height
        );

        let commands = paint::paint_layout(&tree);
        let image = raster::rasterize(
            &commands,
            tree.width,
            css_height,
            options.pixel_ratio,
            options.background,
        )?;
        Ok(Snapshot {
            image,
            css_width: tree.width,
            css_height,
            pixel_ratio: options.pixel_ratio,
        })
    }
}
