//! Delivery stage: hand a finished artifact to a download mechanism.

use crate::{Error, Result};
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

static PART_SEQ: AtomicU64 = AtomicU64::new(0);

/// Format of an exported artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Png,
    Pdf,
}

impl ArtifactKind {
    pub fn content_type(&self) -> &'static str {
        match self {
            ArtifactKind::Png => "image/png",
            ArtifactKind::Pdf => "application/pdf",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactKind::Png => "png",
            ArtifactKind::Pdf => "pdf",
        }
    }
}

/// A finished export, ready for download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub bytes: Vec<u8>,
}

impl Artifact {
    pub fn png(bytes: Vec<u8>) -> Self {
        Self { kind: ArtifactKind::Png, bytes }
    }

    pub fn pdf(bytes: Vec<u8>) -> Self {
        Self { kind: ArtifactKind::Pdf, bytes }
    }

    pub fn content_type(&self) -> &'static str {
        self.kind.content_type()
    }

    pub fn to_data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.content_type(),
            base64::engine::general_purpose::STANDARD.encode(&self.bytes)
        )
    }
}

/// Receives artifacts under a caller-supplied filename.
pub trait DownloadSink: Send + Sync {
    fn deliver(&self, filename: &str, artifact: &Artifact) -> Result<()>;
}

impl<D: DownloadSink + ?Sized> DownloadSink for std::sync::Arc<D> {
    fn deliver(&self, filename: &str, artifact: &Artifact) -> Result<()> {
        (**self).deliver(filename, artifact)
    }
}

/// What to do when the target file already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CollisionPolicy {
    /// Pick `name (1).ext`, `name (2).ext`, ... like a browser download manager.
    #[default]
    Uniquify,
    Overwrite,
}

/// Saves artifacts into a directory.
///
/// Data is written to a hidden `.part` file first and renamed into place, so
/// a failed export never leaves a partial file under the requested name.
/// Under [`CollisionPolicy::Uniquify`] the final name is claimed with an
/// exclusive create before the rename, so several sinks (or processes) sharing
/// a directory never replace each other's files.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
    collision: CollisionPolicy,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            collision: CollisionPolicy::default(),
        }
    }

    pub fn with_collision_policy(mut self, collision: CollisionPolicy) -> Self {
        self.collision = collision;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn validate_filename(filename: &str) -> Result<()> {
        if filename.trim().is_empty() {
            return Err(Error::DeliveryError("empty filename".into()));
        }
        if filename.contains(['/', '\\']) || filename == "." || filename == ".." {
            return Err(Error::DeliveryError(format!("filename {:?} is not a plain file name", filename)));
        }
        Ok(())
    }

    /// `filename`, then `stem (1).ext`, `stem (2).ext`, ...
    fn candidates<'a>(&'a self, filename: &'a str) -> impl Iterator<Item = PathBuf> + 'a {
        let (stem, ext) = match filename.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
            _ => (filename, None),
        };
        std::iter::once(self.dir.join(filename)).chain((1u32..).map(move |n| match ext {
            Some(ext) => self.dir.join(format!("{} ({}).{}", stem, n, ext)),
            None => self.dir.join(format!("{} ({})", stem, n)),
        }))
    }

    /// Final path `filename` would get right now under the collision policy.
    pub fn resolve_path(&self, filename: &str) -> PathBuf {
        if self.collision == CollisionPolicy::Overwrite {
            return self.dir.join(filename);
        }
        self.candidates(filename)
            .find(|p| !p.exists())
            .unwrap_or_else(|| self.dir.join(filename))
    }

    /// Atomically create an empty file at the first free candidate name.
    fn claim(&self, filename: &str) -> std::io::Result<PathBuf> {
        for path in self.candidates(filename) {
            match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => return Ok(path),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e),
            }
        }
        Err(std::io::Error::new(std::io::ErrorKind::AlreadyExists, "no free file name"))
    }

    /// Deliver and return the path actually written.
    pub fn save(&self, filename: &str, artifact: &Artifact) -> Result<PathBuf> {
        Self::validate_filename(filename)?;
        fs::create_dir_all(&self.dir)?;
        let part = self.dir.join(format!(
            ".{}.{}-{}.part",
            filename,
            std::process::id(),
            PART_SEQ.fetch_add(1, Ordering::Relaxed)
        ));

        let mut claimed = None;
        let written = (|| -> std::io::Result<PathBuf> {
            {
                let mut f = fs::File::create(&part)?;
                f.write_all(&artifact.bytes)?;
                f.sync_all()?;
            }
            let target = match self.collision {
                CollisionPolicy::Overwrite => self.dir.join(filename),
                CollisionPolicy::Uniquify => {
                    let path = self.claim(filename)?;
                    claimed = Some(path.clone());
                    path
                }
            };
            fs::rename(&part, &target)?;
            Ok(target)
        })();
        let target = match written {
            Ok(target) => target,
            Err(e) => {
                let _ = fs::remove_file(&part);
                if let Some(path) = claimed {
                    let _ = fs::remove_file(path);
                }
                return Err(Error::DeliveryError(format!("writing {}: {}", filename, e)));
            }
        };
        log::debug!(
            "saved {} ({}, {} bytes)",
            target.display(),
            artifact.content_type(),
            artifact.bytes.len()
        );
        Ok(target)
    }
}

impl DownloadSink for DirectorySink {
    fn deliver(&self, filename: &str, artifact: &Artifact) -> Result<()> {
        self.save(filename, artifact).map(|_| ())
    }
}

/// One recorded delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Keeps deliveries in memory; useful when embedding the pipeline.
#[derive(Debug, Default)]
pub struct MemorySink {
    deliveries: Mutex<Vec<Delivery>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().map(|d| d.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.deliveries.lock().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DownloadSink for MemorySink {
    fn deliver(&self, filename: &str, artifact: &Artifact) -> Result<()> {
        let mut guard = self
            .deliveries
            .lock()
            .map_err(|_| Error::DeliveryError("memory sink poisoned".into()))?;
        guard.push(Delivery {
            filename: filename.to_string(),
            content_type: artifact.content_type().to_string(),
            bytes: artifact.bytes.clone(),
        });
        Ok(())
    }
}
