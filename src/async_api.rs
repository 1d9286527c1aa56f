use crate::capture::Surface;
use crate::deliver::DownloadSink;
use crate::export::{ExportReport, Exporter};
use crate::{Error, Result};
use std::sync::mpsc::{self, Sender};
use std::thread;
use tokio::sync::oneshot;

enum Command {
    ExportImage(String, String, oneshot::Sender<Result<ExportReport>>),
    ExportPdf(String, String, oneshot::Sender<Result<ExportReport>>),
    Close(oneshot::Sender<Result<()>>),
}

/// An async-friendly export trigger backed by a dedicated worker thread.
///
/// The worker thread owns the `Exporter` and runs exports in arrival order, so
/// callers on an async runtime never block on rasterization or encoding. Each
/// trigger resolves once the artifact has been handed to the sink, or with the
/// error that stopped the pipeline.
#[derive(Clone)]
pub struct ExportService {
    cmd_tx: Sender<Command>,
}

impl ExportService {
    /// Spawn the worker thread that owns `exporter`.
    pub fn spawn<S, D>(exporter: Exporter<S, D>) -> Self
    where
        S: Surface + Send + 'static,
        D: DownloadSink + 'static,
    {
        let (cmd_tx, cmd_rx) = mpsc::channel::<Command>();

        thread::spawn(move || {
            while let Ok(cmd) = cmd_rx.recv() {
                match cmd {
                    Command::ExportImage(target, filename, resp) => {
                        let res = exporter.export_image(&target, &filename);
                        let _ = resp.send(res);
                    }
                    Command::ExportPdf(target, filename, resp) => {
                        let res = exporter.export_pdf(&target, &filename);
                        let _ = resp.send(res);
                    }
                    Command::Close(resp) => {
                        let _ = resp.send(Ok(()));
                        break;
                    }
                }
            }
            log::debug!("export worker stopped");
        });

        Self { cmd_tx }
    }

    /// Export `target_id` as a PNG named `filename`.
    pub async fn export_image(&self, target_id: &str, filename: &str) -> Result<ExportReport> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::ExportImage(target_id.to_string(), filename.to_string(), tx))
            .map_err(|_| Error::Other("Export worker is not running".into()))?;
        rx.await
            .map_err(|e| Error::Other(format!("Image export canceled: {}", e)))?
    }

    /// Export `target_id` as a paginated PDF named `filename`.
    pub async fn export_pdf(&self, target_id: &str, filename: &str) -> Result<ExportReport> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::ExportPdf(target_id.to_string(), filename.to_string(), tx))
            .map_err(|_| Error::Other("Export worker is not running".into()))?;
        rx.await
            .map_err(|e| Error::Other(format!("PDF export canceled: {}", e)))?
    }

    /// Stop the worker after requests already queued.
    pub async fn close(self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Close(tx))
            .map_err(|_| Error::Other("Export worker is not running".into()))?;
        rx.await
            .map_err(|e| Error::Other(format!("Close canceled: {}", e)))?
    }
}
