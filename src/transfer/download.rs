use super::{cancellable, ensure_active, Direction, Result, TransferDescriptor, TransferEngine, TransferError};
use crate::client::ClientError;
use crate::events::{EventSender, Level, Progress};
use reqwest::header::{HeaderMap, CONTENT_DISPOSITION};
use reqwest::Response;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A downloaded artifact. The caller owns `path` and its parent directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedArtifact {
    pub path: PathBuf,
    pub bytes: u64,
    pub total_bytes: Option<u64>,
    pub datatype_id: Option<String>,
}

impl TransferEngine {
    /// Fetch the job detail (for its data type), then stream the artifact
    pub async fn download_job(
        &self,
        job_id: &str,
        events: &EventSender,
        cancel: &CancellationToken,
    ) -> Result<DownloadedArtifact> {
        events.info(format!("Preparing to download job {job_id}..."));
        ensure_active(cancel)?;

        events.info(format!("Fetching job details for {job_id}..."));
        let detail = async {
            let token = self.auth.bearer().await?;
            Ok::<_, TransferError>(self.api.job_detail(&token, job_id).await?)
        };
        let detail = cancellable(cancel, detail).await.and_then(|r| r);
        let datatype_id = match detail {
            Ok(detail) => detail.datatype_id(),
            Err(e) => {
                let mut descriptor = TransferDescriptor::new(Direction::Download, job_id);
                let result: Result<DownloadedArtifact> = Err(e);
                self.finish(&mut descriptor, &result, events);
                return result;
            }
        };

        let mut artifact = self.download(job_id, events, cancel).await?;
        artifact.datatype_id = datatype_id;
        Ok(artifact)
    }

    /// Stream the artifact of `job_id` into a fresh temporary directory
    pub async fn download(
        &self,
        job_id: &str,
        events: &EventSender,
        cancel: &CancellationToken,
    ) -> Result<DownloadedArtifact> {
        let url = self.api.url(&self.api.endpoints().retrieve, Some(job_id));
        let mut descriptor = TransferDescriptor::new(Direction::Download, url);

        let result = self.download_inner(job_id, &mut descriptor, events, cancel).await;
        self.finish(&mut descriptor, &result, events);
        result
    }

    async fn download_inner(
        &self,
        job_id: &str,
        descriptor: &mut TransferDescriptor,
        events: &EventSender,
        cancel: &CancellationToken,
    ) -> Result<DownloadedArtifact> {
        events.info(format!("Starting download for job {job_id}..."));
        ensure_active(cancel)?;

        let request = async {
            let token = self.auth.bearer().await?;
            let response = self.api.retrieve(&token, job_id).await;
            if matches!(response, Err(ClientError::Unauthorized)) {
                self.auth.invalidate();
            }
            Ok::<_, TransferError>(response?)
        };
        let mut response = cancellable(cancel, request).await??;

        descriptor.total_bytes = response.content_length().filter(|n| *n > 0);
        let filename = filename_from_disposition(response.headers())
            .unwrap_or_else(|| format!("{}.zip", safe_component(job_id)));

        tokio::fs::create_dir_all(&self.settings.temp_root).await?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("{}{}_", self.settings.temp_dir_prefix, safe_component(job_id)))
            .tempdir_in(&self.settings.temp_root)?;
        descriptor.local_path = dir.path().join(&filename);
        descriptor.state = super::TransferState::InProgress;

        debug!(
            transfer_id = %descriptor.id,
            job_id,
            path = %descriptor.local_path.display(),
            total_bytes = ?descriptor.total_bytes,
            "Streaming artifact"
        );

        match descriptor.banded_percent() {
            Some(percent) => events.percent(percent),
            None => events.progress(Progress::Indeterminate),
        }

        match self.stream_to_file(&mut response, descriptor, events, cancel).await {
            Ok(()) => {
                let path = descriptor.local_path.clone();
                // Ownership of the directory passes to the caller
                let _ = dir.keep();

                if descriptor.total_bytes.is_some() {
                    events.percent(100);
                }
                events.status(format!("Download completed for job {job_id}!"), Level::Success);

                Ok(DownloadedArtifact {
                    path,
                    bytes: descriptor.transferred_bytes,
                    total_bytes: descriptor.total_bytes,
                    datatype_id: None,
                })
            }
            Err(e) => {
                drop(response);
                discard_partial(dir, &descriptor.local_path).await;
                Err(e)
            }
        }
    }

    async fn stream_to_file(
        &self,
        response: &mut Response,
        descriptor: &mut TransferDescriptor,
        events: &EventSender,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut file = tokio::fs::File::create(&descriptor.local_path).await?;
        let mut last_percent = descriptor.banded_percent();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TransferError::Cancelled),
                chunk = response.chunk() => chunk?,
            };
            let Some(bytes) = next else { break };

            for piece in bytes.chunks(self.settings.chunk_size) {
                file.write_all(piece).await?;
                descriptor.record(piece.len() as u64);

                let percent = descriptor.banded_percent();
                if percent.is_some() && percent != last_percent {
                    events.progress(Progress::Percent(percent.unwrap_or_default()));
                    last_percent = percent;
                }
            }
            self.metrics.bytes_downloaded(bytes.len() as u64);
        }

        file.flush().await?;

        if let Some(total) = descriptor.total_bytes {
            if descriptor.transferred_bytes != total {
                return Err(TransferError::Network(format!(
                    "download incomplete: received {} of {} bytes",
                    descriptor.transferred_bytes, total
                )));
            }
        }

        Ok(())
    }
}

/// Remove a partially written artifact and its directory. Failures are logged
/// and never replace the error that caused the cleanup.
async fn discard_partial(dir: TempDir, file: &Path) {
    if let Err(e) = tokio::fs::remove_file(file).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %file.display(), error = %e, "Failed to remove partial artifact");
        }
    }

    let dir_path = dir.path().to_path_buf();
    match dir.close() {
        Ok(()) => info!(path = %dir_path.display(), "Removed partial download"),
        Err(e) => warn!(path = %dir_path.display(), error = %e, "Failed to remove download directory"),
    }
}

/// Filename carried by `Content-Disposition`, reduced to its final path component
pub fn filename_from_disposition(headers: &HeaderMap) -> Option<String> {
    let disposition = headers.get(CONTENT_DISPOSITION)?.to_str().ok()?;
    let (_, raw) = disposition.split_once("filename=")?;
    let raw = raw.trim_start();
    let name = match raw.strip_prefix('"') {
        Some(quoted) => quoted.split('"').next()?,
        None => raw.split(';').next()?.trim(),
    };

    let name = name.replace('\\', "/");
    let component = Path::new(&name).file_name()?.to_str()?.trim().to_string();
    (!component.is_empty()).then_some(component)
}

/// Job ids end up in paths; keep them to a single safe component
fn safe_component(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
        .collect()
}
