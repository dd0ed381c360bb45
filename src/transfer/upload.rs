use super::{cancellable, ensure_active, Direction, Result, TransferDescriptor, TransferEngine, TransferError};
use crate::client::models::error_detail;
use crate::events::{EventSender, Level};
use crate::humanize::ByteSize;
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Response, StatusCode};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// A file to submit for processing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub path: PathBuf,
    pub datatype_id: String,
    pub image_type: String,
}

impl UploadRequest {
    pub fn new(path: impl Into<PathBuf>, datatype_id: impl Into<String>, image_type: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            datatype_id: datatype_id.into(),
            image_type: image_type.into(),
        }
    }

    fn filename(&self) -> String {
        self.path
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string)
            .unwrap_or_else(|| "upload.tif".to_string())
    }
}

/// The processed image returned by the server, persisted locally
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedArtifact {
    pub path: PathBuf,
    pub datatype_id: String,
    pub bytes: u64,
}

impl TransferEngine {
    /// Submit a file and persist the processed image from the response.
    ///
    /// Progress is reported as milestones only: the server gives no feedback
    /// while it reads the body or runs inference.
    pub async fn upload(
        &self,
        request: &UploadRequest,
        events: &EventSender,
        cancel: &CancellationToken,
    ) -> Result<UploadedArtifact> {
        let url = self.api.url(&self.api.endpoints().jobs_create_from_file, None);
        let mut descriptor = TransferDescriptor::new(Direction::Upload, url);
        descriptor.local_path = request.path.clone();

        let result = self.upload_inner(request, &mut descriptor, events, cancel).await;
        self.finish(&mut descriptor, &result, events);
        result
    }

    async fn upload_inner(
        &self,
        request: &UploadRequest,
        descriptor: &mut TransferDescriptor,
        events: &EventSender,
        cancel: &CancellationToken,
    ) -> Result<UploadedArtifact> {
        let filename = request.filename();
        events.percent(5);
        events.info(format!("Preparing to upload {filename}..."));
        ensure_active(cancel)?;

        let size = tokio::fs::metadata(&request.path).await?.len();
        let size = ByteSize(size);
        descriptor.total_bytes = Some(size.as_u64());
        events.info(format!("File size: {:.1} MB", size.as_mib()));

        let limit = self.settings.max_upload_bytes;
        if size > limit {
            return Err(TransferError::TooLarge { size, limit });
        }

        let token = cancellable(cancel, self.auth.bearer()).await??;
        events.percent(10);
        ensure_active(cancel)?;

        events.percent(15);
        events.info(format!("Uploading {filename} to server..."));
        descriptor.state = super::TransferState::InProgress;

        let file = tokio::fs::File::open(&request.path).await?;
        let stream = ReaderStream::with_capacity(file, self.settings.chunk_size);
        let part = Part::stream_with_length(Body::wrap_stream(stream), size.as_u64())
            .file_name(filename.clone())
            .mime_str("image/tiff")?;
        let form = Form::new().part("file", part);

        events.percent(20);
        events.info("Upload and inference in progress (this may take several minutes)...");
        debug!(
            transfer_id = %descriptor.id,
            datatype_id = %request.datatype_id,
            image_type = %request.image_type,
            bytes = size.as_u64(),
            "Sending multipart body"
        );

        // The request is not raced against cancellation: the server starts
        // inference as soon as the body arrives.
        let response = self
            .api
            .create_from_file(
                &token,
                form,
                &request.datatype_id,
                &request.image_type,
                self.settings.upload_timeout,
            )
            .await?;
        descriptor.transferred_bytes = size.as_u64();

        events.percent(70);
        events.info("Inference completed, processing response...");
        ensure_active(cancel)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            self.auth.invalidate();
            return Err(TransferError::AuthExpired);
        }

        let suffix = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(image_suffix);

        match suffix {
            Some(suffix) if status.is_success() => {
                events.percent(85);
                events.info("Saving result file...");

                let (path, bytes) = self.persist_response(response, &suffix, cancel).await?;
                info!(path = %path.display(), bytes, "Saved inference result");

                events.percent(100);
                events.status("Inference completed successfully!", Level::Success);
                Ok(UploadedArtifact {
                    path,
                    datatype_id: request.datatype_id.clone(),
                    bytes,
                })
            }
            _ => Err(server_error(response).await),
        }
    }

    /// Stream the response body to a named file under the temp root
    async fn persist_response(
        &self,
        mut response: Response,
        suffix: &str,
        cancel: &CancellationToken,
    ) -> Result<(PathBuf, u64)> {
        tokio::fs::create_dir_all(&self.settings.temp_root).await?;
        let named = tempfile::Builder::new()
            .prefix(&self.settings.temp_dir_prefix)
            .suffix(suffix)
            .tempfile_in(&self.settings.temp_root)?;

        // The temp path deletes the file when dropped, which covers every error below
        let (file, temp_path) = named.into_parts();
        let mut file = tokio::fs::File::from_std(file);
        let mut written = 0u64;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TransferError::Cancelled),
                chunk = response.chunk() => chunk?,
            };
            let Some(bytes) = next else { break };

            for piece in bytes.chunks(self.settings.chunk_size) {
                file.write_all(piece).await?;
            }
            written += bytes.len() as u64;
        }
        file.flush().await?;
        drop(file);

        let path = temp_path.keep().map_err(|e| e.error)?;
        Ok((path, written))
    }
}

async fn server_error(response: Response) -> TransferError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = error_detail(&body)
        .or_else(|| status.canonical_reason().map(str::to_string))
        .unwrap_or_else(|| "Unknown error".to_string());

    TransferError::Server {
        status_code: status.as_u16(),
        message,
    }
}

/// File suffix for an `image/*` content type, `None` for anything else
fn image_suffix(content_type: &str) -> Option<String> {
    let mime: mime::Mime = content_type.parse().ok()?;
    if mime.type_() != mime::IMAGE {
        return None;
    }

    match mime.subtype().as_str() {
        "tiff" | "tif" => Some(".tif".to_string()),
        other => Some(format!(".{other}")),
    }
}
