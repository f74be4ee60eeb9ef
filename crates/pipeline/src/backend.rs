//! Render backend abstraction
//!
//! The backend stores uploads and renders videos. The client only talks to it
//! through this trait, so controllers can be driven by the HTTP implementation
//! or by a scripted fake.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, StatusCode};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::selection::GenerationRequest;
use crate::transfer::{AudioFile, ProgressSink};

/// Size of each upload body chunk; progress is reported per chunk
pub const UPLOAD_CHUNK_BYTES: usize = 64 * 1024;

pub const UPLOAD_FAILED: &str = "Upload failed";
pub const GENERATION_FAILED: &str = "generation failed";

/// Successful upload response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadReceipt {
    /// Human-readable message
    #[serde(default)]
    pub message: String,

    /// Backend session created for the upload, when the backend tracks one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Successful generation response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedVideo {
    #[serde(rename = "videoUrl", alias = "video_url")]
    pub video_url: String,

    #[serde(
        default,
        rename = "downloadUrl",
        alias = "download_url",
        skip_serializing_if = "Option::is_none"
    )]
    pub download_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Structured error payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Backend view of an upload session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStatus {
    /// uploaded, processing, completed or error
    pub status: String,
    pub timestamp: f64,
    pub filename: String,
}

#[async_trait]
pub trait RenderBackend: Send + Sync {
    /// Backend name
    fn name(&self) -> &str;

    /// Upload an audio file, reporting bytes handed to the transport
    async fn upload(&self, file: AudioFile, progress: ProgressSink) -> Result<UploadReceipt>;

    /// Request a video render
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedVideo>;

    /// Look up an upload session
    async fn session_status(&self, session_id: &str) -> Result<SessionStatus> {
        Err(PipelineError::TransportFailure(format!(
            "{} does not report session status (session {})",
            self.name(),
            session_id
        )))
    }

    /// Download a rendered video to `dest`, returning the bytes written.
    /// `on_progress` receives (bytes written, total bytes if known).
    async fn download(
        &self,
        url: &str,
        dest: &Path,
        on_progress: &(dyn Fn(u64, Option<u64>) + Send + Sync),
    ) -> Result<u64> {
        let _ = (dest, on_progress);
        Err(PipelineError::TransportFailure(format!(
            "{} does not support downloads ({})",
            self.name(),
            url
        )))
    }
}

/// Backend reached over HTTP
pub struct HttpBackend {
    config: PipelineConfig,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        // Fail early on a bad base URL rather than on first request
        config.base_url()?;

        let mut builder = reqwest::Client::builder().user_agent(config.user_agent.clone());
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            config,
            client: builder.build()?,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    async fn read_body(response: reqwest::Response, fallback: &str) -> Result<String> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(rejection(status, &body, fallback));
        }
        Ok(body)
    }
}

/// Map a non-2xx response to `ServerRejected`, preferring the backend's message
fn rejection(status: StatusCode, body: &str, fallback: &str) -> PipelineError {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(payload) if !payload.error.trim().is_empty() => {
            warn!("backend rejected request ({}): {}", status, payload.error);
            PipelineError::ServerRejected(payload.error)
        }
        _ => {
            warn!("backend rejected request ({}) without an error payload", status);
            PipelineError::ServerRejected(fallback.to_string())
        }
    }
}

#[async_trait]
impl RenderBackend for HttpBackend {
    fn name(&self) -> &str {
        "http"
    }

    async fn upload(&self, file: AudioFile, progress: ProgressSink) -> Result<UploadReceipt> {
        let url = self.config.upload_url()?;
        let total = file.len();
        let data = file.shared_data();

        let sink = progress.clone();
        let len = data.len();
        let chunks = futures::stream::iter((0..len).step_by(UPLOAD_CHUNK_BYTES)).map(move |start| {
            let end = (start + UPLOAD_CHUNK_BYTES).min(len);
            let chunk = data[start..end].to_vec();
            sink.report(end as u64);
            Ok::<_, std::io::Error>(chunk)
        });

        let part = Part::stream_with_length(Body::wrap_stream(chunks), total)
            .file_name(file.name().to_string())
            .mime_str(file.content_type())?;
        let form = Form::new().part(self.config.upload_field.clone(), part);

        info!("Uploading {} ({} bytes) to {}", file.name(), total, url);
        let response = self.client.post(url).multipart(form).send().await?;
        let body = Self::read_body(response, UPLOAD_FAILED).await?;

        let receipt: UploadReceipt = serde_json::from_str(&body)?;
        debug!("upload accepted: {:?}", receipt);
        Ok(receipt)
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedVideo> {
        let url = self.config.generate_url()?;
        debug!("POST {} {:?}", url, request);

        let response = self.client.post(url).json(request).send().await?;
        let body = Self::read_body(response, GENERATION_FAILED).await?;

        let video: GeneratedVideo = serde_json::from_str(&body)?;
        if video.video_url.trim().is_empty() {
            return Err(PipelineError::TransportFailure(
                "response did not contain a video url".to_string(),
            ));
        }
        Ok(video)
    }

    async fn session_status(&self, session_id: &str) -> Result<SessionStatus> {
        let url = self.config.status_url(session_id)?;
        let response = self.client.get(url).send().await?;
        let body = Self::read_body(response, "status lookup failed").await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn download(
        &self,
        url: &str,
        dest: &Path,
        on_progress: &(dyn Fn(u64, Option<u64>) + Send + Sync),
    ) -> Result<u64> {
        let url = self.config.resolve(url)?;
        info!("Downloading {} to {}", url, dest.display());

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(rejection(status, &body, "download failed"));
        }

        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Written under a sibling name and renamed once complete
        let partial = partial_path(dest);
        match write_body(response, &partial, on_progress).await {
            Ok(written) => {
                tokio::fs::rename(&partial, dest).await?;
                Ok(written)
            }
            Err(e) => {
                warn!("Download of {} failed: {}", dest.display(), e);
                if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
                    debug!("Could not remove {}: {}", partial.display(), cleanup);
                }
                Err(e)
            }
        }
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

async fn write_body(
    response: reqwest::Response,
    path: &Path,
    on_progress: &(dyn Fn(u64, Option<u64>) + Send + Sync),
) -> Result<u64> {
    let total = response.content_length();
    let mut file = tokio::fs::File::create(path).await?;
    let mut written = 0u64;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
        on_progress(written, total);
    }
    file.flush().await?;
    Ok(written)
}
