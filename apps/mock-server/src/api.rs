//! REST API endpoints for the mock render backend
//! Upload, generate, status and video download routes
use axum::{
    extract::{multipart::MultipartError, rejection::JsonRejection, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use media_pipeline::{GeneratedVideo, GenerationRequest, SessionStatus, UploadReceipt, VideoFormat};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::storage::{BeginError, SessionStore};

const ALLOWED_EXTENSIONS: [&str; 2] = ["mp3", "wav"];

pub struct AppState {
    pub store: SessionStore,
    /// Simulated render time
    pub render_delay: Duration,
}

impl AppState {
    pub fn new(render_delay: Duration) -> Self {
        Self {
            store: SessionStore::new(),
            render_delay,
        }
    }
}

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Rejected(StatusCode, String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Rejected(status, msg) => (status, msg),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::Rejected(err.status(), err.body_text())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(err: JsonRejection) -> Self {
        ApiError::Rejected(err.status(), err.body_text())
    }
}

/// POST /upload - Accept an audio file in the `file` multipart field
pub async fn upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadReceipt>, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        if filename.is_empty() {
            return Err(ApiError::BadRequest("No selected file".to_string()));
        }

        let extension = std::path::Path::new(&filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
            warn!("Rejected upload of {}", filename);
            return Err(ApiError::BadRequest(
                "Invalid file type. Only MP3 and WAV files are allowed.".to_string(),
            ));
        }

        let data = field.bytes().await?;
        let session_id = state.store.create_session(&filename, data.len());
        info!(
            "Stored {} ({} bytes) as session {} ({} sessions)",
            filename,
            data.len(),
            session_id,
            state.store.session_count()
        );

        return Ok(Json(UploadReceipt {
            message: "File uploaded successfully".to_string(),
            session_id: Some(session_id),
        }));
    }

    Err(ApiError::BadRequest("No file part".to_string()))
}

#[derive(Debug, Deserialize)]
pub struct GenerateBody {
    pub session_id: Option<String>,
    #[serde(default)]
    pub format: VideoFormat,
    #[serde(default = "default_slider")]
    pub brightness: u8,
    #[serde(default = "default_slider")]
    pub contrast: u8,
}

fn default_slider() -> u8 {
    media_pipeline::selection::SLIDER_DEFAULT
}

/// POST /generate - Render a placeholder video for an uploaded session
pub async fn generate(
    State(state): State<Arc<AppState>>,
    body: Result<Json<GenerateBody>, JsonRejection>,
) -> Result<Json<GeneratedVideo>, ApiError> {
    let Json(body) = body?;
    let request = GenerationRequest::new(body.format, body.brightness, body.contrast)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let session_id = body
        .session_id
        .ok_or_else(|| ApiError::BadRequest("Missing session_id parameter".to_string()))?;
    let session = state
        .store
        .begin_processing(&session_id)
        .map_err(|e| match e {
            BeginError::UnknownSession => {
                ApiError::NotFound("Invalid session ID or session expired".to_string())
            }
            BeginError::AlreadyProcessed => {
                ApiError::BadRequest("This session has already been processed".to_string())
            }
        })?;
    debug!(
        "Rendering {} video for session {} (brightness {}, contrast {})",
        request.format, session_id, request.brightness, request.contrast
    );
    tokio::time::sleep(state.render_delay).await;

    let video_name = format!("video_{}.mp4", session_id);
    let placeholder = format!(
        "placeholder {} video for {} ({} audio bytes)",
        request.format, session.original_filename, session.audio_bytes
    );
    state
        .store
        .complete(&session_id, &video_name, placeholder.into_bytes());
    info!("Session {} rendered as {}", session_id, video_name);

    Ok(Json(GeneratedVideo {
        video_url: format!("/video/{}", video_name),
        download_url: Some(format!("/download/{}", video_name)),
        description: Some("A cherry blossom video generated from your music".to_string()),
    }))
}

/// GET /status/:id - Session status
pub async fn status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionStatus>, ApiError> {
    state
        .store
        .get_session(&id)
        .map(|s| Json(s.status()))
        .ok_or_else(|| ApiError::NotFound("Invalid session ID".to_string()))
}

/// GET /video/:name - Stream a rendered video inline
pub async fn video(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let data = find_video(&state, &name)?;
    Ok(([(header::CONTENT_TYPE, "video/mp4")], data).into_response())
}

/// GET /download/:name - Rendered video as an attachment
pub async fn download(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let data = find_video(&state, &name)?;
    let disposition = format!("attachment; filename=\"{}\"", name);
    Ok((
        [
            (header::CONTENT_TYPE, "video/mp4".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        data,
    )
        .into_response())
}

fn find_video(state: &AppState, name: &str) -> Result<Vec<u8>, ApiError> {
    state
        .store
        .get_video(name)
        .ok_or_else(|| ApiError::NotFound(format!("Video {} not found", name)))
}
