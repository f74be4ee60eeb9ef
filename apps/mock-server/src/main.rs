//! Mock render backend
//! Development server implementing the upload, generate, status and download API

mod api;
mod storage;

use api::AppState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use media_pipeline::config::DEFAULT_MAX_UPLOAD_BYTES;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Headroom for multipart framing on top of the file size cap
const MULTIPART_OVERHEAD: usize = 64 * 1024;

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/upload", post(api::upload))
        .route("/generate", post(api::generate))
        .route("/status/:id", get(api::status))
        .route("/video/:name", get(api::video))
        .route("/download/:name", get(api::download))
        .layer(DefaultBodyLimit::max(
            DEFAULT_MAX_UPLOAD_BYTES as usize + MULTIPART_OVERHEAD,
        ))
        // CORS for local development
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("mock_server=debug,media_pipeline=debug")),
        )
        .init();

    let addr = std::env::var("BLOSSOM_MOCK_ADDR").unwrap_or_else(|_| "127.0.0.1:5000".to_string());
    let render_delay = std::env::var("BLOSSOM_MOCK_RENDER_MS")
        .ok()
        .and_then(|ms| ms.parse().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(2));

    info!("Starting mock render backend (render delay {:?})...", render_delay);
    let app = router(Arc::new(AppState::new(render_delay)));

    info!("Mock backend listening on http://{}", addr);
    info!("API endpoints:");
    info!("  POST /upload           - Upload audio (multipart field 'file')");
    info!("  POST /generate         - Render a video for a session");
    info!("  GET  /status/:id       - Session status");
    info!("  GET  /video/:name      - Stream rendered video");
    info!("  GET  /download/:name   - Download rendered video");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    const BOUNDARY: &str = "blossom-test-boundary";

    fn test_app() -> (Arc<AppState>, Router) {
        let state = Arc::new(AppState::new(Duration::ZERO));
        (state.clone(), router(state))
    }

    fn multipart_request(filename: &str, data: &[u8]) -> Request<Body> {
        let mut body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{f}\"\r\nContent-Type: audio/mpeg\r\n\r\n",
            b = BOUNDARY,
            f = filename
        )
        .into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

        Request::post("/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn json_request(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn read_json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_upload_generate_status_download() {
        let (state, app) = test_app();

        let response = app
            .clone()
            .oneshot(multipart_request("song.mp3", &[3u8; 4096]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let receipt = read_json(response).await;
        let session_id = receipt["session_id"].as_str().unwrap().to_string();
        assert_eq!(state.store.session_count(), 1);

        let response = app
            .clone()
            .oneshot(json_request(
                "/generate",
                json!({ "format": "vertical", "brightness": 70, "contrast": 40, "session_id": session_id }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let video = read_json(response).await;
        let download_url = video["downloadUrl"].as_str().unwrap().to_string();
        assert!(video["videoUrl"].as_str().unwrap().starts_with("/video/"));

        let response = app
            .clone()
            .oneshot(
                Request::get(format!("/status/{}", session_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = read_json(response).await;
        assert_eq!(status["status"], "completed");
        assert_eq!(status["filename"], "song.mp3");

        let response = app
            .oneshot(Request::get(download_url).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .is_some());
    }

    #[tokio::test]
    async fn test_upload_rejects_other_extensions() {
        let (state, app) = test_app();
        let response = app
            .oneshot(multipart_request("notes.txt", b"hello"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            read_json(response).await["error"],
            "Invalid file type. Only MP3 and WAV files are allowed."
        );
        assert_eq!(state.store.session_count(), 0);
    }

    #[tokio::test]
    async fn test_generate_errors() {
        let (_, app) = test_app();

        let response = app
            .clone()
            .oneshot(json_request("/generate", json!({ "format": "youtube" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(read_json(response).await["error"], "Missing session_id parameter");

        let response = app
            .clone()
            .oneshot(json_request("/generate", json!({ "session_id": "nope" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(json_request(
                "/generate",
                json!({ "session_id": "nope", "brightness": 180 }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_session_processed_once() {
        let (_, app) = test_app();
        let response = app
            .clone()
            .oneshot(multipart_request("clip.wav", &[0u8; 128]))
            .await
            .unwrap();
        let session_id = read_json(response).await["session_id"].clone();

        let body = json!({ "session_id": session_id });
        let first = app.clone().oneshot(json_request("/generate", body.clone())).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app.oneshot(json_request("/generate", body)).await.unwrap();
        assert_eq!(second.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            read_json(second).await["error"],
            "This session has already been processed"
        );
    }

    #[tokio::test]
    async fn test_unknown_status_and_video() {
        let (_, app) = test_app();
        let response = app
            .clone()
            .oneshot(Request::get("/status/missing").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(read_json(response).await["error"], "Invalid session ID");

        let response = app
            .oneshot(Request::get("/video/missing.mp4").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
