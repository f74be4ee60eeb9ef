//! Pipeline configuration
//!
//! Where the render backend lives and how the client talks to it.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::error::{PipelineError, Result};

/// Backend used during development
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:5000";

/// Mirrors the backend's request size cap
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Base URL of the render backend
    pub api_url: String,

    /// Upload endpoint path
    pub upload_path: String,

    /// Generation endpoint path
    pub generate_path: String,

    /// Session status endpoint path, the session id is appended
    pub status_path: String,

    /// Multipart field carrying the audio binary
    pub upload_field: String,

    /// Files above this size are rejected before upload
    pub max_upload_bytes: Option<u64>,

    /// Request timeout in seconds. None means wait indefinitely.
    pub timeout_secs: Option<u64>,

    pub user_agent: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            upload_path: "/upload".to_string(),
            generate_path: "/generate".to_string(),
            status_path: "/status".to_string(),
            upload_field: "file".to_string(),
            max_upload_bytes: Some(DEFAULT_MAX_UPLOAD_BYTES),
            timeout_secs: None,
            user_agent: format!("BlossomPipeline/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl PipelineConfig {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self::default().with_api_url(api_url)
    }

    /// With API endpoint
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// With upload multipart field name
    pub fn with_upload_field(mut self, field: impl Into<String>) -> Self {
        self.upload_field = field.into();
        self
    }

    /// With upload size limit (None disables the check)
    pub fn with_max_upload_bytes(mut self, limit: Option<u64>) -> Self {
        self.max_upload_bytes = limit;
        self
    }

    /// With timeout
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn base_url(&self) -> Result<Url> {
        let mut base = Url::parse(&self.api_url)?;
        // Url::join drops the last path segment unless it ends with a slash
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(base)
    }

    /// Resolve an endpoint path or a URL returned by the backend.
    /// Absolute URLs are returned unchanged.
    pub fn resolve(&self, path_or_url: &str) -> Result<Url> {
        if let Ok(url) = Url::parse(path_or_url) {
            return Ok(url);
        }
        let relative = path_or_url.trim_start_matches('/');
        Ok(self.base_url()?.join(relative)?)
    }

    pub fn upload_url(&self) -> Result<Url> {
        self.resolve(&self.upload_path)
    }

    pub fn generate_url(&self) -> Result<Url> {
        self.resolve(&self.generate_path)
    }

    pub fn status_url(&self, session_id: &str) -> Result<Url> {
        let path = format!("{}/{}", self.status_path.trim_end_matches('/'), session_id);
        self.resolve(&path)
    }

    /// Save configuration to JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| PipelineError::Config(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load configuration from JSON
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json)
            .map_err(|e| PipelineError::Config(format!("{}: {}", path.display(), e)))
    }
}
