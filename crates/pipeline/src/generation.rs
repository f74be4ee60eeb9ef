//! Generation request coordination
//!
//! Sends generation requests to the backend and tracks the current job.
//! Every request is tagged with a sequence number; only the most recently
//! issued request may update observed state, whatever order responses
//! arrive in.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::backend::{GeneratedVideo, RenderBackend, GENERATION_FAILED};
use crate::error::{PipelineError, Result};
use crate::selection::GenerationRequest;

/// Sequence number of a generation request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum JobStatus {
    #[default]
    Idle,
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GenerationJob {
    pub id: JobId,
    pub status: JobStatus,

    /// Present iff Succeeded
    pub result_url: Option<String>,

    /// Separate download location, when the backend provides one
    pub download_url: Option<String>,

    /// Present iff Failed
    pub error: Option<String>,
}

impl GenerationJob {
    fn idle(id: JobId) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    fn running(id: JobId) -> Self {
        Self {
            id,
            status: JobStatus::Running,
            ..Self::default()
        }
    }

    fn succeeded(id: JobId, video: GeneratedVideo) -> Self {
        Self {
            id,
            status: JobStatus::Succeeded,
            result_url: Some(video.video_url),
            download_url: video.download_url,
            error: None,
        }
    }

    fn failed(id: JobId, message: String) -> Self {
        Self {
            id,
            status: JobStatus::Failed,
            error: Some(message),
            ..Self::default()
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == JobStatus::Running
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.status, JobStatus::Succeeded | JobStatus::Failed)
    }
}

type VideoReadyCallback = Box<dyn Fn(&str) + Send + Sync>;

pub struct GenerationCoordinator {
    backend: Arc<dyn RenderBackend>,
    sequence: AtomicU64,
    state: watch::Sender<GenerationJob>,
    on_video_ready: Option<VideoReadyCallback>,
}

impl GenerationCoordinator {
    pub fn new(backend: Arc<dyn RenderBackend>) -> Self {
        let (state, _) = watch::channel(GenerationJob::default());
        Self {
            backend,
            sequence: AtomicU64::new(0),
            state,
            on_video_ready: None,
        }
    }

    /// Called with the result URL whenever the current job succeeds
    pub fn on_video_ready(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_video_ready = Some(Box::new(callback));
        self
    }

    /// Snapshot of the current job
    pub fn current(&self) -> GenerationJob {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<GenerationJob> {
        self.state.subscribe()
    }

    /// Id of the most recently issued request
    pub fn latest_id(&self) -> JobId {
        JobId(self.sequence.load(Ordering::SeqCst))
    }

    /// A job is in flight. Idle, Succeeded and Failed all accept a new submission.
    pub fn is_busy(&self) -> bool {
        self.state.borrow().is_running()
    }

    /// Run one generation request. Never fails: errors come back as a
    /// `Failed` job. The returned job is this request's own outcome; it only
    /// becomes the current job if no newer request was issued meanwhile.
    pub async fn generate(&self, request: GenerationRequest) -> GenerationJob {
        let id = self.issue(GenerationJob::running);
        info!("Generation {} started ({} video, {})", id, request.video_type, request.format);

        let resolved = match self.backend.generate(&request).await {
            Ok(video) => GenerationJob::succeeded(id, video),
            Err(e) => {
                warn!("Generation {} failed: {}", id, e);
                GenerationJob::failed(id, failure_message(&e))
            }
        };

        match self.apply(&resolved) {
            Ok(()) => {
                if let (Some(callback), Some(url)) = (&self.on_video_ready, &resolved.result_url) {
                    callback(url);
                }
            }
            Err(e) => debug!("{}", e),
        }
        resolved
    }

    /// Return to Idle. Any request still in flight is superseded.
    pub fn reset(&self) {
        self.issue(GenerationJob::idle);
    }

    fn issue(&self, make: fn(JobId) -> GenerationJob) -> JobId {
        let mut id = JobId::default();
        self.state.send_modify(|job| {
            id = JobId(self.sequence.fetch_add(1, Ordering::SeqCst) + 1);
            *job = make(id);
        });
        id
    }

    fn apply(&self, resolved: &GenerationJob) -> Result<()> {
        let applied = self.state.send_if_modified(|job| {
            if self.sequence.load(Ordering::SeqCst) != resolved.id.0 {
                return false;
            }
            *job = resolved.clone();
            true
        });
        if applied {
            Ok(())
        } else {
            Err(PipelineError::StaleResult(resolved.id))
        }
    }
}

fn failure_message(err: &PipelineError) -> String {
    match err {
        PipelineError::ServerRejected(message) => message.clone(),
        PipelineError::InvalidInput(input) => input.to_string(),
        _ => GENERATION_FAILED.to_string(),
    }
}
