//! Upload transfer monitoring
//!
//! Wraps a single audio upload and turns it into an ordered stream of
//! progress events ending in `Complete` or `Failed`.

use futures::Stream;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use crate::backend::{RenderBackend, UploadReceipt, UPLOAD_FAILED};
use crate::error::{InvalidInput, PipelineError, Result};

/// An audio file selected for upload
#[derive(Debug, Clone)]
pub struct AudioFile {
    name: String,
    content_type: String,
    data: Arc<[u8]>,
}

impl AudioFile {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            data: data.into(),
        }
    }

    /// Read a file from disk, guessing its content type from the extension
    pub async fn from_path(path: &Path) -> Result<Self> {
        let data = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());
        Ok(Self::new(name, content_type_for(path), data))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_audio(&self) -> bool {
        self.content_type.to_ascii_lowercase().starts_with("audio/")
    }

    pub(crate) fn shared_data(&self) -> Arc<[u8]> {
        Arc::clone(&self.data)
    }
}

pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("flac") => "audio/flac",
        Some("ogg") | Some("oga") => "audio/ogg",
        Some("m4a") => "audio/mp4",
        Some("aac") => "audio/aac",
        Some("opus") => "audio/opus",
        Some("webm") => "audio/webm",
        _ => "application/octet-stream",
    }
}

/// Content type and size checks run before anything reaches the network
pub fn validate(file: &AudioFile, max_bytes: Option<u64>) -> std::result::Result<(), InvalidInput> {
    if !file.is_audio() {
        return Err(InvalidInput::FileType {
            content_type: file.content_type().to_string(),
        });
    }
    if let Some(limit) = max_bytes {
        if file.len() > limit {
            return Err(InvalidInput::FileTooLarge {
                size: file.len(),
                limit,
            });
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UploadStatus {
    #[default]
    Idle,
    InProgress,
    Complete,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    Progress { bytes_transferred: u64, byte_total: u64 },
    Complete(UploadReceipt),
    Failed(String),
}

impl UploadEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadTask {
    pub file_name: String,
    pub byte_total: u64,
    pub bytes_transferred: u64,
    pub status: UploadStatus,
    pub error: Option<String>,
    pub receipt: Option<UploadReceipt>,
}

impl UploadTask {
    pub fn new(file_name: impl Into<String>, byte_total: u64) -> Self {
        Self {
            file_name: file_name.into(),
            byte_total,
            ..Self::default()
        }
    }

    /// Rounded percentage for display
    pub fn percent(&self) -> u8 {
        if self.byte_total == 0 {
            return 0;
        }
        ((self.bytes_transferred as f64 / self.byte_total as f64) * 100.0).round() as u8
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.status, UploadStatus::Complete | UploadStatus::Failed)
    }

    pub fn apply(&mut self, event: &UploadEvent) {
        match event {
            UploadEvent::Progress {
                bytes_transferred, ..
            } => {
                if self.is_finished() {
                    return;
                }
                self.status = UploadStatus::InProgress;
                let bounded = (*bytes_transferred).min(self.byte_total);
                self.bytes_transferred = self.bytes_transferred.max(bounded);
            }
            UploadEvent::Complete(receipt) => {
                if self.bytes_transferred == self.byte_total {
                    self.status = UploadStatus::Complete;
                    self.error = None;
                    self.receipt = Some(receipt.clone());
                } else {
                    self.fail("upload finished before all bytes were sent");
                }
            }
            UploadEvent::Failed(message) => self.fail(message),
        }
    }

    fn fail(&mut self, message: &str) {
        self.status = UploadStatus::Failed;
        self.error = Some(message.to_string());
        self.bytes_transferred = 0;
    }
}

struct SinkState {
    reported: AtomicU64,
    closed: AtomicBool,
}

/// Progress reporter handed to a backend. Drops reports that would go
/// backwards, exceed the total, or arrive after the terminal event.
#[derive(Clone)]
pub struct ProgressSink {
    tx: UnboundedSender<UploadEvent>,
    byte_total: u64,
    state: Arc<SinkState>,
}

impl ProgressSink {
    pub fn channel(byte_total: u64) -> (Self, UploadStream) {
        let (tx, rx) = unbounded_channel();
        let sink = Self {
            tx,
            byte_total,
            state: Arc::new(SinkState {
                reported: AtomicU64::new(0),
                closed: AtomicBool::new(false),
            }),
        };
        (sink, UploadStream { rx, done: false })
    }

    pub fn byte_total(&self) -> u64 {
        self.byte_total
    }

    pub fn reported(&self) -> u64 {
        self.state.reported.load(Ordering::SeqCst)
    }

    fn start(&self) {
        let _ = self.tx.send(UploadEvent::Progress {
            bytes_transferred: 0,
            byte_total: self.byte_total,
        });
    }

    pub fn report(&self, bytes_transferred: u64) {
        if self.state.closed.load(Ordering::SeqCst) {
            return;
        }
        let bounded = bytes_transferred.min(self.byte_total);
        let previous = self.state.reported.fetch_max(bounded, Ordering::SeqCst);
        if bounded > previous {
            let _ = self.tx.send(UploadEvent::Progress {
                bytes_transferred: bounded,
                byte_total: self.byte_total,
            });
        }
    }

    fn finish(&self, event: UploadEvent) {
        if let UploadEvent::Complete(_) = event {
            self.report(self.byte_total);
        }
        self.state.closed.store(true, Ordering::SeqCst);
        let _ = self.tx.send(event);
    }
}

/// Ordered upload events. Ends right after the terminal event, even if the
/// transport still holds a sink clone.
pub struct UploadStream {
    rx: UnboundedReceiver<UploadEvent>,
    done: bool,
}

impl UploadStream {
    pub async fn next(&mut self) -> Option<UploadEvent> {
        futures::future::poll_fn(|cx| self.poll_event(cx)).await
    }

    fn poll_event(&mut self, cx: &mut Context<'_>) -> Poll<Option<UploadEvent>> {
        if self.done {
            return Poll::Ready(None);
        }
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(event)) => {
                self.done = event.is_terminal();
                Poll::Ready(Some(event))
            }
            Poll::Ready(None) => {
                self.done = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Stream for UploadStream {
    type Item = UploadEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.poll_event(cx)
    }
}

fn failure_message(err: &PipelineError) -> String {
    match err {
        PipelineError::ServerRejected(message) => message.clone(),
        PipelineError::InvalidInput(input) => input.to_string(),
        _ => UPLOAD_FAILED.to_string(),
    }
}

/// Start uploading `file` on the current tokio runtime.
///
/// Non-audio files fail with `InvalidInput` before any request is made.
/// Empty files are a no-op and yield `None`. Outside a runtime this returns
/// a `Config` error instead of starting anything.
pub fn submit(backend: Arc<dyn RenderBackend>, file: AudioFile) -> Result<Option<UploadStream>> {
    validate(&file, None)?;
    if file.is_empty() {
        debug!("skipping upload of empty file {}", file.name());
        return Ok(None);
    }
    let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
        PipelineError::Config("uploads must be started from within a tokio runtime".to_string())
    })?;

    let (sink, stream) = ProgressSink::channel(file.len());
    sink.start();

    runtime.spawn(async move {
        let name = file.name().to_string();
        let event = match backend.upload(file, sink.clone()).await {
            Ok(receipt) => {
                info!("Upload of {} complete: {}", name, receipt.message);
                UploadEvent::Complete(receipt)
            }
            Err(e) => {
                warn!("Upload of {} failed: {}", name, e);
                UploadEvent::Failed(failure_message(&e))
            }
        };
        sink.finish(event);
    });

    Ok(Some(stream))
}

/// Owns the upload task for one uploader
pub struct TransferMonitor {
    backend: Arc<dyn RenderBackend>,
    max_upload_bytes: Option<u64>,
    file: Option<AudioFile>,
    task: UploadTask,
    stream: Option<UploadStream>,
}

impl TransferMonitor {
    pub fn new(backend: Arc<dyn RenderBackend>) -> Self {
        Self {
            backend,
            max_upload_bytes: None,
            file: None,
            task: UploadTask::default(),
            stream: None,
        }
    }

    pub fn with_max_upload_bytes(mut self, limit: Option<u64>) -> Self {
        self.max_upload_bytes = limit;
        self
    }

    pub fn task(&self) -> &UploadTask {
        &self.task
    }

    pub fn file(&self) -> Option<&AudioFile> {
        self.file.as_ref()
    }

    /// Upload finished successfully; gates the customize step
    pub fn is_complete(&self) -> bool {
        self.task.status == UploadStatus::Complete
    }

    pub fn is_uploading(&self) -> bool {
        self.task.status == UploadStatus::InProgress
    }

    /// Select a new file, discarding any previous task
    pub fn select(&mut self, file: AudioFile) -> Result<()> {
        self.stream = None;
        if let Err(e) = validate(&file, self.max_upload_bytes) {
            self.file = None;
            self.task = UploadTask {
                error: Some(e.to_string()),
                ..UploadTask::default()
            };
            return Err(e.into());
        }
        self.task = UploadTask::new(file.name(), file.len());
        self.file = Some(file);
        Ok(())
    }

    /// Start uploading the selected file on the current tokio runtime.
    /// Returns false when there is nothing to upload, and a `Config` error
    /// when called outside a runtime.
    pub fn submit(&mut self) -> Result<bool> {
        let Some(file) = self.file.clone() else {
            return Ok(false);
        };
        match submit(Arc::clone(&self.backend), file)? {
            Some(stream) => {
                self.task.status = UploadStatus::InProgress;
                self.task.bytes_transferred = 0;
                self.task.error = None;
                self.task.receipt = None;
                self.stream = Some(stream);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Wait for the next event and fold it into the task
    pub async fn next_event(&mut self) -> Option<UploadEvent> {
        let stream = self.stream.as_mut()?;
        match stream.next().await {
            Some(event) => {
                self.task.apply(&event);
                if event.is_terminal() {
                    self.stream = None;
                }
                Some(event)
            }
            None => {
                // Sender dropped without a terminal event
                if !self.task.is_finished() {
                    self.task.apply(&UploadEvent::Failed(UPLOAD_FAILED.to_string()));
                }
                self.stream = None;
                None
            }
        }
    }

    pub async fn run_to_completion(&mut self) -> &UploadTask {
        while self.next_event().await.is_some() {}
        &self.task
    }

    pub fn reset(&mut self) {
        self.file = None;
        self.stream = None;
        self.task = UploadTask::default();
    }
}
