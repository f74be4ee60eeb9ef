//! Client-side media pipeline
//!
//! Uploads an audio file with progress, requests a video render from the
//! backend, and drives preview playback of the result.
//!
//! - `transfer`: upload lifecycle and progress stream
//! - `generation`: render requests with latest-wins result handling
//! - `playback`: preview transport state over a `MediaElement`
//! - `selection`: user-chosen generation options

pub mod backend;
pub mod clock;
pub mod config;
pub mod error;
pub mod generation;
pub mod playback;
pub mod selection;
pub mod transfer;

pub use backend::{ErrorBody, GeneratedVideo, HttpBackend, RenderBackend, SessionStatus, UploadReceipt};
pub use clock::ClockElement;
pub use config::PipelineConfig;
pub use error::{InvalidInput, PipelineError, Result};
pub use generation::{GenerationCoordinator, GenerationJob, JobId, JobStatus};
pub use playback::{
    AspectRatio, MediaElement, MediaEvent, PlaybackController, PlaybackPhase, PlaybackState, Quality,
};
pub use selection::{GenerationRequest, SelectionModel, VideoFormat, VideoType};
pub use transfer::{AudioFile, ProgressSink, TransferMonitor, UploadEvent, UploadStatus, UploadStream, UploadTask};
