use thiserror::Error;

use crate::generation::JobId;

/// Input rejected before any network call is made.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidInput {
    #[error("please select a valid audio file (got {content_type})")]
    FileType { content_type: String },

    #[error("{name} must be within 0..=100 (got {value})")]
    ParameterOutOfRange { name: &'static str, value: f64 },

    #[error("file is {size} bytes, the limit is {limit} bytes")]
    FileTooLarge { size: u64, limit: u64 },
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid input: {0}")]
    InvalidInput(#[from] InvalidInput),

    #[error("transport failure: {0}")]
    TransportFailure(String),

    /// Non-2xx response. Carries the backend's own message when it sent one.
    #[error("{0}")]
    ServerRejected(String),

    #[error("result for superseded request {0} discarded")]
    StaleResult(JobId),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),
}

impl PipelineError {
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        Self::TransportFailure(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        Self::TransportFailure(format!("malformed response: {}", err))
    }
}

impl From<url::ParseError> for PipelineError {
    fn from(err: url::ParseError) -> Self {
        Self::Config(format!("invalid url: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
