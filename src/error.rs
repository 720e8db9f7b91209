use std::path::PathBuf;

use thiserror::Error;
use tonic::Status;

#[derive(Error, Debug)]
pub enum SubtitleError {
    #[error("unsupported language {0:?}")]
    UnsupportedLanguage(String),

    #[error("job queue is full")]
    QueueFull,

    #[error("job queue is closed")]
    QueueClosed,

    #[error("audio extraction failed: {0}")]
    Extraction(String),

    #[error("failed to launch execution unit: {0}")]
    Launch(String),

    #[error("execution engine error: {0}")]
    Engine(String),

    #[error("failed to read subtitle artifact {path}: {source}")]
    Artifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("job cancelled")]
    Cancelled,

    #[error("delivery failed: {0}")]
    Delivery(#[from] Status),

    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SubtitleError>;

impl From<SubtitleError> for Status {
    fn from(err: SubtitleError) -> Self {
        match err {
            SubtitleError::UnsupportedLanguage(_) => Status::invalid_argument(err.to_string()),
            SubtitleError::QueueFull => Status::resource_exhausted(err.to_string()),
            SubtitleError::QueueClosed => Status::unavailable("service is shutting down"),
            other => Status::internal(other.to_string()),
        }
    }
}
