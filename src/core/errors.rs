// Custom error types for better error handling and debugging
//
// Using thiserror for ergonomic error definitions with:
// - Context preservation
// - Type-safe error matching
// - Automatic Display/Error trait implementations

use thiserror::Error;

use crate::core::types::JobStatus;

/// Image codec errors
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("unsupported media type: {0} (only image/* is accepted)")]
    UnsupportedMedia(String),

    #[error("image decode failed: {0}")]
    Decode(#[from] image::ImageError),

    #[error("blocking image task failed: {0}")]
    TaskJoin(String),
}

/// Generation client failures surfaced to the job layer.
///
/// All kinds are recovered at the job boundary: they terminate only the one
/// attempt, never the sweep or the session.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("no candidates returned from the model")]
    NoCandidates,

    #[error("the model declined to generate an image: {0}")]
    ModelDeclined(String),

    #[error("no image data found in the model response")]
    MalformedResponse,

    #[error("transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for GenerationError {
    fn from(e: reqwest::Error) -> Self {
        GenerationError::Transport(e.to_string())
    }
}

/// Job state machine and batch controller errors
#[derive(Debug, Error)]
pub enum JobError {
    /// `start` was called while the job is already PROCESSING. Internal
    /// misuse; the controller's dispatch discipline prevents it from
    /// double-dispatching to the generation client.
    #[error("job {0} already has an attempt in flight")]
    ReentrancyViolation(String),

    #[error("invalid transition for job {id}: {from:?} -> {to:?}")]
    InvalidTransition {
        id: String,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("unknown job id: {0}")]
    UnknownJob(String),

    #[error("a sweep is already running for this session")]
    SweepAlreadyRunning,
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no API key configured (set GEMINI_API_KEY environment variable)")]
    NoApiKey,

    #[error("invalid server config: {0}")]
    InvalidServerConfig(String),

    #[error("max_retries must be <= 10, got {0}")]
    InvalidMaxRetries(u32),

    #[error("api_timeout_seconds must be > 0")]
    InvalidTimeout,
}

// Convenience type aliases for Results
pub type CodecResult<T> = Result<T, CodecError>;
pub type GenerationResult<T> = Result<T, GenerationError>;
pub type JobOpResult<T> = Result<T, JobError>;
pub type ConfigResult<T> = Result<T, ConfigError>;
