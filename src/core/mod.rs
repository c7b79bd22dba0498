pub mod config;
pub mod errors;
pub mod types;

// Re-export commonly used items for convenience
pub use config::Config;
pub use errors::{CodecError, ConfigError, GenerationError, JobError};
pub use types::{
    AttemptMode, BatchProgress, ColorizationConfig, ColorizationStyle, ImagePayload, Job,
    JobStatus, MaskStroke, RefinementRequest, RunState, SourceImage, SweepOutcome,
};
