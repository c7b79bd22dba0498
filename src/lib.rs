// Library exports for the manga colorization workflow

// Core modules
pub mod core;
pub mod orchestration;
pub mod services;
pub mod utils;

// Re-export commonly used types and functions
pub use core::{
    config::Config,
    errors::{CodecError, ConfigError, GenerationError, JobError},
    types::{
        AttemptMode, BatchProgress, BatchResponse, ColorizationConfig, ColorizationStyle,
        ImagePayload, Job, JobResult, JobStatus, MaskStroke, RefinementRequest, RunState,
        SourceImage, SweepOutcome,
    },
};

pub use orchestration::BatchController;

pub use services::{GeminiClient, GenerationClient};

pub use utils::Metrics;
