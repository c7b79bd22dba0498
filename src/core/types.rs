// Core types for the colorization workflow

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Transport-ready image: raw bytes plus the media type they were uploaded with.
///
/// Bytes are shared via `Arc` so jobs, in-flight attempts, and export all
/// reference the same buffer without copying.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    pub bytes: Arc<Vec<u8>>,
    pub media_type: String,
}

impl ImagePayload {
    pub fn new(bytes: Vec<u8>, media_type: impl Into<String>) -> Self {
        Self {
            bytes: Arc::new(bytes),
            media_type: media_type.into(),
        }
    }
}

/// The original uploaded page. Never mutated after job creation.
#[derive(Debug, Clone)]
pub struct SourceImage {
    pub filename: String,
    pub payload: ImagePayload,
}

/// Per-job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Queued,
    Processing,
    Success,
    Error,
}

/// One unit of colorization work.
///
/// `result` and `last_error` are only ever written by the state machine
/// transitions in `orchestration::job`; a failed refinement keeps the prior
/// successful result.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub source: SourceImage,
    pub status: JobStatus,
    pub result: Option<ImagePayload>,
    pub last_error: Option<String>,
}

/// Sweep execution state, distinct from any individual job's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Stopping,
}

/// Fixed style presets plus a custom free-text variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ColorizationStyle {
    #[default]
    Vibrant,
    Pastel,
    Gritty,
    Retro,
    Painterly,
    Custom,
}

/// User-facing configuration, read (snapshotted) at the moment each request
/// is built. Changes never retroactively affect in-flight jobs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ColorizationConfig {
    #[serde(default)]
    pub style: ColorizationStyle,
    /// Series title used as a canon-colors hint; empty means no context.
    #[serde(default)]
    pub title: String,
    /// Only meaningful when `style == Custom`.
    #[serde(default)]
    pub custom_instructions: String,
}

/// One free-hand mask stroke in resolution-independent coordinates.
///
/// Points and width are normalized to 0..1 of the image dimensions so the
/// stroke can be rasterized at whatever native resolution the base image has.
#[derive(Debug, Clone, Deserialize)]
pub struct MaskStroke {
    pub points: Vec<[f32; 2]>,
    /// Brush width as a fraction of the image width.
    pub width: f32,
}

/// What kind of attempt a request dispatch is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptMode {
    /// First-time (or retried-from-source) colorization.
    Initial,
    /// Finish remaining grayscale regions without touching colored ones.
    AutoFix,
    /// Apply exactly the user's instruction, optionally mask-scoped.
    CustomFix,
}

/// Ephemeral refinement parameters; built per call, never stored on the job.
#[derive(Debug, Clone, Default)]
pub struct RefinementRequest {
    pub instruction: Option<String>,
    pub mask: Option<Vec<MaskStroke>>,
}

/// Aggregate view of the job collection, derived on every change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct BatchProgress {
    pub total: usize,
    pub processed: usize,
    pub successful: usize,
    pub failed: usize,
    pub percent: u32,
}

impl BatchProgress {
    pub fn derive(jobs: &[Job]) -> Self {
        let total = jobs.len();
        let successful = jobs.iter().filter(|j| j.status == JobStatus::Success).count();
        let failed = jobs.iter().filter(|j| j.status == JobStatus::Error).count();
        let processed = successful + failed;
        let percent = if total > 0 {
            (processed * 100 / total) as u32
        } else {
            0
        };
        Self {
            total,
            processed,
            successful,
            failed,
            percent,
        }
    }
}

/// Outcome of one full sweep over the job list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepOutcome {
    /// True when the sweep ran to the end of the list without a stop request.
    pub completed: bool,
    pub progress: BatchProgress,
}

/// Per-job view returned by the HTTP layer.
#[derive(Debug, Clone, Serialize)]
pub struct JobResult {
    pub id: String,
    pub filename: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_url: Option<String>,
}

/// Batch response for the HTTP layer.
#[derive(Debug, Clone, Serialize)]
pub struct BatchResponse {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub completed: bool,
    pub processing_time_ms: f64,
    pub results: Vec<JobResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(status: JobStatus) -> Job {
        Job {
            id: "j".to_string(),
            source: SourceImage {
                filename: "page.png".to_string(),
                payload: ImagePayload::new(vec![1, 2, 3], "image/png"),
            },
            status,
            result: None,
            last_error: None,
        }
    }

    #[test]
    fn progress_over_empty_list_is_zero() {
        let progress = BatchProgress::derive(&[]);
        assert_eq!(progress.total, 0);
        assert_eq!(progress.percent, 0);
    }

    #[test]
    fn progress_counts_terminal_statuses_only() {
        let jobs = vec![
            job(JobStatus::Success),
            job(JobStatus::Error),
            job(JobStatus::Processing),
            job(JobStatus::Queued),
        ];
        let progress = BatchProgress::derive(&jobs);
        assert_eq!(progress.total, 4);
        assert_eq!(progress.processed, 2);
        assert_eq!(progress.successful, 1);
        assert_eq!(progress.failed, 1);
        assert_eq!(progress.percent, 50);
    }

    #[test]
    fn progress_reaches_hundred_when_all_terminal() {
        let jobs = vec![
            job(JobStatus::Success),
            job(JobStatus::Success),
            job(JobStatus::Error),
        ];
        assert_eq!(BatchProgress::derive(&jobs).percent, 100);
    }
}
