// Per-item job lifecycle: QUEUED -> PROCESSING -> SUCCESS | ERROR
//
// Terminal states are re-enterable (retry, auto-fix, custom-fix); the only
// hard rule is that a job with an attempt in flight cannot start another.
// `start` doubles as the per-job lock: taking it while PROCESSING fails with
// ReentrancyViolation, which is how concurrent double-dispatch is prevented.

use uuid::Uuid;

use crate::core::errors::{JobError, JobOpResult};
use crate::core::types::{ImagePayload, Job, JobStatus, SourceImage};

impl Job {
    /// Create a fresh QUEUED job for an uploaded source image.
    pub fn new(source: SourceImage) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source,
            status: JobStatus::Queued,
            result: None,
            last_error: None,
        }
    }

    /// Begin an attempt. Valid from any state except PROCESSING.
    ///
    /// Clears `last_error` optimistically; the prior `result` (if any) is
    /// kept so a failed refinement does not lose a good colorization.
    pub fn start(&mut self) -> JobOpResult<()> {
        if self.status == JobStatus::Processing {
            return Err(JobError::ReentrancyViolation(self.id.clone()));
        }
        self.status = JobStatus::Processing;
        self.last_error = None;
        Ok(())
    }

    /// Record a successful attempt. Valid only from PROCESSING.
    /// Overwrites any previous result; there is no version history.
    pub fn succeed(&mut self, result: ImagePayload) -> JobOpResult<()> {
        if self.status != JobStatus::Processing {
            return Err(JobError::InvalidTransition {
                id: self.id.clone(),
                from: self.status,
                to: JobStatus::Success,
            });
        }
        self.status = JobStatus::Success;
        self.result = Some(result);
        self.last_error = None;
        Ok(())
    }

    /// Record a failed attempt. Valid only from PROCESSING.
    /// A prior result from an earlier successful run is left untouched.
    pub fn fail(&mut self, message: impl Into<String>) -> JobOpResult<()> {
        if self.status != JobStatus::Processing {
            return Err(JobError::InvalidTransition {
                id: self.id.clone(),
                from: self.status,
                to: JobStatus::Error,
            });
        }
        self.status = JobStatus::Error;
        self.last_error = Some(message.into());
        Ok(())
    }

    /// Image a refinement attempt should operate on: the latest result when
    /// one exists, the original source otherwise.
    pub fn refinement_input(&self) -> &ImagePayload {
        self.result.as_ref().unwrap_or(&self.source.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_job() -> Job {
        Job::new(SourceImage {
            filename: "page.png".to_string(),
            payload: ImagePayload::new(vec![0u8; 4], "image/png"),
        })
    }

    #[test]
    fn fresh_jobs_are_queued_with_unique_ids() {
        let a = new_job();
        let b = new_job();
        assert_eq!(a.status, JobStatus::Queued);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn full_success_cycle() {
        let mut job = new_job();
        job.start().unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        job.succeed(ImagePayload::new(vec![9], "image/png")).unwrap();
        assert_eq!(job.status, JobStatus::Success);
        assert!(job.result.is_some());
        assert!(job.last_error.is_none());
    }

    #[test]
    fn start_rejects_processing_job() {
        let mut job = new_job();
        job.start().unwrap();
        assert!(matches!(job.start(), Err(JobError::ReentrancyViolation(_))));
        // Still exactly one attempt in flight
        assert_eq!(job.status, JobStatus::Processing);
    }

    #[test]
    fn start_is_valid_from_terminal_states() {
        let mut job = new_job();
        job.start().unwrap();
        job.fail("boom").unwrap();
        assert_eq!(job.status, JobStatus::Error);

        job.start().unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert!(job.last_error.is_none(), "start clears last_error");
    }

    #[test]
    fn failed_refinement_keeps_prior_result() {
        let mut job = new_job();
        job.start().unwrap();
        job.succeed(ImagePayload::new(vec![1, 2, 3], "image/png"))
            .unwrap();

        job.start().unwrap();
        job.fail("refinement declined").unwrap();

        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(job.last_error.as_deref(), Some("refinement declined"));
        let kept = job.result.as_ref().expect("prior result preserved");
        assert_eq!(**kept.bytes, [1, 2, 3]);
    }

    #[test]
    fn succeed_overwrites_previous_result() {
        let mut job = new_job();
        job.start().unwrap();
        job.succeed(ImagePayload::new(vec![1], "image/png")).unwrap();
        job.start().unwrap();
        job.succeed(ImagePayload::new(vec![2], "image/png")).unwrap();
        assert_eq!(**job.result.as_ref().unwrap().bytes, [2]);
    }

    #[test]
    fn terminal_transitions_require_processing() {
        let mut job = new_job();
        assert!(matches!(
            job.succeed(ImagePayload::new(vec![1], "image/png")),
            Err(JobError::InvalidTransition { .. })
        ));
        assert!(matches!(
            job.fail("nope"),
            Err(JobError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn refinement_input_prefers_result() {
        let mut job = new_job();
        assert_eq!(**job.refinement_input().bytes, [0u8; 4]);
        job.start().unwrap();
        job.succeed(ImagePayload::new(vec![5], "image/png")).unwrap();
        assert_eq!(**job.refinement_input().bytes, [5]);
    }
}
