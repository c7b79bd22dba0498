// Batch controller: owns the ordered job collection and drives execution
//
// One full sweep at a time walks the jobs in insertion order, one generation
// call in flight, checking the stop flag before each job. Manual per-job
// operations (retry / auto-fix / custom-fix) are independent attempts that
// may run alongside a sweep; the only mutual exclusion is the per-job
// PROCESSING guard in the state machine.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::core::errors::{JobError, JobOpResult};
use crate::core::types::{
    AttemptMode, BatchProgress, ColorizationConfig, Job, JobStatus, MaskStroke,
    RefinementRequest, RunState, SourceImage, SweepOutcome,
};
use crate::services::codec;
use crate::services::generation::GenerationClient;
use crate::services::prompt::{self, AttemptInstruction};
use crate::utils::Metrics;

/// Session-scoped controller for a batch of colorization jobs.
pub struct BatchController {
    client: Arc<dyn GenerationClient>,
    config: RwLock<ColorizationConfig>,
    jobs: RwLock<Vec<Job>>,
    stop_requested: AtomicBool,
    sweep_completed: AtomicBool,
    run_state: watch::Sender<RunState>,
    progress: watch::Sender<BatchProgress>,
    metrics: Option<Metrics>,
}

impl BatchController {
    pub fn new(client: Arc<dyn GenerationClient>, metrics: Option<Metrics>) -> Self {
        let (run_state, _) = watch::channel(RunState::Idle);
        let (progress, _) = watch::channel(BatchProgress::default());
        Self {
            client,
            config: RwLock::new(ColorizationConfig::default()),
            jobs: RwLock::new(Vec::new()),
            stop_requested: AtomicBool::new(false),
            sweep_completed: AtomicBool::new(false),
            run_state,
            progress,
            metrics,
        }
    }

    // ----- session configuration -----

    /// Replace the user configuration; applies to subsequently dispatched
    /// jobs only, never to attempts already in flight.
    pub fn set_config(&self, config: ColorizationConfig) {
        *self.config.write() = config;
    }

    pub fn config(&self) -> ColorizationConfig {
        self.config.read().clone()
    }

    // ----- job collection -----

    /// Replace the session with one QUEUED job per source image.
    ///
    /// Any in-flight sweep is stopped and awaited first so a stale sweep
    /// cannot write into the discarded job list. Title and custom style text
    /// are cleared; the style preset is kept.
    #[instrument(skip(self, sources), fields(count = sources.len()))]
    pub async fn load_files(&self, sources: Vec<SourceImage>) -> usize {
        self.abort_sweep_and_wait().await;

        let jobs: Vec<Job> = sources.into_iter().map(Job::new).collect();
        let count = jobs.len();
        *self.jobs.write() = jobs;

        {
            let mut config = self.config.write();
            config.title.clear();
            config.custom_instructions.clear();
        }
        self.sweep_completed.store(false, Ordering::SeqCst);
        self.publish_progress();
        if let Some(ref m) = self.metrics {
            m.record_images_loaded(count);
        }

        info!("loaded {} jobs", count);
        count
    }

    /// Drop all jobs and reset the session.
    pub async fn clear(&self) {
        self.load_files(Vec::new()).await;
    }

    /// Snapshot of the job collection in insertion order.
    pub fn jobs(&self) -> Vec<Job> {
        self.jobs.read().clone()
    }

    pub fn progress(&self) -> BatchProgress {
        *self.progress.borrow()
    }

    /// Subscribe to job-collection change notifications for progress display.
    pub fn subscribe_progress(&self) -> watch::Receiver<BatchProgress> {
        self.progress.subscribe()
    }

    pub fn run_state(&self) -> RunState {
        *self.run_state.borrow()
    }

    /// True once a sweep has run to the end of the list without being stopped.
    pub fn sweep_completed(&self) -> bool {
        self.sweep_completed.load(Ordering::SeqCst)
    }

    // ----- sweep -----

    /// Run the full sweep: every non-SUCCESS job, in insertion order, one at
    /// a time. A single job's failure never stops the sweep; the stop flag is
    /// honored before each job but cannot abort a call already dispatched.
    #[instrument(skip(self))]
    pub async fn run_sweep(&self) -> JobOpResult<SweepOutcome> {
        let claimed = self.run_state.send_if_modified(|state| {
            if *state == RunState::Idle {
                // Reset the flag inside the claim: a stale stop request from
                // before this sweep is discarded, one arriving after the
                // claim must survive until the loop observes it.
                self.stop_requested.store(false, Ordering::SeqCst);
                *state = RunState::Running;
                true
            } else {
                false
            }
        });
        if !claimed {
            return Err(JobError::SweepAlreadyRunning);
        }

        self.sweep_completed.store(false, Ordering::SeqCst);

        let ids: Vec<String> = self.jobs.read().iter().map(|j| j.id.clone()).collect();
        info!("sweep started over {} jobs", ids.len());

        let mut stopped = false;
        for id in ids {
            if self.stop_requested.load(Ordering::SeqCst) {
                debug!("stop observed before job {id}, halting sweep");
                stopped = true;
                break;
            }

            let skip = {
                let jobs = self.jobs.read();
                match jobs.iter().find(|j| j.id == id) {
                    Some(job) => job.status == JobStatus::Success,
                    // Job list replaced underneath us; nothing left to drive.
                    None => true,
                }
            };
            if skip {
                continue;
            }

            // Per-job failures are recorded on the job itself; a reentrancy
            // rejection (a manual attempt got there first) is skipped.
            if let Err(e) = self.run_attempt(&id, AttemptMode::Initial, None).await {
                debug!("sweep skipped job {id}: {e}");
            }
        }

        self.run_state.send_replace(RunState::Idle);
        if !stopped {
            self.sweep_completed.store(true, Ordering::SeqCst);
        }
        if let Some(ref m) = self.metrics {
            m.record_sweep(!stopped);
        }

        let progress = self.progress();
        info!(
            "sweep {}: {}/{} processed ({} ok, {} failed)",
            if stopped { "stopped" } else { "completed" },
            progress.processed,
            progress.total,
            progress.successful,
            progress.failed
        );

        Ok(SweepOutcome {
            completed: !stopped,
            progress,
        })
    }

    /// Request cooperative sweep cancellation. The job currently in flight
    /// finishes and reports its own outcome; jobs after it stay QUEUED.
    pub fn stop_sweep(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        self.run_state.send_if_modified(|state| {
            if *state == RunState::Running {
                *state = RunState::Stopping;
                true
            } else {
                false
            }
        });
    }

    async fn abort_sweep_and_wait(&self) {
        if self.run_state() == RunState::Idle {
            return;
        }
        self.stop_sweep();
        let mut rx = self.run_state.subscribe();
        // Sender lives in self, so wait_for cannot fail from a closed channel.
        let _ = rx.wait_for(|state| *state == RunState::Idle).await;
    }

    // ----- manual per-job operations -----

    /// Re-run a job from its original source image.
    pub async fn retry_job(&self, id: &str) -> JobOpResult<JobStatus> {
        self.run_attempt(id, AttemptMode::Initial, None).await
    }

    /// Ask the model to finish any regions the last result left uncolored.
    pub async fn auto_fix_job(&self, id: &str) -> JobOpResult<JobStatus> {
        if let Some(ref m) = self.metrics {
            m.record_refinement();
        }
        self.run_attempt(id, AttemptMode::AutoFix, None).await
    }

    /// Apply a free-text edit, optionally scoped by mask strokes.
    pub async fn custom_fix_job(
        &self,
        id: &str,
        instruction: impl Into<String>,
        mask: Option<Vec<MaskStroke>>,
    ) -> JobOpResult<JobStatus> {
        if let Some(ref m) = self.metrics {
            m.record_refinement();
        }
        let refinement = RefinementRequest {
            instruction: Some(instruction.into()),
            mask,
        };
        self.run_attempt(id, AttemptMode::CustomFix, Some(refinement))
            .await
    }

    /// One complete attempt cycle for a single job:
    /// start -> (composite mask -> build request -> generate) -> succeed|fail.
    ///
    /// Returns the job's terminal status for this attempt. `start` is taken
    /// under the job-list write lock, so two concurrent attempts on the same
    /// id resolve to exactly one dispatch.
    async fn run_attempt(
        &self,
        id: &str,
        mode: AttemptMode,
        refinement: Option<RefinementRequest>,
    ) -> JobOpResult<JobStatus> {
        let input = {
            let mut jobs = self.jobs.write();
            let job = jobs
                .iter_mut()
                .find(|j| j.id == id)
                .ok_or_else(|| JobError::UnknownJob(id.to_string()))?;
            job.start()?;
            match mode {
                AttemptMode::Initial => job.source.payload.clone(),
                AttemptMode::AutoFix | AttemptMode::CustomFix => job.refinement_input().clone(),
            }
        };
        self.publish_progress();

        // Configuration snapshot: later user edits must not affect this attempt.
        let config = self.config();
        let refinement = refinement.unwrap_or_default();

        let instruction = AttemptInstruction {
            instruction: refinement.instruction.clone(),
            has_mask: refinement.mask.as_deref().is_some_and(|m| !m.is_empty()),
        };

        let input = match refinement.mask.as_deref() {
            Some(strokes) => match codec::composite_mask(&input, strokes).await {
                Ok(masked) => masked,
                Err(e) => {
                    let status = self.finish_attempt(id, Err(e.to_string()));
                    return status;
                }
            },
            None => input,
        };

        let instructions = prompt::build(&config, mode, &instruction);
        let outcome = match self.client.generate(&input, &instructions).await {
            Ok(payload) => Ok(payload),
            Err(e) => Err(e.to_string()),
        };

        self.finish_attempt(id, outcome)
    }

    /// Record the attempt outcome on the job and publish progress.
    fn finish_attempt(
        &self,
        id: &str,
        outcome: Result<crate::core::types::ImagePayload, String>,
    ) -> JobOpResult<JobStatus> {
        let status = {
            let mut jobs = self.jobs.write();
            let Some(job) = jobs.iter_mut().find(|j| j.id == id) else {
                // Session was cleared while the attempt was in flight.
                warn!("job {id} vanished mid-attempt; dropping outcome");
                return Err(JobError::UnknownJob(id.to_string()));
            };
            match outcome {
                Ok(payload) => job.succeed(payload)?,
                Err(message) => job.fail(message)?,
            }
            job.status
        };
        self.publish_progress();
        if let Some(ref m) = self.metrics {
            m.record_job_outcome(status == JobStatus::Success);
        }
        Ok(status)
    }

    fn publish_progress(&self) {
        let progress = BatchProgress::derive(&self.jobs.read());
        self.progress.send_replace(progress);
    }
}
