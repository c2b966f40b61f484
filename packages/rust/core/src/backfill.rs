//! Batch runner for offline backfill jobs.
//!
//! Loads candidate records from a [`RecordStore`], drives each one through a
//! [`RecordPipeline`] on the [`WorkerPool`], persists successes, and returns a
//! report. One record's failure never stops the batch.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, instrument, warn};

use noteforge_shared::{BackfillConfig, RecordFilter, Result, SourceRecord};

use crate::pipeline::{RecordPipeline, Stage, StageFailure};
use crate::pool::WorkerPool;
use crate::store::RecordStore;

// ---------------------------------------------------------------------------
// Job lifecycle
// ---------------------------------------------------------------------------

/// Lifecycle of one backfill job: pending → in-flight → a terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Pending,
    InFlight,
    Succeeded,
    /// `stage` is `None` when the job panicked outside any stage.
    Failed { stage: Option<Stage>, message: String },
    Skipped { reason: String },
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::InFlight)
    }
}

/// A batch-scoped unit of work for one record.
#[derive(Debug, Clone)]
pub struct BackfillJob {
    pub record: SourceRecord,
    pub state: JobState,
}

impl BackfillJob {
    pub fn new(record: SourceRecord) -> Self {
        Self {
            record,
            state: JobState::Pending,
        }
    }

    fn start(&mut self) {
        self.state = JobState::InFlight;
    }

    fn finish(&mut self, outcome: std::result::Result<(), StageFailure>) {
        self.state = match outcome {
            Ok(()) => JobState::Succeeded,
            Err(f) if f.is_skip() => JobState::Skipped {
                reason: f.error.to_string(),
            },
            Err(f) => JobState::Failed {
                stage: Some(f.stage),
                message: f.error.to_string(),
            },
        };
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// One failed record, with enough detail to diagnose it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFailure {
    pub record_id: String,
    /// `None` when the job panicked outside any stage.
    pub stage: Option<Stage>,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct BackfillReport {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub failures: Vec<JobFailure>,
    pub elapsed: Duration,
}

impl BackfillReport {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.skipped
    }

    fn record(&mut self, record_id: &str, state: &JobState) {
        match state {
            JobState::Succeeded => self.succeeded += 1,
            JobState::Skipped { .. } => self.skipped += 1,
            JobState::Failed { stage, message } => {
                self.failed += 1;
                self.failures.push(JobFailure {
                    record_id: record_id.to_string(),
                    stage: *stage,
                    message: message.clone(),
                });
            }
            JobState::Pending | JobState::InFlight => {
                self.failed += 1;
                self.failures.push(JobFailure {
                    record_id: record_id.to_string(),
                    stage: None,
                    message: "job did not finish".into(),
                });
            }
        }
    }
}

/// Progress callbacks for a backfill run.
pub trait BackfillProgress: Send + Sync {
    /// Called once candidates are loaded.
    fn started(&self, total: usize);
    /// Called as each job reaches a terminal state.
    fn job_finished(&self, record_id: &str, state: &JobState);
    /// Called when the run completes.
    fn done(&self, report: &BackfillReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl BackfillProgress for SilentProgress {
    fn started(&self, _total: usize) {}
    fn job_finished(&self, _record_id: &str, _state: &JobState) {}
    fn done(&self, _report: &BackfillReport) {}
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

pub struct BackfillRunner<S, P> {
    store: Arc<S>,
    pipeline: Arc<P>,
    pool: WorkerPool,
}

impl<S, P> BackfillRunner<S, P>
where
    S: RecordStore + 'static,
    P: RecordPipeline + 'static,
{
    pub fn new(store: Arc<S>, pipeline: Arc<P>, config: &BackfillConfig) -> Self {
        Self {
            store,
            pipeline,
            pool: WorkerPool::new(config.concurrency),
        }
    }

    /// Run every candidate matching `filter`. Fails only if candidates cannot
    /// be loaded.
    #[instrument(skip_all, fields(only_missing = filter.only_missing, limit = ?filter.limit))]
    pub async fn run(
        &self,
        filter: &RecordFilter,
        progress: Arc<dyn BackfillProgress>,
    ) -> Result<BackfillReport> {
        let start = Instant::now();
        let records = self.store.load_candidate_records(filter).await?;
        let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();

        info!(candidates = records.len(), "backfill starting");
        progress.started(records.len());

        let jobs: Vec<BackfillJob> = records.into_iter().map(BackfillJob::new).collect();
        let store = Arc::clone(&self.store);
        let pipeline = Arc::clone(&self.pipeline);
        let job_progress = Arc::clone(&progress);

        let outcomes = self
            .pool
            .run(jobs, move |mut job: BackfillJob| {
                let store = Arc::clone(&store);
                let pipeline = Arc::clone(&pipeline);
                let progress = Arc::clone(&job_progress);
                async move {
                    job.start();
                    let outcome = run_job(store.as_ref(), pipeline.as_ref(), &job.record).await;
                    job.finish(outcome);
                    progress.job_finished(&job.record.id, &job.state);
                    job
                }
            })
            .await;

        let mut report = BackfillReport::default();
        for (record_id, outcome) in ids.iter().zip(outcomes) {
            match outcome.into_result() {
                Ok(job) => {
                    if let JobState::Failed { stage, message } = &job.state {
                        warn!(%record_id, ?stage, %message, "record failed");
                    }
                    report.record(record_id, &job.state);
                }
                Err(panic) => {
                    warn!(%record_id, %panic, "record job panicked");
                    let state = JobState::Failed {
                        stage: None,
                        message: format!("panicked: {panic}"),
                    };
                    progress.job_finished(record_id, &state);
                    report.record(record_id, &state);
                }
            }
        }
        report.elapsed = start.elapsed();

        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            skipped = report.skipped,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "backfill finished"
        );
        progress.done(&report);
        Ok(report)
    }
}

async fn run_job<S: RecordStore, P: RecordPipeline>(
    store: &S,
    pipeline: &P,
    record: &SourceRecord,
) -> std::result::Result<(), StageFailure> {
    let artifacts = pipeline.process(record).await?;
    store
        .save_artifacts(&record.id, &artifacts)
        .await
        .map_err(|e| StageFailure::new(Stage::Persist, e))
}
