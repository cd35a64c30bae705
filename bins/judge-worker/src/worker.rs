/// Worker Loop - pop, judge, record, repeat
///
/// Per job: RECEIVED → RESOLVING_TESTS → JUDGING → WRITING_RESULT.
///
/// Nothing a single job does can stop the loop: job-level failures and
/// panics become an ERROR record, and a failed terminal write is logged and
/// skipped. Only a queue that keeps failing or the shutdown signal ends
/// [`Worker::run`]; on shutdown the in-flight job is finished first.

use crate::config::WorkerConfig;
use crate::engine::CodeRunner;
use crate::evaluator::Judgement;
use crate::executor::{self, JobError};
use futures_util::FutureExt;
use judge_common::problems::ProblemStore;
use judge_common::store::{JobStore, StoreError};
use judge_common::types::{Job, Verdict};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub pop_timeout: Duration,
    pub max_consecutive_queue_errors: u32,
    pub queue_error_backoff: Duration,
}

impl From<&WorkerConfig> for WorkerSettings {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            pop_timeout: config.pop_timeout(),
            max_consecutive_queue_errors: config.max_consecutive_queue_errors,
            queue_error_backoff: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Queue unavailable after {attempts} consecutive failures: {source}")]
    QueueUnavailable { attempts: u32, source: StoreError },
}

/// What one iteration of the loop did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Pop timed out with nothing queued
    Idle,
    /// A record was (or was attempted to be) written for this job
    Processed { job_id: Uuid, verdict: Verdict },
    /// Payload carried no usable id; nothing could be recorded
    Dropped,
}

pub struct Worker {
    store: Arc<dyn JobStore>,
    problems: ProblemStore,
    runner: Arc<dyn CodeRunner>,
    settings: WorkerSettings,
}

impl Worker {
    pub fn new(
        store: Arc<dyn JobStore>,
        problems: ProblemStore,
        runner: Arc<dyn CodeRunner>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            store,
            problems,
            runner,
            settings,
        }
    }

    /// Consume jobs until `shutdown` turns true or the queue fails too many
    /// times in a row. The signal is only checked between iterations, so a
    /// job that was popped always runs to its terminal record.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), WorkerError> {
        info!(
            pop_timeout_secs = self.settings.pop_timeout.as_secs(),
            problems_dir = %self.problems.dir().display(),
            "Worker loop started"
        );

        let mut consecutive_errors = 0u32;
        loop {
            if *shutdown.borrow() {
                info!("Shutdown requested, worker loop stopped");
                return Ok(());
            }

            match self.run_once().await {
                Ok(_) => consecutive_errors = 0,
                Err(e) => {
                    consecutive_errors += 1;
                    error!(error = %e, consecutive_errors, "Queue error");
                    if consecutive_errors >= self.settings.max_consecutive_queue_errors {
                        return Err(WorkerError::QueueUnavailable {
                            attempts: consecutive_errors,
                            source: e,
                        });
                    }
                    tokio::select! {
                        _ = tokio::time::sleep(self.settings.queue_error_backoff) => {}
                        Ok(()) = shutdown.changed() => {}
                    }
                }
            }
        }
    }

    /// One bounded pop and, if a job arrived, its full processing.
    /// Only the pop itself can fail.
    pub async fn run_once(&self) -> Result<Step, StoreError> {
        let Some(payload) = self.store.pop(self.settings.pop_timeout).await? else {
            return Ok(Step::Idle);
        };

        let step = match Job::from_envelope(&payload) {
            Ok(job) => {
                info!(
                    job_id = %job.id,
                    problem_id = %job.problem_id,
                    kind = %job.kind,
                    source_size = job.source_code.len(),
                    "Received job"
                );
                self.process(&job).await
            }
            Err(e) => self.reject_envelope(&payload, e).await,
        };
        Ok(step)
    }

    #[instrument(skip_all, fields(job_id = %job.id, problem_id = %job.problem_id, kind = %job.kind))]
    async fn process(&self, job: &Job) -> Step {
        let started = Instant::now();

        let attempt = AssertUnwindSafe(executor::execute_job(
            job,
            &self.problems,
            self.runner.as_ref(),
        ))
        .catch_unwind()
        .await;

        let judgement = match attempt {
            Ok(Ok(judgement)) => judgement,
            Ok(Err(e)) => {
                warn!(error = %e, "Job failed");
                e.into_judgement()
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(panic = %message, "Job panicked");
                JobError::Panicked(message).into_judgement()
            }
        };

        info!(
            verdict = %judgement.verdict,
            tests = judgement.results.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Execution completed"
        );
        for result in &judgement.results {
            debug!(test_index = result.test_index, status = ?result.status, "Test result");
        }

        self.record(job.id, judgement).await
    }

    /// A payload that is not a valid job. If an id can still be read the
    /// submitter gets an ERROR record instead of a forever-PENDING one.
    async fn reject_envelope(&self, payload: &str, err: serde_json::Error) -> Step {
        let id = serde_json::from_str::<serde_json::Value>(payload)
            .ok()
            .and_then(|value| value.get("id")?.as_str()?.parse::<Uuid>().ok());

        match id {
            Some(id) => {
                warn!(job_id = %id, error = %err, "Malformed job envelope");
                self.record(id, JobError::Envelope(err).into_judgement()).await
            }
            None => {
                error!(error = %err, payload_size = payload.len(), "Dropping job envelope without an id");
                Step::Dropped
            }
        }
    }

    /// WRITING_RESULT; a failure here is logged and the loop goes on
    async fn record(&self, job_id: Uuid, judgement: Judgement) -> Step {
        match self
            .store
            .complete(&job_id, judgement.verdict, &judgement.results)
            .await
        {
            Ok(()) => info!(job_id = %job_id, "Result persisted"),
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Failed to persist result");
                // Non-fatal - worker continues, record stays PENDING
            }
        }

        Step::Processed {
            job_id,
            verdict: judgement.verdict,
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
