/// Job Executor - High-Level Orchestration
///
/// **Responsibility:**
/// Turn one received job into a judgement: resolve its tests from the
/// problem store, then hand them to the evaluator.
///
/// **Architecture:**
/// 1. Load the problem and select public or public + private tests
/// 2. Judge the submission through any [`CodeRunner`] (evaluator.rs)
/// 3. Return the verdict and per-test results
///
/// This module is the glue layer - it knows nothing about:
/// - How code executes (engine's job)
/// - How outputs are compared (evaluator's job)
/// - Where results are written (worker loop's job)

use crate::engine::CodeRunner;
use crate::evaluator::{self, Judgement};
use judge_common::problems::{ProblemError, ProblemStore};
use judge_common::types::{Job, TestResult, Verdict};

/// Job-level failure; recorded as `verdict=ERROR`, never propagated further
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error(transparent)]
    Problem(#[from] ProblemError),

    #[error("Job aborted: {0}")]
    Panicked(String),

    #[error("Malformed job envelope: {0}")]
    Envelope(#[from] serde_json::Error),
}

impl JobError {
    /// The ERROR judgement carrying this failure as its only result
    pub fn into_judgement(self) -> Judgement {
        Judgement {
            verdict: Verdict::Error,
            results: vec![TestResult::job_error(self.to_string())],
        }
    }
}

/// RESOLVING_TESTS then JUDGING for one job
pub async fn execute_job<R>(
    job: &Job,
    problems: &ProblemStore,
    runner: &R,
) -> Result<Judgement, JobError>
where
    R: CodeRunner + ?Sized,
{
    let problem = problems.load_problem(&job.problem_id)?;
    let tests = problem.tests_for(job.kind);

    tracing::info!(
        job_id = %job.id,
        problem_id = %problem.id,
        kind = %job.kind,
        test_count = tests.len(),
        "Tests resolved"
    );

    if tests.is_empty() {
        tracing::warn!(
            job_id = %job.id,
            problem_id = %problem.id,
            "Problem has no tests for this job kind; verdict is vacuously ACCEPTED"
        );
    }

    Ok(evaluator::judge(runner, &job.source_code, &tests).await)
}
