/// Test Evaluator - Output Comparison and Verdicts
///
/// **Core Responsibility:**
/// Run each test through a [`CodeRunner`], compare normalized output with
/// the expected output, and aggregate per-test statuses into a verdict.
///
/// **Critical Properties:**
/// - Knows nothing about Docker
/// - Knows nothing about Redis or the queue
/// - Tests are independent; one outcome never influences another run
///
/// **Classification (per test):**
/// - exit status TLE/RTE → that status, whatever the output says
/// - normalized stdout == normalized expected → PASSED
/// - otherwise → WA
///
/// **Verdict:** ACCEPTED iff every test PASSED, else REJECTED.
///
/// **Normalization Rules:**
/// - Whitespace before the first / after the last content character: removed
/// - Trailing whitespace of every line: removed
/// - Leading whitespace of any later line: preserved
/// - Internal blank lines and case: preserved
/// - Non-empty result ends with exactly one `\n`

use crate::engine::{CodeRunner, ExitStatus, SandboxOutcome};
use judge_common::types::{TestCase, TestResult, TestStatus, Verdict};
use tracing::debug;

/// Normalize program output for comparison
pub fn normalize(output: &str) -> String {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let mut normalized = trimmed
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n");
    normalized.push('\n');
    normalized
}

/// Status of one test given the sandbox outcome and the expected output
pub fn classify(outcome: &SandboxOutcome, expected: &str) -> TestStatus {
    match outcome.exit_status {
        ExitStatus::TimeLimitExceeded => TestStatus::TimeLimitExceeded,
        ExitStatus::RuntimeError => TestStatus::RuntimeError,
        ExitStatus::Ok => {
            if normalize(&outcome.stdout) == normalize(expected) {
                TestStatus::Passed
            } else {
                TestStatus::WrongAnswer
            }
        }
    }
}

/// Verdict over a complete result list
pub fn aggregate(results: &[TestResult]) -> Verdict {
    if results.iter().all(|r| r.status == TestStatus::Passed) {
        Verdict::Accepted
    } else {
        Verdict::Rejected
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Judgement {
    pub verdict: Verdict,
    pub results: Vec<TestResult>,
}

/// Run `source_code` against every test in order and judge the outputs
pub async fn judge<R>(runner: &R, source_code: &str, tests: &[TestCase]) -> Judgement
where
    R: CodeRunner + ?Sized,
{
    let mut results = Vec::with_capacity(tests.len());

    for (idx, test) in tests.iter().enumerate() {
        let outcome = runner.execute(source_code, &test.input).await;
        let status = classify(&outcome, &test.output);

        debug!(test_index = idx, status = ?status, "Test judged");

        results.push(TestResult {
            test_index: idx as i64,
            status,
            stdout: outcome.stdout,
            stderr: outcome.stderr,
            expected: test.output.clone(),
        });
    }

    Judgement {
        verdict: aggregate(&results),
        results,
    }
}
