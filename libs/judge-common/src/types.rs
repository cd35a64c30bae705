use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Which slice of a problem's tests a job is judged against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    /// Public tests only (the "run" button)
    Public,
    /// Public tests followed by private tests (a real submission)
    All,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Public => write!(f, "public"),
            JobKind::All => write!(f, "all"),
        }
    }
}

/// Job envelope as it travels through the queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub kind: JobKind,
    pub problem_id: String,
    pub source_code: String,
}

impl Job {
    pub fn new(kind: JobKind, problem_id: impl Into<String>, source_code: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            problem_id: problem_id.into(),
            source_code: source_code.into(),
        }
    }

    pub fn to_envelope(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_envelope(payload: &str) -> serde_json::Result<Self> {
        serde_json::from_str(payload)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub input: String,
    pub output: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Problem {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub statement: String,
    #[serde(default)]
    pub constraints: String,
    #[serde(default)]
    pub public_tests: Vec<TestCase>,
    #[serde(default)]
    pub private_tests: Vec<TestCase>,
}

impl Problem {
    /// Resolve the ordered test set for a job kind
    pub fn tests_for(&self, kind: JobKind) -> Vec<TestCase> {
        match kind {
            JobKind::Public => self.public_tests.clone(),
            JobKind::All => self
                .public_tests
                .iter()
                .chain(self.private_tests.iter())
                .cloned()
                .collect(),
        }
    }

    pub fn summary(&self) -> ProblemSummary {
        ProblemSummary {
            id: self.id.clone(),
            title: self.title.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemSummary {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Accepted,
    Rejected,
    Error,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Accepted => "ACCEPTED",
            Verdict::Rejected => "REJECTED",
            Verdict::Error => "ERROR",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "ACCEPTED" => Some(Verdict::Accepted),
            "REJECTED" => Some(Verdict::Rejected),
            "ERROR" => Some(Verdict::Error),
            _ => None,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-test outcome code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestStatus {
    #[serde(rename = "PASSED")]
    Passed,
    #[serde(rename = "WA")]
    WrongAnswer,
    #[serde(rename = "TLE")]
    TimeLimitExceeded,
    #[serde(rename = "RTE")]
    RuntimeError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    /// Position in the resolved test set; -1 marks the synthetic job-error entry
    pub test_index: i64,
    pub status: TestStatus,
    pub stdout: String,
    pub stderr: String,
    pub expected: String,
}

impl TestResult {
    /// The single entry written when a job fails before or during judging
    pub fn job_error(diagnostic: impl Into<String>) -> Self {
        Self {
            test_index: -1,
            status: TestStatus::RuntimeError,
            stdout: String::new(),
            stderr: diagnostic.into(),
            expected: String::new(),
        }
    }
}

/// Current state of one submission as seen by pollers.
///
/// A `Done` record always carries its verdict and results; there is no way
/// to observe DONE with only part of the terminal fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultRecord {
    Pending,
    Done {
        verdict: Verdict,
        results: Vec<TestResult>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        finished_at: Option<DateTime<Utc>>,
    },
}

impl ResultRecord {
    pub fn is_done(&self) -> bool {
        matches!(self, ResultRecord::Done { .. })
    }

    pub fn verdict(&self) -> Option<Verdict> {
        match self {
            ResultRecord::Pending => None,
            ResultRecord::Done { verdict, .. } => Some(*verdict),
        }
    }
}
