// CLI commands for operating the judge
use anyhow::{bail, Context, Result};
use judge_common::problems::{ProblemError, ProblemStore};
use judge_common::redis::RedisStore;
use judge_common::store::{self, JobStore};
use judge_common::types::{JobKind, Problem, ResultRecord, TestStatus};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

const MAX_SOURCE_CODE_BYTES: u64 = 1024 * 1024;
const POLL_INTERVAL: Duration = Duration::from_millis(500);
/// Output longer than this is cut in the result table
const PREVIEW_CHARS: usize = 200;

pub async fn connect(redis_url: &str) -> Result<RedisStore> {
    RedisStore::connect(redis_url)
        .await
        .with_context(|| format!("Failed to connect to Redis at {}", redis_url))
}

/// List every problem in the problem directory
pub fn list_problems(problems: &ProblemStore) -> Result<()> {
    let listed = problems.list_problems()?;

    if listed.is_empty() {
        println!("No problems found in {}", problems.dir().display());
        return Ok(());
    }

    println!("📋 Problems:\n");
    println!("{:<24} {}", "ID", "TITLE");
    println!("{}", "─".repeat(60));
    for problem in &listed {
        println!("{:<24} {}", problem.id, problem.title);
    }
    println!("\n✅ Total: {} problem(s)", listed.len());
    Ok(())
}

/// Print the solver-facing view of a problem
pub fn show_problem(problems: &ProblemStore, id: &str) -> Result<()> {
    let problem = problems.load_problem(id)?;
    print!("{}", render_problem(&problem));
    Ok(())
}

/// Solver-facing rendering of a problem; private tests are only counted
struct ProblemView<'a>(&'a Problem);

impl fmt::Display for ProblemView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let problem = self.0;
        writeln!(f, "{} ({})", problem.title, problem.id)?;
        writeln!(f, "{}", "═".repeat(60))?;
        if !problem.statement.is_empty() {
            writeln!(f, "\n{}", problem.statement.trim_end())?;
        }
        if !problem.constraints.is_empty() {
            writeln!(f, "\nConstraints:\n{}", problem.constraints.trim_end())?;
        }
        for (idx, test) in problem.public_tests.iter().enumerate() {
            writeln!(f, "\nExample {}:", idx + 1)?;
            writeln!(f, "  Input:\n{}", indent(&test.input))?;
            writeln!(f, "  Output:\n{}", indent(&test.output))?;
        }
        writeln!(
            f,
            "\n{} public test(s), {} private test(s)",
            problem.public_tests.len(),
            problem.private_tests.len()
        )
    }
}

fn render_problem(problem: &Problem) -> String {
    ProblemView(problem).to_string()
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|line| format!("    {}", line))
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub file: PathBuf,
    pub severity: Severity,
    pub message: String,
}

/// Problems a judge operator should hear about before solvers do
pub fn check_problems(scanned: Vec<(PathBuf, Result<Problem, ProblemError>)>) -> Vec<Issue> {
    let mut issues = Vec::new();
    let mut seen: HashMap<String, PathBuf> = HashMap::new();

    for (file, parsed) in scanned {
        let problem = match parsed {
            Ok(problem) => problem,
            Err(e) => {
                issues.push(Issue {
                    file,
                    severity: Severity::Error,
                    message: e.to_string(),
                });
                continue;
            }
        };

        let mut issue = |severity, message: String| {
            issues.push(Issue {
                file: file.clone(),
                severity,
                message,
            })
        };

        if problem.id.trim().is_empty() {
            issue(Severity::Error, "Problem id is empty".to_string());
        }
        if let Some(first) = seen.get(&problem.id) {
            issue(
                Severity::Error,
                format!("Duplicate id '{}' (also in {})", problem.id, first.display()),
            );
        }
        if problem.public_tests.is_empty() {
            // A run against zero tests would be ACCEPTED for any program
            issue(Severity::Error, "No public tests".to_string());
        }
        if problem.private_tests.is_empty() {
            issue(Severity::Warning, "No private tests".to_string());
        }
        if problem.title.trim().is_empty() {
            issue(Severity::Warning, "Title is empty".to_string());
        }

        seen.entry(problem.id).or_insert(file);
    }

    issues
}

/// Validate every problem file; fails when any error is found
pub fn validate_problems(problems: &ProblemStore) -> Result<()> {
    let scanned = problems.scan()?;
    let total = scanned.len();
    println!("🔍 Validating {} problem file(s) in {}...\n", total, problems.dir().display());

    let issues = check_problems(scanned);
    let errors = issues.iter().filter(|i| i.severity == Severity::Error).count();

    for issue in &issues {
        let marker = match issue.severity {
            Severity::Error => "❌",
            Severity::Warning => "⚠️ ",
        };
        println!("{} {}: {}", marker, issue.file.display(), issue.message);
    }

    if errors > 0 {
        bail!("{} error(s) in problem definitions", errors);
    }

    println!("\n✅ All {} problem(s) are valid", total);
    Ok(())
}

/// Queue a submission and optionally wait for its result
pub async fn submit<S>(
    store: &S,
    problems: &ProblemStore,
    problem_id: &str,
    file: &Path,
    all: bool,
    wait: Option<Duration>,
) -> Result<Uuid>
where
    S: JobStore + ?Sized,
{
    // Fail before queueing anything the worker can only reject
    problems.load_problem(problem_id)?;

    let size = fs::metadata(file)
        .with_context(|| format!("Failed to read {}", file.display()))?
        .len();
    if size > MAX_SOURCE_CODE_BYTES {
        bail!(
            "{} is {} bytes; the limit is {} bytes",
            file.display(),
            size,
            MAX_SOURCE_CODE_BYTES
        );
    }
    let source_code = fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let kind = if all { JobKind::All } else { JobKind::Public };
    let id = store::enqueue(store, kind, problem_id, &source_code).await?;
    println!("🚀 Submitted {} ({} tests): {}", problem_id, kind, id);

    if let Some(timeout) = wait {
        println!("⏳ Waiting for result...");
        let record = wait_for_result(store, &id, timeout, POLL_INTERVAL).await?;
        print!("{}", render_record(&id, Some(&record)));
    }

    Ok(id)
}

/// Poll until the record is DONE or `timeout` elapses
pub async fn wait_for_result<S>(
    store: &S,
    id: &Uuid,
    timeout: Duration,
    interval: Duration,
) -> Result<ResultRecord>
where
    S: JobStore + ?Sized,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        match store::poll(store, id).await? {
            Some(record @ ResultRecord::Done { .. }) => return Ok(record),
            Some(ResultRecord::Pending) => {}
            None => bail!("Unknown submission id: {}", id),
        }
        if tokio::time::Instant::now() + interval > deadline {
            bail!(
                "Submission {} still PENDING after {}s",
                id,
                timeout.as_secs()
            );
        }
        tokio::time::sleep(interval).await;
    }
}

pub async fn show_result<S>(store: &S, raw_id: &str) -> Result<()>
where
    S: JobStore + ?Sized,
{
    let id = Uuid::parse_str(raw_id).with_context(|| format!("Invalid submission id: {}", raw_id))?;
    let record = store::poll(store, &id).await?;
    print!("{}", render_record(&id, record.as_ref()));
    Ok(())
}

struct RecordView<'a> {
    id: &'a Uuid,
    record: Option<&'a ResultRecord>,
}

impl fmt::Display for RecordView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = self.id;
        let (verdict, results, finished_at) = match self.record {
            None => return writeln!(f, "❓ {}: UNKNOWN (no such submission id)", id),
            Some(ResultRecord::Pending) => return writeln!(f, "⏳ {}: PENDING", id),
            Some(ResultRecord::Done {
                verdict,
                results,
                finished_at,
            }) => (verdict, results, finished_at),
        };

        write!(f, "📊 {}: {}", id, verdict)?;
        if let Some(at) = finished_at {
            write!(f, " (finished {})", at.to_rfc3339())?;
        }
        writeln!(f)?;

        let passed = results
            .iter()
            .filter(|r| r.status == TestStatus::Passed)
            .count();
        writeln!(f, "   {}/{} test(s) passed\n", passed, results.len())?;

        for result in results {
            let marker = if result.status == TestStatus::Passed { "✅" } else { "❌" };
            writeln!(f, "{} #{:<3} {:?}", marker, result.test_index, result.status)?;
            if result.status == TestStatus::Passed {
                continue;
            }
            if !result.expected.is_empty() {
                writeln!(f, "     expected: {}", preview(&result.expected))?;
            }
            if !result.stdout.is_empty() {
                writeln!(f, "     stdout:   {}", preview(&result.stdout))?;
            }
            if !result.stderr.is_empty() {
                writeln!(f, "     stderr:   {}", preview(&result.stderr))?;
            }
        }
        Ok(())
    }
}

pub fn render_record(id: &Uuid, record: Option<&ResultRecord>) -> String {
    RecordView { id, record }.to_string()
}

fn preview(text: &str) -> String {
    let flat = text.trim_end().replace('\n', "⏎");
    if flat.chars().count() > PREVIEW_CHARS {
        let cut: String = flat.chars().take(PREVIEW_CHARS).collect();
        format!("{}…", cut)
    } else {
        flat
    }
}
