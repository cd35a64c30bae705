/// Execution Engine - runs one program against one stdin payload
///
/// **Core Responsibility:**
/// Drive a [`SandboxProvider`] through one isolated run and reduce whatever
/// happens to a [`SandboxOutcome`].
///
/// **Critical Architectural Boundary:**
/// - Engine knows HOW to execute (through the provider)
/// - Engine does NOT compare outputs or decide verdicts
/// - Engine never returns an error: provisioning and communication
///   failures become an RTE outcome with a diagnostic in stderr
///
/// **Lifecycle per run:**
/// create → copy_in (source + stdin) → start → wait ≤ timeout →
/// kill on timeout → collect logs → destroy (on every path)

use crate::config::SandboxConfig;
use crate::sandbox::{SandboxError, SandboxFile, SandboxHandle, SandboxProvider, SandboxSpec};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Safety limits to prevent pathological inputs from reaching the sandbox
const MAX_SOURCE_CODE_BYTES: usize = 1024 * 1024; // 1MB
const MAX_TEST_INPUT_BYTES: usize = 10 * 1024 * 1024; // 10MB

/// Exit code reported for a run the engine had to kill (128 + SIGKILL)
pub const KILLED_EXIT_CODE: i64 = 137;
/// 128 + SIGTERM
pub const TERMINATED_EXIT_CODE: i64 = 143;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Ok,
    TimeLimitExceeded,
    RuntimeError,
}

/// Map a process exit code to an execution status.
///
/// Forced-kill codes read as TLE. A kernel OOM kill also surfaces as 137
/// and is therefore reported as TLE as well.
pub fn classify_exit_code(code: i64) -> ExitStatus {
    match code {
        0 => ExitStatus::Ok,
        KILLED_EXIT_CODE | TERMINATED_EXIT_CODE => ExitStatus::TimeLimitExceeded,
        _ => ExitStatus::RuntimeError,
    }
}

/// Raw result of one sandboxed run, consumed by the evaluator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxOutcome {
    pub exit_status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl SandboxOutcome {
    pub fn runner_error(err: impl std::fmt::Display) -> Self {
        Self {
            exit_status: ExitStatus::RuntimeError,
            stdout: String::new(),
            stderr: format!("Runner error: {}", err),
        }
    }
}

/// Anything that can run a submission against one stdin payload
#[async_trait]
pub trait CodeRunner: Send + Sync {
    async fn execute(&self, source_code: &str, stdin_data: &str) -> SandboxOutcome;
}

/// Cleanup guard - destroys the sandbox even if the run future is dropped.
///
/// The normal path calls [`SandboxGuard::release`]; `Drop` only fires when
/// the owning future was cancelled mid-run.
struct SandboxGuard<P: SandboxProvider> {
    provider: Arc<P>,
    sandbox: Option<SandboxHandle>,
}

impl<P: SandboxProvider> SandboxGuard<P> {
    fn new(provider: Arc<P>, sandbox: SandboxHandle) -> Self {
        Self {
            provider,
            sandbox: Some(sandbox),
        }
    }

    async fn release(mut self) {
        if let Some(sandbox) = self.sandbox.take() {
            if let Err(e) = self.provider.destroy(&sandbox).await {
                warn!(sandbox = %sandbox, error = %e, "Failed to destroy sandbox");
            }
        }
    }
}

impl<P: SandboxProvider> Drop for SandboxGuard<P> {
    fn drop(&mut self) {
        let Some(sandbox) = self.sandbox.take() else {
            return;
        };
        // Cannot be async in Drop
        let provider = self.provider.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = provider.destroy(&sandbox).await {
                        warn!(sandbox = %sandbox, error = %e, "Failed to destroy abandoned sandbox");
                    }
                });
            }
            Err(_) => warn!(sandbox = %sandbox, "No runtime left to destroy abandoned sandbox"),
        }
    }
}

/// Sandboxed executor with fixed limits, built once at startup
pub struct SandboxExecutor<P: SandboxProvider> {
    provider: Arc<P>,
    spec: SandboxSpec,
    source_path: String,
    stdin_path: String,
    timeout: Duration,
}

impl<P: SandboxProvider> SandboxExecutor<P> {
    pub fn new(provider: Arc<P>, config: &SandboxConfig) -> Self {
        Self {
            provider,
            spec: config.spec(),
            source_path: config.source_path.clone(),
            stdin_path: config.stdin_path.clone(),
            timeout: config.timeout(),
        }
    }

    fn files(&self, source_code: &str, stdin_data: &str) -> Vec<SandboxFile> {
        vec![
            SandboxFile::new(self.source_path.as_str(), source_code.as_bytes()),
            SandboxFile::new(self.stdin_path.as_str(), stdin_data.as_bytes()),
        ]
    }

    /// Everything between create and destroy; any error aborts the run
    async fn run_in(
        &self,
        sandbox: &SandboxHandle,
        files: &[SandboxFile],
    ) -> Result<SandboxOutcome, SandboxError> {
        self.provider.copy_in(sandbox, files).await?;
        self.provider.start(sandbox).await?;

        let started = Instant::now();
        let (exit_code, timed_out) =
            match tokio::time::timeout(self.timeout, self.provider.wait(sandbox)).await {
                Ok(waited) => (waited?, false),
                Err(_) => {
                    warn!(
                        sandbox = %sandbox,
                        timeout_ms = self.timeout.as_millis() as u64,
                        "Execution timed out - killing sandbox"
                    );
                    if let Err(e) = self.provider.kill(sandbox).await {
                        warn!(sandbox = %sandbox, error = %e, "Failed to kill timed-out sandbox");
                    }
                    (KILLED_EXIT_CODE, true)
                }
            };

        // Partial output is still collected after a kill
        let mut output = self.provider.collect_logs(sandbox).await?;
        if timed_out {
            output.stderr.push_str(&format!(
                "\n[Execution timed out after {}ms]",
                self.timeout.as_millis()
            ));
        }

        let exit_status = classify_exit_code(exit_code);
        debug!(
            sandbox = %sandbox,
            exit_code,
            status = ?exit_status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Sandbox run finished"
        );

        Ok(SandboxOutcome {
            exit_status,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

#[async_trait]
impl<P: SandboxProvider> CodeRunner for SandboxExecutor<P> {
    async fn execute(&self, source_code: &str, stdin_data: &str) -> SandboxOutcome {
        if source_code.len() > MAX_SOURCE_CODE_BYTES {
            return SandboxOutcome::runner_error(SandboxError::Rejected(format!(
                "Source code exceeds maximum size of {} bytes",
                MAX_SOURCE_CODE_BYTES
            )));
        }
        if stdin_data.len() > MAX_TEST_INPUT_BYTES {
            return SandboxOutcome::runner_error(SandboxError::Rejected(format!(
                "Test input exceeds maximum size of {} bytes",
                MAX_TEST_INPUT_BYTES
            )));
        }

        let sandbox = match self.provider.create(&self.spec).await {
            Ok(sandbox) => sandbox,
            Err(e) => {
                warn!(error = %e, "Sandbox creation failed");
                return SandboxOutcome::runner_error(e);
            }
        };
        let guard = SandboxGuard::new(self.provider.clone(), sandbox.clone());

        let files = self.files(source_code, stdin_data);
        let outcome = match self.run_in(&sandbox, &files).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(sandbox = %sandbox, error = %e, "Sandbox run failed");
                SandboxOutcome::runner_error(e)
            }
        };

        guard.release().await;
        outcome
    }
}
