/// Sandbox Provider - the isolation capability behind the executor
///
/// **Core Responsibility:**
/// Own the lifecycle of one ephemeral, resource-bounded environment:
/// create → copy_in → start → wait / kill → collect_logs → destroy.
///
/// **Boundary:**
/// - Providers know nothing about tests, verdicts or the queue
/// - The executor drives the lifecycle and guarantees `destroy`
/// - Docker is one backend (docker.rs); a microVM or user-space kernel
///   backend only has to implement this trait
use async_trait::async_trait;
use std::fmt;

/// Opaque id of a created sandbox (container id for Docker)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SandboxHandle(pub String);

impl fmt::Display for SandboxHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceLimits {
    pub memory_bytes: i64,
    pub pids_limit: i64,
    /// CPU quota in units of 1e-9 CPUs
    pub nano_cpus: i64,
    pub network_disabled: bool,
}

/// Everything a provider needs to create a sandbox
#[derive(Debug, Clone)]
pub struct SandboxSpec {
    pub image: String,
    pub command: Vec<String>,
    pub working_dir: String,
    pub limits: ResourceLimits,
}

/// A file injected into the sandbox before start
#[derive(Debug, Clone)]
pub struct SandboxFile {
    /// Absolute path inside the sandbox
    pub path: String,
    pub contents: Vec<u8>,
    pub mode: u32,
}

impl SandboxFile {
    pub fn new(path: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            contents: contents.into(),
            mode: 0o644,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("failed to {op} sandbox: {message}")]
    Backend { op: &'static str, message: String },

    #[error("failed to build sandbox archive: {0}")]
    Archive(#[from] std::io::Error),

    #[error("{0}")]
    Rejected(String),
}

impl SandboxError {
    pub fn backend(op: &'static str, err: impl fmt::Display) -> Self {
        SandboxError::Backend {
            op,
            message: err.to_string(),
        }
    }
}

#[async_trait]
pub trait SandboxProvider: Send + Sync + 'static {
    async fn create(&self, spec: &SandboxSpec) -> Result<SandboxHandle, SandboxError>;

    /// Transfer files into the sandbox without any host-shared path
    async fn copy_in(&self, sandbox: &SandboxHandle, files: &[SandboxFile]) -> Result<(), SandboxError>;

    async fn start(&self, sandbox: &SandboxHandle) -> Result<(), SandboxError>;

    /// Block until the program exits; returns its exit code.
    /// Unbounded - the executor applies the wall-clock limit.
    async fn wait(&self, sandbox: &SandboxHandle) -> Result<i64, SandboxError>;

    /// Forcibly terminate the program (SIGKILL semantics)
    async fn kill(&self, sandbox: &SandboxHandle) -> Result<(), SandboxError>;

    async fn collect_logs(&self, sandbox: &SandboxHandle) -> Result<CapturedOutput, SandboxError>;

    /// Remove the sandbox and everything in it
    async fn destroy(&self, sandbox: &SandboxHandle) -> Result<(), SandboxError>;
}
