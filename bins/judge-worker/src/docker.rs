// Docker sandbox backend using Bollard
//
// Containers are created with networking disabled, memory (no swap), pids
// and CPU limits, no-new-privileges and every capability dropped. Files go
// in as an in-memory tar uploaded through the API; nothing is bind-mounted.

use crate::sandbox::{
    CapturedOutput, SandboxError, SandboxFile, SandboxHandle, SandboxProvider, SandboxSpec,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, KillContainerOptions, LogOutput, LogsOptions,
    RemoveContainerOptions, StartContainerOptions, UploadToContainerOptions, WaitContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::image::CreateImageOptions;
use bollard::models::HostConfig;
use bollard::Docker;
use futures_util::stream::StreamExt;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Per-stream cap on captured program output (matches the stdin guard)
pub const MAX_CAPTURED_BYTES: usize = 10 * 1024 * 1024;

/// Bounded buffer for one output stream
#[derive(Debug, Default)]
struct BoundedBuffer {
    bytes: Vec<u8>,
    dropped: usize,
}

impl BoundedBuffer {
    fn push(&mut self, chunk: &[u8], limit: usize) {
        let room = limit.saturating_sub(self.bytes.len());
        let taken = room.min(chunk.len());
        self.bytes.extend_from_slice(&chunk[..taken]);
        self.dropped += chunk.len() - taken;
    }

    fn is_full(&self, limit: usize) -> bool {
        self.bytes.len() >= limit
    }

    fn into_text(self, limit: usize) -> String {
        let mut text = String::from_utf8_lossy(&self.bytes).into_owned();
        if self.dropped > 0 {
            text.push_str(&format!("\n[Output truncated after {} bytes]", limit));
        }
        text
    }
}

/// Demultiplexed stdout/stderr, each capped at `limit` bytes
#[derive(Debug)]
pub struct LogCapture {
    limit: usize,
    stdout: BoundedBuffer,
    stderr: BoundedBuffer,
}

impl LogCapture {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            stdout: BoundedBuffer::default(),
            stderr: BoundedBuffer::default(),
        }
    }

    pub fn push(&mut self, chunk: LogOutput) {
        match chunk {
            LogOutput::StdOut { message } => self.stdout.push(&message, self.limit),
            LogOutput::StdErr { message } => self.stderr.push(&message, self.limit),
            _ => {}
        }
    }

    /// Nothing more can be kept once both streams hit the cap
    pub fn is_full(&self) -> bool {
        self.stdout.is_full(self.limit) && self.stderr.is_full(self.limit)
    }

    pub fn finish(self) -> CapturedOutput {
        CapturedOutput {
            stdout: self.stdout.into_text(self.limit),
            stderr: self.stderr.into_text(self.limit),
        }
    }
}

/// Build an uncompressed tar holding `files`, rooted at `/`.
///
/// Parent directories get explicit entries so the upload does not depend on
/// the image already having them.
pub fn build_archive(files: &[SandboxFile]) -> std::io::Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());

    let mut dirs = BTreeSet::new();
    for file in files {
        let relative = file.path.trim_start_matches('/');
        let mut prefix = String::new();
        let components: Vec<&str> = relative.split('/').collect();
        for component in &components[..components.len().saturating_sub(1)] {
            prefix.push_str(component);
            prefix.push('/');
            dirs.insert(prefix.clone());
        }
    }

    for dir in &dirs {
        // /tmp already exists with the sticky bit; leave it alone
        if dir == "tmp/" {
            continue;
        }
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Directory);
        header.set_size(0);
        header.set_mode(0o755);
        header.set_cksum();
        builder.append_data(&mut header, dir, std::io::empty())?;
    }

    for file in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(file.contents.len() as u64);
        header.set_mode(file.mode);
        header.set_cksum();
        builder.append_data(
            &mut header,
            file.path.trim_start_matches('/'),
            file.contents.as_slice(),
        )?;
    }

    builder.into_inner()
}

/// Docker-backed sandbox provider
///
/// **Docker Execution Rules:**
/// 1. One container per run, named `judge-sandbox-<uuid>`
/// 2. Network disabled (`network_mode: none`)
/// 3. Memory, swap, pids and CPU limits from the worker config
/// 4. Source and stdin uploaded as a tar archive, never bind-mounted
/// 5. Force-removed by the executor after every run
#[derive(Clone)]
pub struct DockerProvider {
    docker: Docker,
}

impl DockerProvider {
    /// Connect to the local Docker daemon and verify it answers
    pub async fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .context("Failed to connect to Docker daemon")?;
        docker.ping().await.context("Failed to ping Docker daemon")?;
        info!("Connected to Docker daemon");
        Ok(Self { docker })
    }

    /// Ensure the sandbox image is available locally (pull if needed)
    pub async fn ensure_image(&self, image: &str) -> Result<()> {
        if self.docker.inspect_image(image).await.is_ok() {
            debug!(image = %image, "Image cache hit");
            return Ok(());
        }

        warn!(image = %image, "Image cache miss - pulling now");

        let options = Some(CreateImageOptions {
            from_image: image,
            ..Default::default()
        });

        let mut stream = self.docker.create_image(options, None, None);
        while let Some(result) = stream.next().await {
            result.context("Failed to pull Docker image")?;
        }

        info!(image = %image, "Image pulled successfully");
        Ok(())
    }
}

#[async_trait]
impl SandboxProvider for DockerProvider {
    async fn create(&self, spec: &SandboxSpec) -> Result<SandboxHandle, SandboxError> {
        let container_name = format!("judge-sandbox-{}", uuid::Uuid::new_v4());

        let config = Config {
            image: Some(spec.image.clone()),
            cmd: Some(spec.command.clone()),
            working_dir: Some(spec.working_dir.clone()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            open_stdin: Some(false),
            tty: Some(false),
            network_disabled: Some(spec.limits.network_disabled),
            host_config: Some(HostConfig {
                memory: Some(spec.limits.memory_bytes),
                // Same value as memory: no swap on top of the ceiling
                memory_swap: Some(spec.limits.memory_bytes),
                pids_limit: Some(spec.limits.pids_limit),
                nano_cpus: Some(spec.limits.nano_cpus),
                network_mode: Some("none".to_string()),
                security_opt: Some(vec!["no-new-privileges:true".to_string()]),
                cap_drop: Some(vec!["ALL".to_string()]),
                ..Default::default()
            }),
            ..Default::default()
        };

        let create_options = CreateContainerOptions {
            name: container_name.as_str(),
            platform: None,
        };

        let container = self
            .docker
            .create_container(Some(create_options), config)
            .await
            .map_err(|e| SandboxError::backend("create", e))?;

        debug!(container_id = %container.id, name = %container_name, "Container created");
        Ok(SandboxHandle(container.id))
    }

    async fn copy_in(&self, sandbox: &SandboxHandle, files: &[SandboxFile]) -> Result<(), SandboxError> {
        let archive = build_archive(files)?;

        let options = UploadToContainerOptions {
            path: "/",
            ..Default::default()
        };

        self.docker
            .upload_to_container(&sandbox.0, Some(options), archive.into())
            .await
            .map_err(|e| SandboxError::backend("copy files into", e))
    }

    async fn start(&self, sandbox: &SandboxHandle) -> Result<(), SandboxError> {
        self.docker
            .start_container(&sandbox.0, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| SandboxError::backend("start", e))
    }

    async fn wait(&self, sandbox: &SandboxHandle) -> Result<i64, SandboxError> {
        let options = WaitContainerOptions {
            condition: "not-running",
        };

        let mut stream = self.docker.wait_container(&sandbox.0, Some(options));
        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // Bollard reports a non-zero exit as an error carrying the code
            Some(Err(DockerError::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(SandboxError::backend("wait for", e)),
            None => Err(SandboxError::backend("wait for", "no wait response from container")),
        }
    }

    async fn kill(&self, sandbox: &SandboxHandle) -> Result<(), SandboxError> {
        self.docker
            .kill_container(&sandbox.0, Some(KillContainerOptions { signal: "SIGKILL" }))
            .await
            .map_err(|e| SandboxError::backend("kill", e))
    }

    async fn collect_logs(&self, sandbox: &SandboxHandle) -> Result<CapturedOutput, SandboxError> {
        let options = Some(LogsOptions::<String> {
            stdout: true,
            stderr: true,
            follow: false,
            ..Default::default()
        });

        let mut capture = LogCapture::new(MAX_CAPTURED_BYTES);
        let mut stream = self.docker.logs(&sandbox.0, options);
        while let Some(chunk) = stream.next().await {
            capture.push(chunk.map_err(|e| SandboxError::backend("read logs from", e))?);
            if capture.is_full() {
                debug!(sandbox = %sandbox, "Output cap reached on both streams, skipping the rest");
                break;
            }
        }
        Ok(capture.finish())
    }

    async fn destroy(&self, sandbox: &SandboxHandle) -> Result<(), SandboxError> {
        let options = RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };

        self.docker
            .remove_container(&sandbox.0, Some(options))
            .await
            .map_err(|e| SandboxError::backend("destroy", e))
    }
}
