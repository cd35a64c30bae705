/// Integration tests for the Docker sandbox
///
/// These tests run real containers from the default sandbox image:
/// 1. A correct program is accepted
/// 2. A sleeping program hits the time limit and its container is removed
/// 3. An unhandled exception is a runtime error with a traceback
/// 4. Outbound network access fails inside the sandbox

#[cfg(test)]
mod docker_sandbox_tests {
    use crate::config::SandboxConfig;
    use crate::docker::DockerProvider;
    use crate::engine::{CodeRunner, ExitStatus, SandboxExecutor};
    use crate::evaluator::judge;
    use crate::sandbox::{
        CapturedOutput, SandboxError, SandboxFile, SandboxHandle, SandboxProvider, SandboxSpec,
    };
    use async_trait::async_trait;
    use bollard::Docker;
    use judge_common::types::{TestCase, TestStatus, Verdict};
    use std::sync::{Arc, Mutex};

    /// Docker provider that remembers every sandbox it created
    struct RecordingProvider {
        inner: DockerProvider,
        created: Mutex<Vec<SandboxHandle>>,
    }

    #[async_trait]
    impl SandboxProvider for RecordingProvider {
        async fn create(&self, spec: &SandboxSpec) -> Result<SandboxHandle, SandboxError> {
            let handle = self.inner.create(spec).await?;
            self.created.lock().unwrap().push(handle.clone());
            Ok(handle)
        }

        async fn copy_in(&self, sandbox: &SandboxHandle, files: &[SandboxFile]) -> Result<(), SandboxError> {
            self.inner.copy_in(sandbox, files).await
        }

        async fn start(&self, sandbox: &SandboxHandle) -> Result<(), SandboxError> {
            self.inner.start(sandbox).await
        }

        async fn wait(&self, sandbox: &SandboxHandle) -> Result<i64, SandboxError> {
            self.inner.wait(sandbox).await
        }

        async fn kill(&self, sandbox: &SandboxHandle) -> Result<(), SandboxError> {
            self.inner.kill(sandbox).await
        }

        async fn collect_logs(&self, sandbox: &SandboxHandle) -> Result<CapturedOutput, SandboxError> {
            self.inner.collect_logs(sandbox).await
        }

        async fn destroy(&self, sandbox: &SandboxHandle) -> Result<(), SandboxError> {
            self.inner.destroy(sandbox).await
        }
    }

    async fn executor(config: &SandboxConfig) -> (Arc<RecordingProvider>, SandboxExecutor<RecordingProvider>) {
        let inner = DockerProvider::connect()
            .await
            .expect("Failed to connect to Docker");
        inner
            .ensure_image(&config.image)
            .await
            .expect("Failed to pull sandbox image");

        let provider = Arc::new(RecordingProvider {
            inner,
            created: Mutex::new(Vec::new()),
        });
        let executor = SandboxExecutor::new(provider.clone(), config);
        (provider, executor)
    }

    async fn assert_all_removed(provider: &RecordingProvider) {
        let docker = Docker::connect_with_local_defaults().unwrap();
        let created = provider.created.lock().unwrap().clone();
        assert!(!created.is_empty(), "No sandbox was created");
        for handle in created {
            assert!(
                docker.inspect_container(&handle.0, None).await.is_err(),
                "Container {} was not removed",
                handle
            );
        }
    }

    #[tokio::test]
    #[ignore] // Requires Docker
    async fn test_two_sum_is_accepted() {
        let (provider, executor) = executor(&SandboxConfig::default()).await;

        let source = r#"
nums = list(map(int, input().split()))
target = int(input())
seen = {}
for i, n in enumerate(nums):
    if target - n in seen:
        print(seen[target - n], i)
        break
    seen[n] = i
"#;
        let tests = vec![
            TestCase {
                input: "2 7 11 15\n9\n".to_string(),
                output: "0 1\n".to_string(),
            },
            TestCase {
                input: "3 2 4\n6\n".to_string(),
                output: "1 2\n".to_string(),
            },
        ];

        let judgement = judge(&executor, source, &tests).await;

        assert_eq!(judgement.verdict, Verdict::Accepted, "{:?}", judgement.results);
        assert_all_removed(&provider).await;
    }

    #[tokio::test]
    #[ignore] // Requires Docker
    async fn test_sleep_past_limit_is_tle_and_container_removed() {
        let config = SandboxConfig {
            timeout_ms: 1000,
            ..SandboxConfig::default()
        };
        let (provider, executor) = executor(&config).await;

        let started = std::time::Instant::now();
        let outcome = executor
            .execute("import time\ntime.sleep(30)\nprint('late')", "")
            .await;

        assert_eq!(outcome.exit_status, ExitStatus::TimeLimitExceeded);
        assert!(outcome.stderr.contains("[Execution timed out after 1000ms]"));
        assert!(!outcome.stdout.contains("late"));
        assert!(started.elapsed() < std::time::Duration::from_secs(20));
        assert_all_removed(&provider).await;
    }

    #[tokio::test]
    #[ignore] // Requires Docker
    async fn test_unhandled_exception_is_runtime_error() {
        let (provider, executor) = executor(&SandboxConfig::default()).await;

        let judgement = judge(
            &executor,
            "raise ValueError('boom')",
            &[TestCase {
                input: String::new(),
                output: "anything\n".to_string(),
            }],
        )
        .await;

        assert_eq!(judgement.verdict, Verdict::Rejected);
        assert_eq!(judgement.results[0].status, TestStatus::RuntimeError);
        assert!(judgement.results[0].stderr.contains("ValueError"));
        assert_all_removed(&provider).await;
    }

    #[tokio::test]
    #[ignore] // Requires Docker
    async fn test_network_is_unreachable() {
        let (_provider, executor) = executor(&SandboxConfig::default()).await;

        let source = r#"
import socket
try:
    socket.create_connection(("1.1.1.1", 53), timeout=1)
    print("connected")
except OSError:
    print("blocked")
"#;
        let outcome = executor.execute(source, "").await;

        assert_eq!(outcome.exit_status, ExitStatus::Ok, "{}", outcome.stderr);
        assert_eq!(outcome.stdout.trim(), "blocked");
    }

    #[tokio::test]
    #[ignore] // Requires Docker
    async fn test_stdin_is_delivered() {
        let (_provider, executor) = executor(&SandboxConfig::default()).await;

        let outcome = executor
            .execute("import sys\nprint(sys.stdin.read().upper(), end='')", "hello\nworld\n")
            .await;

        assert_eq!(outcome.exit_status, ExitStatus::Ok, "{}", outcome.stderr);
        assert_eq!(outcome.stdout, "HELLO\nWORLD\n");
    }
}
