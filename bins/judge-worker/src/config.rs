// Worker configuration: sandbox limits, queue behaviour, connection settings
use anyhow::{bail, Context, Result};
use judge_common::config::Config;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::sandbox::{ResourceLimits, SandboxSpec};

/// Sandbox image and limits.
///
/// Every field has a default so a JSON file only needs the overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub image: String,
    pub command: Vec<String>,
    pub working_dir: String,
    /// Where the submission is written inside the sandbox
    pub source_path: String,
    /// Where the test input is written; the command redirects it to stdin
    pub stdin_path: String,
    pub timeout_ms: u64,
    pub memory_limit_mb: u32,
    pub pids_limit: i64,
    pub cpu_limit: f64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            image: "python:3.11-slim".to_string(),
            command: vec![
                "/bin/sh".to_string(),
                "-c".to_string(),
                "python /work/main.py < /tmp/_in".to_string(),
            ],
            working_dir: "/work".to_string(),
            source_path: "/work/main.py".to_string(),
            stdin_path: "/tmp/_in".to_string(),
            timeout_ms: 2000,
            memory_limit_mb: 256,
            pids_limit: 256,
            cpu_limit: 1.0,
        }
    }
}

impl SandboxConfig {
    /// Load sandbox settings from a JSON file
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            bail!("Sandbox config file not found: {}", config_path.display());
        }

        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.image.trim().is_empty() {
            bail!("Sandbox image must not be empty");
        }
        if self.command.is_empty() {
            bail!("Sandbox command must not be empty");
        }
        if self.timeout_ms == 0 {
            bail!("Sandbox timeout must be greater than zero");
        }
        if self.memory_limit_mb == 0 {
            bail!("Sandbox memory limit must be greater than zero");
        }
        if self.pids_limit <= 0 {
            bail!("Sandbox process limit must be greater than zero");
        }
        if !(self.cpu_limit > 0.0) {
            bail!("Sandbox CPU limit must be greater than zero");
        }
        for path in [&self.source_path, &self.stdin_path, &self.working_dir] {
            if !path.starts_with('/') {
                bail!("Sandbox path '{}' must be absolute", path);
            }
        }
        // Both files must be read by the command
        let command = self.command.join(" ");
        for (name, path) in [("source_path", &self.source_path), ("stdin_path", &self.stdin_path)] {
            if !command.contains(path.as_str()) {
                bail!("Sandbox command does not reference {} '{}'", name, path);
            }
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn limits(&self) -> ResourceLimits {
        ResourceLimits {
            memory_bytes: (self.memory_limit_mb as i64) * 1024 * 1024,
            pids_limit: self.pids_limit,
            nano_cpus: (self.cpu_limit * 1_000_000_000.0) as i64,
            network_disabled: true,
        }
    }

    pub fn spec(&self) -> SandboxSpec {
        SandboxSpec {
            image: self.image.clone(),
            command: self.command.clone(),
            working_dir: self.working_dir.clone(),
            limits: self.limits(),
        }
    }

    fn apply_overrides(&mut self, lookup: &impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(image) = lookup("SANDBOX_IMAGE") {
            self.image = image;
        }
        if let Some(raw) = lookup("SANDBOX_TIMEOUT_MS") {
            self.timeout_ms = parse_var("SANDBOX_TIMEOUT_MS", &raw)?;
        }
        if let Some(raw) = lookup("SANDBOX_MEMORY_MB") {
            self.memory_limit_mb = parse_var("SANDBOX_MEMORY_MB", &raw)?;
        }
        if let Some(raw) = lookup("SANDBOX_PIDS_LIMIT") {
            self.pids_limit = parse_var("SANDBOX_PIDS_LIMIT", &raw)?;
        }
        if let Some(raw) = lookup("SANDBOX_CPU_LIMIT") {
            self.cpu_limit = parse_var("SANDBOX_CPU_LIMIT", &raw)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub common: Config,
    pub sandbox: SandboxConfig,
    /// Bounded wait of one queue pop
    pub pop_timeout_secs: u64,
    /// Expire DONE records after this many seconds (kept forever when unset)
    pub result_ttl_secs: Option<u64>,
    /// Give up after this many queue failures in a row
    pub max_consecutive_queue_errors: u32,
}

impl WorkerConfig {
    /// Environment first, then the optional `SANDBOX_CONFIG` JSON file,
    /// then individual `SANDBOX_*` overrides on top
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let common = Config::from_lookup(&lookup);

        let mut sandbox = match lookup("SANDBOX_CONFIG") {
            Some(path) => SandboxConfig::load(Path::new(&path))?,
            None => SandboxConfig::default(),
        };
        sandbox.apply_overrides(&lookup)?;
        sandbox.validate()?;

        let pop_timeout_secs = match lookup("QUEUE_POP_TIMEOUT_SECS") {
            Some(raw) => parse_var("QUEUE_POP_TIMEOUT_SECS", &raw)?,
            None => 5,
        };
        if pop_timeout_secs == 0 {
            // BLPOP treats 0 as "block forever", which would hide shutdown
            bail!("QUEUE_POP_TIMEOUT_SECS must be greater than zero");
        }

        let result_ttl_secs = lookup("RESULT_TTL_SECS")
            .map(|raw| parse_var("RESULT_TTL_SECS", &raw))
            .transpose()?;

        let max_consecutive_queue_errors = match lookup("MAX_QUEUE_ERRORS") {
            Some(raw) => parse_var("MAX_QUEUE_ERRORS", &raw)?,
            None => 30,
        };

        Ok(Self {
            common,
            sandbox,
            pop_timeout_secs,
            result_ttl_secs,
            max_consecutive_queue_errors,
        })
    }

    pub fn pop_timeout(&self) -> Duration {
        Duration::from_secs(self.pop_timeout_secs)
    }
}

fn parse_var<T>(name: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse()
        .with_context(|| format!("Invalid value for {}: '{}'", name, raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_match_reference_limits() {
        let config = WorkerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.sandbox.image, "python:3.11-slim");
        assert_eq!(config.sandbox.timeout(), Duration::from_secs(2));
        assert_eq!(config.sandbox.limits().memory_bytes, 256 * 1024 * 1024);
        assert_eq!(config.sandbox.limits().pids_limit, 256);
        assert_eq!(config.sandbox.limits().nano_cpus, 1_000_000_000);
        assert!(config.sandbox.limits().network_disabled);
        assert_eq!(config.pop_timeout(), Duration::from_secs(5));
        assert_eq!(config.result_ttl_secs, None);
    }

    #[test]
    fn test_env_overrides() {
        let config = WorkerConfig::from_lookup(lookup(&[
            ("SANDBOX_IMAGE", "python:3.12-alpine"),
            ("SANDBOX_TIMEOUT_MS", "500"),
            ("SANDBOX_CPU_LIMIT", "0.5"),
            ("RESULT_TTL_SECS", "86400"),
            ("REDIS_URL", "redis://redis:6379/0"),
        ]))
        .unwrap();
        assert_eq!(config.sandbox.image, "python:3.12-alpine");
        assert_eq!(config.sandbox.timeout_ms, 500);
        assert_eq!(config.sandbox.limits().nano_cpus, 500_000_000);
        assert_eq!(config.result_ttl_secs, Some(86400));
        assert_eq!(config.common.redis_url, "redis://redis:6379/0");
    }

    #[test]
    fn test_zero_limits_rejected() {
        assert!(WorkerConfig::from_lookup(lookup(&[("SANDBOX_TIMEOUT_MS", "0")])).is_err());
        assert!(WorkerConfig::from_lookup(lookup(&[("SANDBOX_MEMORY_MB", "0")])).is_err());
        assert!(WorkerConfig::from_lookup(lookup(&[("QUEUE_POP_TIMEOUT_SECS", "0")])).is_err());
    }

    #[test]
    fn test_command_must_reference_both_paths() {
        let moved_source = SandboxConfig {
            source_path: "/work/solution.py".to_string(),
            ..SandboxConfig::default()
        };
        let err = moved_source.validate().unwrap_err();
        assert!(err.to_string().contains("source_path"));

        let moved_both = SandboxConfig {
            command: vec![
                "/bin/sh".to_string(),
                "-c".to_string(),
                "python /work/solution.py < /tmp/stdin.txt".to_string(),
            ],
            source_path: "/work/solution.py".to_string(),
            stdin_path: "/tmp/stdin.txt".to_string(),
            ..SandboxConfig::default()
        };
        assert!(moved_both.validate().is_ok());
    }

    #[test]
    fn test_garbage_value_names_the_variable() {
        let err = WorkerConfig::from_lookup(lookup(&[("SANDBOX_PIDS_LIMIT", "lots")])).unwrap_err();
        assert!(err.to_string().contains("SANDBOX_PIDS_LIMIT"));
    }

    #[test]
    fn test_json_file_with_partial_overrides() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("sandbox.json");
        fs::write(&path, r#"{ "image": "judge-python:latest", "memory_limit_mb": 128 }"#).unwrap();

        let path_str = path.to_string_lossy().to_string();
        let config = WorkerConfig::from_lookup(lookup(&[
            ("SANDBOX_CONFIG", path_str.as_str()),
            ("SANDBOX_MEMORY_MB", "64"),
        ]))
        .unwrap();
        assert_eq!(config.sandbox.image, "judge-python:latest");
        assert_eq!(config.sandbox.memory_limit_mb, 64);
        assert_eq!(config.sandbox.timeout_ms, 2000);
    }

    #[test]
    fn test_shipped_sandbox_file_matches_defaults() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/sandbox.json");
        assert_eq!(SandboxConfig::load(&path).unwrap(), SandboxConfig::default());
    }

    #[test]
    fn test_missing_json_file() {
        let err = SandboxConfig::load(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
