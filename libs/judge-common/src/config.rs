// Settings shared by every binary in the workspace
use std::path::PathBuf;

pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
pub const DEFAULT_PROBLEMS_DIR: &str = "problems";

#[derive(Debug, Clone)]
pub struct Config {
    pub redis_url: String,
    pub problems_dir: PathBuf,
}

impl Config {
    /// Read `REDIS_URL` and `PROBLEMS_DIR`, falling back to local defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            redis_url: lookup("REDIS_URL").unwrap_or_else(|| DEFAULT_REDIS_URL.to_string()),
            problems_dir: lookup("PROBLEMS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PROBLEMS_DIR)),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}
