// API settings: bind address and the browser origins allowed by CORS
use judge_common::config::Config;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000,http://127.0.0.1:3000";

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub common: Config,
    pub bind_addr: String,
    pub allowed_origins: Vec<String>,
}

impl ApiConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let allowed_origins = lookup("ALLOWED_ORIGINS")
            .unwrap_or_else(|| DEFAULT_ALLOWED_ORIGINS.to_string())
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect();

        Self {
            common: Config::from_lookup(&lookup),
            bind_addr: lookup("API_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            allowed_origins,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ApiConfig::from_lookup(|_| None);
        assert_eq!(config.bind_addr, "0.0.0.0:8000");
        assert_eq!(
            config.allowed_origins,
            vec!["http://localhost:3000", "http://127.0.0.1:3000"]
        );
    }

    #[test]
    fn test_origin_list_is_trimmed() {
        let config = ApiConfig::from_lookup(|key| match key {
            "ALLOWED_ORIGINS" => Some(" https://judge.example.com , ,http://localhost:5173".to_string()),
            _ => None,
        });
        assert_eq!(
            config.allowed_origins,
            vec!["https://judge.example.com", "http://localhost:5173"]
        );
    }
}
