use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_freq_minutes")]
    pub freq_minutes: u64,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default)]
    pub insecure_skip_verify: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: String::new(),
            token: String::new(),
            token_env: default_token_env(),
            freq_minutes: default_freq_minutes(),
            db_path: default_db_path(),
            request_timeout_secs: None,
            insecure_skip_verify: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse YAML in {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("invalid configuration: {0}")]
    Validation(String),
}

impl Config {
    /// Reads a YAML file without validating it; CLI flags may still fill gaps.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path_display,
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::Validation(
                "reporting url is required (--url)".to_string(),
            ));
        }
        let url = Url::parse(&self.url).map_err(|e| {
            ConfigError::Validation(format!("url '{}' is not valid: {e}", self.url))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Validation(format!(
                "url scheme must be http or https, got '{}'",
                url.scheme()
            )));
        }
        if self.token.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "authentication token is required (--token or ${})",
                self.token_env
            )));
        }
        if self.freq_minutes < 1 {
            return Err(ConfigError::Validation(
                "freq_minutes must be >= 1".to_string(),
            ));
        }
        if self.request_timeout_secs == Some(0) {
            return Err(ConfigError::Validation(
                "request_timeout_secs must be > 0 when set".to_string(),
            ));
        }
        Ok(())
    }

    /// Fixed pause between cycles. Cycle duration is not subtracted.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.freq_minutes.saturating_mul(60))
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }
}

fn default_token_env() -> String {
    "HOSTPULSE_TOKEN".to_string()
}

const fn default_freq_minutes() -> u64 {
    5
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./server_monitor.db")
}
