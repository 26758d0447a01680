use serde::{Deserialize, Serialize};
use std::{
    env,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;
use tracing::{debug, info};

/// Environment variable holding the bearer token for the chat-completions API.
pub const API_KEY_ENV: &str = "OPENROUTER_API_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Please set the OPENROUTER_API_KEY environment variable")]
    MissingApiKey,
    #[error("Could not determine home directory")]
    NoHomeDirectory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub target_directory: PathBuf,
    /// Directory basenames that are never analyzed.
    pub skip_dirs: Vec<String>,
    /// Any directory whose full path contains this string is left out of the walk.
    pub excluded_path_fragment: String,
    /// Lowercase extensions (without the dot) eligible for analysis.
    pub file_extensions: Vec<String>,
    pub llm: LLMConfig,
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LLMConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub referer: String,
    /// Per-request timeout. `None` leaves the transport default in place.
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub max_concurrent_requests: usize,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub max_content_length: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target_directory: PathBuf::from("."),
            skip_dirs: [
                "node_modules",
                "venv",
                ".git",
                "__pycache__",
                "dist",
                "build",
                ".idea",
                ".vscode",
                "vendor",
                "packages",
                "system",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            excluded_path_fragment: "node_modules".to_string(),
            file_extensions: [
                "py", "js", "jsx", "ts", "tsx", "vue", "java", "cpp", "c", "h", "hpp", "cs",
                "go", "rb", "php", "html", "css", "scss", "less", "sql", "md", "json", "yaml",
                "yml", "xml", "sh", "bash",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            llm: LLMConfig::default(),
            analysis: AnalysisConfig::default(),
        }
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://openrouter.ai/api/v1".to_string(),
            model: "anthropic/claude-3.5-sonnet".to_string(),
            referer: "http://localhost:8000".to_string(),
            timeout_seconds: None,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 2,
            max_retries: 5,
            retry_delay_ms: 5_000,
            max_content_length: 8000,
        }
    }
}

impl AnalysisConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Linear backoff: the wait before retry step `n` is `n` times the base delay.
    pub fn backoff(&self, step: u32) -> Duration {
        self.retry_delay() * step
    }
}

impl Config {
    /// Get the default config file path (~/.project-analyzer.toml)
    pub fn default_config_path() -> crate::Result<PathBuf> {
        let home_dir = env::var("HOME")
            .or_else(|_| env::var("USERPROFILE"))
            .map_err(|_| ConfigError::NoHomeDirectory)?;
        Ok(PathBuf::from(home_dir).join(".project-analyzer.toml"))
    }

    /// Load config from the default file if present, then fill the API key from the environment.
    ///
    /// An undeterminable home directory is treated like a missing config file.
    pub fn load() -> crate::Result<Self> {
        let config_path = match Self::default_config_path() {
            Ok(path) => Some(path),
            Err(e) => {
                debug!("{}, using defaults", e);
                None
            }
        };
        Self::load_from(config_path.as_deref())
    }

    fn load_from(config_path: Option<&Path>) -> crate::Result<Self> {
        let mut config = match config_path {
            Some(path) if path.exists() => {
                info!("Loading configuration from {}", path.display());
                Self::from_file(path)?
            }
            Some(path) => {
                debug!("No config file at {}, using defaults", path.display());
                Self::default()
            }
            None => Self::default(),
        };

        if config.llm.api_key.is_none() {
            config.llm.api_key = env::var(API_KEY_ENV).ok();
        }

        Ok(config)
    }

    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.llm
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey)
    }
}
