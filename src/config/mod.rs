//! Application configuration
//!
//! Settings come from an optional TOML file (path in `MAINCOON_CONFIG`),
//! then environment variables override individual fields.
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 8787
//!
//! [database]
//! path = "./data/chat_memory.db"
//!
//! [llm]
//! provider = "workers-ai"
//! model = "@cf/meta/llama-3.3-70b-instruct-fp8-fast"
//! account_id = "..."
//! timeout_secs = 25
//!
//! [workflow]
//! max_attempts = 3
//! initial_backoff_ms = 250
//! step_timeout_secs = 30
//! ```

pub mod prompts;

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::StepPolicy;

/// Environment variable naming the TOML config file
pub const CONFIG_PATH_ENV: &str = "MAINCOON_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub workflow: WorkflowConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8787
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database file
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./data/chat_memory.db")
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name: "workers-ai", "ollama", "openai"
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model to use; each provider has its own default
    #[serde(default)]
    pub model: Option<String>,

    /// Custom API endpoint
    #[serde(default)]
    pub base_url: Option<String>,

    /// Cloudflare account that owns the Workers AI binding
    #[serde(default)]
    pub account_id: Option<String>,

    /// Prefer setting this through the environment
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// Limit on one model call; past it the caller gets the fallback reply.
    /// Must be below `workflow.step_timeout_secs`.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_provider() -> String {
    "workers-ai".to_string()
}

fn default_timeout_secs() -> u64 {
    25
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            base_url: None,
            account_id: None,
            api_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Step execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_step_timeout_secs")]
    pub step_timeout_secs: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    250
}

fn default_step_timeout_secs() -> u64 {
    30
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            step_timeout_secs: default_step_timeout_secs(),
        }
    }
}

impl WorkflowConfig {
    pub fn step_policy(&self) -> StepPolicy {
        StepPolicy {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            timeout: Duration::from_secs(self.step_timeout_secs),
        }
    }
}

impl Config {
    /// Load from `MAINCOON_CONFIG` (if set) and the process environment
    pub fn load() -> Result<Self, ConfigError> {
        let config = match env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };

        let config = config.with_overrides(|key: &str| env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment-style overrides from `lookup`
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        if let Some(path) = lookup("DATABASE_PATH") {
            self.database.path = PathBuf::from(path);
        }
        if let Some(provider) = lookup("LLM_PROVIDER") {
            self.llm.provider = provider;
        }
        if let Some(model) = lookup("LLM_MODEL") {
            self.llm.model = Some(model);
        }
        if let Some(account_id) = lookup("CLOUDFLARE_ACCOUNT_ID") {
            self.llm.account_id = Some(account_id);
        }

        // Provider-specific variables apply only to their provider
        let (url_var, key_var) = match self.llm.provider.to_lowercase().as_str() {
            "ollama" => (Some("OLLAMA_URL"), None),
            "openai" | "openai-compat" => (None, Some("OPENAI_API_KEY")),
            _ => (None, Some("CLOUDFLARE_API_TOKEN")),
        };

        if let Some(url) = url_var.and_then(&lookup) {
            self.llm.base_url = Some(url);
        }
        if let Some(key) = key_var.and_then(&lookup) {
            self.llm.api_key = Some(key);
        }

        // Generic variables win over provider-specific ones
        if let Some(url) = lookup("LLM_BASE_URL") {
            self.llm.base_url = Some(url);
        }
        if let Some(key) = lookup("LLM_API_KEY") {
            self.llm.api_key = Some(key);
        }

        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workflow.max_attempts == 0 {
            return Err(ConfigError::Validation(
                "workflow.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.llm.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "llm.timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.llm.timeout_secs >= self.workflow.step_timeout_secs {
            return Err(ConfigError::Validation(format!(
                "llm.timeout_secs ({}) must be below workflow.step_timeout_secs ({})",
                self.llm.timeout_secs, self.workflow.step_timeout_secs
            )));
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}
