//! Configuration management for Conclave
//!
//! Supports environment variables, config files, and runtime overrides.
//!
//! Config file location: ~/.config/conclave/config.toml

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::core::error::{ConclaveError, Result};
use crate::core::types::HumanInputMode;

/// Reserved reply that ends a loop under the default predicate
pub const DEFAULT_TERMINATION_TOKEN: &str = "TERMINATE";

/// Main configuration for Conclave
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Ollama configuration
    #[serde(default)]
    pub ollama: OllamaConfig,
    /// Model configuration
    #[serde(default)]
    pub models: ModelConfig,
    /// Two-party loop behaviour
    #[serde(default)]
    pub chat: ChatConfig,
    /// Leader/worker nested chats
    #[serde(default)]
    pub delegation: DelegationConfig,
    /// Reviewer rounds
    #[serde(default)]
    pub reflection: ReflectionConfig,
    /// Multi-party orchestration
    #[serde(default)]
    pub group: GroupSettings,
}

/// Ollama server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Host address (default: localhost)
    pub host: String,
    /// Port number (default: 11434)
    pub port: u16,
    /// HTTP request timeout in seconds
    pub timeout_secs: u64,
}

/// Model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model used by participants unless overridden
    pub default: String,
    /// Model used for delegation summaries; falls back to `default`
    #[serde(default)]
    pub summarizer: Option<String>,
}

/// Behaviour of a two-party conversation loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Automatic proxy replies allowed before the loop stops
    pub max_consecutive_auto_reply: usize,
    /// Hard bound on participant generations per run
    #[serde(default)]
    pub max_turns: Option<usize>,
    /// When a human is consulted
    #[serde(default)]
    pub human_input_mode: HumanInputMode,
    /// Reserved reply that ends the loop
    pub termination_token: String,
    /// What the proxy says after a plain reply; `None` ends the loop instead
    #[serde(default)]
    pub default_auto_reply: Option<String>,
    /// Sampling temperature
    pub temperature: f32,
    /// Per model call timeout in seconds
    pub model_timeout_secs: u64,
    /// Per tool call timeout in seconds
    pub tool_timeout_secs: u64,
    /// Retries after a failed model call
    pub max_retries: u32,
    /// Base delay of the exponential backoff, in milliseconds
    pub retry_backoff_ms: u64,
    /// Whether the proxy runs fenced code blocks found in replies
    #[serde(default)]
    pub code_execution: bool,
    /// Whether to show debug output
    #[serde(default)]
    pub debug: bool,
}

/// Per delegation bounds of a nested chat
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationConfig {
    /// Worker generations allowed per nested chat
    pub max_turns: usize,
    /// Automatic proxy replies allowed per nested chat
    pub max_auto_reply: usize,
    /// Prompt used to condense a nested transcript
    pub summary_prompt: String,
}

/// Reflection supervisor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflectionConfig {
    /// Maximum critique/revision rounds
    pub max_rounds: usize,
}

/// Group orchestrator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupSettings {
    /// Maximum turns appended by the orchestrator per run
    pub max_round: usize,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: env::var("OLLAMA_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: env::var("OLLAMA_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(11434),
            timeout_secs: 120,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            default: env::var("CONCLAVE_MODEL").unwrap_or_else(|_| "qwen3:8b".to_string()),
            summarizer: env::var("CONCLAVE_SUMMARY_MODEL").ok(),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_consecutive_auto_reply: 10,
            max_turns: None,
            human_input_mode: HumanInputMode::Never,
            termination_token: DEFAULT_TERMINATION_TOKEN.to_string(),
            default_auto_reply: Some(
                "Continue. Reply TERMINATE when the task is done.".to_string(),
            ),
            temperature: 0.0,
            model_timeout_secs: 120,
            tool_timeout_secs: 60,
            max_retries: 2,
            retry_backoff_ms: 500,
            code_execution: false,
            debug: env::var("CONCLAVE_DEBUG")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        }
    }
}

impl Default for DelegationConfig {
    fn default() -> Self {
        Self {
            max_turns: 10,
            max_auto_reply: 10,
            summary_prompt: "Summarize the takeaway from the conversation. \
                             Do not add any introductory phrases."
                .to_string(),
        }
    }
}

impl Default for ReflectionConfig {
    fn default() -> Self {
        Self { max_rounds: 2 }
    }
}

impl Default for GroupSettings {
    fn default() -> Self {
        Self { max_round: 12 }
    }
}

impl ChatConfig {
    pub fn model_timeout(&self) -> Duration {
        Duration::from_secs(self.model_timeout_secs)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("conclave")
    }

    /// Get the config file path
    pub fn config_file() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load configuration from file, environment, and defaults
    /// Priority: CLI args > env vars > config file > defaults
    pub fn load() -> Self {
        // Try to load .env file if it exists
        let _ = dotenvy::dotenv();

        if let Ok(config) = Self::load_from_file() {
            return config;
        }

        // Fall back to defaults (which respect env vars)
        Self::default()
    }

    /// Load configuration from file only
    pub fn load_from_file() -> Result<Self> {
        let config_path = Self::config_file();

        if !config_path.exists() {
            return Err(ConclaveError::config("Config file not found"));
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|e| ConclaveError::config(format!("Failed to read config: {}", e)))?;

        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| ConclaveError::config(format!("Failed to parse config: {}", e)))
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<PathBuf> {
        let config_dir = Self::config_dir();
        let config_path = Self::config_file();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .map_err(|e| ConclaveError::config(format!("Failed to create config dir: {}", e)))?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| ConclaveError::config(format!("Failed to serialize config: {}", e)))?;

        fs::write(&config_path, content)
            .map_err(|e| ConclaveError::config(format!("Failed to write config: {}", e)))?;

        Ok(config_path)
    }

    /// Get the full Ollama API URL
    pub fn ollama_url(&self) -> String {
        format!("http://{}:{}", self.ollama.host, self.ollama.port)
    }

    /// Model used for delegation summaries
    pub fn summarizer_model(&self) -> &str {
        self.models
            .summarizer
            .as_deref()
            .unwrap_or(&self.models.default)
    }

    /// Generate a default config file content for display
    pub fn default_config_toml() -> String {
        toml::to_string_pretty(&Config::default())
            .unwrap_or_else(|_| String::from("# Error generating config"))
    }
}
