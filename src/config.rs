//! Service configuration file loading with environment variable overrides.
//!
//! This is the operator's deployment config (bind address, file locations,
//! fallback credentials). Model and prompt choices live in the JSON
//! settings file instead, see [`crate::settings`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Locations of the JSON stores.
    #[serde(default)]
    pub paths: PathsConfig,

    /// Fallback credentials.
    #[serde(default)]
    pub keys: KeysConfig,

    /// Hosted search index connection.
    #[serde(default)]
    pub search: SearchConfig,

    /// Prediction polling limits.
    #[serde(default)]
    pub replicate: ReplicateConfig,
}

/// HTTP server configuration.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Socket address to bind.
    pub bind: String,
    /// Reject uploads (public demo deployments).
    #[serde(default)]
    pub demo_mode: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: "127.0.0.1:3000".to_string(), demo_mode: false }
    }
}

/// Locations of the JSON stores.
#[derive(Debug, Deserialize)]
pub struct PathsConfig {
    /// Operator settings file.
    pub settings: PathBuf,
    /// Request log file.
    pub logs: PathBuf,
    /// Saved question answers.
    pub answers: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            settings: PathBuf::from("tattty-settings.json"),
            logs: PathBuf::from("tattty-logs.json"),
            answers: PathBuf::from(".tattty/answers.json"),
        }
    }
}

/// Fallback credentials, used when neither the settings file nor the
/// environment supplies one.
#[derive(Debug, Default, Deserialize)]
pub struct KeysConfig {
    /// `OpenAI` API key.
    pub openai: Option<String>,
    /// Replicate API token.
    pub replicate: Option<String>,
    /// Vercel Blob read/write token.
    pub blob: Option<String>,
}

/// Hosted search index connection.
#[derive(Debug, Default, Deserialize)]
pub struct SearchConfig {
    /// Upstash Search REST URL.
    pub url: Option<String>,
    /// Upstash Search REST token.
    pub token: Option<String>,
}

/// Prediction polling limits.
#[derive(Debug, Deserialize)]
pub struct ReplicateConfig {
    /// Delay between status checks, in milliseconds.
    pub poll_interval_ms: u64,
    /// Maximum number of status checks.
    pub max_polls: u32,
    /// Overall deadline for one prediction, in seconds.
    pub deadline_secs: u64,
}

impl Default for ReplicateConfig {
    fn default() -> Self {
        Self { poll_interval_ms: 1000, max_polls: 300, deadline_secs: 300 }
    }
}

impl ReplicateConfig {
    /// Delay between status checks.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Overall deadline for one prediction.
    #[must_use]
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }
}

impl Config {
    /// Load configuration from the given path, or return defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config {}: {e}", path.display()))?;
        toml::from_str(&contents)
            .map_err(|e| format!("Failed to parse config {}: {e}", path.display()))
    }

    /// Fallback `OpenAI` key, preferring the environment variable.
    #[must_use]
    pub fn openai_key(&self) -> Option<String> {
        env_non_empty("OPENAI_API_KEY").or_else(|| self.keys.openai.clone())
    }

    /// Fallback Replicate token, preferring the environment variable.
    #[must_use]
    pub fn replicate_token(&self) -> Option<String> {
        env_non_empty("REPLICATE_API_TOKEN").or_else(|| self.keys.replicate.clone())
    }

    /// Blob store token, preferring the environment variable.
    #[must_use]
    pub fn blob_token(&self) -> Option<String> {
        env_non_empty("BLOB_READ_WRITE_TOKEN").or_else(|| self.keys.blob.clone())
    }

    /// Search index URL, preferring the environment variable.
    #[must_use]
    pub fn search_url(&self) -> Option<String> {
        env_non_empty("UPSTASH_SEARCH_REST_URL").or_else(|| self.search.url.clone())
    }

    /// Search index token, preferring the environment variable.
    #[must_use]
    pub fn search_token(&self) -> Option<String> {
        env_non_empty("UPSTASH_SEARCH_REST_TOKEN").or_else(|| self.search.token.clone())
    }
}

/// Provider keys from the environment or config file, consulted when the
/// settings file carries none.
#[derive(Debug, Clone, Default)]
pub struct FallbackKeys {
    /// `OpenAI` API key.
    pub openai: Option<String>,
    /// Replicate API token.
    pub replicate: Option<String>,
}

impl FallbackKeys {
    /// Snapshot the fallback keys.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self { openai: config.openai_key(), replicate: config.replicate_token() }
    }
}

/// Ollama host, from `OLLAMA_BASE_URL` or the local default.
#[must_use]
pub fn ollama_base_url() -> String {
    env_non_empty("OLLAMA_BASE_URL").unwrap_or_else(|| "http://localhost:11434".to_string())
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Discover the config file path using the resolution order:
/// 1. Explicit path (from `--config` flag)
/// 2. `TATTTY_CONFIG` environment variable
/// 3. `~/.config/tattty/config.toml`
#[must_use]
pub fn discover_config_path(explicit: Option<&str>) -> PathBuf {
    if let Some(p) = explicit {
        return PathBuf::from(p);
    }

    if let Ok(p) = std::env::var("TATTTY_CONFIG") {
        return PathBuf::from(p);
    }

    default_config_path()
}

/// Default config path: `~/.config/tattty/config.toml`.
fn default_config_path() -> PathBuf {
    if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".config/tattty/config.toml")
    } else {
        PathBuf::from("tattty.toml")
    }
}
