//! Application configuration for noteforge.
//!
//! User config lives at `~/.noteforge/noteforge.toml`.
//! CLI flags override config file values, which override defaults.
//! Components receive the immutable runtime structs below and never
//! read the environment themselves.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{NoteforgeError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "noteforge.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".noteforge";

// ---------------------------------------------------------------------------
// Config structs (matching noteforge.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Completion service settings.
    #[serde(default)]
    pub completion: CompletionSection,

    /// Transcript chunking.
    #[serde(default)]
    pub chunking: ChunkingSection,

    /// Backfill job settings.
    #[serde(default)]
    pub backfill: BackfillSection,

    /// Record database.
    #[serde(default)]
    pub storage: StorageSection,
}

/// `[completion]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionSection {
    /// OpenAI-compatible API base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model identifier.
    #[serde(default = "default_model")]
    pub model: String,

    /// Additional attempts after the first failure.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay between attempts; attempt `n` waits `n` times this.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Wall-clock timeout for one attempt.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum output tokens per request.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for CompletionSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            model: default_model(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            timeout_secs: default_timeout_secs(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_model() -> String {
    "moonshotai/kimi-k2.5".into()
}
fn default_max_retries() -> u32 {
    2
}
fn default_retry_base_delay_ms() -> u64 {
    1_500
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_max_tokens() -> u32 {
    4_096
}
fn default_temperature() -> f32 {
    0.3
}

/// `[chunking]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingSection {
    /// Preferred number of transcript blocks per chunk.
    #[serde(default = "default_baseline_blocks")]
    pub baseline_blocks: usize,

    /// Upper bound on chunks per transcript.
    #[serde(default = "default_max_chunks")]
    pub max_chunks: usize,

    /// Chunks resolved concurrently for one document.
    #[serde(default = "default_chunk_concurrency")]
    pub concurrency: usize,
}

impl Default for ChunkingSection {
    fn default() -> Self {
        Self {
            baseline_blocks: default_baseline_blocks(),
            max_chunks: default_max_chunks(),
            concurrency: default_chunk_concurrency(),
        }
    }
}

fn default_baseline_blocks() -> usize {
    80
}
fn default_max_chunks() -> usize {
    12
}
fn default_chunk_concurrency() -> usize {
    3
}

/// `[backfill]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackfillSection {
    /// Records processed concurrently.
    #[serde(default = "default_backfill_concurrency")]
    pub concurrency: usize,

    /// Skip records that already have artifacts.
    #[serde(default = "default_true")]
    pub only_missing: bool,
}

impl Default for BackfillSection {
    fn default() -> Self {
        Self {
            concurrency: default_backfill_concurrency(),
            only_missing: true,
        }
    }
}

fn default_backfill_concurrency() -> usize {
    4
}
fn default_true() -> bool {
    true
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSection {
    /// Path of the libSQL database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    "~/.noteforge/noteforge.db".into()
}

// ---------------------------------------------------------------------------
// Runtime config (immutable, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime completion settings handed to the completion client.
#[derive(Debug, Clone)]
pub struct CompletionSettings {
    pub base_url: String,
    /// Resolved API key (see [`resolve_api_key`]).
    pub api_key: String,
    pub model: String,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub timeout: Duration,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl CompletionSettings {
    /// Build settings from the config file section and an already-resolved key.
    pub fn from_section(section: &CompletionSection, api_key: impl Into<String>) -> Self {
        Self {
            base_url: section.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: section.model.clone(),
            max_retries: section.max_retries,
            retry_base_delay: Duration::from_millis(section.retry_base_delay_ms),
            timeout: Duration::from_secs(section.timeout_secs),
            max_tokens: section.max_tokens,
            temperature: section.temperature,
        }
    }
}

/// Runtime chunking configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub baseline_blocks: usize,
    pub max_chunks: usize,
    pub concurrency: usize,
}

impl From<&AppConfig> for ChunkingConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            baseline_blocks: config.chunking.baseline_blocks,
            max_chunks: config.chunking.max_chunks,
            concurrency: config.chunking.concurrency,
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

/// Runtime backfill configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackfillConfig {
    pub concurrency: usize,
}

impl From<&AppConfig> for BackfillConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            concurrency: config.backfill.concurrency,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.noteforge/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| NoteforgeError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.noteforge/noteforge.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| NoteforgeError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        NoteforgeError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| NoteforgeError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| NoteforgeError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| NoteforgeError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Expand a leading `~/` against the user's home directory.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| NoteforgeError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}

/// Resolve the API key from the env var named in the config.
///
/// Only the binary calls this; library components get the key through
/// [`CompletionSettings`].
pub fn resolve_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.completion.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val.trim().to_string()),
        _ => Err(NoteforgeError::config(format!(
            "API key not found. Set the {var_name} environment variable."
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("baseline_blocks"));
        assert!(toml_str.contains("OPENROUTER_API_KEY"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.chunking.max_chunks, 12);
        assert_eq!(parsed.completion.max_retries, 2);
    }

    #[test]
    fn partial_config_uses_defaults() {
        let toml_str = r#"
[completion]
model = "openai/gpt-4o-mini"
max_retries = 5

[chunking]
max_chunks = 4
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.completion.model, "openai/gpt-4o-mini");
        assert_eq!(config.completion.max_retries, 5);
        assert_eq!(config.completion.timeout_secs, 120);
        assert_eq!(config.chunking.max_chunks, 4);
        assert_eq!(config.chunking.baseline_blocks, 80);
        assert!(config.backfill.only_missing);
    }

    #[test]
    fn completion_settings_from_section() {
        let mut section = CompletionSection::default();
        section.base_url = "http://localhost:8080/v1/".into();
        section.retry_base_delay_ms = 250;
        let settings = CompletionSettings::from_section(&section, "sk-test");
        assert_eq!(settings.base_url, "http://localhost:8080/v1");
        assert_eq!(settings.retry_base_delay, Duration::from_millis(250));
        assert_eq!(settings.timeout, Duration::from_secs(120));
        assert_eq!(settings.api_key, "sk-test");
    }

    #[test]
    fn runtime_configs_from_app_config() {
        let app = AppConfig::default();
        let chunking = ChunkingConfig::from(&app);
        assert_eq!(chunking.baseline_blocks, 80);
        assert_eq!(chunking.concurrency, 3);
        assert_eq!(BackfillConfig::from(&app).concurrency, 4);
    }

    #[test]
    fn expand_home_leaves_plain_paths() {
        assert_eq!(expand_home("/tmp/x.db").unwrap(), PathBuf::from("/tmp/x.db"));
    }

    #[test]
    fn api_key_resolution() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.completion.api_key_env = "NF_TEST_NONEXISTENT_KEY_12345".into();
        let result = resolve_api_key(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }
}
