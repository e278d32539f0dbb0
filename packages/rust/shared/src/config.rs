//! Application configuration for ContextPack.
//!
//! User config lives at `~/.contextpack/contextpack.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ContextPackError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "contextpack.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".contextpack";

/// Default database file name inside the config directory.
const DB_FILE_NAME: &str = "packs.db";

// ---------------------------------------------------------------------------
// Config structs (matching contextpack.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// OpenRouter settings.
    #[serde(default)]
    pub openrouter: OpenRouterConfig,

    /// Scan policies.
    #[serde(default)]
    pub scan: ScanPoliciesConfig,

    /// Pack storage.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// `[openrouter]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRouterConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model used for field extraction.
    #[serde(default = "default_model")]
    pub default_model: String,

    /// API base URL (OpenAI-compatible chat completions).
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-call timeout in seconds.
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            default_model: default_model(),
            base_url: default_base_url(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_model() -> String {
    "moonshotai/kimi-k2.5".into()
}
fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_llm_timeout() -> u64 {
    60
}

/// `[scan]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanPoliciesConfig {
    /// Paths appended to the company URL; `""` is the home page.
    #[serde(default = "default_candidate_paths")]
    pub candidate_paths: Vec<String>,

    /// Per-page fetch timeout in seconds.
    #[serde(default = "default_page_timeout")]
    pub page_timeout_secs: u64,

    /// Maximum concurrent page fetches.
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: u32,

    /// Characters of normalized text kept per page.
    #[serde(default = "default_max_page_chars")]
    pub max_page_chars: usize,

    /// Maximum concurrent extraction calls against the model backend.
    #[serde(default = "default_extraction_concurrency")]
    pub extraction_concurrency: u32,
}

impl Default for ScanPoliciesConfig {
    fn default() -> Self {
        Self {
            candidate_paths: default_candidate_paths(),
            page_timeout_secs: default_page_timeout(),
            fetch_concurrency: default_fetch_concurrency(),
            max_page_chars: default_max_page_chars(),
            extraction_concurrency: default_extraction_concurrency(),
        }
    }
}

fn default_candidate_paths() -> Vec<String> {
    ["", "about", "careers", "blog"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_page_timeout() -> u64 {
    15
}
fn default_fetch_concurrency() -> u32 {
    4
}
fn default_max_page_chars() -> usize {
    6_000
}
fn default_extraction_concurrency() -> u32 {
    4
}

/// `[storage]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database file path (defaults to `~/.contextpack/packs.db`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<String>,
}

// ---------------------------------------------------------------------------
// Scan config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime scan configuration, merged from the config file and CLI flags.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub candidate_paths: Vec<String>,
    pub page_timeout_secs: u64,
    pub fetch_concurrency: u32,
    pub max_page_chars: usize,
    pub extraction_concurrency: u32,
    /// Allow fetching loopback/private hosts (mock servers only).
    pub allow_private_hosts: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for ScanConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            candidate_paths: config.scan.candidate_paths.clone(),
            page_timeout_secs: config.scan.page_timeout_secs,
            fetch_concurrency: config.scan.fetch_concurrency,
            max_page_chars: config.scan.max_page_chars,
            extraction_concurrency: config.scan.extraction_concurrency,
            allow_private_hosts: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.contextpack/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ContextPackError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.contextpack/contextpack.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Resolve the pack database path: explicit config value or the default location.
pub fn db_path(config: &AppConfig) -> Result<PathBuf> {
    match &config.storage.db_path {
        Some(p) => Ok(PathBuf::from(p)),
        None => Ok(config_dir()?.join(DB_FILE_NAME)),
    }
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
    let content = std::fs::read_to_string(path).map_err(|e| ContextPackError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        ContextPackError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ContextPackError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ContextPackError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ContextPackError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the OpenRouter API key from the configured env var.
///
/// A missing or blank key is a [`ContextPackError::Credential`] whose message
/// contains "API key".
pub fn resolve_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.openrouter.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val),
        _ => Err(ContextPackError::Credential(format!(
            "OpenRouter API key not found. Set the {var_name} environment variable. \
             Get a key at https://openrouter.ai/keys"
        ))),
    }
}
