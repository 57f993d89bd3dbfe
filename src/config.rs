use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct KoaConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub retrieval: RetrievalConfig,
    pub completion: CompletionConfig,
    pub training: TrainingConfig,
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    /// Origins allowed to embed the widget. Empty means any origin.
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub max_results: usize,
    pub snippet_char_budget: usize,
    pub post_results: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CompletionConfig {
    pub api_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
    pub max_retries: u32,
    /// Only ever read from `OPENAI_API_KEY`; never from the config file.
    #[serde(skip)]
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct TrainingConfig {
    pub secret_code: Option<String>,
    pub exit_code: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub check_interval_mins: u64,
    pub max_retries: u32,
    pub initial_retry_delay_secs: u64,
    pub backoff_factor: u32,
    pub auth_secret: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 3000,
            log_level: "info".into(),
            allowed_origins: Vec::new(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_koa_dir()
            .join("koa.db")
            .to_string_lossy()
            .into_owned();
        Self { db_path }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_results: 8,
            snippet_char_budget: 600,
            post_results: 3,
        }
    }
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.openai.com/v1/chat/completions".into(),
            model: "gpt-4o-mini".into(),
            max_tokens: 500,
            temperature: 0.7,
            timeout_secs: 30,
            max_retries: 3,
            api_key: None,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval_mins: 60,
            max_retries: 3,
            initial_retry_delay_secs: 5,
            backoff_factor: 2,
            auth_secret: None,
        }
    }
}

/// Returns `~/.koa/`
pub fn default_koa_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".koa")
}

/// Returns the default config file path: `~/.koa/config.toml`
pub fn default_config_path() -> PathBuf {
    default_koa_dir().join("config.toml")
}

impl KoaConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            KoaConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("KOA_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("KOA_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("KOA_HOST") {
            self.server.host = val;
        }
        if let Ok(val) = std::env::var("KOA_PORT") {
            match val.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!(value = %val, "ignoring invalid KOA_PORT"),
            }
        }
        if let Ok(val) = std::env::var("OPENAI_API_KEY") {
            self.completion.api_key = Some(val);
        }
        if let Ok(val) = std::env::var("KOA_SECRET_TRAINING_CODE") {
            self.training.secret_code = Some(val);
        }
        if let Ok(val) = std::env::var("KOA_EXIT_TRAINING_CODE") {
            self.training.exit_code = Some(val);
        }
        if let Ok(val) = std::env::var("KOA_AUTO_TRAIN_SECRET") {
            self.scheduler.auth_secret = Some(val);
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
