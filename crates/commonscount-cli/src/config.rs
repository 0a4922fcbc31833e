//! Configuration loading from TOML files

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use commonscount_core::{BackoffPolicy, Credential, HttpSettings};
use serde::Deserialize;

/// Global configuration for commonscount
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub output: OutputConfig,
    pub http: HttpConfig,
    pub gcs: GcsConfig,
    pub wikicommons: WikiCommonsConfig,
    pub youtube: YouTubeConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub data_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
    pub jitter_ms: u64,
    /// Pause between consecutive requests of one source
    pub request_delay_ms: u64,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        let backoff = BackoffPolicy::default();
        let http = HttpSettings::default();
        Self {
            max_attempts: backoff.max_attempts,
            base_delay_ms: backoff.base.as_millis() as u64,
            multiplier: backoff.multiplier,
            max_delay_ms: backoff.max_delay.as_millis() as u64,
            jitter_ms: backoff.jitter.as_millis() as u64,
            request_delay_ms: 1000,
            connect_timeout_secs: http.connect_timeout.as_secs(),
            request_timeout_secs: http.request_timeout.as_secs(),
        }
    }
}

impl HttpConfig {
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            max_attempts: self.max_attempts.max(1),
            base: Duration::from_millis(self.base_delay_ms),
            multiplier: self.multiplier,
            max_delay: Duration::from_millis(self.max_delay_ms),
            jitter: Duration::from_millis(self.jitter_ms),
        }
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn settings(&self) -> HttpSettings {
        HttpSettings {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GcsConfig {
    pub base_url: String,
    #[serde(deserialize_with = "deserialize_env_var")]
    pub cx: Option<String>,
    /// Comma-separated developer keys, rotated in order
    #[serde(deserialize_with = "deserialize_env_var")]
    pub developer_keys: Option<String>,
}

impl Default for GcsConfig {
    fn default() -> Self {
        Self {
            base_url: commonscount_gcs::config::DEFAULT_BASE_URL.to_string(),
            cx: std::env::var("GCS_CX").ok(),
            developer_keys: std::env::var("GCS_DEVELOPER_KEY").ok(),
        }
    }
}

impl GcsConfig {
    pub fn source_config(&self, plan_file: Option<PathBuf>) -> commonscount_gcs::Config {
        commonscount_gcs::Config {
            base_url: self.base_url.clone(),
            cx: self.cx.clone().unwrap_or_default(),
            developer_keys: split_keys(self.developer_keys.as_deref()),
            plan_file,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WikiCommonsConfig {
    pub api_url: String,
    pub root_category: String,
}

impl Default for WikiCommonsConfig {
    fn default() -> Self {
        let defaults = commonscount_wikicommons::Config::default();
        Self {
            api_url: defaults.api_url,
            root_category: defaults.root_category,
        }
    }
}

impl WikiCommonsConfig {
    pub fn source_config(&self, root: Option<String>) -> commonscount_wikicommons::Config {
        commonscount_wikicommons::Config {
            api_url: self.api_url.clone(),
            root_category: root.unwrap_or_else(|| self.root_category.clone()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct YouTubeConfig {
    pub api_url: String,
    pub license_type: String,
    /// Comma-separated API keys, rotated in order
    #[serde(deserialize_with = "deserialize_env_var")]
    pub api_keys: Option<String>,
    pub goal: Option<usize>,
}

impl Default for YouTubeConfig {
    fn default() -> Self {
        let defaults = commonscount_youtube::Config::default();
        Self {
            api_url: defaults.api_url,
            license_type: defaults.license_type,
            api_keys: std::env::var("YOUTUBE_API_KEY").ok(),
            goal: None,
        }
    }
}

impl YouTubeConfig {
    pub fn source_config(&self, goal: Option<usize>) -> commonscount_youtube::Config {
        commonscount_youtube::Config {
            api_url: self.api_url.clone(),
            license_type: self.license_type.clone(),
            api_keys: split_keys(self.api_keys.as_deref()),
            goal: goal.or(self.goal),
        }
    }
}

/// `KEY1,KEY2` into credentials, skipping blanks
fn split_keys(list: Option<&str>) -> Vec<Credential> {
    list.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(Credential::new)
        .collect()
}

/// Deserialize a string that may contain environment variable reference like ${VAR}
fn deserialize_env_var<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.and_then(|s| expand_env_var(&s)))
}

/// Expand ${VAR} to environment variable value
fn expand_env_var(s: &str) -> Option<String> {
    if let Some(var_name) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        std::env::var(var_name).ok()
    } else {
        Some(s.to_string())
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./commonscount.toml (current directory)
    /// 2. ~/.config/commonscount/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("commonscount.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "commonscount") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }
}
