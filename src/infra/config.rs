//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct GeocodeConfig {
    #[serde(default = "default_geocode_base_url")]
    pub base_url: String,
    /// Client identifier sent with every reverse geocode request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_language")]
    pub language: String,
    /// Upper bound per cascade strategy (0 disables the bound)
    #[serde(default = "default_strategy_timeout_ms")]
    pub strategy_timeout_ms: u64,
}

impl Default for GeocodeConfig {
    fn default() -> Self {
        Self {
            base_url: default_geocode_base_url(),
            user_agent: default_user_agent(),
            language: default_language(),
            strategy_timeout_ms: default_strategy_timeout_ms(),
        }
    }
}

fn default_geocode_base_url() -> String {
    "https://nominatim.openstreetmap.org".to_string()
}

fn default_user_agent() -> String {
    "FieldPunch/1.0".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

fn default_strategy_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocationConfig {
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
    #[serde(default = "default_min_distance_m")]
    pub min_distance_m: f64,
    /// JSONL fix recording replayed by the binary's location provider
    #[serde(default)]
    pub replay_file: Option<String>,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: default_min_interval_ms(),
            min_distance_m: default_min_distance_m(),
            replay_file: None,
        }
    }
}

fn default_min_interval_ms() -> u64 {
    10_000
}

fn default_min_distance_m() -> f64 {
    10.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Durable key-value store (identity, re-auth flag, last punch)
    #[serde(default = "default_store_file")]
    pub store_file: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { store_file: default_store_file() }
    }
}

fn default_store_file() -> String {
    "fieldpunch-store.json".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_backend_url")]
    pub base_url: String,
    #[serde(default = "default_backend_timeout_ms")]
    pub timeout_ms: u64,
    /// Selected company; first company from the backend when unset
    #[serde(default)]
    pub company: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_backend_url(),
            timeout_ms: default_backend_timeout_ms(),
            company: None,
        }
    }
}

fn default_backend_url() -> String {
    "http://localhost:8080/api".to_string()
}

fn default_backend_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

fn default_metrics_interval() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub geocode: GeocodeConfig,
    #[serde(default)]
    pub location: LocationConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    geocode_base_url: String,
    geocode_user_agent: String,
    geocode_language: String,
    geocode_strategy_timeout_ms: u64,
    watch_min_interval_ms: u64,
    watch_min_distance_m: f64,
    replay_file: Option<String>,
    store_file: String,
    backend_url: String,
    backend_timeout_ms: u64,
    company: Option<String>,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        Self {
            geocode_base_url: toml_config.geocode.base_url,
            geocode_user_agent: toml_config.geocode.user_agent,
            geocode_language: toml_config.geocode.language,
            geocode_strategy_timeout_ms: toml_config.geocode.strategy_timeout_ms,
            watch_min_interval_ms: toml_config.location.min_interval_ms,
            watch_min_distance_m: toml_config.location.min_distance_m,
            replay_file: toml_config.location.replay_file,
            store_file: toml_config.session.store_file,
            backend_url: toml_config.backend.base_url,
            backend_timeout_ms: toml_config.backend.timeout_ms,
            company: toml_config.backend.company,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            config_file,
        }
    }

    /// Determine config file path: explicit `--config`, then the
    /// `CONFIG_FILE` environment variable, then `config/dev.toml`
    pub fn resolve_config_path(explicit: Option<&str>) -> String {
        if let Some(path) = explicit {
            return path.to_string();
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, path.display().to_string()))
    }

    /// Load configuration from a path, falling back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load(explicit: Option<&str>) -> Self {
        Self::load_from_path(&Self::resolve_config_path(explicit))
    }

    pub fn geocode_base_url(&self) -> &str {
        &self.geocode_base_url
    }

    pub fn geocode_user_agent(&self) -> &str {
        &self.geocode_user_agent
    }

    pub fn geocode_language(&self) -> &str {
        &self.geocode_language
    }

    /// Per-strategy bound, `None` when disabled
    pub fn geocode_strategy_timeout(&self) -> Option<Duration> {
        (self.geocode_strategy_timeout_ms > 0)
            .then(|| Duration::from_millis(self.geocode_strategy_timeout_ms))
    }

    pub fn watch_min_interval(&self) -> Duration {
        Duration::from_millis(self.watch_min_interval_ms)
    }

    pub fn watch_min_distance_m(&self) -> f64 {
        self.watch_min_distance_m
    }

    pub fn replay_file(&self) -> Option<&str> {
        self.replay_file.as_deref()
    }

    pub fn store_file(&self) -> &str {
        &self.store_file
    }

    pub fn backend_url(&self) -> &str {
        &self.backend_url
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_millis(self.backend_timeout_ms)
    }

    pub fn company(&self) -> Option<&str> {
        self.company.as_deref()
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to point the geocoder at a mock server
    pub fn with_geocode_base_url(mut self, url: &str) -> Self {
        self.geocode_base_url = url.to_string();
        self
    }

    /// Builder method for tests to point the backend at a mock server
    pub fn with_backend_url(mut self, url: &str) -> Self {
        self.backend_url = url.to_string();
        self
    }
}
