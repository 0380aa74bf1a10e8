use serde::Deserialize;
use std::{
    env,
    path::{Path, PathBuf},
    time::Duration,
};

use glimpse_providers::{ApiEndpoint, DEFAULT_API_BASE_URL, RetryPolicy};
use glimpse_types::ModelId;
use thiserror::Error;

/// Models offered when `[models] allowed` is absent or unusable.
pub const DEFAULT_ALLOWED_MODELS: [&str; 3] = [
    "openai/gpt-4o-mini",
    "anthropic/claude-3.5-haiku",
    "google/gemini-2.0-flash-001",
];

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_PRICING_TTL_DAYS: u64 = 7;
pub const DEFAULT_PRICING_MAX_RETRIES: u32 = 2;
pub const DEFAULT_PRICING_RETRY_DELAY_SECS: u64 = 3;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Env override for the config file location.
pub const CONFIG_PATH_ENV: &str = "GLIMPSE_CONFIG";
/// Env override for the data directory (local storage tier).
pub const DATA_DIR_ENV: &str = "GLIMPSE_DATA_DIR";

/// Raw `config.toml` contents. Every field is optional; resolution into
/// [`GatewayConfig`] applies defaults and validation.
#[derive(Debug, Default, Deserialize)]
pub struct GlimpseConfig {
    pub api: Option<ApiConfig>,
    pub models: Option<ModelsConfig>,
    pub broker: Option<BrokerConfig>,
    pub pricing: Option<PricingConfig>,
    pub storage: Option<StorageConfig>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApiConfig {
    pub base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ModelsConfig {
    pub allowed: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BrokerConfig {
    pub request_timeout_secs: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PricingConfig {
    pub ttl_days: Option<i64>,
    pub max_retries: Option<i64>,
    pub retry_delay_secs: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StorageConfig {
    pub data_dir: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl ConfigError {
    pub fn path(&self) -> &PathBuf {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

impl GlimpseConfig {
    /// Load the config file. A missing file is `Ok(None)`.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        let Some(path) = config_path() else {
            return Ok(None);
        };
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        match toml::from_str(&content) {
            Ok(config) => Ok(Some(config)),
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        }
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }
}

/// `$GLIMPSE_CONFIG`, else `~/.glimpse/config.toml`.
#[must_use]
pub fn config_path() -> Option<PathBuf> {
    if let Some(path) = env::var_os(CONFIG_PATH_ENV).filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(path));
    }
    dirs::home_dir().map(|home| home.join(".glimpse").join("config.toml"))
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("glimpse"))
        .unwrap_or_else(|| PathBuf::from(".glimpse").join("data"))
}

/// Validated gateway settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub endpoint: ApiEndpoint,
    pub allowed_models: Vec<ModelId>,
    pub request_timeout: Duration,
    pub pricing_ttl: Duration,
    pub pricing_retry: RetryPolicy,
    pub data_dir: PathBuf,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            endpoint: ApiEndpoint::new(DEFAULT_API_BASE_URL),
            allowed_models: default_models(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            pricing_ttl: Duration::from_secs(DEFAULT_PRICING_TTL_DAYS * SECS_PER_DAY),
            pricing_retry: RetryPolicy {
                max_retries: DEFAULT_PRICING_MAX_RETRIES,
                delay: Duration::from_secs(DEFAULT_PRICING_RETRY_DELAY_SECS),
            },
            data_dir: default_data_dir(),
        }
    }
}

fn default_models() -> Vec<ModelId> {
    DEFAULT_ALLOWED_MODELS
        .iter()
        .filter_map(|raw| ModelId::parse(raw).ok())
        .collect()
}

impl GatewayConfig {
    /// Read the config file and `$GLIMPSE_DATA_DIR`, then resolve.
    pub fn load() -> Result<Self, ConfigError> {
        let raw = GlimpseConfig::load()?;
        let mut config = Self::resolve(raw.as_ref());
        if let Some(dir) = env::var_os(DATA_DIR_ENV).filter(|d| !d.is_empty()) {
            config.data_dir = PathBuf::from(dir);
        }
        Ok(config)
    }

    /// Resolve raw settings. Invalid values fall back to defaults with a warning.
    #[must_use]
    pub fn resolve(raw: Option<&GlimpseConfig>) -> Self {
        let mut config = Self::default();
        let Some(raw) = raw else {
            return config;
        };

        if let Some(base_url) = raw.api.as_ref().and_then(|api| api.base_url.as_deref()) {
            match validate_base_url(base_url) {
                Ok(()) => config.endpoint = ApiEndpoint::new(base_url),
                Err(reason) => {
                    tracing::warn!(base_url, "Ignoring api.base_url ({reason}); using default");
                }
            }
        }

        if let Some(allowed) = raw.models.as_ref().and_then(|m| m.allowed.as_ref()) {
            let mut models = Vec::with_capacity(allowed.len());
            for entry in allowed {
                match ModelId::parse(entry) {
                    Ok(model) if !models.contains(&model) => models.push(model),
                    Ok(_) => {}
                    Err(e) => tracing::warn!("Ignoring models.allowed entry {entry:?}: {e}"),
                }
            }
            if models.is_empty() {
                tracing::warn!("models.allowed has no usable entries; using built-in list");
            } else {
                config.allowed_models = models;
            }
        }

        if let Some(broker) = &raw.broker
            && let Some(secs) = positive("broker.request_timeout_secs", broker.request_timeout_secs)
        {
            config.request_timeout = Duration::from_secs(secs);
        }

        if let Some(pricing) = &raw.pricing {
            if let Some(days) = positive("pricing.ttl_days", pricing.ttl_days) {
                config.pricing_ttl = Duration::from_secs(days.saturating_mul(SECS_PER_DAY));
            }
            if let Some(retries) = non_negative("pricing.max_retries", pricing.max_retries) {
                config.pricing_retry.max_retries = u32::try_from(retries).unwrap_or(u32::MAX);
            }
            if let Some(secs) = non_negative("pricing.retry_delay_secs", pricing.retry_delay_secs) {
                config.pricing_retry.delay = Duration::from_secs(secs);
            }
        }

        if let Some(dir) = raw
            .storage
            .as_ref()
            .and_then(|s| s.data_dir.as_deref())
            .map(str::trim)
            .filter(|d| !d.is_empty())
        {
            config.data_dir = PathBuf::from(dir);
        }

        config
    }

    #[must_use]
    pub fn is_model_allowed(&self, model: &ModelId) -> bool {
        self.allowed_models.contains(model)
    }
}

fn validate_base_url(raw: &str) -> Result<(), String> {
    let url = url::Url::parse(raw.trim()).map_err(|e| e.to_string())?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(format!("unsupported scheme '{other}'")),
    }
}

fn positive(key: &str, value: Option<i64>) -> Option<u64> {
    let value = value?;
    match u64::try_from(value) {
        Ok(v) if v > 0 => Some(v),
        _ => {
            tracing::warn!(key, value, "Config value must be greater than zero; using default");
            None
        }
    }
}

fn non_negative(key: &str, value: Option<i64>) -> Option<u64> {
    let value = value?;
    if let Ok(v) = u64::try_from(value) {
        Some(v)
    } else {
        tracing::warn!(key, value, "Config value must not be negative; using default");
        None
    }
}
