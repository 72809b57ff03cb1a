//! Configuration module
//!
//! Configuration is read from the process environment (after loading `.env` via
//! `dotenvy`). Every provider credential is optional: a missing key disables the
//! dependent step instead of failing startup.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

// Common constants
const DB_MAX_CONNECTIONS: u32 = 10;
const DB_TIMEOUT_SECS: u64 = 30;
const GEOCODER_URL: &str = "https://nominatim.openstreetmap.org";
const GEOCODER_USER_AGENT: &str = "picflow/0.1";
const GEOCODER_LANGUAGE: &str = "zh-CN";
const GEOCODER_TIMEOUT_SECS: u64 = 5;
const OFFLINE_GEOCODER_TIMEOUT_SECS: u64 = 2;
const VISION_API_BASE: &str = "https://api.siliconflow.cn/v1";
const VISION_MODEL: &str = "Qwen/Qwen2.5-VL-72B-Instruct";
const ANTHROPIC_VISION_MODEL: &str = "claude-sonnet-4-20250514";
const VISION_TIMEOUT_SECS: u64 = 60;
const ENRICHMENT_MAX_WORKERS: usize = 2;
const ENRICHMENT_QUEUE_CAPACITY: usize = 256;

/// Which vision API family the enrichment job talks to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VisionProviderKind {
    /// OpenAI-compatible chat completions (OpenAI, SiliconFlow, vLLM, ...)
    OpenAi,
    /// Anthropic Messages API
    Anthropic,
}

impl VisionProviderKind {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" | "openai-compatible" | "siliconflow" => Some(Self::OpenAi),
            "anthropic" | "claude" => Some(Self::Anthropic),
            _ => None,
        }
    }
}

/// Reverse-geocoding provider settings
#[derive(Clone, Debug)]
pub struct GeocodingConfig {
    /// Base URL of a Nominatim-compatible service; `None` disables the online provider
    pub online_url: Option<String>,
    pub user_agent: String,
    pub language: String,
    pub online_timeout: Duration,
    /// CSV file backing the offline nearest-place index
    pub offline_index_path: Option<PathBuf>,
    pub offline_timeout: Duration,
}

/// Vision enrichment settings
#[derive(Clone, Debug)]
pub struct VisionConfig {
    pub provider: VisionProviderKind,
    /// WARNING: secret. Never log this field.
    pub api_key: Option<String>,
    pub api_base: String,
    pub model: String,
    pub timeout: Duration,
}

impl VisionConfig {
    /// Enrichment is only attempted when a non-blank credential is configured.
    pub fn is_enabled(&self) -> bool {
        self.api_key
            .as_deref()
            .map(|k| !k.trim().is_empty())
            .unwrap_or(false)
    }
}

/// Application configuration
#[derive(Clone, Debug)]
pub struct Config {
    /// Postgres connection string; `None` selects the in-memory store
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    pub storage_path: PathBuf,
    pub storage_base_url: String,
    pub geocoding: GeocodingConfig,
    pub vision: VisionConfig,
    pub enrichment_max_workers: usize,
    pub enrichment_queue_capacity: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup. `from_env` is this
    /// function over the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let parsed = |key: &str, default: u64| -> u64 {
            var(key).and_then(|v| v.parse().ok()).unwrap_or(default)
        };

        let vision_provider = match var("VISION_PROVIDER") {
            Some(raw) => VisionProviderKind::parse(&raw)
                .ok_or_else(|| anyhow::anyhow!("Unknown VISION_PROVIDER: {}", raw))?,
            None => VisionProviderKind::OpenAi,
        };
        let default_model = match vision_provider {
            VisionProviderKind::OpenAi => VISION_MODEL,
            VisionProviderKind::Anthropic => ANTHROPIC_VISION_MODEL,
        };
        let default_base = match vision_provider {
            VisionProviderKind::OpenAi => VISION_API_BASE,
            VisionProviderKind::Anthropic => "https://api.anthropic.com/v1",
        };

        let geocoding = GeocodingConfig {
            online_url: match var("GEOCODER_URL") {
                Some(url) if url.eq_ignore_ascii_case("off") => None,
                Some(url) => Some(url),
                None => Some(GEOCODER_URL.to_string()),
            },
            user_agent: var("GEOCODER_USER_AGENT").unwrap_or_else(|| GEOCODER_USER_AGENT.into()),
            language: var("GEOCODER_LANGUAGE").unwrap_or_else(|| GEOCODER_LANGUAGE.into()),
            online_timeout: Duration::from_secs(parsed(
                "GEOCODER_TIMEOUT_SECS",
                GEOCODER_TIMEOUT_SECS,
            )),
            offline_index_path: var("OFFLINE_GEOCODER_INDEX").map(PathBuf::from),
            offline_timeout: Duration::from_secs(parsed(
                "OFFLINE_GEOCODER_TIMEOUT_SECS",
                OFFLINE_GEOCODER_TIMEOUT_SECS,
            )),
        };

        let vision = VisionConfig {
            provider: vision_provider,
            api_key: var("VISION_API_KEY").or_else(|| var("SILICONFLOW_API_KEY")),
            api_base: var("VISION_API_BASE").unwrap_or_else(|| default_base.to_string()),
            model: var("VISION_MODEL").unwrap_or_else(|| default_model.to_string()),
            timeout: Duration::from_secs(parsed("VISION_TIMEOUT_SECS", VISION_TIMEOUT_SECS)),
        };

        let config = Config {
            database_url: var("DATABASE_URL"),
            db_max_connections: parsed("DB_MAX_CONNECTIONS", DB_MAX_CONNECTIONS as u64) as u32,
            db_timeout_seconds: parsed("DB_TIMEOUT_SECS", DB_TIMEOUT_SECS),
            storage_path: PathBuf::from(
                var("LOCAL_STORAGE_PATH").unwrap_or_else(|| "./static".to_string()),
            ),
            storage_base_url: var("LOCAL_STORAGE_BASE_URL")
                .unwrap_or_else(|| "http://localhost:8000/static".to_string()),
            geocoding,
            vision,
            enrichment_max_workers: parsed("ENRICHMENT_MAX_WORKERS", ENRICHMENT_MAX_WORKERS as u64)
                as usize,
            enrichment_queue_capacity: parsed(
                "ENRICHMENT_QUEUE_CAPACITY",
                ENRICHMENT_QUEUE_CAPACITY as u64,
            ) as usize,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.enrichment_max_workers == 0 {
            anyhow::bail!("ENRICHMENT_MAX_WORKERS must be at least 1");
        }
        if self.enrichment_queue_capacity == 0 {
            anyhow::bail!("ENRICHMENT_QUEUE_CAPACITY must be at least 1");
        }
        if self.db_max_connections == 0 {
            anyhow::bail!("DB_MAX_CONNECTIONS must be at least 1");
        }
        if self.geocoding.online_timeout.is_zero() {
            anyhow::bail!("GEOCODER_TIMEOUT_SECS must be greater than 0");
        }
        if self.geocoding.offline_timeout.is_zero() {
            anyhow::bail!("OFFLINE_GEOCODER_TIMEOUT_SECS must be greater than 0");
        }
        if self.vision.timeout.is_zero() {
            anyhow::bail!("VISION_TIMEOUT_SECS must be greater than 0");
        }
        if let Some(url) = &self.geocoding.online_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("GEOCODER_URL must be an http(s) URL, got {}", url);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, anyhow::Error> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults_without_environment() {
        let config = config_from(&[]).unwrap();
        assert!(config.database_url.is_none());
        assert!(!config.vision.is_enabled());
        assert_eq!(config.vision.provider, VisionProviderKind::OpenAi);
        assert_eq!(config.geocoding.online_timeout, Duration::from_secs(5));
        assert_eq!(config.enrichment_max_workers, 2);
    }

    #[test]
    fn test_siliconflow_key_is_accepted_as_vision_key() {
        let config = config_from(&[("SILICONFLOW_API_KEY", "sk-test")]).unwrap();
        assert!(config.vision.is_enabled());
        assert_eq!(config.vision.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_blank_key_disables_vision() {
        let config = config_from(&[("VISION_API_KEY", "   ")]).unwrap();
        assert!(!config.vision.is_enabled());
    }

    #[test]
    fn test_anthropic_provider_switches_default_model() {
        let config = config_from(&[("VISION_PROVIDER", "claude")]).unwrap();
        assert_eq!(config.vision.provider, VisionProviderKind::Anthropic);
        assert_eq!(config.vision.model, ANTHROPIC_VISION_MODEL);
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        assert!(config_from(&[("VISION_PROVIDER", "bard")]).is_err());
    }

    #[test]
    fn test_geocoder_can_be_turned_off() {
        let config = config_from(&[("GEOCODER_URL", "off")]).unwrap();
        assert!(config.geocoding.online_url.is_none());
    }

    #[test]
    fn test_zero_workers_fail_validation() {
        assert!(config_from(&[("ENRICHMENT_MAX_WORKERS", "0")]).is_err());
    }

    #[test]
    fn test_zero_geocoder_timeouts_fail_validation() {
        assert!(config_from(&[("GEOCODER_TIMEOUT_SECS", "0")]).is_err());
        assert!(config_from(&[("OFFLINE_GEOCODER_TIMEOUT_SECS", "0")]).is_err());
        let config = config_from(&[("OFFLINE_GEOCODER_TIMEOUT_SECS", "3")]).unwrap();
        assert_eq!(config.geocoding.offline_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_malformed_numbers_fall_back_to_defaults() {
        let config = config_from(&[("GEOCODER_TIMEOUT_SECS", "soon")]).unwrap();
        assert_eq!(config.geocoding.online_timeout, Duration::from_secs(5));
    }
}
