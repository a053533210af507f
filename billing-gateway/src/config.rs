//! Gateway configuration types.
//!
//! This module defines the TOML-deserializable configuration for the billing
//! gateway: backend location and credentials, HTTP client limits, and the
//! optional plan-listing cache.
//!
//! # Examples
//!
//! ```toml
//! enabled = true
//! url = "https://subhub.example.com"
//! api_key_env = "SUBHUB_API_KEY"
//! timeout_secs = 15
//!
//! [cache]
//! plans_ttl_seconds = 600
//! backend = "redis"
//! redis_url = "redis://127.0.0.1/"
//! ```

use std::{path::Path, time::Duration};

use serde::Deserialize;
use url::Url;

use crate::error::{GatewayError, Result};

/// Root gateway configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Whether subscription features are available at all.
    ///
    /// A disabled gateway rejects every call with
    /// [`GatewayError::FeatureNotEnabled`] and never touches the network.
    #[serde(default)]
    pub enabled: bool,

    /// Base URL of the billing backend.
    #[serde(default)]
    pub url: String,

    /// Static bearer credential. Prefer `api_key_env` outside of tests.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Environment variable holding the bearer credential.
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Connection timeout in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Maximum idle connections per host.
    #[serde(default = "default_pool_max_idle")]
    pub pool_max_idle_per_host: usize,

    /// Value sent as `origin_system` when creating subscriptions.
    #[serde(default = "default_origin_system")]
    pub origin_system: String,

    /// Prefix of performance event names.
    #[serde(default = "default_metrics_event_prefix")]
    pub metrics_event_prefix: String,

    /// Plan-listing cache.
    #[serde(default)]
    pub cache: CacheConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: String::new(),
            api_key: None,
            api_key_env: None,
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            pool_max_idle_per_host: default_pool_max_idle(),
            origin_system: default_origin_system(),
            metrics_event_prefix: default_metrics_event_prefix(),
            cache: CacheConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Parses and validates configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ConfigError`] if parsing or validation fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use billing_gateway::GatewayConfig;
    ///
    /// let config = GatewayConfig::from_toml(r#"
    ///     enabled = true
    ///     url = "https://subhub.example.com"
    ///     api_key = "secret"
    /// "#).unwrap();
    /// assert_eq!(config.timeout_secs, 15);
    /// ```
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml_str)
            .map_err(|e| GatewayError::ConfigError(format!("invalid TOML config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or the configuration is invalid.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| GatewayError::ConfigError(format!("cannot read config file: {e}")))?;
        Self::from_toml(&content)
    }

    /// Validates the configuration.
    ///
    /// Disabled configurations only need well-formed values; URL and
    /// credential checks apply when `enabled = true`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ConfigError`] naming the offending key.
    pub fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 || self.timeout_secs > 300 {
            return Err(GatewayError::ConfigError(
                "timeout_secs must be between 1 and 300".to_owned(),
            ));
        }
        if self.connect_timeout_secs == 0 || self.connect_timeout_secs > 60 {
            return Err(GatewayError::ConfigError(
                "connect_timeout_secs must be between 1 and 60".to_owned(),
            ));
        }
        if let Some(ref name) = self.api_key_env {
            validate_env_var_name(name)?;
        }
        self.cache.validate()?;

        if !self.enabled {
            return Ok(());
        }

        self.base_url()?;
        if self.api_key.is_none() && self.api_key_env.is_none() {
            return Err(GatewayError::ConfigError(
                "one of api_key or api_key_env is required when enabled".to_owned(),
            ));
        }
        Ok(())
    }

    /// Parses the backend base URL.
    ///
    /// # Errors
    ///
    /// Returns error if the URL is malformed or not http(s).
    pub fn base_url(&self) -> Result<Url> {
        let url = Url::parse(&self.url)
            .map_err(|e| GatewayError::ConfigError(format!("invalid url '{}': {e}", self.url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(GatewayError::ConfigError(format!(
                "url must use http or https, got: {}",
                url.scheme()
            )));
        }
        if url.cannot_be_a_base() {
            return Err(GatewayError::ConfigError(format!("url cannot be a base: {}", self.url)));
        }
        Ok(url)
    }

    /// Resolves the bearer credential.
    ///
    /// An inline `api_key` wins over `api_key_env`.
    ///
    /// # Errors
    ///
    /// Returns error if neither source yields a non-empty key.
    pub fn resolve_api_key(&self) -> Result<String> {
        if let Some(key) = self.api_key.as_ref().filter(|key| !key.is_empty()) {
            return Ok(key.clone());
        }
        let Some(ref name) = self.api_key_env else {
            return Err(GatewayError::ConfigError("no api key configured".to_owned()));
        };
        match std::env::var(name) {
            Ok(key) if !key.is_empty() => Ok(key),
            _ => Err(GatewayError::ConfigError(format!(
                "environment variable {name} is not set or empty"
            ))),
        }
    }

    /// Returns request timeout as Duration.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Returns connect timeout as Duration.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Plan-listing cache configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Time-to-live of cached plan listings. Caching is off unless this is positive.
    #[serde(default)]
    pub plans_ttl_seconds: Option<u64>,

    /// Store backing the cache.
    #[serde(default)]
    pub backend: CacheBackend,

    /// Redis connection URL, required for the redis backend.
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Prepended to every cache key.
    #[serde(default)]
    pub key_prefix: String,

    /// Upper bound on a single cache read or write, in milliseconds.
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,

    /// Capacity of the in-memory store.
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            plans_ttl_seconds: None,
            backend: CacheBackend::default(),
            redis_url: None,
            key_prefix: String::new(),
            operation_timeout_ms: default_operation_timeout_ms(),
            max_entries: default_max_entries(),
        }
    }
}

impl CacheConfig {
    /// Validates cache settings.
    ///
    /// # Errors
    ///
    /// Returns error if the redis backend is selected with a TTL but no URL,
    /// or if `operation_timeout_ms` is zero.
    pub fn validate(&self) -> Result<()> {
        if self.operation_timeout_ms == 0 {
            return Err(GatewayError::ConfigError(
                "cache.operation_timeout_ms must be positive".to_owned(),
            ));
        }
        if self.plans_ttl().is_some()
            && self.backend == CacheBackend::Redis
            && self.redis_url.as_deref().is_none_or(str::is_empty)
        {
            return Err(GatewayError::ConfigError(
                "cache.redis_url is required when the redis backend is enabled".to_owned(),
            ));
        }
        Ok(())
    }

    /// TTL of plan listings, `None` when caching is disabled.
    #[must_use]
    pub fn plans_ttl(&self) -> Option<Duration> {
        self.plans_ttl_seconds.filter(|&secs| secs > 0).map(Duration::from_secs)
    }

    /// Returns the per-operation cache timeout as Duration.
    #[must_use]
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

/// Store selection for the response cache.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackend {
    /// Shared Redis instance.
    #[default]
    Redis,
    /// Process-local store.
    Memory,
}

/// Validates an environment variable name.
fn validate_env_var_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let Some(first_char) = chars.next() else {
        return Err(GatewayError::ConfigError(
            "environment variable name cannot be empty".to_owned(),
        ));
    };

    if !first_char.is_ascii_alphabetic() && first_char != '_' {
        return Err(GatewayError::ConfigError(format!(
            "environment variable name must start with letter or underscore: {name}"
        )));
    }

    if let Some(ch) = chars.find(|ch| !ch.is_ascii_alphanumeric() && *ch != '_') {
        return Err(GatewayError::ConfigError(format!(
            "environment variable name contains invalid character '{ch}': {name}"
        )));
    }

    Ok(())
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_pool_max_idle() -> usize {
    32
}

fn default_origin_system() -> String {
    "fxa".to_owned()
}

fn default_metrics_event_prefix() -> String {
    "billing.performance".to_owned()
}

fn default_operation_timeout_ms() -> u64 {
    500
}

fn default_max_entries() -> u64 {
    1_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_config_default() {
        let config = GatewayConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.timeout_secs, 15);
        assert_eq!(config.origin_system, "fxa");
        assert_eq!(config.metrics_event_prefix, "billing.performance");
        assert!(config.cache.plans_ttl().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_gateway_config_from_toml() {
        let config = GatewayConfig::from_toml(
            r#"
            enabled = true
            url = "https://subhub.example.com"
            api_key = "secret"
            timeout_secs = 20
            origin_system = "accounts"

            [cache]
            plans_ttl_seconds = 600
            backend = "memory"
            key_prefix = "billing:"
        "#,
        )
        .unwrap();

        assert!(config.enabled);
        assert_eq!(config.timeout(), Duration::from_secs(20));
        assert_eq!(config.origin_system, "accounts");
        assert_eq!(config.cache.backend, CacheBackend::Memory);
        assert_eq!(config.cache.plans_ttl(), Some(Duration::from_secs(600)));
        assert_eq!(config.cache.key_prefix, "billing:");
        assert_eq!(config.cache.operation_timeout(), Duration::from_millis(500));
    }

    #[test]
    fn test_disabled_config_skips_url_check() {
        let config = GatewayConfig::from_toml("enabled = false").unwrap();
        assert!(!config.enabled);
    }

    #[test]
    fn test_enabled_config_requires_url() {
        let result = GatewayConfig::from_toml(
            r#"
            enabled = true
            api_key = "secret"
        "#,
        );
        assert!(matches!(result, Err(GatewayError::ConfigError(_))));
    }

    #[test]
    fn test_enabled_config_requires_key() {
        let result = GatewayConfig::from_toml(
            r#"
            enabled = true
            url = "https://subhub.example.com"
        "#,
        );
        let err = result.unwrap_err();
        assert!(err.to_string().contains("api_key"));
    }

    #[test]
    fn test_non_http_url_rejected() {
        let config = GatewayConfig {
            enabled: true,
            url: "ftp://subhub.example.com".to_owned(),
            api_key: Some("secret".to_owned()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_timeout_bounds() {
        let config = GatewayConfig { timeout_secs: 0, ..Default::default() };
        assert!(config.validate().is_err());

        let config = GatewayConfig { timeout_secs: 301, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_ttl_disables_cache() {
        let cache = CacheConfig { plans_ttl_seconds: Some(0), ..Default::default() };
        assert!(cache.plans_ttl().is_none());
        assert!(cache.validate().is_ok());
    }

    #[test]
    fn test_redis_backend_requires_url() {
        let cache = CacheConfig { plans_ttl_seconds: Some(60), ..Default::default() };
        assert!(cache.validate().is_err());

        let cache = CacheConfig {
            plans_ttl_seconds: Some(60),
            redis_url: Some("redis://127.0.0.1/".to_owned()),
            ..Default::default()
        };
        assert!(cache.validate().is_ok());
    }

    #[test]
    fn test_env_var_name_validation() {
        assert!(validate_env_var_name("SUBHUB_API_KEY").is_ok());
        assert!(validate_env_var_name("_KEY").is_ok());
        assert!(validate_env_var_name("").is_err());
        assert!(validate_env_var_name("1KEY").is_err());
        assert!(validate_env_var_name("KEY-NAME").is_err());
    }

    #[test]
    fn test_inline_api_key_wins() {
        let config = GatewayConfig {
            api_key: Some("inline".to_owned()),
            api_key_env: Some("BILLING_GATEWAY_TEST_UNSET_KEY".to_owned()),
            ..Default::default()
        };
        assert_eq!(config.resolve_api_key().unwrap(), "inline");
    }

    #[test]
    fn test_empty_inline_api_key_falls_back_to_env() {
        let config = GatewayConfig {
            api_key: Some(String::new()),
            api_key_env: Some("BILLING_GATEWAY_TEST_UNSET_KEY".to_owned()),
            ..Default::default()
        };
        let err = config.resolve_api_key().unwrap_err();
        assert!(err.to_string().contains("BILLING_GATEWAY_TEST_UNSET_KEY"));

        let config = GatewayConfig { api_key: Some(String::new()), ..Default::default() };
        assert!(matches!(config.resolve_api_key(), Err(GatewayError::ConfigError(_))));
    }

    #[test]
    fn test_missing_env_key() {
        let config = GatewayConfig {
            api_key_env: Some("BILLING_GATEWAY_TEST_UNSET_KEY".to_owned()),
            ..Default::default()
        };
        assert!(matches!(config.resolve_api_key(), Err(GatewayError::ConfigError(_))));
    }

    #[test]
    fn test_invalid_toml_syntax() {
        let result = GatewayConfig::from_toml("enabled = [");
        assert!(matches!(result, Err(GatewayError::ConfigError(_))));
    }
}
