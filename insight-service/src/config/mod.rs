use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct InsightConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub session: SessionConfig,
    pub storage: StorageConfig,
    pub analytics: AnalyticsConfig,
    pub razorpay: RazorpayConfig,
    pub quota: QuotaConfig,
    pub upload: UploadConfig,
    pub rate_limit: RateLimitConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    /// Take the client address from `x-forwarded-for`. Only safe behind a
    /// proxy that overwrites the header.
    pub trust_forwarded_for: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            cors_origins: vec!["http://localhost:3000".to_string()],
            trust_forwarded_for: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Mongo,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub uri: Secret<String>,
    pub name: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: DatabaseBackend::Mongo,
            uri: Secret::new("mongodb://localhost:27017".to_string()),
            name: "insight_db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub cookie_name: String,
    pub ttl_hours: i64,
    pub remember_ttl_days: i64,
    pub secure_cookie: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "insight_session".to_string(),
            ttl_hours: 24 * 7,
            remember_ttl_days: 30,
            secure_cookie: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Local,
    Cloudinary,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub local_path: String,
    /// Base URL under which locally stored blobs are reachable by the
    /// analytics engine.
    pub public_base_url: String,
    pub cloudinary: CloudinaryConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local,
            local_path: "storage".to_string(),
            public_base_url: "http://localhost:3001/blobs".to_string(),
            cloudinary: CloudinaryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: Secret<String>,
    pub api_base_url: String,
}

impl Default for CloudinaryConfig {
    fn default() -> Self {
        Self {
            cloud_name: String::new(),
            api_key: String::new(),
            api_secret: Secret::new(String::new()),
            api_base_url: "https://api.cloudinary.com/v1_1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub base_url: String,
    pub timeout_seconds: u64,
    pub pricing_units: u32,
    pub pricing_months: u32,
    /// A run left in `processing` longer than this may be re-triggered.
    pub stale_after_seconds: i64,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            timeout_seconds: 60,
            pricing_units: 120,
            pricing_months: 6,
            stale_after_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RazorpayConfig {
    pub key_id: String,
    pub key_secret: Secret<String>,
    pub api_base_url: String,
    pub currency: String,
}

impl Default for RazorpayConfig {
    fn default() -> Self {
        Self {
            key_id: String::new(),
            key_secret: Secret::new(String::new()),
            api_base_url: "https://api.razorpay.com/v1".to_string(),
            currency: "INR".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    pub free_limit: u64,
    pub pro_limit: u64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            free_limit: 3,
            pro_limit: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub max_bytes: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub login_attempts: u32,
    pub login_window_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            login_attempts: 5,
            login_window_seconds: 15 * 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub service_name: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "insight-service".to_string(),
            log_level: "info".to_string(),
            otlp_endpoint: None,
        }
    }
}

impl InsightConfig {
    /// Defaults, then `configuration.{yaml,toml,json}`, then `APP__*` variables.
    pub fn load() -> Result<Self, AppError> {
        let config: Self = core_config::load("configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if core_config::is_production() {
            if self.razorpay.key_secret.expose_secret().is_empty() {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "razorpay.key_secret is required in production but not set"
                )));
            }
            if self.database.backend == DatabaseBackend::Memory {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "the memory database backend cannot be used in production"
                )));
            }
        }
        if self.quota.free_limit == 0 || self.quota.pro_limit == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "quota limits must be positive"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = InsightConfig::default();
        assert_eq!(config.server.port, 3001);
        assert_eq!(config.quota.free_limit, 3);
        assert_eq!(config.quota.pro_limit, 10);
        assert_eq!(config.analytics.pricing_units, 120);
        assert_eq!(config.analytics.pricing_months, 6);
        assert_eq!(config.analytics.timeout_seconds, 60);
        assert_eq!(config.razorpay.currency, "INR");
        assert_eq!(config.upload.max_bytes, 10 * 1024 * 1024);
        assert_eq!(config.session.remember_ttl_days, 30);
    }

    #[test]
    fn zero_quota_is_rejected() {
        let mut config = InsightConfig::default();
        config.quota.free_limit = 0;
        assert!(config.validate().is_err());
    }
}
