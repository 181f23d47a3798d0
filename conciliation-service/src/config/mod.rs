//! Configuration module for conciliation-service.

use secrecy::Secret;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

pub const DEFAULT_CONCILIATION_FIELD: &str = "custom_conciliation_id";

#[derive(Debug, Clone)]
pub struct ConciliationConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub erpnext: ErpNextConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone)]
pub struct ErpNextConfig {
    pub url: String,
    pub api_key: String,
    pub api_secret: Secret<String>,
    pub timeout_secs: u64,
    /// Custom field holding the group tag on invoices and payments.
    pub conciliation_field: String,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// No invalidation is sent when unset.
    pub redis_url: Option<String>,
    pub prefix: String,
}

impl ConciliationConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "conciliation-service".to_string()),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok(),
            erpnext: ErpNextConfig {
                url: env::var("ERPNEXT_URL").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("ERPNEXT_URL is required"))
                })?,
                api_key: env::var("ERPNEXT_API_KEY").unwrap_or_default(),
                api_secret: Secret::new(env::var("ERPNEXT_API_SECRET").unwrap_or_default()),
                timeout_secs: env::var("ERPNEXT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
                conciliation_field: env::var("CONCILIATION_FIELD")
                    .ok()
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_CONCILIATION_FIELD.to_string()),
            },
            cache: CacheConfig {
                redis_url: env::var("REDIS_URL").ok().filter(|s| !s.is_empty()),
                prefix: env::var("CACHE_PREFIX").unwrap_or_else(|_| "conciliation".to_string()),
            },
        })
    }
}
