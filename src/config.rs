//! Configuration types.

use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Global parameter holding the e-Factura lookback window, in days.
pub const DOWNLOAD_LIMIT_DAYS_KEY: &str = "efactura_download_limit_days";

/// Lookback window used when the parameter has never been set.
pub const DEFAULT_DOWNLOAD_LIMIT_DAYS: i64 = 60;

/// ANAF e-Factura deployment to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnafEnvironment {
    Production,
    Test,
}

impl AnafEnvironment {
    /// REST base URL for the environment.
    pub fn base_url(&self) -> &'static str {
        match self {
            AnafEnvironment::Production => "https://api.anaf.ro/prod/FCTEL/rest",
            AnafEnvironment::Test => "https://api.anaf.ro/test/FCTEL/rest",
        }
    }
}

impl FromStr for AnafEnvironment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Ok(AnafEnvironment::Production),
            "test" => Ok(AnafEnvironment::Test),
            other => Err(ConfigError::InvalidValue {
                key: "EFACTURA_ANAF_ENV".to_string(),
                message: format!("expected 'prod' or 'test', got '{other}'"),
            }),
        }
    }
}

/// Service configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub db_path: String,
    pub environment: AnafEnvironment,
    pub base_url: String,
    /// Cron expression (with seconds field) driving the sync ticker.
    pub schedule: String,
    pub http_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            db_path: "./data/efactura.db".to_string(),
            environment: AnafEnvironment::Production,
            base_url: AnafEnvironment::Production.base_url().to_string(),
            schedule: "0 0 * * * *".to_string(), // hourly
            http_timeout: Duration::from_secs(30),
        }
    }
}

impl SyncConfig {
    /// Build config from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let db_path = std::env::var("EFACTURA_DB_PATH").unwrap_or(defaults.db_path);

        let environment = match std::env::var("EFACTURA_ANAF_ENV") {
            Ok(s) => s.parse()?,
            Err(_) => defaults.environment,
        };

        let base_url = std::env::var("EFACTURA_ANAF_BASE_URL")
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or_else(|_| environment.base_url().to_string());

        let schedule = std::env::var("EFACTURA_SCHEDULE").unwrap_or(defaults.schedule);
        validate_schedule(&schedule)?;

        let http_timeout = match std::env::var("EFACTURA_HTTP_TIMEOUT_SECS") {
            Ok(s) => {
                let secs: u64 = s.parse().map_err(|e| ConfigError::InvalidValue {
                    key: "EFACTURA_HTTP_TIMEOUT_SECS".to_string(),
                    message: format!("{e}"),
                })?;
                Duration::from_secs(secs)
            }
            Err(_) => defaults.http_timeout,
        };

        Ok(Self {
            db_path,
            environment,
            base_url,
            schedule,
            http_timeout,
        })
    }
}

/// Reject cron expressions the ticker would not be able to run.
pub fn validate_schedule(schedule: &str) -> Result<cron::Schedule, ConfigError> {
    cron::Schedule::from_str(schedule).map_err(|e| ConfigError::InvalidValue {
        key: "EFACTURA_SCHEDULE".to_string(),
        message: format!("invalid cron: {e}"),
    })
}
