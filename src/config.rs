//! Environment-driven configuration.

use rust_decimal::Decimal;
use std::env;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub port: u16,
    pub service_name: String,
    pub log_level: String,
    /// Fraction of capacity at or below which a balance reports LOW.
    pub low_balance_threshold: Decimal,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            port: parse_env("APP_PORT", 8080)?,
            service_name: env::var("SERVICE_NAME").unwrap_or_else(|_| "balance-service".into()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            low_balance_threshold: parse_env(
                "LOW_BALANCE_THRESHOLD_PCT",
                crate::models::status::DEFAULT_LOW_THRESHOLD,
            )?,
        })
    }
}

fn parse_env<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.parse().map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!("invalid value for {}: {}", key, e))
        }),
        Err(_) => Ok(default),
    }
}
