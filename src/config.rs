use std::{str::FromStr, time::Duration};

use chrono::Duration as ChronoDuration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{key} has an invalid value: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Process-wide settings, read once at start-up and shared read-only.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: String,
    pub jwt_secret: String,
    pub access_token_ttl: ChronoDuration,
    pub refresh_token_ttl: ChronoDuration,
    pub reset_token_ttl: ChronoDuration,
    /// Repeated identical cart adds inside this window are ignored.
    pub cart_debounce: ChronoDuration,
    pub page_size: u64,
    pub frontend_url: String,
    pub google_client_id: Option<String>,
    pub default_country: String,
    pub gateway: GatewayConfig,
}

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub key_id: String,
    pub key_secret: String,
    pub base_url: String,
    pub currency: String,
    pub timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup, so tests need not touch the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| lookup(key).ok_or(ConfigError::Missing(key));
        let or_default = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_owned());

        Ok(AppConfig {
            database_url: required("DATABASE_URL")?,
            bind_addr: or_default("BIND_ADDR", "0.0.0.0:3000"),
            jwt_secret: required("JWT_SECRET")?,
            access_token_ttl: ChronoDuration::minutes(parse(&lookup, "ACCESS_TOKEN_TTL_MINUTES", 60)?),
            refresh_token_ttl: ChronoDuration::days(parse(&lookup, "REFRESH_TOKEN_TTL_DAYS", 7)?),
            reset_token_ttl: ChronoDuration::minutes(parse(&lookup, "RESET_TOKEN_TTL_MINUTES", 60)?),
            cart_debounce: ChronoDuration::milliseconds(parse(&lookup, "CART_DEBOUNCE_MS", 2000)?),
            page_size: parse(&lookup, "PAGE_SIZE", 12)?,
            frontend_url: or_default("FRONTEND_URL", "http://localhost:5173"),
            google_client_id: lookup("GOOGLE_CLIENT_ID").filter(|id| !id.is_empty()),
            default_country: or_default("DEFAULT_COUNTRY", "India"),
            gateway: GatewayConfig {
                key_id: required("GATEWAY_KEY_ID")?,
                key_secret: required("GATEWAY_KEY_SECRET")?,
                base_url: or_default("GATEWAY_BASE_URL", "https://api.razorpay.com/v1"),
                currency: or_default("GATEWAY_CURRENCY", "INR"),
                timeout: Duration::from_secs(parse(&lookup, "GATEWAY_TIMEOUT_SECS", 10)?),
            },
        })
    }
}

fn parse<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("DATABASE_URL", "sqlite::memory:"),
            ("JWT_SECRET", "secret"),
            ("GATEWAY_KEY_ID", "rzp_test_key"),
            ("GATEWAY_KEY_SECRET", "rzp_test_secret"),
        ])
    }

    #[test]
    fn defaults_are_applied() {
        let vars = base();
        let config = AppConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.page_size, 12);
        assert_eq!(config.cart_debounce, ChronoDuration::seconds(2));
        assert_eq!(config.gateway.currency, "INR");
        assert!(config.google_client_id.is_none());
    }

    #[test]
    fn missing_secret_is_reported() {
        let mut vars = base();
        vars.remove("JWT_SECRET");
        let err = AppConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("JWT_SECRET")));
    }

    #[test]
    fn malformed_number_is_rejected() {
        let mut vars = base();
        vars.insert("PAGE_SIZE", "twelve");
        let err = AppConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PAGE_SIZE", .. }));
    }
}
