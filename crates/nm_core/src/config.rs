use std::path::PathBuf;
use std::time::Duration;

use crate::{Error, Result};

#[derive(Debug, Clone, Default)]
pub struct ProviderKeys {
    pub newsapi: Option<String>,
    pub newsdata: Option<String>,
    pub gnews: Option<String>,
    pub currents: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub brevo_api_key: Option<String>,
    pub sender_email: String,
    pub sender_name: String,
    pub public_url: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub providers: ProviderKeys,
    pub database_path: PathBuf,
    pub text_model_url: Option<String>,
    pub image_model_url: Option<String>,
    pub http_timeout: Duration,
    pub fetch_interval: Duration,
    pub bind_addr: String,
    pub email: EmailConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let http_timeout_secs = parse_positive(get("HTTP_TIMEOUT_SECS"), "HTTP_TIMEOUT_SECS", 10)?;
        let fetch_interval_hours = parse_positive(get("FETCH_INTERVAL_HOURS"), "FETCH_INTERVAL_HOURS", 6)?;
        let fetch_interval_secs = fetch_interval_hours
            .checked_mul(3600)
            .ok_or_else(|| Error::Config(format!("FETCH_INTERVAL_HOURS is too large: {}", fetch_interval_hours)))?;

        Ok(Self {
            providers: ProviderKeys {
                newsapi: get("NEWSAPI_KEY"),
                newsdata: get("NEWSDATA_KEY"),
                gnews: get("GNEWS_API_KEY"),
                currents: get("CURRENTS_API_KEY"),
            },
            database_path: get("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("news.db")),
            text_model_url: get("TEXT_MODEL_URL"),
            image_model_url: get("IMAGE_MODEL_URL"),
            http_timeout: Duration::from_secs(http_timeout_secs),
            fetch_interval: Duration::from_secs(fetch_interval_secs),
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8000".to_string()),
            email: EmailConfig {
                brevo_api_key: get("BREVO_API_KEY"),
                sender_email: get("BREVO_SENDER_EMAIL")
                    .unwrap_or_else(|| "noreply@ainewsanalyzer.com".to_string()),
                sender_name: get("BREVO_SENDER_NAME").unwrap_or_else(|| "AI News Analyzer".to_string()),
                public_url: get("PUBLIC_URL").unwrap_or_else(|| "http://localhost:5173".to_string()),
            },
        })
    }
}

fn parse_positive(value: Option<String>, key: &str, default: u64) -> Result<u64> {
    let number = match value {
        Some(v) => v
            .parse()
            .map_err(|_| Error::Config(format!("{} must be a whole number, got {:?}", key, v)))?,
        None => default,
    };
    if number == 0 {
        return Err(Error::Config(format!("{} must be positive", key)));
    }
    Ok(number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.http_timeout, Duration::from_secs(10));
        assert_eq!(config.fetch_interval, Duration::from_secs(6 * 3600));
        assert_eq!(config.database_path, PathBuf::from("news.db"));
        assert!(config.providers.newsapi.is_none());
        assert_eq!(config.email.sender_name, "AI News Analyzer");
    }

    #[test]
    fn test_overrides_and_blank_values() {
        let config = config_from(&[
            ("NEWSAPI_KEY", "abc"),
            ("GNEWS_API_KEY", "  "),
            ("HTTP_TIMEOUT_SECS", "3"),
            ("FETCH_INTERVAL_HOURS", "1"),
        ])
        .unwrap();
        assert_eq!(config.providers.newsapi.as_deref(), Some("abc"));
        assert!(config.providers.gnews.is_none());
        assert_eq!(config.http_timeout, Duration::from_secs(3));
        assert_eq!(config.fetch_interval, Duration::from_secs(3600));
    }

    #[test]
    fn test_invalid_numbers_are_rejected() {
        assert!(config_from(&[("HTTP_TIMEOUT_SECS", "ten")]).is_err());
        assert!(config_from(&[("FETCH_INTERVAL_HOURS", "0")]).is_err());
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let err = config_from(&[("HTTP_TIMEOUT_SECS", "0")]).unwrap_err();
        assert!(err.to_string().contains("HTTP_TIMEOUT_SECS"));
    }

    #[test]
    fn test_overflowing_interval_is_rejected() {
        let hours = u64::MAX.to_string();
        let err = config_from(&[("FETCH_INTERVAL_HOURS", hours.as_str())]).unwrap_err();
        assert!(err.to_string().contains("too large"));
    }
}
