use std::env;

use thiserror::Error;

use crate::aggregate::DEFAULT_PAGE_SIZE;

/// Top-level configuration for the tool, read from `.env` and the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub mail: MailConfig,
    pub telemetry: TelemetryConfig,
    /// Base URL used when building evaluator links.
    pub app_base_url: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
    /// Rows per request when paging through score tables.
    pub page_size: i64,
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub relay_url: Option<String>,
    pub from: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let max_connections = match non_empty("DORM_EVAL_MAX_CONNECTIONS") {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or(ConfigError::InvalidNumber {
                    key: "DORM_EVAL_MAX_CONNECTIONS",
                    value: raw,
                })?,
            None => 5,
        };

        let page_size = match non_empty("DORM_EVAL_PAGE_SIZE") {
            Some(raw) => raw
                .trim()
                .parse::<i64>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or(ConfigError::InvalidNumber {
                    key: "DORM_EVAL_PAGE_SIZE",
                    value: raw,
                })?,
            None => DEFAULT_PAGE_SIZE,
        };

        let app_base_url = non_empty("APP_BASE_URL")
            .unwrap_or_else(|| "http://localhost:3000".to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            database: DatabaseConfig {
                url: non_empty("DATABASE_URL"),
                max_connections,
                page_size,
            },
            mail: MailConfig {
                relay_url: non_empty("MAIL_RELAY_URL"),
                from: non_empty("MAIL_FROM"),
            },
            telemetry: TelemetryConfig {
                log_level: non_empty("DORM_EVAL_LOG").unwrap_or_else(|| "info".to_string()),
            },
            app_base_url,
        })
    }

    pub fn database_url(&self) -> Result<&str, ConfigError> {
        self.database
            .url
            .as_deref()
            .ok_or(ConfigError::Missing("DATABASE_URL"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} must be a positive integer, got '{value}'")]
    InvalidNumber { key: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = load(&[]).unwrap();
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.database.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.app_base_url, "http://localhost:3000");
        assert!(config.mail.relay_url.is_none());
        assert_eq!(
            config.database_url().unwrap_err(),
            ConfigError::Missing("DATABASE_URL")
        );
    }

    #[test]
    fn reads_overrides() {
        let config = load(&[
            ("DATABASE_URL", "postgres://localhost/dorm"),
            ("DORM_EVAL_PAGE_SIZE", "250"),
            ("MAIL_RELAY_URL", "http://relay.local/send"),
            ("APP_BASE_URL", "https://eval.example.edu/"),
        ])
        .unwrap();
        assert_eq!(config.database_url().unwrap(), "postgres://localhost/dorm");
        assert_eq!(config.database.page_size, 250);
        assert_eq!(config.mail.relay_url.as_deref(), Some("http://relay.local/send"));
        assert_eq!(config.app_base_url, "https://eval.example.edu");
    }

    #[test]
    fn rejects_bad_numbers() {
        let err = load(&[("DORM_EVAL_PAGE_SIZE", "zero")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidNumber {
                key: "DORM_EVAL_PAGE_SIZE",
                ..
            }
        ));
        assert_eq!(
            err.to_string(),
            "DORM_EVAL_PAGE_SIZE must be a positive integer, got 'zero'"
        );
        assert!(load(&[("DORM_EVAL_MAX_CONNECTIONS", "0")]).is_err());
    }
}
