//! Log output for the CLI: compact lines on stderr so stdout stays clean for
//! command summaries and reports.

use thiserror::Error;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

use crate::config::TelemetryConfig;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid log filter '{value}' from {origin}")]
    Filter {
        origin: &'static str,
        value: String,
        #[source]
        source: ParseError,
    },

    #[error("could not install log subscriber: {0}")]
    Subscriber(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Picks the filter directive: a non-blank `RUST_LOG` first, else `DORM_EVAL_LOG`.
pub fn build_filter(
    rust_log: Option<&str>,
    config: &TelemetryConfig,
) -> Result<EnvFilter, TelemetryError> {
    let (origin, value) = match rust_log.map(str::trim).filter(|v| !v.is_empty()) {
        Some(directive) => ("RUST_LOG", directive),
        None => ("DORM_EVAL_LOG", config.log_level.trim()),
    };

    EnvFilter::try_new(value).map_err(|source| TelemetryError::Filter {
        origin,
        value: value.to_string(),
        source,
    })
}

pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = build_filter(rust_log.as_deref(), config)?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .try_init()
        .map_err(TelemetryError::Subscriber)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::filter::LevelFilter;

    fn level(value: &str) -> TelemetryConfig {
        TelemetryConfig {
            log_level: value.to_string(),
        }
    }

    #[test]
    fn rust_log_overrides_configured_level() {
        let filter = build_filter(Some("dorm_eval=debug"), &level("warn")).unwrap();
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));

        let blank = build_filter(Some("  "), &level("warn")).unwrap();
        assert_eq!(blank.max_level_hint(), Some(LevelFilter::WARN));
    }

    #[test]
    fn bad_configured_level_names_its_variable() {
        let err = build_filter(None, &level("dorm_eval=loud")).unwrap_err();
        assert!(matches!(
            err,
            TelemetryError::Filter {
                origin: "DORM_EVAL_LOG",
                ..
            }
        ));
        assert!(err.to_string().contains("DORM_EVAL_LOG"));
    }
}
