//! Structured logging configuration.

use crate::config::LoggingSettings;
use crate::{Error, Result};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Filter used when neither the config nor the environment names one.
pub const DEFAULT_FILTER: &str = "info";

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line human-readable output.
    #[default]
    Pretty,
    /// Single-line human-readable output.
    Compact,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Returns the format name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pretty => "pretty",
            Self::Compact => "compact",
            Self::Json => "json",
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(Error::InvalidInput(format!("unknown log format: {other}"))),
        }
    }
}

/// Resolved logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// `EnvFilter` directive.
    pub filter: String,
    /// Optional append-only log file; stderr when absent.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            filter: DEFAULT_FILTER.to_string(),
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Resolves settings against `RUST_LOG` and the verbose flag.
    ///
    /// Precedence for the filter: `--verbose`, then the configured filter
    /// (which `FACTGRAPH_LOG` has already overridden), then `RUST_LOG`, then
    /// [`DEFAULT_FILTER`].
    #[must_use]
    pub fn from_settings(settings: &LoggingSettings, verbose: bool) -> Self {
        Self::resolve(settings, verbose, std::env::var("RUST_LOG").ok())
    }

    fn resolve(settings: &LoggingSettings, verbose: bool, rust_log: Option<String>) -> Self {
        let filter = if verbose {
            "debug".to_string()
        } else {
            settings
                .filter
                .clone()
                .or(rust_log)
                .filter(|f| !f.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_FILTER.to_string())
        };

        Self {
            format: settings.format,
            filter,
            file: settings.file.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("pretty", LogFormat::Pretty; "pretty")]
    #[test_case("TEXT", LogFormat::Pretty; "text alias")]
    #[test_case("compact", LogFormat::Compact; "compact")]
    #[test_case(" json ", LogFormat::Json; "json trimmed")]
    fn test_log_format_parse(input: &str, expected: LogFormat) {
        assert_eq!(input.parse::<LogFormat>().unwrap(), expected);
    }

    #[test]
    fn test_log_format_rejects_unknown() {
        assert!(matches!(
            "xml".parse::<LogFormat>(),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_filter_precedence() {
        let mut settings = LoggingSettings::default();
        let rust_log = Some("warn".to_string());

        assert_eq!(LoggingConfig::resolve(&settings, false, None).filter, "info");
        assert_eq!(
            LoggingConfig::resolve(&settings, false, rust_log.clone()).filter,
            "warn"
        );

        settings.filter = Some("factgraph=trace".to_string());
        assert_eq!(
            LoggingConfig::resolve(&settings, false, rust_log.clone()).filter,
            "factgraph=trace"
        );
        assert_eq!(LoggingConfig::resolve(&settings, true, rust_log).filter, "debug");
    }
}
