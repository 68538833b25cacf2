//! Logging setup and secret redaction.
//!
//! Passwords come from the auth catalog and may surface inside driver error
//! messages (connection strings, DSNs). Anything that reaches a log line or
//! a response body goes through [`redact_secret`] first.

use std::fmt;
use tracing_subscriber::{fmt as tracing_fmt, prelude::*, EnvFilter};

/// Output format of the log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Initialize tracing/logging
///
/// `RUST_LOG` takes precedence over the configured level. Can only be
/// called once per process.
pub fn init_tracing(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_fmt::layer().with_target(true))
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_fmt::layer().json().with_target(true))
            .init(),
    }
}

/// Masked rendering of a secret for display purposes
#[derive(Clone, Debug)]
pub struct Masked<'a> {
    inner: &'a str,
}

impl<'a> Masked<'a> {
    pub fn new(secret: &'a str) -> Self {
        Self { inner: secret }
    }
}

impl fmt::Display for Masked<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.inner.is_empty() {
            write!(f, "")
        } else {
            write!(f, "***")
        }
    }
}

/// Replace every occurrence of `secret` in `text` with `***`
pub fn redact_secret(text: &str, secret: &str) -> String {
    if secret.is_empty() {
        return text.to_string();
    }
    text.replace(secret, "***")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_secret() {
        assert_eq!(
            redact_secret("login failed for exporter:pa55@db", "pa55"),
            "login failed for exporter:***@db"
        );
        assert_eq!(redact_secret("nothing here", "pa55"), "nothing here");
    }

    #[test]
    fn test_redact_empty_secret_is_noop() {
        assert_eq!(redact_secret("abc", ""), "abc");
    }

    #[test]
    fn test_masked_display() {
        assert_eq!(Masked::new("hunter2").to_string(), "***");
        assert_eq!(Masked::new("").to_string(), "");
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("JSON"), Some(LogFormat::Json));
        assert_eq!(LogFormat::parse("text"), Some(LogFormat::Text));
        assert_eq!(LogFormat::parse("xml"), None);
    }
}
