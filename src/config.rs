use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::executor::Backend;
use crate::logging::LogFormat;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerConfig,
    pub scrape: ScrapeConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9399,
            log_level: "info".to_string(),
            log_format: "text".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScrapeConfig {
    /// YAML document with the `packages` map
    pub queries_file: PathBuf,
    /// YAML document with the `auths` map
    pub auth_file: PathBuf,
    /// Upper bound for a single query, connection setup included
    pub query_timeout_seconds: u64,
    /// Backend used when a request does not name one
    pub default_backend: Backend,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            queries_file: PathBuf::from("queries.yaml"),
            auth_file: PathBuf::from("auth.yaml"),
            query_timeout_seconds: 30,
            default_backend: Backend::Mysql,
        }
    }
}

impl ScrapeConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "/metrics".to_string(),
        }
    }
}

impl Settings {
    pub fn log_format(&self) -> LogFormat {
        LogFormat::parse(&self.server.log_format).unwrap_or(LogFormat::Text)
    }
}

/// Load settings from `path` (optional) and `SQL_EXPORTER__*` environment
/// variables, then validate them.
pub fn load_settings(path: &Path) -> anyhow::Result<Settings> {
    let config = config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(
            config::Environment::with_prefix("SQL_EXPORTER")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let settings: Settings = config.try_deserialize()?;
    validate_settings(&settings)?;

    Ok(settings)
}

fn validate_settings(settings: &Settings) -> anyhow::Result<()> {
    if LogFormat::parse(&settings.server.log_format).is_none() {
        anyhow::bail!(
            "Invalid log format '{}': expected 'text' or 'json'",
            settings.server.log_format
        );
    }

    if settings.scrape.queries_file.as_os_str().is_empty() {
        anyhow::bail!("scrape.queries_file cannot be empty");
    }
    if settings.scrape.auth_file.as_os_str().is_empty() {
        anyhow::bail!("scrape.auth_file cannot be empty");
    }
    if settings.scrape.query_timeout_seconds == 0 {
        anyhow::bail!("scrape.query_timeout_seconds must be >= 1");
    }

    if settings.metrics.enabled {
        let endpoint = settings.metrics.endpoint.as_str();
        if !endpoint.starts_with('/') {
            anyhow::bail!("metrics.endpoint must start with '/': {}", endpoint);
        }
        if matches!(endpoint, "/" | "/scrape" | "/healthcheck") {
            anyhow::bail!("metrics.endpoint '{}' collides with a built-in route", endpoint);
        }
    }

    Ok(())
}
