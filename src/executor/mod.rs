//! Query execution against the target databases.
//!
//! The scrape pipeline only sees [`QueryExecutor`]: hand it a
//! [`ConnectionDescriptor`] and SQL text, get back a [`ResultSet`] or a
//! [`BackendError`] that the driver has already sorted into one of the
//! normalized categories. Driver-specific error codes never leave the
//! driver modules.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::logging::redact_secret;

#[cfg(feature = "mssql")]
mod mssql;
mod mysql;
#[cfg(feature = "oracle")]
mod oracledb;
mod postgres;

/// Supported database backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Mysql,
    Postgres,
    Oracle,
    Mssql,
}

impl Backend {
    /// Port used when the request does not name one
    pub fn default_port(self) -> u16 {
        match self {
            Self::Mysql => 3306,
            Self::Postgres => 5432,
            Self::Oracle => 1521,
            Self::Mssql => 1433,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mysql => "mysql",
            Self::Postgres => "postgres",
            Self::Oracle => "oracle",
            Self::Mssql => "mssql",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(Self::Mysql),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "oracle" => Ok(Self::Oracle),
            "mssql" | "sqlserver" => Ok(Self::Mssql),
            other => Err(other.to_string()),
        }
    }
}

/// Everything needed to open one connection for one request.
///
/// Built fresh per request and dropped with it.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    pub backend: Backend,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("backend", &self.backend)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("database", &self.database)
            .finish()
    }
}

/// One untyped scalar from a result row
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Cell {
    /// Wrap a text-protocol value, where SQL NULL arrives as `None`
    pub fn from_text(value: Option<String>) -> Self {
        value.map(Cell::Text).unwrap_or(Cell::Null)
    }

    /// Numeric reading of the cell, if it has one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Null => None,
            Cell::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Cell::Int(i) => Some(*i as f64),
            Cell::Float(f) => Some(*f),
            Cell::Text(s) => {
                let s = s.trim();
                match s.to_ascii_lowercase().as_str() {
                    "t" | "true" => Some(1.0),
                    "f" | "false" => Some(0.0),
                    _ => s.parse::<f64>().ok(),
                }
            }
        }
    }

    /// Label rendering of the cell; NULL becomes the empty string
    pub fn label_value(&self) -> String {
        match self {
            Cell::Null => String::new(),
            Cell::Bool(b) => b.to_string(),
            Cell::Int(i) => i.to_string(),
            Cell::Float(f) => f.to_string(),
            Cell::Text(s) => s.clone(),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => f.write_str("NULL"),
            other => f.write_str(&other.label_value()),
        }
    }
}

/// Column-described tabular result of one query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        Self { columns, rows }
    }
}

/// Backend failure, already classified by the driver that produced it.
///
/// The payload is the driver's own message, used as response detail.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("Authentication failed: Invalid username or password")]
    AuthenticationFailed(String),

    #[error("Cannot connect to database server")]
    Unreachable(String),

    #[error("Error in your SQL syntax")]
    Syntax(String),

    #[error("Database error")]
    Other(String),
}

impl BackendError {
    /// Driver message behind the normalized category
    pub fn detail(&self) -> &str {
        match self {
            Self::AuthenticationFailed(msg)
            | Self::Unreachable(msg)
            | Self::Syntax(msg)
            | Self::Other(msg) => msg,
        }
    }

    /// Strip a secret out of the driver message
    pub fn redact(self, secret: &str) -> Self {
        match self {
            Self::AuthenticationFailed(msg) => Self::AuthenticationFailed(redact_secret(&msg, secret)),
            Self::Unreachable(msg) => Self::Unreachable(redact_secret(&msg, secret)),
            Self::Syntax(msg) => Self::Syntax(redact_secret(&msg, secret)),
            Self::Other(msg) => Self::Other(redact_secret(&msg, secret)),
        }
    }
}

/// Runs one SQL statement against one target.
#[async_trait]
pub trait QueryExecutor: Send + Sync + 'static {
    async fn execute(
        &self,
        descriptor: &ConnectionDescriptor,
        sql: &str,
    ) -> Result<ResultSet, BackendError>;
}

/// Production executor: opens a fresh connection per call with the driver
/// matching the descriptor's backend, runs the SQL and closes it again.
#[derive(Debug, Default, Clone, Copy)]
pub struct DriverExecutor;

#[async_trait]
impl QueryExecutor for DriverExecutor {
    async fn execute(
        &self,
        descriptor: &ConnectionDescriptor,
        sql: &str,
    ) -> Result<ResultSet, BackendError> {
        match descriptor.backend {
            Backend::Mysql => mysql::execute(descriptor, sql).await,
            Backend::Postgres => postgres::execute(descriptor, sql).await,
            #[cfg(feature = "mssql")]
            Backend::Mssql => mssql::execute(descriptor, sql).await,
            #[cfg(feature = "oracle")]
            Backend::Oracle => oracledb::execute(descriptor, sql).await,
            #[allow(unreachable_patterns)]
            other => Err(BackendError::Other(format!(
                "backend '{}' is not compiled into this build",
                other
            ))),
        }
    }
}
