//! Query packages and auth entries.
//!
//! Two YAML documents feed the catalog: one maps package name to an ordered
//! list of query definitions, the other maps auth key to credentials. Both
//! are read once at startup (and again on SIGHUP) and are read-only
//! afterwards.

use anyhow::{bail, Context};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::error::ScrapeError;

/// Metric type of a value column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MetricKind {
    Gauge,
    Counter,
}

impl MetricKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gauge => "gauge",
            Self::Counter => "counter",
        }
    }
}

impl FromStr for MetricKind {
    type Err = ScrapeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gauge" => Ok(Self::Gauge),
            "counter" => Ok(Self::Counter),
            _ => Err(ScrapeError::UnsupportedMetricType(s.to_string())),
        }
    }
}

impl TryFrom<String> for MetricKind {
    type Error = ScrapeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MetricKind> for String {
    fn from(kind: MetricKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One value column of a query and the instrument it feeds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueSpec {
    pub column: String,
    #[serde(rename = "type")]
    pub kind: MetricKind,
    #[serde(default)]
    pub help: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    /// Metric name prefix
    pub name: String,
    /// SQL text, passed to the backend untouched
    #[serde(alias = "query")]
    pub sql: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub values: Vec<ValueSpec>,
}

impl Query {
    /// Name of the instrument fed by `value`
    pub fn metric_name(&self, value: &ValueSpec) -> String {
        format!("{}_{}", self.name, value.column)
    }

    /// Number of columns every result row must have
    pub fn expected_width(&self) -> usize {
        self.labels.len() + self.values.len()
    }
}

/// Named, ordered set of queries scraped together
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPackage {
    pub name: String,
    pub queries: Vec<Query>,
}

#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct AuthEntry {
    pub user: String,
    pub password: String,
}

impl fmt::Debug for AuthEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthEntry")
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

/// Everything the exporter knows about packages and credentials
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    packages: HashMap<String, QueryPackage>,
    auths: HashMap<String, AuthEntry>,
}

#[derive(Deserialize)]
struct QueriesDocument {
    #[serde(default)]
    packages: HashMap<String, Vec<Query>>,
}

#[derive(Deserialize)]
struct AuthDocument {
    #[serde(default)]
    auths: HashMap<String, AuthEntry>,
}

impl Catalog {
    /// Build a catalog without validating it.
    ///
    /// Files go through [`load_catalog`], which validates; this constructor
    /// exists for catalogs assembled in code.
    pub fn new(
        packages: impl IntoIterator<Item = QueryPackage>,
        auths: impl IntoIterator<Item = (String, AuthEntry)>,
    ) -> Self {
        Self {
            packages: packages
                .into_iter()
                .map(|p| (p.name.clone(), p))
                .collect(),
            auths: auths.into_iter().collect(),
        }
    }

    pub fn package(&self, name: &str) -> Option<&QueryPackage> {
        self.packages.get(name)
    }

    pub fn auth(&self, key: &str) -> Option<&AuthEntry> {
        self.auths.get(key)
    }

    /// Packages sorted by name
    pub fn packages(&self) -> Vec<&QueryPackage> {
        let mut packages: Vec<_> = self.packages.values().collect();
        packages.sort_by(|a, b| a.name.cmp(&b.name));
        packages
    }

    /// Auth keys sorted
    pub fn auth_keys(&self) -> Vec<&str> {
        let mut keys: Vec<_> = self.auths.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Reject anything the scrape pipeline would only discover per request
    pub fn validate(&self) -> anyhow::Result<()> {
        for package in self.packages() {
            validate_package(package).with_context(|| format!("package '{}'", package.name))?;
        }
        for key in self.auth_keys() {
            if self.auths[key].user.is_empty() {
                bail!("auth '{}': user cannot be empty", key);
            }
        }
        Ok(())
    }
}

fn validate_package(package: &QueryPackage) -> anyhow::Result<()> {
    if package.queries.is_empty() {
        bail!("package has no queries");
    }

    let mut metric_names = HashSet::new();
    for query in &package.queries {
        if query.name.is_empty() {
            bail!("query name cannot be empty");
        }
        if query.sql.trim().is_empty() {
            bail!("query '{}': SQL cannot be empty", query.name);
        }
        if query.values.is_empty() {
            bail!("query '{}': at least one value column is required", query.name);
        }

        let mut labels = HashSet::new();
        for label in &query.labels {
            if !is_valid_label_name(label) {
                bail!("query '{}': '{}' is not a valid label name", query.name, label);
            }
            if !labels.insert(label.as_str()) {
                bail!("query '{}': label '{}' is declared twice", query.name, label);
            }
        }

        let mut columns = HashSet::new();
        for value in &query.values {
            if !columns.insert(value.column.as_str()) {
                return Err(ScrapeError::DuplicateValueColumn {
                    query: query.name.clone(),
                    column: value.column.clone(),
                }
                .into());
            }
            if labels.contains(value.column.as_str()) {
                bail!(
                    "query '{}': column '{}' is both a label and a value",
                    query.name,
                    value.column
                );
            }
            let name = query.metric_name(value);
            if !is_valid_metric_name(&name) {
                return Err(ScrapeError::InvalidMetric {
                    reason: format!("'{}' is not a valid metric name", name),
                    name,
                }
                .into());
            }
            if !metric_names.insert(name.clone()) {
                return Err(ScrapeError::DuplicateMetricName { name }.into());
            }
        }
    }

    Ok(())
}

/// Load and validate both catalog documents
pub fn load_catalog(queries_file: &Path, auth_file: &Path) -> anyhow::Result<Catalog> {
    let queries: QueriesDocument = read_document(queries_file)?;
    let auths: AuthDocument = read_document(auth_file)?;

    let catalog = Catalog::new(
        queries
            .packages
            .into_iter()
            .map(|(name, queries)| QueryPackage { name, queries }),
        auths.auths,
    );
    catalog
        .validate()
        .with_context(|| format!("invalid query catalog {}", queries_file.display()))?;

    Ok(catalog)
}

/// Parse one YAML document. Map keys keep their case: package names and
/// auth keys are looked up verbatim.
fn read_document<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    serde_yaml::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
}

/// Exposition-format metric name: `[a-zA-Z_:][a-zA-Z0-9_:]*`
fn is_valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

/// Exposition-format label name: `[a-zA-Z_][a-zA-Z0-9_]*`, `__` prefix reserved
fn is_valid_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    !name.starts_with("__")
        && matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
