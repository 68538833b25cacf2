use serde::Deserialize;

use crate::catalog::{Catalog, QueryPackage};
use crate::error::ScrapeError;
use crate::executor::{Backend, ConnectionDescriptor};

/// Raw `/scrape` query parameters.
///
/// Everything arrives as an optional string so that malformed values can be
/// reported as JSON errors instead of extractor rejections.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScrapeParams {
    pub target: Option<String>,
    pub port: Option<String>,
    pub database: Option<String>,
    pub package: Option<String>,
    pub auth: Option<String>,
    pub backend: Option<String>,
}

/// A validated scrape request: where to connect and what to run
#[derive(Debug)]
pub struct ScrapeTarget<'a> {
    pub descriptor: ConnectionDescriptor,
    pub package: &'a QueryPackage,
}

fn required(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Check the request parameters against the catalog and assemble the
/// connection descriptor, with credentials taken from the auth entry.
pub fn resolve<'a>(
    catalog: &'a Catalog,
    params: &ScrapeParams,
    default_backend: Backend,
) -> Result<ScrapeTarget<'a>, ScrapeError> {
    let (Some(target), Some(database), Some(package_key), Some(auth_key)) = (
        required(&params.target),
        required(&params.database),
        required(&params.package),
        required(&params.auth),
    ) else {
        return Err(ScrapeError::MissingParameters);
    };

    let backend = match required(&params.backend) {
        Some(raw) => raw
            .parse::<Backend>()
            .map_err(|_| ScrapeError::UnknownBackend(raw.to_string()))?,
        None => default_backend,
    };

    let port = match required(&params.port) {
        Some(raw) => match raw.parse::<u16>() {
            Ok(port) if port > 0 => port,
            _ => return Err(ScrapeError::InvalidPort(raw.to_string())),
        },
        None => backend.default_port(),
    };

    let package = catalog
        .package(package_key)
        .ok_or_else(|| ScrapeError::PackageNotFound(package_key.to_string()))?;
    let auth = catalog
        .auth(auth_key)
        .ok_or_else(|| ScrapeError::AuthNotFound(auth_key.to_string()))?;

    Ok(ScrapeTarget {
        descriptor: ConnectionDescriptor {
            backend,
            host: target.to_string(),
            port,
            user: auth.user.clone(),
            password: auth.password.clone(),
            database: database.to_string(),
        },
        package,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{AuthEntry, MetricKind, Query, ValueSpec};

    fn catalog() -> Catalog {
        Catalog::new(
            vec![QueryPackage {
                name: "p1".to_string(),
                queries: vec![Query {
                    name: "p1".to_string(),
                    sql: "SELECT host, cnt FROM t".to_string(),
                    labels: vec!["host".to_string()],
                    values: vec![ValueSpec {
                        column: "cnt".to_string(),
                        kind: MetricKind::Counter,
                        help: "h".to_string(),
                    }],
                }],
            }],
            vec![(
                "ops".to_string(),
                AuthEntry {
                    user: "exporter".to_string(),
                    password: "pw".to_string(),
                },
            )],
        )
    }

    fn params() -> ScrapeParams {
        ScrapeParams {
            target: Some("db.internal".to_string()),
            port: None,
            database: Some("app".to_string()),
            package: Some("p1".to_string()),
            auth: Some("ops".to_string()),
            backend: None,
        }
    }

    #[test]
    fn test_resolve_substitutes_credentials() {
        let catalog = catalog();
        let resolved = resolve(&catalog, &params(), Backend::Mysql).unwrap();

        assert_eq!(resolved.package.name, "p1");
        assert_eq!(resolved.descriptor.host, "db.internal");
        assert_eq!(resolved.descriptor.port, 3306);
        assert_eq!(resolved.descriptor.user, "exporter");
        assert_eq!(resolved.descriptor.password, "pw");
        assert_eq!(resolved.descriptor.database, "app");
        assert_eq!(resolved.descriptor.backend, Backend::Mysql);
    }

    #[test]
    fn test_resolve_explicit_backend_and_port() {
        let catalog = catalog();
        let mut p = params();
        p.backend = Some("postgresql".to_string());
        let resolved = resolve(&catalog, &p, Backend::Mysql).unwrap();
        assert_eq!(resolved.descriptor.backend, Backend::Postgres);
        assert_eq!(resolved.descriptor.port, 5432);

        p.port = Some("6432".to_string());
        let resolved = resolve(&catalog, &p, Backend::Mysql).unwrap();
        assert_eq!(resolved.descriptor.port, 6432);
    }

    #[test]
    fn test_missing_parameters() {
        let catalog = catalog();
        for strip in 0..4 {
            let mut p = params();
            match strip {
                0 => p.target = None,
                1 => p.database = Some("  ".to_string()),
                2 => p.package = None,
                _ => p.auth = None,
            }
            let err = resolve(&catalog, &p, Backend::Mysql).unwrap_err();
            assert!(matches!(err, ScrapeError::MissingParameters));
        }
    }

    #[test]
    fn test_unknown_package_and_auth() {
        let catalog = catalog();
        let mut p = params();
        p.package = Some("foo".to_string());
        let err = resolve(&catalog, &p, Backend::Mysql).unwrap_err();
        assert_eq!(err.to_string(), "package 'foo' not found");

        let mut p = params();
        p.auth = Some("nobody".to_string());
        let err = resolve(&catalog, &p, Backend::Mysql).unwrap_err();
        assert_eq!(err.to_string(), "auth 'nobody' not found");
    }

    #[test]
    fn test_invalid_port_and_backend() {
        let catalog = catalog();
        let mut p = params();
        p.port = Some("abc".to_string());
        assert!(matches!(
            resolve(&catalog, &p, Backend::Mysql).unwrap_err(),
            ScrapeError::InvalidPort(_)
        ));

        let mut p = params();
        p.backend = Some("db2".to_string());
        assert!(matches!(
            resolve(&catalog, &p, Backend::Mysql).unwrap_err(),
            ScrapeError::UnknownBackend(_)
        ));
    }
}
