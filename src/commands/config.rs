use anyhow::Result;
use colored::Colorize;
use sql_exporter::catalog::{self, Catalog};
use sql_exporter::config::Settings;
use sql_exporter::logging::Masked;
use tracing::info;

/// Execute the config show command
///
/// Prints the effective settings and the catalog with passwords masked
pub fn show(settings: &Settings) -> Result<()> {
    println!("{}", "Loading configuration...".yellow());
    info!("Loading configuration for display");

    let catalog =
        catalog::load_catalog(&settings.scrape.queries_file, &settings.scrape.auth_file)?;

    println!("{}", "Current Configuration:".green().bold());
    println!();
    println!("{}", toml::to_string_pretty(settings)?);

    println!("{}", "Catalog:".green().bold());
    print!("{}", render_catalog(&catalog));

    info!("Configuration displayed successfully");
    Ok(())
}

/// Execute the config validate command
pub fn validate(settings: &Settings) -> Result<()> {
    println!("{}", "Validating configuration...".yellow());
    info!("Validating configuration file");

    let catalog =
        catalog::load_catalog(&settings.scrape.queries_file, &settings.scrape.auth_file)?;

    println!("{}", "✓ Configuration is valid".green());
    println!();
    println!("{}", "Summary:".bold());
    println!("  Packages: {}", catalog.packages().len());
    println!("  Queries: {}", count_queries(&catalog));
    println!("  Auth Entries: {}", catalog.auth_keys().len());

    info!("Configuration validation successful");
    Ok(())
}

/// Plain-text catalog listing; passwords only ever appear masked
fn render_catalog(catalog: &Catalog) -> String {
    let mut out = String::new();

    out.push_str("  packages:\n");
    for package in catalog.packages() {
        out.push_str(&format!("    {}:\n", package.name));
        for query in &package.queries {
            let metrics: Vec<String> = query
                .values
                .iter()
                .map(|v| format!("{} ({})", query.metric_name(v), v.kind))
                .collect();
            out.push_str(&format!("      - {} -> {}\n", query.name, metrics.join(", ")));
        }
    }

    out.push_str("  auths:\n");
    for key in catalog.auth_keys() {
        if let Some(auth) = catalog.auth(key) {
            out.push_str(&format!(
                "    {}: user={} password={}\n",
                key,
                auth.user,
                Masked::new(&auth.password)
            ));
        }
    }

    out
}

fn count_queries(catalog: &Catalog) -> usize {
    catalog.packages().iter().map(|p| p.queries.len()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sql_exporter::catalog::{AuthEntry, MetricKind, Query, QueryPackage, ValueSpec};

    fn sample_catalog() -> Catalog {
        Catalog::new(
            [QueryPackage {
                name: "p1".to_string(),
                queries: vec![Query {
                    name: "conn".to_string(),
                    sql: "SELECT 1".to_string(),
                    labels: vec!["state".to_string()],
                    values: vec![ValueSpec {
                        column: "total".to_string(),
                        kind: MetricKind::Gauge,
                        help: String::new(),
                    }],
                }],
            }],
            [(
                "a1".to_string(),
                AuthEntry {
                    user: "exporter".to_string(),
                    password: "hunter2".to_string(),
                },
            )],
        )
    }

    #[test]
    fn test_render_catalog_masks_passwords() {
        let rendered = render_catalog(&sample_catalog());

        assert!(rendered.contains("conn -> conn_total (gauge)"));
        assert!(rendered.contains("a1: user=exporter password=***"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_count_queries() {
        assert_eq!(count_queries(&sample_catalog()), 1);
        assert_eq!(count_queries(&Catalog::default()), 0);
    }
}
