use anyhow::Result;
use colored::Colorize;
use sql_exporter::{catalog, config::Settings, server};
use tracing::info;

/// Execute the start command
///
/// Loads the catalog and serves until SIGTERM/SIGINT.
pub async fn execute(settings: Settings) -> Result<()> {
    println!("{}", "Starting SQL exporter...".green());

    let catalog =
        catalog::load_catalog(&settings.scrape.queries_file, &settings.scrape.auth_file)?;

    info!(
        queries_file = %settings.scrape.queries_file.display(),
        auth_file = %settings.scrape.auth_file.display(),
        "Catalog loaded"
    );

    server::start_server(settings, catalog).await
}
