use anyhow::Result;
use arc_swap::ArcSwap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

use crate::catalog::{load_catalog, Catalog};

/// Shutdown signal types
#[derive(Debug, Clone, Copy)]
pub enum ShutdownSignal {
    /// Graceful shutdown (drain connections, clean up)
    Graceful,
}

/// Files the catalog is reloaded from
#[derive(Debug, Clone)]
pub struct CatalogSources {
    pub queries_file: PathBuf,
    pub auth_file: PathBuf,
}

/// Setup signal handlers for the server
///
/// Returns a broadcast sender for shutdown signals and a join handle for the signal task
///
/// Handles:
/// - SIGTERM/SIGINT: Graceful shutdown
/// - SIGHUP: Catalog reload
#[cfg(unix)]
pub fn setup_signal_handlers(
    catalog: Arc<ArcSwap<Catalog>>,
    sources: CatalogSources,
) -> (
    broadcast::Sender<ShutdownSignal>,
    tokio::task::JoinHandle<()>,
) {
    let (shutdown_tx, _) = broadcast::channel(16);
    let tx_clone = shutdown_tx.clone();

    let handle = tokio::spawn(async move {
        let (mut sigterm, mut sigint, mut sighup) = match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
            signal(SignalKind::hangup()),
        ) {
            (Ok(term), Ok(int), Ok(hup)) => (term, int, hup),
            _ => {
                error!("Failed to install signal handlers, falling back to Ctrl+C only");
                wait_for_ctrl_c(&tx_clone).await;
                return;
            }
        };

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("SIGTERM received, initiating graceful shutdown");
                    let _ = tx_clone.send(ShutdownSignal::Graceful);
                    break;
                }
                _ = sigint.recv() => {
                    info!("SIGINT received, initiating graceful shutdown");
                    let _ = tx_clone.send(ShutdownSignal::Graceful);
                    break;
                }
                _ = sighup.recv() => {
                    info!("SIGHUP received, reloading query catalog");
                    if let Err(e) = reload_catalog(&catalog, &sources) {
                        error!("Failed to reload catalog, keeping the previous one: {:#}", e);
                    }
                }
            }
        }
    });

    (shutdown_tx, handle)
}

/// Windows placeholder - only Ctrl+C, no reload
#[cfg(not(unix))]
pub fn setup_signal_handlers(
    _catalog: Arc<ArcSwap<Catalog>>,
    _sources: CatalogSources,
) -> (
    broadcast::Sender<ShutdownSignal>,
    tokio::task::JoinHandle<()>,
) {
    let (shutdown_tx, _) = broadcast::channel(16);
    let tx_clone = shutdown_tx.clone();

    let handle = tokio::spawn(async move {
        wait_for_ctrl_c(&tx_clone).await;
    });

    (shutdown_tx, handle)
}

async fn wait_for_ctrl_c(tx: &broadcast::Sender<ShutdownSignal>) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("Ctrl+C received, initiating shutdown");
            let _ = tx.send(ShutdownSignal::Graceful);
        }
        Err(e) => {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
    }
}

/// Load both catalog files again and swap them in atomically.
///
/// In-flight scrapes keep the catalog they started with. On any error the
/// current catalog stays in place.
pub fn reload_catalog(catalog: &ArcSwap<Catalog>, sources: &CatalogSources) -> Result<()> {
    let new_catalog = load_catalog(&sources.queries_file, &sources.auth_file)?;

    info!(
        packages = new_catalog.packages().len(),
        auths = new_catalog.auth_keys().len(),
        "Query catalog reloaded"
    );

    catalog.store(Arc::new(new_catalog));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const QUERIES: &str = r#"
packages:
  p1:
    - name: conn
      sql: SELECT 1 AS total
      values:
        - column: total
          type: gauge
          help: connections
"#;

    const AUTHS: &str = r#"
auths:
  a1:
    user: exporter
    password: s3cret
"#;

    fn write_sources(dir: &tempfile::TempDir, queries: &str) -> CatalogSources {
        let queries_file = dir.path().join("queries.yaml");
        let auth_file = dir.path().join("auth.yaml");
        fs::write(&queries_file, queries).unwrap();
        fs::write(&auth_file, AUTHS).unwrap();
        CatalogSources {
            queries_file,
            auth_file,
        }
    }

    #[tokio::test]
    async fn test_setup_signal_handlers() {
        let catalog = Arc::new(ArcSwap::from_pointee(Catalog::default()));
        let sources = CatalogSources {
            queries_file: PathBuf::from("queries.yaml"),
            auth_file: PathBuf::from("auth.yaml"),
        };
        let (shutdown_tx, _handle) = setup_signal_handlers(catalog, sources);

        let mut rx = shutdown_tx.subscribe();
        shutdown_tx.send(ShutdownSignal::Graceful).unwrap();

        let received = rx.recv().await.unwrap();
        assert!(matches!(received, ShutdownSignal::Graceful));
    }

    #[test]
    fn test_reload_swaps_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let sources = write_sources(&dir, QUERIES);
        let catalog = ArcSwap::from_pointee(Catalog::default());

        let before = catalog.load_full();
        reload_catalog(&catalog, &sources).unwrap();

        assert!(before.package("p1").is_none());
        assert!(catalog.load().package("p1").is_some());
        assert!(catalog.load().auth("a1").is_some());
    }

    #[test]
    fn test_failed_reload_keeps_previous_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let sources = write_sources(&dir, QUERIES);
        let catalog = ArcSwap::from_pointee(Catalog::default());
        reload_catalog(&catalog, &sources).unwrap();

        let broken = QUERIES.replace("type: gauge", "type: summary");
        fs::write(&sources.queries_file, broken).unwrap();

        assert!(reload_catalog(&catalog, &sources).is_err());
        assert!(catalog.load().package("p1").is_some());
    }
}
