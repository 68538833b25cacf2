use anyhow::Result;
use arc_swap::ArcSwap;
use axum::{http::StatusCode, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::{net::SocketAddr, sync::Arc};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    catalog::Catalog,
    config::Settings,
    error::json_error,
    executor::DriverExecutor,
    handlers::{self, scrape::AppState},
    metrics,
    signals::{setup_signal_handlers, CatalogSources},
};

/// Start the exporter
///
/// This function:
/// 1. Initializes self-metrics (when enabled)
/// 2. Sets up signal handlers for graceful shutdown and catalog reload
/// 3. Creates the Axum application
/// 4. Binds to the configured address
/// 5. Serves requests with graceful shutdown support
pub async fn start_server(settings: Settings, catalog: Catalog) -> Result<()> {
    let metrics_handle = if settings.metrics.enabled {
        info!("Initializing Prometheus metrics...");
        Some((
            settings.metrics.endpoint.clone(),
            Arc::new(metrics::init_metrics()?),
        ))
    } else {
        None
    };

    info!(
        "Catalog: {} packages, {} auth entries",
        catalog.packages().len(),
        catalog.auth_keys().len()
    );

    let catalog_swap = Arc::new(ArcSwap::from_pointee(catalog));

    let (shutdown_tx, signal_handle) = setup_signal_handlers(
        catalog_swap.clone(),
        CatalogSources {
            queries_file: settings.scrape.queries_file.clone(),
            auth_file: settings.scrape.auth_file.clone(),
        },
    );
    let mut shutdown_rx = shutdown_tx.subscribe();

    let state = AppState {
        catalog: catalog_swap,
        executor: Arc::new(DriverExecutor),
        query_timeout: settings.scrape.query_timeout(),
        default_backend: settings.scrape.default_backend,
    };

    let app = create_router(state, metrics_handle);

    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));

    info!("Starting SQL exporter on {}", addr);
    info!(
        "Query timeout {}s, default backend {}",
        settings.scrape.query_timeout_seconds, settings.scrape.default_backend
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("Shutdown signal received, draining connections...");
        })
        .await?;

    signal_handle.await?;
    info!("Server stopped gracefully");

    Ok(())
}

/// Create the Axum router with all routes and middleware
///
/// `metrics` carries the endpoint path and handle of the self-metrics
/// recorder; `None` leaves the endpoint unrouted.
pub fn create_router(
    state: AppState,
    metrics: Option<(String, Arc<PrometheusHandle>)>,
) -> Router {
    let mut app = Router::new()
        .route("/scrape", get(handlers::scrape::handle_scrape))
        .route("/healthcheck", get(handlers::health::healthcheck))
        .with_state(state);

    if let Some((endpoint, handle)) = metrics {
        let metrics_routes = Router::new()
            .route(&endpoint, get(handlers::metrics_handler::metrics))
            .with_state(handle);
        app = app.merge(metrics_routes);
    }

    app.fallback(|| async { json_error(StatusCode::NOT_FOUND, "not found") })
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{Backend, BackendError, ConnectionDescriptor, QueryExecutor, ResultSet};
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    struct NoopExecutor;

    #[async_trait]
    impl QueryExecutor for NoopExecutor {
        async fn execute(
            &self,
            _descriptor: &ConnectionDescriptor,
            _sql: &str,
        ) -> Result<ResultSet, BackendError> {
            Ok(ResultSet::default())
        }
    }

    fn test_state() -> AppState {
        AppState {
            catalog: Arc::new(ArcSwap::from_pointee(Catalog::default())),
            executor: Arc::new(NoopExecutor),
            query_timeout: Duration::from_secs(5),
            default_backend: Backend::Mysql,
        }
    }

    async fn get_status(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_metrics_route_is_optional() {
        let (status, _) = get_status(create_router(test_state(), None), "/metrics").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = Arc::new(recorder.handle());
        let app = create_router(test_state(), Some(("/internal/metrics".to_string(), handle)));

        let (status, _) = get_status(app, "/internal/metrics").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_route_returns_json_error() {
        let (status, body) = get_status(create_router(test_state(), None), "/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, r#"{"error":"not found"}"#);
    }
}
