use arc_swap::ArcSwap;
use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

use crate::catalog::Catalog;
use crate::error::ScrapeError;
use crate::executor::{Backend, QueryExecutor};
use crate::metrics;
use crate::pipeline::{self, SnapshotRegistry};
use crate::resolver::{self, ScrapeParams};

/// Shared state of the scrape endpoint
#[derive(Clone)]
pub struct AppState {
    /// Swapped atomically on reload
    pub catalog: Arc<ArcSwap<Catalog>>,
    pub executor: Arc<dyn QueryExecutor>,
    pub query_timeout: Duration,
    pub default_backend: Backend,
}

/// Handle `GET /scrape`
///
/// Resolves the target, runs the package and returns the snapshot in the
/// text exposition format. Any failure returns a JSON error body instead;
/// a partially built snapshot is never emitted.
pub async fn handle_scrape(
    State(state): State<AppState>,
    params: Result<Query<ScrapeParams>, QueryRejection>,
) -> Response {
    let params = match params {
        Ok(Query(params)) => params,
        Err(rejection) => {
            let err = ScrapeError::InvalidQueryString(rejection.body_text());
            warn!(details = ?err.details(), "Scrape rejected: {}", err);
            metrics::record_scrape("unknown", Duration::ZERO, Some(err.kind().as_str()));
            return err.into_response();
        }
    };
    let catalog = state.catalog.load_full();
    let request_id = Uuid::new_v4();

    // Only catalog packages become metric labels
    let package_label = params
        .package
        .as_deref()
        .filter(|p| catalog.package(p).is_some())
        .unwrap_or("unknown")
        .to_string();

    let span = info_span!(
        "scrape",
        request_id = %request_id,
        package = %package_label,
        target = params.target.as_deref().unwrap_or(""),
        database = params.database.as_deref().unwrap_or(""),
        backend = tracing::field::Empty,
    );

    let started = Instant::now();
    let result = scrape(&state, &catalog, &params).instrument(span.clone()).await;
    let elapsed = started.elapsed();

    span.in_scope(|| match result {
        Ok(body) => {
            info!(elapsed_ms = elapsed.as_millis() as u64, "Scrape completed");
            metrics::record_scrape(&package_label, elapsed, None);
            (
                [(header::CONTENT_TYPE, SnapshotRegistry::content_type())],
                body,
            )
                .into_response()
        }
        Err(err) => {
            let kind = err.kind();
            if err.status().is_server_error() {
                error!(kind = %kind, details = ?err.details(), "Scrape failed: {}", err);
            } else {
                warn!(kind = %kind, details = ?err.details(), "Scrape rejected: {}", err);
            }
            metrics::record_scrape(&package_label, elapsed, Some(kind.as_str()));
            err.into_response()
        }
    })
}

async fn scrape(
    state: &AppState,
    catalog: &Catalog,
    params: &ScrapeParams,
) -> Result<Vec<u8>, ScrapeError> {
    let target = resolver::resolve(catalog, params, state.default_backend)?;
    Span::current().record("backend", target.descriptor.backend.as_str());
    info!(
        port = target.descriptor.port,
        queries = target.package.queries.len(),
        "Scraping target"
    );

    let snapshot = pipeline::scrape_package(
        state.executor.as_ref(),
        &target.descriptor,
        target.package,
        state.query_timeout,
    )
    .await?;

    snapshot.encode()
}
