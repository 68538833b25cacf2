//! Result-to-metric compilation.
//!
//! For every query of a package: run it, match its declared columns against
//! the result columns ([`matcher`]), create its instruments
//! ([`materializer`]) and feed every row into them ([`projector`]). All
//! queries of one request write into a single [`SnapshotRegistry`]; the
//! first failure discards the registry and ends the request.

pub mod materializer;
pub mod matcher;
pub mod projector;
pub mod snapshot;

use std::time::{Duration, Instant};
use tracing::{debug, info_span, Instrument as _};

use crate::catalog::{Query, QueryPackage};
use crate::error::ScrapeError;
use crate::executor::{ConnectionDescriptor, QueryExecutor, ResultSet};
use crate::metrics;

pub use snapshot::{Instrument, SnapshotRegistry};

/// Compile one query's result set into `registry`.
///
/// Returns the number of rows applied.
pub fn compile_query(
    query: &Query,
    result: &ResultSet,
    registry: &mut SnapshotRegistry,
) -> Result<usize, ScrapeError> {
    let mapping = matcher::match_columns(query, &result.columns)?;
    let names = materializer::materialize(query, registry)?;
    projector::project(query, &mapping, &names, &result.rows, registry)
}

/// Run every query of `package` in order and collect one snapshot.
///
/// Queries run strictly one after another. Each executor call is bounded by
/// `query_timeout`; a timeout counts as the target being unavailable.
pub async fn scrape_package(
    executor: &dyn QueryExecutor,
    descriptor: &ConnectionDescriptor,
    package: &QueryPackage,
    query_timeout: Duration,
) -> Result<SnapshotRegistry, ScrapeError> {
    let mut registry = SnapshotRegistry::new();

    for query in &package.queries {
        let span = info_span!("query", query = %query.name);
        let started = Instant::now();

        let result = tokio::time::timeout(query_timeout, executor.execute(descriptor, &query.sql))
            .instrument(span.clone())
            .await
            .map_err(|_| ScrapeError::Timeout {
                query: query.name.clone(),
                seconds: query_timeout.as_secs(),
            })?
            .map_err(|e| ScrapeError::Backend(e.redact(&descriptor.password)))?;

        metrics::record_query_duration(&package.name, &query.name, started.elapsed());

        span.in_scope(|| {
            let rows = compile_query(query, &result, &mut registry)?;
            debug!(
                columns = result.columns.len(),
                rows, "Query compiled into snapshot"
            );
            Ok::<_, ScrapeError>(())
        })?;
    }

    Ok(registry)
}
