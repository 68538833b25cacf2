//! Operational metrics of the exporter itself.
//!
//! These live in the process-wide `metrics` recorder and are served on the
//! configured metrics endpoint. They have nothing to do with the
//! per-request snapshots that `/scrape` returns.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the global Prometheus recorder
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    init_metric_descriptions();
    Ok(handle)
}

/// Initialize metric descriptions (can be called multiple times safely)
fn init_metric_descriptions() {
    describe_counter!(
        "sql_exporter_scrapes_total",
        "Total number of scrape requests by package and outcome"
    );
    describe_counter!(
        "sql_exporter_scrape_errors_total",
        "Total number of failed scrapes by package and error kind"
    );
    describe_histogram!(
        "sql_exporter_scrape_duration_seconds",
        "Duration of a whole scrape request in seconds"
    );
    describe_histogram!(
        "sql_exporter_query_duration_seconds",
        "Duration of a single query execution in seconds"
    );
    describe_gauge!("sql_exporter_info", "Exporter version information");

    gauge!("sql_exporter_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);
}

/// Record a finished scrape; `error_kind` is `None` on success
pub fn record_scrape(package: &str, duration: Duration, error_kind: Option<&str>) {
    let outcome = if error_kind.is_some() { "error" } else { "success" };
    counter!(
        "sql_exporter_scrapes_total",
        "package" => package.to_string(),
        "outcome" => outcome,
    )
    .increment(1);

    if let Some(kind) = error_kind {
        counter!(
            "sql_exporter_scrape_errors_total",
            "package" => package.to_string(),
            "kind" => kind.to_string(),
        )
        .increment(1);
    }

    histogram!(
        "sql_exporter_scrape_duration_seconds",
        "package" => package.to_string(),
    )
    .record(duration.as_secs_f64());
}

/// Record how long one query took to execute
pub fn record_query_duration(package: &str, query: &str, duration: Duration) {
    histogram!(
        "sql_exporter_query_duration_seconds",
        "package" => package.to_string(),
        "query" => query.to_string(),
    )
    .record(duration.as_secs_f64());
}
