use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Serve the exporter's own operational metrics
pub async fn metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)],
        handle.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_self_metrics_render_exposition_text() {
        // Local recorder, the global one is left alone
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            metrics::counter!("sql_exporter_scrapes_total", "package" => "p1").increment(2);
        });

        let response = metrics(State(Arc::new(handle))).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            EXPOSITION_CONTENT_TYPE
        );

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("sql_exporter_scrapes_total{package=\"p1\"} 2"));
    }
}
