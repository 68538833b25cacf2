use axum::{http::StatusCode, response::IntoResponse};

/// Liveness probe; no dependencies, no side effects
pub async fn healthcheck() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_healthcheck_returns_ok() {
        let response = healthcheck().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"ok");
    }
}
