//! HTTP request handlers.

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::state::AppState;

/// Body of `POST /invoke`.
#[derive(Debug, Deserialize)]
pub struct InvokeRequest {
    pub operation: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// POST /invoke - run one operation
pub async fn invoke_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<InvokeRequest>,
) -> Response {
    match state
        .pipeline
        .dispatch(&request.operation, request.args)
        .await
    {
        Ok(result) => (
            StatusCode::OK,
            Json(json!({ "operation": request.operation, "result": result })),
        )
            .into_response(),
        Err(e) => {
            let status = StatusCode::from_u16(e.kind().http_status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            if status.is_server_error() {
                warn!(operation = %request.operation, error = %e, "Operation failed");
            } else {
                debug!(operation = %request.operation, error = %e, "Operation rejected");
            }
            (status, Json(e.to_json())).into_response()
        }
    }
}

/// GET /health - Basic health check
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// GET /metrics - Prometheus metrics
pub async fn metrics_handler(Extension(handle): Extension<PrometheusHandle>) -> String {
    handle.render()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_handler() {
        let response = health_handler().await;
        assert_eq!(response.status, "ok");
    }

    #[test]
    fn test_invoke_request_without_args() {
        let request: InvokeRequest =
            serde_json::from_value(json!({ "operation": "cache_info" })).unwrap();
        assert!(request.args.is_null());
    }
}
