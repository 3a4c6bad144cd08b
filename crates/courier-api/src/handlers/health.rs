//! Health check handlers

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::AppState;

/// Basic health response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Health response with the database check
#[derive(Debug, Serialize, Deserialize)]
pub struct DetailedHealthResponse {
    pub status: String,
    pub database: ComponentHealth,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ComponentHealth {
    /// healthy, unhealthy or unconfigured
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
    })
}

/// Liveness check (is the process running)
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// Readiness check (can the database be reached)
pub async fn readiness(State(state): State<Arc<AppState>>) -> Result<StatusCode, StatusCode> {
    if let Some(pool) = &state.db_pool {
        pool.health_check()
            .await
            .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;
    }

    Ok(StatusCode::OK)
}

pub async fn health_detailed(State(state): State<Arc<AppState>>) -> Json<DetailedHealthResponse> {
    let database = match &state.db_pool {
        None => ComponentHealth {
            status: "unconfigured".to_string(),
            latency_ms: None,
            error: None,
        },
        Some(pool) => {
            let start = std::time::Instant::now();
            match pool.health_check().await {
                Ok(()) => ComponentHealth {
                    status: "healthy".to_string(),
                    latency_ms: Some(start.elapsed().as_millis() as u64),
                    error: None,
                },
                Err(e) => ComponentHealth {
                    status: "unhealthy".to_string(),
                    latency_ms: None,
                    error: Some(e.to_string()),
                },
            }
        }
    };

    let status = if database.status == "unhealthy" {
        "unhealthy"
    } else {
        "healthy"
    };

    Json(DetailedHealthResponse {
        status: status.to_string(),
        database,
    })
}

#[cfg(test)]
mod tests {
    use crate::handlers::test_support::harness;
    use axum::http::StatusCode;
    use courier_core::testing::FakeDirectory;
    use pretty_assertions::assert_eq;
    use serde_json::Value;

    #[tokio::test]
    async fn test_health_routes_skip_auth() {
        let h = harness(FakeDirectory::default());

        let response = h.server.get("/health").await;
        assert_eq!(response.status_code(), StatusCode::OK);
        assert_eq!(response.json::<Value>()["status"], "healthy");

        assert_eq!(h.server.get("/health/live").await.status_code(), StatusCode::OK);
        assert_eq!(h.server.get("/health/ready").await.status_code(), StatusCode::OK);

        let detailed: Value = h.server.get("/health/detailed").await.json();
        assert_eq!(detailed["database"]["status"], "unconfigured");
    }
}
