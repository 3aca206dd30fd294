// handlers/health.rs - GET / and GET /health

use axum::{extract::State, http::StatusCode, response::Json};
use serde_json::{json, Value};

use crate::api::AppState;

pub async fn root() -> Json<Value> {
    Json(json!({
        "success": true,
        "data": {
            "name": "tenantdb",
            "version": env!("CARGO_PKG_VERSION"),
            "description": "Multi-tenant data-access router over a shared storage cluster",
            "endpoints": {
                "home": "/",
                "health": "/health",
                "tenants": "/api/tenants[/:slug]",
                "employees": "/api/tenants/:slug/employees",
            }
        }
    }))
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let now = chrono::Utc::now();
    let supervisor = &state.supervisor;

    match supervisor.health_check().await {
        Ok(()) => {
            let bound = state.directory.router().bound_databases().await;
            (
                StatusCode::OK,
                Json(json!({
                    "success": true,
                    "data": {
                        "status": "ok",
                        "timestamp": now,
                        "database": "ok",
                        "backend": supervisor.backend_name(),
                        "bound_databases": bound,
                    }
                })),
            )
        }
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "success": false,
                "error": "database unavailable",
                "data": {
                    "status": "degraded",
                    "timestamp": now,
                    "backend": supervisor.backend_name(),
                    "connection_state": format!("{:?}", supervisor.state()),
                    "database_error": e.to_string(),
                }
            })),
        ),
    }
}
