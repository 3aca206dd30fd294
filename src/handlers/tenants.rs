// handlers/tenants.rs - tenant directory and per-company reads

use axum::extract::{Path, State};

use crate::api::AppState;
use crate::database::models::{Employee, Tenant};
use crate::middleware::{ApiResponse, ApiResult};

/// GET /api/tenants
pub async fn tenant_list(State(state): State<AppState>) -> ApiResult<Vec<Tenant>> {
    let tenants = state.directory.list_tenants().await?;
    Ok(ApiResponse::success(tenants))
}

/// GET /api/tenants/:slug
pub async fn tenant_show(State(state): State<AppState>, Path(slug): Path<String>) -> ApiResult<Tenant> {
    let tenant = state.directory.get_tenant(&slug).await?;
    Ok(ApiResponse::success(tenant))
}

/// GET /api/tenants/:slug/employees
pub async fn tenant_employees(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<Vec<Employee>> {
    let tenant = state.directory.get_tenant(&slug).await?;
    let employees = state.directory.list_employees(&tenant).await?;
    Ok(ApiResponse::success(employees))
}
