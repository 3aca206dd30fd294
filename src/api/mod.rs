use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::database::manager::ConnectionSupervisor;
use crate::database::router::TenantRouter;
use crate::handlers;
use crate::services::{Seeder, TenantDirectory};

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub supervisor: Arc<ConnectionSupervisor>,
    pub directory: TenantDirectory,
    pub seeder: Seeder,
}

impl AppState {
    pub fn new(supervisor: Arc<ConnectionSupervisor>) -> Self {
        let router = Arc::new(TenantRouter::new(supervisor.clone()));
        let directory = TenantDirectory::new(router);
        let seeder = Seeder::new(directory.clone());

        Self {
            supervisor,
            directory,
            seeder,
        }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        // Public
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .merge(tenant_routes())
        // Global middleware
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn tenant_routes() -> Router<AppState> {
    Router::new()
        .route("/api/tenants", get(handlers::tenant_list))
        .route("/api/tenants/:slug", get(handlers::tenant_show))
        .route("/api/tenants/:slug/employees", get(handlers::tenant_employees))
}
