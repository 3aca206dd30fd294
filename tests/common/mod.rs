#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tenantdb::api::AppState;
use tenantdb::database::{ConnectionSupervisor, MemoryDriver, TenantRouter};
use tenantdb::services::{Seeder, TenantDirectory};

/// Everything a test needs, backed by its own in-memory cluster
pub struct Harness {
    pub driver: Arc<MemoryDriver>,
    pub supervisor: Arc<ConnectionSupervisor>,
    pub router: Arc<TenantRouter>,
    pub directory: TenantDirectory,
    pub seeder: Seeder,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_driver(MemoryDriver::new())
    }

    pub fn with_driver(driver: MemoryDriver) -> Self {
        Self::with_timeout(driver, Duration::from_secs(3))
    }

    pub fn with_timeout(driver: MemoryDriver, connect_timeout: Duration) -> Self {
        let driver = Arc::new(driver);
        let supervisor = Arc::new(ConnectionSupervisor::new(driver.clone(), connect_timeout));
        let router = Arc::new(TenantRouter::new(supervisor.clone()));
        let directory = TenantDirectory::new(router.clone());
        let seeder = Seeder::new(directory.clone());

        Self {
            driver,
            supervisor,
            router,
            directory,
            seeder,
        }
    }
}

/// HTTP state over a fresh in-memory cluster
pub fn app_state(driver: MemoryDriver) -> (Arc<MemoryDriver>, AppState) {
    let driver = Arc::new(driver);
    let supervisor = Arc::new(ConnectionSupervisor::new(driver.clone(), Duration::from_secs(3)));
    (driver, AppState::new(supervisor))
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
