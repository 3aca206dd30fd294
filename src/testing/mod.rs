use std::sync::Arc;
use std::time::Duration;

use crate::database::manager::ConnectionSupervisor;
use crate::database::memory::MemoryDriver;
use crate::database::router::TenantRouter;
use crate::services::{Seeder, TenantDirectory};

/// Router, directory and seeder wired to a fresh in-memory cluster
pub struct TestContext {
    pub driver: Arc<MemoryDriver>,
    pub supervisor: Arc<ConnectionSupervisor>,
    pub router: Arc<TenantRouter>,
    pub directory: TenantDirectory,
    pub seeder: Seeder,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_driver(MemoryDriver::new())
    }

    pub fn with_driver(driver: MemoryDriver) -> Self {
        let driver = Arc::new(driver);
        let supervisor = Arc::new(ConnectionSupervisor::new(driver.clone(), Duration::from_secs(3)));
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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn contexts_do_not_share_storage() {
        let first = TestContext::new();
        let second = TestContext::new();

        first.seeder.seed_tenants().await.unwrap();

        assert_eq!(first.directory.list_tenants().await.unwrap().len(), 3);
        assert!(second.directory.list_tenants().await.unwrap().is_empty());
    }
}
