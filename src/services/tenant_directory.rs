use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

use crate::database::catalog::{company_schema_set, tenant_schema_set, TENANT_DIRECTORY};
use crate::database::manager::DatabaseError;
use crate::database::models::{Employee, NewTenant, Tenant};
use crate::database::router::{validate_logical_name, CollectionHandle, DatabaseHandle, TenantRouter};
use crate::database::schema::SchemaSet;

/// Read and write access to the tenant directory, plus the hop from a tenant
/// to its own company database.
#[derive(Clone)]
pub struct TenantDirectory {
    router: Arc<TenantRouter>,
    tenant_schema: SchemaSet,
    company_schema: SchemaSet,
}

impl TenantDirectory {
    pub fn new(router: Arc<TenantRouter>) -> Self {
        Self {
            router,
            tenant_schema: tenant_schema_set(),
            company_schema: company_schema_set(),
        }
    }

    pub fn router(&self) -> &Arc<TenantRouter> {
        &self.router
    }

    pub async fn directory(&self) -> Result<DatabaseHandle, DatabaseError> {
        self.router.resolve(TENANT_DIRECTORY, &self.tenant_schema).await
    }

    pub async fn tenants(&self) -> Result<CollectionHandle, DatabaseError> {
        self.directory().await?.model_of::<Tenant>()
    }

    pub async fn list_tenants(&self) -> Result<Vec<Tenant>, DatabaseError> {
        let tenants: Vec<Tenant> = self.tenants().await?.find_as(json!({})).await?;
        debug!(count = tenants.len(), "listed tenants");
        Ok(tenants)
    }

    /// Case-insensitive lookup by company slug
    pub async fn find_tenant(&self, slug: &str) -> Result<Option<Tenant>, DatabaseError> {
        self.tenants()
            .await?
            .find_one(json!({ "companySlug": slug }))
            .await?
            .map(|doc| doc.decode())
            .transpose()
    }

    pub async fn get_tenant(&self, slug: &str) -> Result<Tenant, DatabaseError> {
        self.find_tenant(slug)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("tenant '{}'", slug)))
    }

    /// The stored (lowercased) slug must be usable as a logical database name
    pub async fn create_tenant(&self, tenant: &NewTenant) -> Result<Tenant, DatabaseError> {
        validate_logical_name(&tenant.company_slug.to_lowercase())?;

        let created: Tenant = self.tenants().await?.create_as(tenant).await?.decode()?;
        info!(company = %created.company_slug, email = %created.email, "tenant created");
        Ok(created)
    }

    /// The tenant's own logical database, bound to the company schema set
    pub async fn company_database(&self, tenant: &Tenant) -> Result<DatabaseHandle, DatabaseError> {
        self.router.resolve(&tenant.company_slug, &self.company_schema).await
    }

    pub async fn employees(&self, tenant: &Tenant) -> Result<CollectionHandle, DatabaseError> {
        self.company_database(tenant).await?.model_of::<Employee>()
    }

    pub async fn list_employees(&self, tenant: &Tenant) -> Result<Vec<Employee>, DatabaseError> {
        self.employees(tenant).await?.find_as(Value::Null).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestContext;

    fn steve() -> NewTenant {
        NewTenant::new("Steve", "Steve@example.com", "Apple", "Apple", "secret")
    }

    #[tokio::test]
    async fn create_and_find_is_case_insensitive() {
        let ctx = TestContext::new();
        let created = ctx.directory.create_tenant(&steve()).await.unwrap();

        assert_eq!(created.email, "steve@example.com");
        assert_eq!(created.company_slug, "apple");

        let found = ctx.directory.find_tenant("APPLE").await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert!(ctx.directory.find_tenant("oracle").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn slug_must_be_a_valid_database_name() {
        let ctx = TestContext::new();
        ctx.seeder.seed_tenants().await.unwrap();

        let acme = NewTenant::new("Wile", "wile@example.com", "Acme", "Acme Corp", "secret");
        let err = ctx.directory.create_tenant(&acme).await.unwrap_err();

        assert!(matches!(err, DatabaseError::InvalidDatabaseName(name) if name == "acme corp"));
        assert_eq!(ctx.directory.list_tenants().await.unwrap().len(), 3);
        assert_eq!(ctx.seeder.seed_employees().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn missing_tenant_is_not_found() {
        let ctx = TestContext::new();
        let err = ctx.directory.get_tenant("oracle").await.unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound(_)));
    }

    #[tokio::test]
    async fn company_database_is_named_after_slug() {
        let ctx = TestContext::new();
        let tenant = ctx.directory.create_tenant(&steve()).await.unwrap();

        let company = ctx.directory.company_database(&tenant).await.unwrap();
        assert_eq!(company.name(), "apple");
        assert_eq!(company.collection_names(), vec!["employees".to_string()]);
        assert!(ctx.directory.list_employees(&tenant).await.unwrap().is_empty());
    }
}
