//! Fixture bootstrap for the tenant directory and company databases.

use futures::future::try_join_all;
use rand::Rng;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

use crate::database::manager::DatabaseError;
use crate::database::models::{Employee, NewEmployee, NewTenant, Tenant};
use crate::services::tenant_directory::TenantDirectory;

const FIXTURE_PASSWORD: &str = "secret";

/// Employees of one company, as returned by [`Seeder::list_all_employees`]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyEmployees {
    pub company_slug: String,
    pub employees: Vec<Employee>,
}

pub fn fixture_tenants() -> Vec<NewTenant> {
    vec![
        NewTenant::new("Steve", "Steve@example.com", "Apple", "apple", FIXTURE_PASSWORD),
        NewTenant::new("Bill", "Bill@example.com", "Microsoft", "microsoft", FIXTURE_PASSWORD),
        NewTenant::new("Jeff", "Jeff@example.com", "Amazon", "amazon", FIXTURE_PASSWORD),
    ]
}

#[derive(Clone)]
pub struct Seeder {
    directory: TenantDirectory,
}

impl Seeder {
    pub fn new(directory: TenantDirectory) -> Self {
        Self { directory }
    }

    /// Clear the tenant directory and insert the fixture tenants
    pub async fn seed_tenants(&self) -> Result<Vec<Tenant>, DatabaseError> {
        let tenants = self.directory.tenants().await?;
        let cleared = tenants.delete_many(json!({})).await?;
        debug!(cleared, "cleared tenant directory");

        let mut created = Vec::new();
        for fixture in fixture_tenants() {
            created.push(self.directory.create_tenant(&fixture).await?);
        }

        info!(count = created.len(), "seeded tenants");
        Ok(created)
    }

    /// Replace every tenant's employees with one fixture employee
    pub async fn seed_employees(&self) -> Result<Vec<Employee>, DatabaseError> {
        let tenants = self.directory.list_tenants().await?;
        let employees = try_join_all(tenants.iter().map(|tenant| self.seed_company(tenant))).await?;

        info!(companies = employees.len(), "seeded employees");
        Ok(employees)
    }

    async fn seed_company(&self, tenant: &Tenant) -> Result<Employee, DatabaseError> {
        let employees = self.directory.employees(tenant).await?;
        employees.delete_many(json!({})).await?;

        let fixture = NewEmployee {
            employee_id: rand::thread_rng().gen_range(0..10_000).to_string(),
            name: "John".to_string(),
            company_slug: tenant.company_slug.clone(),
        };

        let employee: Employee = employees.create_as(&fixture).await?.decode()?;
        debug!(company = %tenant.company_slug, employee_id = %employee.employee_id, "seeded employee");
        Ok(employee)
    }

    pub async fn list_all_employees(&self) -> Result<Vec<CompanyEmployees>, DatabaseError> {
        let tenants = self.directory.list_tenants().await?;

        try_join_all(tenants.into_iter().map(|tenant| async move {
            let employees = self.directory.list_employees(&tenant).await?;
            Ok::<_, DatabaseError>(CompanyEmployees {
                company_slug: tenant.company_slug,
                employees,
            })
        }))
        .await
    }

    /// Seed tenants, then employees, then log what ended up stored
    pub async fn initialize(&self) -> Result<(), DatabaseError> {
        info!("initializing fixture data");
        self.seed_tenants().await?;
        self.seed_employees().await?;

        let tenants = self.directory.list_tenants().await?;
        let slugs: Vec<&str> = tenants.iter().map(|t| t.company_slug.as_str()).collect();
        info!(tenants = ?slugs, "tenant directory");

        for company in self.list_all_employees().await? {
            let names: Vec<&str> = company.employees.iter().map(|e| e.name.as_str()).collect();
            info!(company = %company.company_slug, employees = ?names, "company employees");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestContext;

    #[tokio::test]
    async fn initialize_seeds_every_company() {
        let ctx = TestContext::new();
        ctx.seeder.initialize().await.unwrap();

        let all = ctx.seeder.list_all_employees().await.unwrap();
        assert_eq!(all.len(), 3);
        for company in all {
            assert_eq!(company.employees.len(), 1);
            assert_eq!(company.employees[0].company_slug, company.company_slug);
            assert_eq!(company.employees[0].name, "John");
        }
    }

    #[tokio::test]
    async fn seed_employees_without_tenants_is_empty() {
        let ctx = TestContext::new();
        assert!(ctx.seeder.seed_employees().await.unwrap().is_empty());
    }
}
