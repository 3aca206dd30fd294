mod common;

use serde_json::json;
use tenantdb::database::models::{NewTenant, Tenant};
use tenantdb::database::{DatabaseError, Model};

use common::Harness;

#[tokio::test]
async fn seeding_tenants_twice_keeps_three() {
    let h = Harness::new();

    h.seeder.seed_tenants().await.unwrap();
    h.seeder.seed_tenants().await.unwrap();

    let tenants = h.directory.list_tenants().await.unwrap();
    assert_eq!(tenants.len(), 3);
}

#[tokio::test]
async fn seed_scenario_populates_every_company() {
    common::init_tracing();
    let h = Harness::new();

    h.seeder.seed_tenants().await.unwrap();
    h.seeder.seed_employees().await.unwrap();

    let tenants = h.directory.list_tenants().await.unwrap();
    let mut slugs: Vec<&str> = tenants.iter().map(|t| t.company_slug.as_str()).collect();
    slugs.sort();
    assert_eq!(slugs, vec!["amazon", "apple", "microsoft"]);

    for tenant in &tenants {
        let employees = h.directory.list_employees(tenant).await.unwrap();
        assert_eq!(employees.len(), 1);
        assert_eq!(employees[0].company_slug, tenant.company_slug);
    }

    let mut bound = h.router.bound_databases().await;
    bound.sort();
    assert_eq!(bound, vec!["AppTenants", "amazon", "apple", "microsoft"]);
}

#[tokio::test]
async fn reseeding_employees_replaces_them() {
    let h = Harness::new();
    h.seeder.seed_tenants().await.unwrap();
    h.seeder.seed_employees().await.unwrap();
    h.seeder.seed_employees().await.unwrap();

    for company in h.seeder.list_all_employees().await.unwrap() {
        assert_eq!(company.employees.len(), 1);
    }
    // One registration per company database, however often it is seeded
    assert_eq!(h.driver.registrations_for("apple"), 1);
}

#[tokio::test]
async fn employees_do_not_leak_between_companies() {
    let h = Harness::new();
    h.seeder.initialize().await.unwrap();

    let apple = h.directory.get_tenant("apple").await.unwrap();
    let microsoft = h.directory.get_tenant("microsoft").await.unwrap();

    let microsoft_employees = h.directory.list_employees(&microsoft).await.unwrap();
    assert!(microsoft_employees.iter().all(|e| e.company_slug == "microsoft"));

    let apple_employees = h.directory.employees(&apple).await.unwrap();
    assert_eq!(apple_employees.count(json!({ "companySlug": "microsoft" })).await.unwrap(), 0);
}

#[tokio::test]
async fn duplicate_slug_is_rejected_case_insensitively() {
    let h = Harness::new();
    h.seeder.seed_tenants().await.unwrap();

    let err = h
        .directory
        .create_tenant(&NewTenant::new("Tim", "tim@example.com", "Apple Inc", "APPLE", "secret"))
        .await
        .unwrap_err();

    assert!(matches!(err, DatabaseError::DuplicateKey { .. }));
    assert_eq!(h.directory.list_tenants().await.unwrap().len(), 3);
}

#[tokio::test]
async fn passwords_are_stored_hashed() {
    let h = Harness::new();
    h.seeder.seed_tenants().await.unwrap();

    let stored = h
        .directory
        .tenants()
        .await
        .unwrap()
        .find_one(json!({ "companySlug": "apple" }))
        .await
        .unwrap()
        .unwrap();

    let password = stored.get_str("password").unwrap();
    assert_ne!(password, "secret");
    assert!(password.starts_with("$argon2"));
    assert_eq!(stored.get_str("email"), Some("steve@example.com"));
    assert_eq!(Tenant::COLLECTION, "tenants");
}
