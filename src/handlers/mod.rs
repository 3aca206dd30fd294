// handlers/mod.rs - route handlers, one file per resource

pub mod health;
pub mod tenants;

pub use health::{health, root};
pub use tenants::{tenant_employees, tenant_list, tenant_show};
