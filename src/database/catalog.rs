//! Schema sets the application registers.
//!
//! The tenant directory lives in one shared logical database; every company gets
//! its own logical database named after its slug, holding the company schema set.

use crate::database::models::{Employee, Tenant};
use crate::database::schema::SchemaSet;

/// Logical database holding the tenant directory
pub const TENANT_DIRECTORY: &str = "AppTenants";

pub fn tenant_schema_set() -> SchemaSet {
    SchemaSet::new("tenant-directory").model::<Tenant>()
}

pub fn company_schema_set() -> SchemaSet {
    SchemaSet::new("company").model::<Employee>()
}
