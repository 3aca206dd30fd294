use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::database::schema::{CollectionDef, FieldDef, Model};

/// Worker record stored in a company's own logical database
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub employee_id: String,
    pub name: String,
    /// Back-reference to the owning tenant, not enforced by storage
    pub company_slug: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model for Employee {
    const COLLECTION: &'static str = "employees";

    fn definition() -> CollectionDef {
        CollectionDef::new(Self::COLLECTION)
            .field(FieldDef::string("employeeId").required().lowercase().unique())
            .field(FieldDef::string("name").required())
            .field(FieldDef::string("companySlug").required())
            .index(&["companySlug"], false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEmployee {
    pub employee_id: String,
    pub name: String,
    pub company_slug: String,
}
