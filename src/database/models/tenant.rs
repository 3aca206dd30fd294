use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::database::schema::{CollectionDef, FieldDef, Model};

/// A company account in the tenant directory.
///
/// `company_slug` doubles as the name of the tenant's own logical database.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub email: String,
    pub name: String,
    /// Argon2 PHC string; never leaves the process
    #[serde(default, skip_serializing)]
    pub password: String,
    pub company_name: String,
    pub company_slug: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model for Tenant {
    const COLLECTION: &'static str = "tenants";

    fn definition() -> CollectionDef {
        CollectionDef::new(Self::COLLECTION)
            .field(FieldDef::string("email").required().lowercase().unique())
            .field(FieldDef::string("name").required())
            .field(FieldDef::string("password").required().hashed())
            .field(FieldDef::string("companyName").required())
            .field(FieldDef::string("companySlug").required().lowercase().unique())
    }
}

/// Signup payload; the password is plaintext until the collection hashes it
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTenant {
    pub email: String,
    pub name: String,
    pub password: String,
    pub company_name: String,
    pub company_slug: String,
}

impl NewTenant {
    pub fn new(name: &str, email: &str, company_name: &str, company_slug: &str, password: &str) -> Self {
        Self {
            email: email.to_string(),
            name: name.to_string(),
            password: password.to_string(),
            company_name: company_name.to_string(),
            company_slug: company_slug.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn password_is_never_serialized() {
        let tenant: Tenant = serde_json::from_value(json!({
            "_id": Uuid::new_v4(),
            "email": "steve@example.com",
            "name": "Steve",
            "password": "$argon2id$v=19$...",
            "companyName": "Apple",
            "companySlug": "apple",
            "createdAt": Utc::now(),
            "updatedAt": Utc::now(),
        }))
        .unwrap();

        let value = serde_json::to_value(&tenant).unwrap();
        assert!(value.get("password").is_none());
        assert_eq!(value["companySlug"], "apple");
    }

    #[test]
    fn definition_marks_unique_keys() {
        let def = Tenant::definition();
        assert_eq!(def.unique_keys(), vec![vec!["email".to_string()], vec!["companySlug".to_string()]]);
        assert!(def.has_hashed_fields());
    }
}
