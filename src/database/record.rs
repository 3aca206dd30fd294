use argon2::password_hash::{PasswordHasher, SaltString};
use argon2::Argon2;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::database::manager::DatabaseError;
use crate::database::schema::{CollectionDef, FieldKind};

/// Fields managed by the storage layer, never accepted from callers
const SYSTEM_FIELDS: &[&str] = &["_id", "createdAt", "updatedAt"];

/// Errors that can occur while preparing a record for storage
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("System field '{0}' cannot be set directly")]
    SystemFieldNotAllowed(&'static str),
    #[error("Invalid JSON format: {0}")]
    InvalidJson(String),
    #[error("Missing required field: {0}")]
    MissingRequiredField(String),
    #[error("Field '{field}' must be of type {expected:?}")]
    InvalidFieldType { field: String, expected: FieldKind },
}

/// A stored record: generated id, caller fields, and storage timestamps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "_id")]
    pub id: Uuid,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub fn new(fields: Map<String, Value>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            fields,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    /// True when every key of `filter` is present with an equal value
    pub fn matches(&self, filter: &Map<String, Value>) -> bool {
        filter.iter().all(|(key, value)| self.fields.get(key) == Some(value))
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, DatabaseError> {
        serde_json::from_value(self.to_value())
            .map_err(|e| DatabaseError::QueryError(format!("failed to decode document {}: {}", self.id, e)))
    }
}

/// Validate and normalize caller input for insertion into `definition`.
///
/// Lowercases `lowercase` fields, checks declared types and required fields,
/// and replaces `hashed` fields with an Argon2 PHC string. Undeclared fields
/// pass through untouched.
pub fn prepare_insert(definition: &CollectionDef, input: Value) -> Result<Map<String, Value>, DatabaseError> {
    let mut fields = match input {
        Value::Object(map) => map,
        other => {
            return Err(RecordError::InvalidJson(format!("expected JSON object, got {}", kind_of(&other))).into())
        }
    };

    if let Some(system) = SYSTEM_FIELDS.iter().find(|f| fields.contains_key(**f)) {
        return Err(RecordError::SystemFieldNotAllowed(*system).into());
    }

    for field in &definition.fields {
        let value = match fields.get_mut(&field.name) {
            Some(value) if !value.is_null() => value,
            _ if field.required => return Err(RecordError::MissingRequiredField(field.name.clone()).into()),
            _ => continue,
        };

        if !kind_matches(field.kind, value) {
            return Err(RecordError::InvalidFieldType {
                field: field.name.clone(),
                expected: field.kind,
            }
            .into());
        }

        if field.lowercase {
            lowercase_in_place(value);
        }

        if field.hashed {
            if let Value::String(plain) = value {
                *plain = hash_secret(plain)?;
            }
        }
    }

    Ok(fields)
}

/// Normalize an equality filter the same way stored values were normalized
pub fn prepare_filter(definition: &CollectionDef, filter: Value) -> Result<Map<String, Value>, DatabaseError> {
    let mut filter = match filter {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            return Err(RecordError::InvalidJson(format!("filter must be a JSON object, got {}", kind_of(&other))).into())
        }
    };

    for field in definition.fields.iter().filter(|f| f.lowercase) {
        if let Some(value) = filter.get_mut(&field.name) {
            lowercase_in_place(value);
        }
    }

    Ok(filter)
}

pub fn hash_secret(plain: &str) -> Result<String, DatabaseError> {
    let salt = SaltString::generate(&mut rand::thread_rng());
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| DatabaseError::PasswordHash(e.to_string()))
}

fn lowercase_in_place(value: &mut Value) {
    if let Value::String(s) = value {
        *s = s.to_lowercase();
    }
}

fn kind_matches(kind: FieldKind, value: &Value) -> bool {
    match kind {
        FieldKind::String => value.is_string(),
        FieldKind::Number => value.is_number(),
        FieldKind::Boolean => value.is_boolean(),
        FieldKind::Json => true,
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
