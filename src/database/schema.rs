//! Record definitions registered against logical databases.
//!
//! A [`CollectionDef`] describes one collection: its field shapes, indexes and
//! uniqueness constraints. A [`SchemaSet`] groups the collections of one logical
//! domain and is what the router registers when it first binds a database.
//!
//! Definitions can be declared two ways, both producing the same `CollectionDef`:
//! with the builder directly, or by implementing [`Model`] on a typed record.

use serde::de::DeserializeOwned;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Number,
    Boolean,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
    /// Normalize string values to lowercase before storing or filtering
    pub lowercase: bool,
    pub unique: bool,
    /// Replace the value with a password hash before it reaches storage
    pub hashed: bool,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            lowercase: false,
            unique: false,
            hashed: false,
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::String)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn lowercase(mut self) -> Self {
        self.lowercase = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn hashed(mut self) -> Self {
        self.hashed = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexDef {
    pub fields: Vec<String>,
    pub unique: bool,
}

impl IndexDef {
    pub fn name(&self, collection: &str) -> String {
        let suffix = if self.unique { "key" } else { "idx" };
        format!("{}_{}_{}", collection, self.fields.join("_"), suffix)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionDef {
    pub name: String,
    pub fields: Vec<FieldDef>,
    pub indexes: Vec<IndexDef>,
}

impl CollectionDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            indexes: Vec::new(),
        }
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn index(mut self, fields: &[&str], unique: bool) -> Self {
        self.indexes.push(IndexDef {
            fields: fields.iter().map(|f| f.to_string()).collect(),
            unique,
        });
        self
    }

    pub fn has_hashed_fields(&self) -> bool {
        self.fields.iter().any(|f| f.hashed)
    }

    /// Declared indexes plus those implied by `unique` fields, without duplicates.
    /// A unique index supersedes a plain one over the same fields.
    pub fn effective_indexes(&self) -> Vec<IndexDef> {
        let implied = self.fields.iter().filter(|f| f.unique).map(|f| IndexDef {
            fields: vec![f.name.clone()],
            unique: true,
        });

        let mut indexes: Vec<IndexDef> = Vec::new();
        for index in self.indexes.iter().cloned().chain(implied) {
            match indexes.iter_mut().find(|existing| existing.fields == index.fields) {
                Some(existing) => existing.unique |= index.unique,
                None => indexes.push(index),
            }
        }
        indexes
    }

    pub fn unique_keys(&self) -> Vec<Vec<String>> {
        self.effective_indexes()
            .into_iter()
            .filter(|index| index.unique)
            .map(|index| index.fields)
            .collect()
    }
}

/// Typed record bound to a collection definition
pub trait Model: DeserializeOwned + Send + Sync {
    const COLLECTION: &'static str;

    fn definition() -> CollectionDef;
}

/// The collections registered together against one logical database
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaSet {
    domain: String,
    collections: Vec<CollectionDef>,
}

impl SchemaSet {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            collections: Vec::new(),
        }
    }

    pub fn collection(mut self, definition: CollectionDef) -> Self {
        self.collections.retain(|c| c.name != definition.name);
        self.collections.push(definition);
        self
    }

    pub fn model<M: Model>(self) -> Self {
        self.collection(M::definition())
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn collections(&self) -> &[CollectionDef] {
        &self.collections
    }

    pub fn names(&self) -> Vec<String> {
        self.collections.iter().map(|c| c.name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_fields_and_explicit_indexes_collapse() {
        let def = CollectionDef::new("tenants")
            .field(FieldDef::string("email").required().lowercase().unique())
            .field(FieldDef::string("companySlug").required().lowercase().unique())
            .index(&["email"], true)
            .index(&["companySlug"], false);

        let indexes = def.effective_indexes();

        assert_eq!(indexes.len(), 2);
        assert!(indexes.iter().all(|i| i.unique));
        assert_eq!(def.unique_keys(), vec![vec!["email".to_string()], vec!["companySlug".to_string()]]);
    }

    #[test]
    fn index_names_are_stable() {
        let index = IndexDef {
            fields: vec!["employeeId".to_string()],
            unique: true,
        };
        assert_eq!(index.name("employees"), "employees_employeeId_key");
    }

    #[test]
    fn later_definition_replaces_same_name() {
        let set = SchemaSet::new("company")
            .collection(CollectionDef::new("employees"))
            .collection(CollectionDef::new("employees").field(FieldDef::string("name")));

        assert_eq!(set.names(), vec!["employees".to_string()]);
        assert_eq!(set.collections()[0].fields, vec![FieldDef::string("name")]);
    }
}
