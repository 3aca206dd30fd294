//! Tenant database router.
//!
//! Resolves a logical database name to a bound [`DatabaseHandle`] over the one
//! shared storage connection. The first resolve for a name registers the schema
//! set's collections; every later resolve reuses the bound handle and performs
//! no registration work.
//!
//! Each name owns a gate (an async once-cell). Concurrent first resolvers for the
//! same name queue on that gate, so at most one registration pass runs per name.
//! If a pass fails midway the gate stays empty and the next resolve runs it again;
//! storage-level registration is idempotent, so a rerun is safe.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

use crate::database::driver::StorageConnection;
use crate::database::manager::{ConnectionSupervisor, DatabaseError};
use crate::database::record::{self, Document};
use crate::database::schema::{CollectionDef, Model, SchemaSet};

/// Postgres identifier limit; applied to every backend so names stay portable
pub const MAX_LOGICAL_NAME_LEN: usize = 63;

pub fn validate_logical_name(name: &str) -> Result<(), DatabaseError> {
    let valid = !name.is_empty()
        && name.len() <= MAX_LOGICAL_NAME_LEN
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');

    if valid {
        Ok(())
    } else {
        Err(DatabaseError::InvalidDatabaseName(name.to_string()))
    }
}

/// Router's view of one logical database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
    Unbound,
    Binding,
    Bound,
}

#[derive(Default)]
struct Binding {
    bound: OnceCell<DatabaseHandle>,
    in_flight: AtomicBool,
}

struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct TenantRouter {
    supervisor: Arc<ConnectionSupervisor>,
    bindings: Mutex<HashMap<String, Arc<Binding>>>,
}

impl TenantRouter {
    pub fn new(supervisor: Arc<ConnectionSupervisor>) -> Self {
        Self {
            supervisor,
            bindings: Mutex::new(HashMap::new()),
        }
    }

    pub fn supervisor(&self) -> &Arc<ConnectionSupervisor> {
        &self.supervisor
    }

    /// Bound handle for `logical_name`, registering `schema_set` on first use
    pub async fn resolve(&self, logical_name: &str, schema_set: &SchemaSet) -> Result<DatabaseHandle, DatabaseError> {
        validate_logical_name(logical_name)?;

        let connection = self.supervisor.ensure_connected().await?;
        let binding = self.binding(logical_name).await;

        let handle = binding
            .bound
            .get_or_try_init(|| self.bind(&binding, connection, logical_name, schema_set))
            .await?;

        if handle.schema_set() != schema_set {
            warn!(
                database = logical_name,
                bound_domain = handle.schema_set().domain(),
                requested_domain = schema_set.domain(),
                "rejecting a different schema set for an already bound database"
            );
            return Err(DatabaseError::RegistrationConflict {
                database: logical_name.to_string(),
            });
        }

        debug!(database = logical_name, "switched to bound database");
        Ok(handle.clone())
    }

    /// Collection handle for `collection_name` within a bound database
    pub fn get_model(&self, handle: &DatabaseHandle, collection_name: &str) -> Result<CollectionHandle, DatabaseError> {
        handle.model(collection_name)
    }

    pub async fn binding_state(&self, logical_name: &str) -> BindingState {
        let bindings = self.bindings.lock().await;
        match bindings.get(logical_name) {
            Some(binding) if binding.bound.initialized() => BindingState::Bound,
            Some(binding) if binding.in_flight.load(Ordering::SeqCst) => BindingState::Binding,
            _ => BindingState::Unbound,
        }
    }

    /// Collections registered against `logical_name`, if it has been bound
    pub async fn registered_collections(&self, logical_name: &str) -> Option<Vec<String>> {
        let bindings = self.bindings.lock().await;
        bindings
            .get(logical_name)
            .and_then(|binding| binding.bound.get())
            .map(DatabaseHandle::collection_names)
    }

    pub async fn bound_databases(&self) -> Vec<String> {
        let bindings = self.bindings.lock().await;
        let mut names: Vec<String> = bindings
            .iter()
            .filter(|(_, binding)| binding.bound.initialized())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    async fn binding(&self, logical_name: &str) -> Arc<Binding> {
        let mut bindings = self.bindings.lock().await;
        bindings.entry(logical_name.to_string()).or_default().clone()
    }

    async fn bind(
        &self,
        binding: &Binding,
        connection: Arc<dyn StorageConnection>,
        logical_name: &str,
        schema_set: &SchemaSet,
    ) -> Result<DatabaseHandle, DatabaseError> {
        let _in_flight = InFlight::enter(&binding.in_flight);
        info!(database = logical_name, domain = schema_set.domain(), "binding logical database");

        let registered = async {
            connection.open_scope(logical_name).await?;
            for definition in schema_set.collections() {
                debug!(database = logical_name, collection = %definition.name, "registering collection");
                connection.register_collection(logical_name, definition).await?;
            }
            Ok::<(), DatabaseError>(())
        }
        .await;

        if let Err(err) = registered {
            warn!(database = logical_name, error = %err, "registration pass failed; database left unbound");
            return Err(err);
        }

        info!(database = logical_name, collections = ?schema_set.names(), "logical database bound");
        Ok(DatabaseHandle {
            inner: Arc::new(BoundDatabase {
                name: logical_name.to_string(),
                schema_set: schema_set.clone(),
                supervisor: self.supervisor.clone(),
            }),
        })
    }
}

struct BoundDatabase {
    name: String,
    schema_set: SchemaSet,
    supervisor: Arc<ConnectionSupervisor>,
}

/// Reusable reference to a bound logical database
#[derive(Clone)]
pub struct DatabaseHandle {
    inner: Arc<BoundDatabase>,
}

impl DatabaseHandle {
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn schema_set(&self) -> &SchemaSet {
        &self.inner.schema_set
    }

    pub fn collection_names(&self) -> Vec<String> {
        self.inner.schema_set.names()
    }

    pub fn model(&self, collection_name: &str) -> Result<CollectionHandle, DatabaseError> {
        let index = self
            .inner
            .schema_set
            .collections()
            .iter()
            .position(|c| c.name == collection_name)
            .ok_or_else(|| DatabaseError::NotRegistered {
                database: self.inner.name.clone(),
                collection: collection_name.to_string(),
            })?;

        Ok(CollectionHandle {
            database: self.inner.clone(),
            index,
        })
    }

    pub fn model_of<M: Model>(&self) -> Result<CollectionHandle, DatabaseError> {
        self.model(M::COLLECTION)
    }

    /// True when both handles come from the same registration pass
    pub fn same_binding(&self, other: &DatabaseHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for DatabaseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseHandle")
            .field("name", &self.inner.name)
            .field("collections", &self.collection_names())
            .finish()
    }
}

/// CRUD access to one registered collection
#[derive(Clone)]
pub struct CollectionHandle {
    database: Arc<BoundDatabase>,
    index: usize,
}

impl CollectionHandle {
    pub fn database(&self) -> &str {
        &self.database.name
    }

    pub fn name(&self) -> &str {
        &self.definition().name
    }

    pub fn definition(&self) -> &CollectionDef {
        &self.database.schema_set.collections()[self.index]
    }

    async fn connection(&self) -> Result<Arc<dyn StorageConnection>, DatabaseError> {
        Ok(self.database.supervisor.ensure_connected().await?)
    }

    pub async fn create(&self, input: Value) -> Result<Document, DatabaseError> {
        let fields = if self.definition().has_hashed_fields() {
            let definition = self.definition().clone();
            tokio::task::spawn_blocking(move || record::prepare_insert(&definition, input))
                .await
                .map_err(|e| DatabaseError::QueryError(format!("record preparation failed: {}", e)))??
        } else {
            record::prepare_insert(self.definition(), input)?
        };

        let connection = self.connection().await?;
        let document = connection
            .insert(self.database(), self.name(), Document::new(fields))
            .await?;

        debug!(database = self.database(), collection = self.name(), id = %document.id, "inserted document");
        Ok(document)
    }

    pub async fn create_as<T: Serialize>(&self, record: &T) -> Result<Document, DatabaseError> {
        let input = serde_json::to_value(record)
            .map_err(|e| DatabaseError::QueryError(format!("failed to encode record: {}", e)))?;
        self.create(input).await
    }

    pub async fn find(&self, filter: Value) -> Result<Vec<Document>, DatabaseError> {
        let filter = record::prepare_filter(self.definition(), filter)?;
        let connection = self.connection().await?;
        connection.find(self.database(), self.name(), &filter).await
    }

    pub async fn find_as<T: DeserializeOwned>(&self, filter: Value) -> Result<Vec<T>, DatabaseError> {
        self.find(filter).await?.iter().map(Document::decode).collect()
    }

    pub async fn find_one(&self, filter: Value) -> Result<Option<Document>, DatabaseError> {
        Ok(self.find(filter).await?.into_iter().next())
    }

    pub async fn count(&self, filter: Value) -> Result<u64, DatabaseError> {
        let filter = record::prepare_filter(self.definition(), filter)?;
        let connection = self.connection().await?;
        connection.count(self.database(), self.name(), &filter).await
    }

    pub async fn delete_many(&self, filter: Value) -> Result<u64, DatabaseError> {
        let filter = record::prepare_filter(self.definition(), filter)?;
        let connection = self.connection().await?;
        let deleted = connection.delete_many(self.database(), self.name(), &filter).await?;

        debug!(database = self.database(), collection = self.name(), deleted, "deleted documents");
        Ok(deleted)
    }
}

impl fmt::Debug for CollectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionHandle")
            .field("database", &self.database.name)
            .field("collection", &self.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::schema::FieldDef;
    use crate::testing::TestContext;
    use serde_json::json;

    fn widgets() -> SchemaSet {
        SchemaSet::new("widgets")
            .collection(CollectionDef::new("widgets").field(FieldDef::string("sku").required().lowercase().unique()))
            .collection(CollectionDef::new("parts"))
    }

    #[test]
    fn validates_logical_names() {
        assert!(validate_logical_name("AppTenants").is_ok());
        assert!(validate_logical_name("tenant_123-abc").is_ok());
        assert!(validate_logical_name("").is_err());
        assert!(validate_logical_name("a; DROP SCHEMA x").is_err());
        assert!(validate_logical_name(&"x".repeat(64)).is_err());
    }

    #[tokio::test]
    async fn repeat_resolves_skip_registration() {
        let ctx = TestContext::new();

        let first = ctx.router.resolve("acme", &widgets()).await.unwrap();
        for _ in 0..10 {
            let again = ctx.router.resolve("acme", &widgets()).await.unwrap();
            assert!(again.same_binding(&first));
        }

        assert_eq!(ctx.driver.registrations_for("acme"), 2);
        assert_eq!(ctx.driver.stats().scope_opens, 1);
        assert_eq!(ctx.router.binding_state("acme").await, BindingState::Bound);
    }

    #[tokio::test]
    async fn different_schema_set_conflicts() {
        let ctx = TestContext::new();
        ctx.router.resolve("acme", &widgets()).await.unwrap();

        let other = SchemaSet::new("other").collection(CollectionDef::new("widgets"));
        let err = ctx.router.resolve("acme", &other).await.unwrap_err();

        assert!(matches!(err, DatabaseError::RegistrationConflict { database } if database == "acme"));
        assert_eq!(
            ctx.router.registered_collections("acme").await,
            Some(vec!["widgets".to_string(), "parts".to_string()])
        );
    }

    #[tokio::test]
    async fn get_model_requires_registration() {
        let ctx = TestContext::new();
        let handle = ctx.router.resolve("acme", &widgets()).await.unwrap();

        assert!(ctx.router.get_model(&handle, "widgets").is_ok());
        let err = ctx.router.get_model(&handle, "gadgets").unwrap_err();
        assert!(matches!(err, DatabaseError::NotRegistered { collection, .. } if collection == "gadgets"));
    }

    #[tokio::test]
    async fn invalid_name_never_touches_storage() {
        let ctx = TestContext::new();
        let err = ctx.router.resolve("bad name", &widgets()).await.unwrap_err();

        assert!(matches!(err, DatabaseError::InvalidDatabaseName(_)));
        assert_eq!(ctx.driver.stats().connects, 0);
    }

    #[tokio::test]
    async fn collection_crud_round_trip() {
        let ctx = TestContext::new();
        let handle = ctx.router.resolve("acme", &widgets()).await.unwrap();
        let widgets = handle.model("widgets").unwrap();

        widgets.create(json!({ "sku": "AB-1", "color": "red" })).await.unwrap();
        widgets.create(json!({ "sku": "AB-2", "color": "blue" })).await.unwrap();

        let err = widgets.create(json!({ "sku": "ab-1" })).await.unwrap_err();
        assert!(err.is_duplicate_key());

        let found = widgets.find_one(json!({ "sku": "Ab-2" })).await.unwrap().unwrap();
        assert_eq!(found.get_str("color"), Some("blue"));
        assert_eq!(widgets.count(json!({})).await.unwrap(), 2);
        assert_eq!(widgets.delete_many(json!({ "color": "red" })).await.unwrap(), 1);
        assert_eq!(widgets.count(Value::Null).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unbound_databases_are_not_listed() {
        let ctx = TestContext::new();
        assert!(ctx.router.bound_databases().await.is_empty());
        assert_eq!(ctx.router.binding_state("acme").await, BindingState::Unbound);

        ctx.router.resolve("beta", &widgets()).await.unwrap();
        ctx.router.resolve("acme", &widgets()).await.unwrap();

        assert_eq!(ctx.router.bound_databases().await, vec!["acme".to_string(), "beta".to_string()]);
    }
}
