//! In-process storage backend.
//!
//! Behaves like the Postgres backend (scopes, registered collections, unique
//! indexes) without a server. Data lives in the driver, so it survives
//! reconnects the way a real cluster would. Counters and fault injection make
//! it the backend of choice for tests.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

use crate::database::driver::{StorageConnection, StorageDriver};
use crate::database::manager::{ConnectionError, DatabaseError};
use crate::database::record::Document;
use crate::database::schema::CollectionDef;

struct MemoryCollection {
    definition: CollectionDef,
    documents: Vec<Document>,
}

static NULL: Value = Value::Null;

type Scopes = HashMap<String, HashMap<String, MemoryCollection>>;

#[derive(Default)]
struct Counters {
    connects: AtomicUsize,
    scope_opens: AtomicUsize,
    registrations: AtomicUsize,
    inserts: AtomicUsize,
    closes: AtomicUsize,
}

/// Snapshot of driver activity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryStats {
    pub connects: usize,
    pub scope_opens: usize,
    pub registrations: usize,
    pub inserts: usize,
    pub closes: usize,
}

struct Cluster {
    scopes: RwLock<Scopes>,
    counters: Counters,
    registrations_by_scope: std::sync::Mutex<HashMap<String, usize>>,
    failing_registrations: AtomicBool,
}

pub struct MemoryDriver {
    cluster: Arc<Cluster>,
    reachable: AtomicBool,
    failure: String,
    connect_latency: Duration,
    registration_latency: Duration,
}

impl Default for MemoryDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self {
            cluster: Arc::new(Cluster {
                scopes: RwLock::new(HashMap::new()),
                counters: Counters::default(),
                registrations_by_scope: std::sync::Mutex::new(HashMap::new()),
                failing_registrations: AtomicBool::new(false),
            }),
            reachable: AtomicBool::new(true),
            failure: "connection refused".to_string(),
            connect_latency: Duration::ZERO,
            registration_latency: Duration::ZERO,
        }
    }

    pub fn with_connect_latency(mut self, latency: Duration) -> Self {
        self.connect_latency = latency;
        self
    }

    pub fn with_registration_latency(mut self, latency: Duration) -> Self {
        self.registration_latency = latency;
        self
    }

    /// Make every connect attempt fail with `reason` until `set_reachable(true)`
    pub fn unreachable(mut self, reason: impl Into<String>) -> Self {
        self.failure = reason.into();
        self.reachable = AtomicBool::new(false);
        self
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// While set, collection registrations are counted and then rejected
    pub fn set_registrations_failing(&self, failing: bool) {
        self.cluster.failing_registrations.store(failing, Ordering::SeqCst);
    }

    pub fn stats(&self) -> MemoryStats {
        let counters = &self.cluster.counters;
        MemoryStats {
            connects: counters.connects.load(Ordering::SeqCst),
            scope_opens: counters.scope_opens.load(Ordering::SeqCst),
            registrations: counters.registrations.load(Ordering::SeqCst),
            inserts: counters.inserts.load(Ordering::SeqCst),
            closes: counters.closes.load(Ordering::SeqCst),
        }
    }

    /// How many collection registrations have targeted `scope`
    pub fn registrations_for(&self, scope: &str) -> usize {
        self.cluster
            .registrations_by_scope
            .lock()
            .map(|log| log.get(scope).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}

#[async_trait]
impl StorageDriver for MemoryDriver {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn connect(&self) -> Result<Arc<dyn StorageConnection>, ConnectionError> {
        self.cluster.counters.connects.fetch_add(1, Ordering::SeqCst);

        if !self.connect_latency.is_zero() {
            tokio::time::sleep(self.connect_latency).await;
        }

        if !self.reachable.load(Ordering::SeqCst) {
            return Err(ConnectionError::Unreachable(self.failure.clone()));
        }

        Ok(Arc::new(MemoryStore {
            cluster: self.cluster.clone(),
            registration_latency: self.registration_latency,
        }))
    }
}

pub struct MemoryStore {
    cluster: Arc<Cluster>,
    registration_latency: Duration,
}

fn not_registered(scope: &str, collection: &str) -> DatabaseError {
    DatabaseError::NotRegistered {
        database: scope.to_string(),
        collection: collection.to_string(),
    }
}

fn collection<'a>(scopes: &'a Scopes, scope: &str, name: &str) -> Result<&'a MemoryCollection, DatabaseError> {
    scopes
        .get(scope)
        .and_then(|collections| collections.get(name))
        .ok_or_else(|| not_registered(scope, name))
}

#[async_trait]
impl StorageConnection for MemoryStore {
    async fn ping(&self) -> Result<(), DatabaseError> {
        Ok(())
    }

    async fn open_scope(&self, scope: &str) -> Result<(), DatabaseError> {
        self.cluster.counters.scope_opens.fetch_add(1, Ordering::SeqCst);
        self.cluster.scopes.write().await.entry(scope.to_string()).or_default();
        Ok(())
    }

    async fn register_collection(&self, scope: &str, definition: &CollectionDef) -> Result<(), DatabaseError> {
        self.cluster.counters.registrations.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut log) = self.cluster.registrations_by_scope.lock() {
            *log.entry(scope.to_string()).or_insert(0) += 1;
        }

        if !self.registration_latency.is_zero() {
            tokio::time::sleep(self.registration_latency).await;
        }

        if self.cluster.failing_registrations.load(Ordering::SeqCst) {
            return Err(DatabaseError::QueryError(format!(
                "registration of '{}' in '{}' rejected",
                definition.name, scope
            )));
        }

        let mut scopes = self.cluster.scopes.write().await;
        let collections = scopes
            .get_mut(scope)
            .ok_or_else(|| DatabaseError::NotFound(format!("logical database '{}'", scope)))?;

        collections
            .entry(definition.name.clone())
            .and_modify(|existing| existing.definition = definition.clone())
            .or_insert_with(|| MemoryCollection {
                definition: definition.clone(),
                documents: Vec::new(),
            });

        debug!(scope, collection = %definition.name, "registered collection");
        Ok(())
    }

    async fn insert(&self, scope: &str, collection_name: &str, document: Document) -> Result<Document, DatabaseError> {
        let mut scopes = self.cluster.scopes.write().await;
        let target = scopes
            .get_mut(scope)
            .and_then(|collections| collections.get_mut(collection_name))
            .ok_or_else(|| not_registered(scope, collection_name))?;

        for key in target.definition.unique_keys() {
            let values: Vec<&Value> = key
                .iter()
                .map(|field| document.get(field).unwrap_or(&NULL))
                .collect();

            // Like Postgres, NULLs never collide
            if values.iter().any(|v| v.is_null()) {
                continue;
            }

            let clash = target.documents.iter().any(|existing| {
                key.iter()
                    .zip(&values)
                    .all(|(field, value)| existing.get(field) == Some(*value))
            });

            if clash {
                let rendered: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                return Err(DatabaseError::DuplicateKey {
                    collection: collection_name.to_string(),
                    key: format!("({})=({})", key.join(", "), rendered.join(", ")),
                });
            }
        }

        target.documents.push(document.clone());
        self.cluster.counters.inserts.fetch_add(1, Ordering::SeqCst);
        Ok(document)
    }

    async fn find(&self, scope: &str, collection_name: &str, filter: &Map<String, Value>) -> Result<Vec<Document>, DatabaseError> {
        let scopes = self.cluster.scopes.read().await;
        let target = collection(&scopes, scope, collection_name)?;
        Ok(target.documents.iter().filter(|d| d.matches(filter)).cloned().collect())
    }

    async fn count(&self, scope: &str, collection_name: &str, filter: &Map<String, Value>) -> Result<u64, DatabaseError> {
        let scopes = self.cluster.scopes.read().await;
        let target = collection(&scopes, scope, collection_name)?;
        Ok(target.documents.iter().filter(|d| d.matches(filter)).count() as u64)
    }

    async fn delete_many(&self, scope: &str, collection_name: &str, filter: &Map<String, Value>) -> Result<u64, DatabaseError> {
        let mut scopes = self.cluster.scopes.write().await;
        let target = scopes
            .get_mut(scope)
            .and_then(|collections| collections.get_mut(collection_name))
            .ok_or_else(|| not_registered(scope, collection_name))?;

        let before = target.documents.len();
        target.documents.retain(|d| !d.matches(filter));
        Ok((before - target.documents.len()) as u64)
    }

    async fn close(&self) {
        self.cluster.counters.closes.fetch_add(1, Ordering::SeqCst);
        debug!("memory store closed");
    }
}
