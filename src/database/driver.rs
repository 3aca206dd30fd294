//! Storage driver seam between the router and a concrete backend.
//!
//! A [`StorageDriver`] knows how to open the one physical connection to the
//! cluster; the resulting [`StorageConnection`] is shared by every tenant and
//! addresses logical databases ("scopes") by name.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::config::{DatabaseConfig, StorageBackend};
use crate::database::manager::{ConnectionError, DatabaseError};
use crate::database::memory::MemoryDriver;
use crate::database::postgres::PostgresDriver;
use crate::database::record::Document;
use crate::database::schema::CollectionDef;

#[async_trait]
pub trait StorageDriver: Send + Sync {
    fn backend_name(&self) -> &'static str;

    /// Open the physical connection (pool) to the storage cluster
    async fn connect(&self) -> Result<Arc<dyn StorageConnection>, ConnectionError>;
}

#[async_trait]
pub trait StorageConnection: Send + Sync {
    async fn ping(&self) -> Result<(), DatabaseError>;

    /// Create the logical database namespace if it does not exist yet
    async fn open_scope(&self, scope: &str) -> Result<(), DatabaseError>;

    /// Declare a collection's shape and indexes inside `scope`
    async fn register_collection(&self, scope: &str, definition: &CollectionDef) -> Result<(), DatabaseError>;

    async fn insert(&self, scope: &str, collection: &str, document: Document) -> Result<Document, DatabaseError>;

    /// Documents whose fields contain every key/value of `filter`, oldest first
    async fn find(&self, scope: &str, collection: &str, filter: &Map<String, Value>) -> Result<Vec<Document>, DatabaseError>;

    async fn count(&self, scope: &str, collection: &str, filter: &Map<String, Value>) -> Result<u64, DatabaseError>;

    async fn delete_many(&self, scope: &str, collection: &str, filter: &Map<String, Value>) -> Result<u64, DatabaseError>;

    async fn close(&self);
}

/// Build the driver selected by configuration
pub fn driver_from_config(config: &DatabaseConfig) -> Arc<dyn StorageDriver> {
    match config.backend {
        StorageBackend::Postgres => Arc::new(PostgresDriver::new(config.clone())),
        StorageBackend::Memory => Arc::new(MemoryDriver::new()),
    }
}
