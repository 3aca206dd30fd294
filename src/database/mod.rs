pub mod catalog;
pub mod driver;
pub mod manager;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod record;
pub mod router;
pub mod schema;

pub use catalog::{company_schema_set, tenant_schema_set, TENANT_DIRECTORY};
pub use driver::{driver_from_config, StorageConnection, StorageDriver};
pub use manager::{ConnectionError, ConnectionState, ConnectionSupervisor, DatabaseError};
pub use memory::{MemoryDriver, MemoryStats};
pub use record::{Document, RecordError};
pub use router::{BindingState, CollectionHandle, DatabaseHandle, TenantRouter};
pub use schema::{CollectionDef, FieldDef, FieldKind, IndexDef, Model, SchemaSet};
