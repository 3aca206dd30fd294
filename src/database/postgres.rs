//! Postgres storage backend.
//!
//! One `PgPool` serves every tenant. A logical database is a Postgres schema
//! inside the configured physical database, a collection is a table holding
//! JSONB documents, and each index is an expression index over `data->>'field'`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::database::driver::{StorageConnection, StorageDriver};
use crate::database::manager::{ConnectionError, DatabaseError};
use crate::database::record::Document;
use crate::database::schema::CollectionDef;

/// Idle connections are reaped after this long when keep-alive is off
const IDLE_TIMEOUT: Duration = Duration::from_secs(600);

pub struct PostgresDriver {
    config: DatabaseConfig,
}

impl PostgresDriver {
    pub fn new(config: DatabaseConfig) -> Self {
        Self { config }
    }

    fn connect_options(&self) -> Result<PgConnectOptions, ConnectionError> {
        let options = match &self.config.url {
            Some(url) => PgConnectOptions::from_str(url)
                .map_err(|e| ConnectionError::InvalidSettings(format!("{}: {}", redact_url(url), e)))?,
            None => {
                let mut options = PgConnectOptions::new()
                    .host(&self.config.host)
                    .port(self.config.port)
                    .database(&self.config.name);
                if let Some(user) = &self.config.user {
                    options = options.username(user);
                }
                if let Some(password) = &self.config.password {
                    options = options.password(password);
                }
                options
            }
        };

        // Server-side bound on every statement, the closest Postgres analogue of a socket timeout
        Ok(options.options([("statement_timeout", self.config.socket_timeout().as_millis().to_string())]))
    }

    fn pool_options(&self) -> PgPoolOptions {
        let options = PgPoolOptions::new()
            .max_connections(self.config.max_connections)
            .acquire_timeout(self.config.connect_timeout());

        if self.config.keep_alive {
            options.min_connections(1).idle_timeout(None::<Duration>).test_before_acquire(true)
        } else {
            options.idle_timeout(Some(IDLE_TIMEOUT))
        }
    }

    fn describe_target(&self) -> String {
        match &self.config.url {
            Some(url) => redact_url(url),
            None => format!("{}:{}/{}", self.config.host, self.config.port, self.config.name),
        }
    }
}

#[async_trait]
impl StorageDriver for PostgresDriver {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    async fn connect(&self) -> Result<Arc<dyn StorageConnection>, ConnectionError> {
        let endpoint = self.describe_target();
        info!(endpoint = %endpoint, "opening postgres pool");

        let pool = self
            .pool_options()
            .connect_with(self.connect_options()?)
            .await
            .map_err(connection_error)?;

        Ok(Arc::new(PostgresStore {
            pool,
            log_queries: self.config.enable_query_logging,
        }))
    }
}

pub struct PostgresStore {
    pool: PgPool,
    log_queries: bool,
}

#[derive(FromRow)]
struct DocumentRow {
    id: Uuid,
    data: Json<Map<String, Value>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<DocumentRow> for Document {
    fn from(row: DocumentRow) -> Self {
        Document {
            id: row.id,
            fields: row.data.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl PostgresStore {
    async fn execute(&self, sql: &str) -> Result<(), DatabaseError> {
        if self.log_queries {
            debug!(sql, "executing");
        }
        sqlx::query(sql).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl StorageConnection for PostgresStore {
    async fn ping(&self) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn open_scope(&self, scope: &str) -> Result<(), DatabaseError> {
        self.execute(&format!("CREATE SCHEMA IF NOT EXISTS {}", quote_identifier(scope)))
            .await
    }

    async fn register_collection(&self, scope: &str, definition: &CollectionDef) -> Result<(), DatabaseError> {
        let table = qualified_table(scope, &definition.name);

        self.execute(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id UUID PRIMARY KEY,
                data JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
            table
        ))
        .await?;

        for index in definition.effective_indexes() {
            let expressions: Vec<String> = index
                .fields
                .iter()
                .map(|field| format!("(data->>{})", quote_literal(field)))
                .collect();

            self.execute(&format!(
                "CREATE {}INDEX IF NOT EXISTS {} ON {} ({})",
                if index.unique { "UNIQUE " } else { "" },
                quote_identifier(&index.name(&definition.name)),
                table,
                expressions.join(", ")
            ))
            .await?;
        }

        self.execute(&format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} (created_at)",
            quote_identifier(&format!("{}_created_at_idx", definition.name)),
            table
        ))
        .await
    }

    async fn insert(&self, scope: &str, collection: &str, document: Document) -> Result<Document, DatabaseError> {
        let sql = format!(
            "INSERT INTO {} (id, data, created_at, updated_at) VALUES ($1, $2, $3, $4)
             RETURNING id, data, created_at, updated_at",
            qualified_table(scope, collection)
        );

        let row = sqlx::query_as::<_, DocumentRow>(&sql)
            .bind(document.id)
            .bind(Json(&document.fields))
            .bind(document.created_at)
            .bind(document.updated_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| storage_error(e, collection))?;

        Ok(row.into())
    }

    async fn find(&self, scope: &str, collection: &str, filter: &Map<String, Value>) -> Result<Vec<Document>, DatabaseError> {
        let sql = format!(
            "SELECT id, data, created_at, updated_at FROM {} WHERE data @> $1 ORDER BY created_at, id",
            qualified_table(scope, collection)
        );

        let rows = sqlx::query_as::<_, DocumentRow>(&sql)
            .bind(Json(filter))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Document::from).collect())
    }

    async fn count(&self, scope: &str, collection: &str, filter: &Map<String, Value>) -> Result<u64, DatabaseError> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE data @> $1",
            qualified_table(scope, collection)
        );

        let (count,): (i64,) = sqlx::query_as(&sql).bind(Json(filter)).fetch_one(&self.pool).await?;
        Ok(count.max(0) as u64)
    }

    async fn delete_many(&self, scope: &str, collection: &str, filter: &Map<String, Value>) -> Result<u64, DatabaseError> {
        let sql = format!("DELETE FROM {} WHERE data @> $1", qualified_table(scope, collection));
        let result = sqlx::query(&sql).bind(Json(filter)).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Quote SQL identifier to prevent injection
fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn qualified_table(scope: &str, collection: &str) -> String {
    format!("{}.{}", quote_identifier(scope), quote_identifier(collection))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        return db_err.code().map(|code| code == "23505").unwrap_or(false);
    }
    false
}

fn storage_error(err: sqlx::Error, collection: &str) -> DatabaseError {
    if is_unique_violation(&err) {
        let key = match &err {
            sqlx::Error::Database(db_err) => db_err.constraint().unwrap_or("unique index").to_string(),
            _ => String::new(),
        };
        return DatabaseError::DuplicateKey {
            collection: collection.to_string(),
            key,
        };
    }
    DatabaseError::Sqlx(err)
}

fn connection_error(err: sqlx::Error) -> ConnectionError {
    match &err {
        sqlx::Error::PoolTimedOut => ConnectionError::Unreachable("timed out waiting for a connection".to_string()),
        sqlx::Error::Configuration(e) => ConnectionError::InvalidSettings(e.to_string()),
        // 28000 invalid_authorization_specification, 28P01 invalid_password
        sqlx::Error::Database(db_err) if matches!(db_err.code().as_deref(), Some("28000") | Some("28P01")) => {
            ConnectionError::Rejected(db_err.message().to_string())
        }
        _ => ConnectionError::Unreachable(err.to_string()),
    }
}

/// Strip credentials from a connection URL before logging it
pub fn redact_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut url) => {
            if url.password().is_some() {
                let _ = url.set_password(Some("****"));
            }
            url.into()
        }
        Err(_) => "<unparseable url>".to_string(),
    }
}
