use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::database::driver::{StorageConnection, StorageDriver};
use crate::database::record::RecordError;

/// Failure to establish the physical connection to the storage cluster.
///
/// Cloneable so that a single failed attempt can be reported to every caller
/// that was waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("storage cluster unreachable: {0}")]
    Unreachable(String),

    #[error("storage cluster rejected credentials: {0}")]
    Rejected(String),

    #[error("connection attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid connection settings: {0}")]
    InvalidSettings(String),

    #[error("storage connection closed before the attempt completed")]
    Closed,
}

/// Errors from the data-access layer
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("Logical database '{database}' is already bound to a different schema set")]
    RegistrationConflict { database: String },

    #[error("Collection '{collection}' is not registered in logical database '{database}'")]
    NotRegistered { database: String, collection: String },

    #[error("Duplicate key in '{collection}': {key}")]
    DuplicateKey { collection: String, key: String },

    #[error("Invalid logical database name: {0}")]
    InvalidDatabaseName(String),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Password hashing failed: {0}")]
    PasswordHash(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl DatabaseError {
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, DatabaseError::DuplicateKey { .. })
    }
}

/// Observable state of the shared storage connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unconnected,
    Connecting,
    Ready,
    Failed,
}

type ConnectResult = Result<Arc<dyn StorageConnection>, ConnectionError>;
type ConnectFuture = Shared<BoxFuture<'static, ConnectResult>>;

enum Slot {
    Unconnected,
    Connecting { attempt: u64, future: ConnectFuture },
    Ready(Arc<dyn StorageConnection>),
    Failed(ConnectionError),
}

/// Owns the single physical connection (pool) to the storage cluster.
///
/// The connection is established lazily on first use. Callers that arrive while
/// an attempt is in flight await that same attempt, so a burst of first requests
/// never opens more than one pool. Each attempt runs on its own task and
/// settles the state itself, so it completes even if every waiter goes away.
/// A failed attempt is reported to all of its waiters; the next explicit call
/// starts a fresh attempt.
pub struct ConnectionSupervisor {
    driver: Arc<dyn StorageDriver>,
    connect_timeout: Duration,
    slot: Arc<Mutex<Slot>>,
    attempts: AtomicU64,
}

impl ConnectionSupervisor {
    pub fn new(driver: Arc<dyn StorageDriver>, connect_timeout: Duration) -> Self {
        Self {
            driver,
            connect_timeout,
            slot: Arc::new(Mutex::new(Slot::Unconnected)),
            attempts: AtomicU64::new(0),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.driver.backend_name()
    }

    pub fn state(&self) -> ConnectionState {
        match &*self.lock_slot() {
            Slot::Unconnected => ConnectionState::Unconnected,
            Slot::Connecting { .. } => ConnectionState::Connecting,
            Slot::Ready(_) => ConnectionState::Ready,
            Slot::Failed(_) => ConnectionState::Failed,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    /// Error from the most recent attempt, if that attempt failed
    pub fn last_error(&self) -> Option<ConnectionError> {
        match &*self.lock_slot() {
            Slot::Failed(err) => Some(err.clone()),
            _ => None,
        }
    }

    /// Number of physical connection attempts started so far
    pub fn connect_attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Return the shared connection, establishing it first if needed
    pub async fn ensure_connected(&self) -> Result<Arc<dyn StorageConnection>, ConnectionError> {
        let future = {
            let mut slot = self.lock_slot();
            match &*slot {
                Slot::Ready(connection) => return Ok(connection.clone()),
                Slot::Connecting { attempt, future } => {
                    debug!(attempt, "waiting on in-flight storage connection attempt");
                    future.clone()
                }
                Slot::Unconnected | Slot::Failed(_) => {
                    let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
                    let future = self.start_attempt(attempt);
                    *slot = Slot::Connecting {
                        attempt,
                        future: future.clone(),
                    };
                    future
                }
            }
        };

        future.await
    }

    /// Round-trip to the storage cluster, connecting first if needed
    pub async fn health_check(&self) -> Result<(), DatabaseError> {
        let connection = self.ensure_connected().await?;
        connection.ping().await
    }

    /// Close the physical connection (e.g., on shutdown).
    ///
    /// An attempt still in flight loses the slot; whatever it connects is
    /// closed again and its waiters see [`ConnectionError::Closed`].
    pub async fn close(&self) {
        let previous = std::mem::replace(&mut *self.lock_slot(), Slot::Unconnected);
        match previous {
            Slot::Ready(connection) => {
                connection.close().await;
                info!(backend = self.backend_name(), "closed storage connection");
            }
            Slot::Connecting { attempt, .. } => {
                info!(backend = self.backend_name(), attempt, "abandoned in-flight storage connection attempt");
            }
            Slot::Unconnected | Slot::Failed(_) => {}
        }
    }

    fn start_attempt(&self, attempt: u64) -> ConnectFuture {
        let driver = self.driver.clone();
        let timeout = self.connect_timeout;
        let slot = self.slot.clone();

        let task = tokio::spawn({
            let slot = slot.clone();
            async move {
                info!(backend = driver.backend_name(), attempt, "connecting to storage cluster");

                let outcome = match tokio::time::timeout(timeout, driver.connect()).await {
                    Ok(result) => result,
                    Err(_) => Err(ConnectionError::Timeout(timeout)),
                };

                match &outcome {
                    Ok(_) => info!(backend = driver.backend_name(), attempt, "storage connection established"),
                    Err(err) => error!(backend = driver.backend_name(), attempt, error = %err, "storage connection failed"),
                }

                if settle(&slot, attempt, &outcome) {
                    return outcome;
                }

                // Closed or superseded while connecting
                match outcome {
                    Ok(orphan) => {
                        orphan.close().await;
                        warn!(backend = driver.backend_name(), attempt, "closed connection from abandoned attempt");
                        Err(ConnectionError::Closed)
                    }
                    Err(err) => Err(err),
                }
            }
        });

        async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(join_err) => {
                    let outcome = Err(ConnectionError::Unreachable(format!("connect task failed: {}", join_err)));
                    settle(&slot, attempt, &outcome);
                    outcome
                }
            }
        }
        .boxed()
        .shared()
    }

    fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        lock(&self.slot)
    }
}

fn lock(slot: &Mutex<Slot>) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(|poisoned: PoisonError<_>| {
        warn!("connection supervisor lock was poisoned; continuing");
        poisoned.into_inner()
    })
}

/// Record the outcome of `attempt` if it still owns the slot
fn settle(slot: &Mutex<Slot>, attempt: u64, outcome: &ConnectResult) -> bool {
    let mut slot = lock(slot);
    if !matches!(&*slot, Slot::Connecting { attempt: current, .. } if *current == attempt) {
        return false;
    }

    *slot = match outcome {
        Ok(connection) => Slot::Ready(connection.clone()),
        Err(err) => Slot::Failed(err.clone()),
    };
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::MemoryDriver;

    fn supervisor(driver: MemoryDriver) -> (Arc<MemoryDriver>, Arc<ConnectionSupervisor>) {
        let driver = Arc::new(driver);
        let supervisor = Arc::new(ConnectionSupervisor::new(driver.clone(), Duration::from_secs(3)));
        (driver, supervisor)
    }

    #[tokio::test]
    async fn starts_unconnected_and_becomes_ready() {
        let (driver, supervisor) = supervisor(MemoryDriver::new());
        assert_eq!(supervisor.state(), ConnectionState::Unconnected);

        supervisor.ensure_connected().await.unwrap();
        supervisor.ensure_connected().await.unwrap();

        assert!(supervisor.is_ready());
        assert_eq!(driver.stats().connects, 1);
        assert_eq!(supervisor.connect_attempts(), 1);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_attempt() {
        let (driver, supervisor) =
            supervisor(MemoryDriver::new().with_connect_latency(Duration::from_millis(50)));

        let waiters: Vec<_> = (0..20)
            .map(|_| {
                let supervisor = supervisor.clone();
                tokio::spawn(async move { supervisor.ensure_connected().await.map(|_| ()) })
            })
            .collect();

        for waiter in futures::future::join_all(waiters).await {
            waiter.unwrap().unwrap();
        }

        assert_eq!(driver.stats().connects, 1);
        assert_eq!(supervisor.state(), ConnectionState::Ready);
    }

    #[tokio::test]
    async fn failure_reaches_every_waiter_and_leaves_failed_state() {
        let (driver, supervisor) = supervisor(
            MemoryDriver::new()
                .with_connect_latency(Duration::from_millis(20))
                .unreachable("connection refused"),
        );

        let results = futures::future::join_all((0..5).map(|_| supervisor.ensure_connected())).await;

        for result in results {
            assert!(matches!(result, Err(ConnectionError::Unreachable(_))));
        }
        assert_eq!(driver.stats().connects, 1);
        assert_eq!(supervisor.state(), ConnectionState::Failed);
        assert!(supervisor.last_error().is_some());
    }

    #[tokio::test]
    async fn explicit_call_after_failure_retries() {
        let (driver, supervisor) = supervisor(MemoryDriver::new().unreachable("down"));

        assert!(supervisor.ensure_connected().await.is_err());
        driver.set_reachable(true);
        supervisor.ensure_connected().await.unwrap();

        assert_eq!(driver.stats().connects, 2);
        assert!(supervisor.is_ready());
    }

    #[tokio::test]
    async fn slow_connect_times_out_into_failed() {
        let driver = Arc::new(MemoryDriver::new().with_connect_latency(Duration::from_millis(500)));
        let supervisor = ConnectionSupervisor::new(driver, Duration::from_millis(20));

        let err = supervisor.ensure_connected().await.err().unwrap();

        assert_eq!(err, ConnectionError::Timeout(Duration::from_millis(20)));
        assert_eq!(supervisor.state(), ConnectionState::Failed);
    }

    #[tokio::test]
    async fn close_returns_to_unconnected() {
        let (driver, supervisor) = supervisor(MemoryDriver::new());
        supervisor.health_check().await.unwrap();

        supervisor.close().await;

        assert_eq!(supervisor.state(), ConnectionState::Unconnected);
        assert_eq!(driver.stats().closes, 1);
    }

    #[tokio::test]
    async fn attempt_completes_after_its_only_caller_gives_up() {
        let (driver, supervisor) =
            supervisor(MemoryDriver::new().with_connect_latency(Duration::from_millis(100)));

        let gave_up = tokio::time::timeout(Duration::from_millis(10), supervisor.ensure_connected()).await;
        assert!(gave_up.is_err());
        assert_eq!(supervisor.state(), ConnectionState::Connecting);

        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(supervisor.state(), ConnectionState::Ready);
        assert_eq!(driver.stats().connects, 1);
        assert_eq!(supervisor.connect_attempts(), 1);
    }

    #[tokio::test]
    async fn failed_attempt_settles_without_waiters() {
        let (_, supervisor) = supervisor(
            MemoryDriver::new()
                .with_connect_latency(Duration::from_millis(50))
                .unreachable("connection refused"),
        );

        let gave_up = tokio::time::timeout(Duration::from_millis(10), supervisor.ensure_connected()).await;
        assert!(gave_up.is_err());

        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(supervisor.state(), ConnectionState::Failed);
        assert!(matches!(supervisor.last_error(), Some(ConnectionError::Unreachable(_))));
    }

    #[tokio::test]
    async fn close_during_connect_discards_the_late_connection() {
        let (driver, supervisor) =
            supervisor(MemoryDriver::new().with_connect_latency(Duration::from_millis(50)));

        let waiter = tokio::spawn({
            let supervisor = supervisor.clone();
            async move { supervisor.ensure_connected().await.map(|_| ()) }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(supervisor.state(), ConnectionState::Connecting);

        supervisor.close().await;

        assert_eq!(waiter.await.unwrap(), Err(ConnectionError::Closed));
        assert_eq!(supervisor.state(), ConnectionState::Unconnected);
        assert_eq!(driver.stats().connects, 1);
        assert_eq!(driver.stats().closes, 1);

        // The next call starts over
        supervisor.ensure_connected().await.unwrap();
        assert!(supervisor.is_ready());
        assert_eq!(driver.stats().connects, 2);
    }
}
