//! Store lifecycle and the single-writer transaction.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePoolOptions,
    SqliteSynchronous,
};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tokio::sync::{Mutex, OwnedMutexGuard};

use estate_core::config::StoreConfig;

use crate::migrations;
use crate::schema::SchemaRegistry;

/// Errors from graph operations.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Schema violation for {label}: {reason}")]
    SchemaViolation { label: String, reason: String },

    #[error("Unknown endpoint for {kind} edge: {endpoint}")]
    UnknownEndpoint { kind: String, endpoint: String },

    #[error("Store error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Node not found: {label} with key {key}")]
    NotFound { label: String, key: String },

    #[error("Store connection error: {0}")]
    Connection(String),

    #[error("Store was written with schema v{stored}, registry is v{registry}")]
    SchemaVersion { stored: u32, registry: u32 },
}

impl From<serde_json::Error> for GraphError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl GraphError {
    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, GraphError::Storage(_) | GraphError::Connection(_))
    }
}

/// Embedded property-graph store.
///
/// Reads go through the connection pool and may run concurrently. Writes go
/// through [`GraphStore::begin_write`], which admits one writer at a time.
/// Clone is cheap (inner Arcs).
#[derive(Clone)]
pub struct GraphStore {
    pool: SqlitePool,
    registry: Arc<SchemaRegistry>,
    writer: Arc<Mutex<()>>,
}

impl GraphStore {
    /// Open (or create) the store described by `config`.
    pub async fn open(config: &StoreConfig, registry: SchemaRegistry) -> Result<Self, GraphError> {
        if config.path == ":memory:" {
            return Self::in_memory(registry).await;
        }

        let path = Path::new(&config.path);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    GraphError::Connection(format!("cannot create {}: {e}", parent.display()))
                })?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(|e| GraphError::Connection(format!("{}: {e}", config.path)))?;

        Self::init(pool, registry, &config.path).await
    }

    /// A private in-memory store. It lives on a single pooled connection, so
    /// a caller holding a [`WriteTxn`] must not read through the store until
    /// the transaction ends.
    pub async fn in_memory(registry: SchemaRegistry) -> Result<Self, GraphError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        Self::init(pool, registry, ":memory:").await
    }

    async fn init(
        pool: SqlitePool,
        registry: SchemaRegistry,
        location: &str,
    ) -> Result<Self, GraphError> {
        migrations::run_migrations(&pool).await?;
        migrations::check_schema_version(&pool, registry.version()).await?;

        tracing::info!(
            store = %location,
            schema_version = registry.version(),
            "Opened graph store"
        );

        Ok(Self {
            pool,
            registry: Arc::new(registry),
            writer: Arc::new(Mutex::new(())),
        })
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// The underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Wait for the writer slot and open a transaction.
    ///
    /// The slot is held until the returned [`WriteTxn`] is committed, rolled
    /// back, or dropped.
    pub async fn begin_write(&self) -> Result<WriteTxn, GraphError> {
        let guard = Arc::clone(&self.writer).lock_owned().await;
        let tx = self.pool.begin().await?;
        Ok(WriteTxn {
            tx,
            registry: Arc::clone(&self.registry),
            _guard: guard,
        })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// The active write transaction. Dropping it without committing rolls back.
pub struct WriteTxn {
    // Field order matters: the transaction is released before the writer slot.
    tx: Transaction<'static, Sqlite>,
    registry: Arc<SchemaRegistry>,
    _guard: OwnedMutexGuard<()>,
}

impl WriteTxn {
    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub(crate) fn conn(&mut self) -> &mut SqliteConnection {
        &mut *self.tx
    }

    pub async fn commit(self) -> Result<(), GraphError> {
        self.tx.commit().await?;
        Ok(())
    }

    pub async fn rollback(self) -> Result<(), GraphError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
