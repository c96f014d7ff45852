//! On-disk layout of the graph store.
//!
//! Layout migrations are versioned separately from the schema registry: the
//! layout describes tables, the registry describes node kinds.

use sqlx::SqlitePool;

use crate::store::GraphError;

/// Current layout version.
pub const LAYOUT_VERSION: i64 = 1;

const CREATE_META_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS schema_meta (
        key TEXT PRIMARY KEY NOT NULL,
        value TEXT NOT NULL
    );
"#;

/// Layout 1: nodes keyed by (label, natural_key), edges keyed by
/// (kind, source, target).
const LAYOUT_V1: &str = r#"
    CREATE TABLE IF NOT EXISTS nodes (
        label TEXT NOT NULL,
        natural_key TEXT NOT NULL,
        id TEXT NOT NULL,
        properties TEXT NOT NULL DEFAULT '{}',
        first_seen TEXT NOT NULL,
        last_seen TEXT NOT NULL,
        PRIMARY KEY (label, natural_key)
    );

    CREATE UNIQUE INDEX IF NOT EXISTS idx_nodes_id ON nodes(id);

    CREATE TABLE IF NOT EXISTS edges (
        kind TEXT NOT NULL,
        source_label TEXT NOT NULL,
        source_key TEXT NOT NULL,
        target_label TEXT NOT NULL,
        target_key TEXT NOT NULL,
        properties TEXT NOT NULL DEFAULT '{}',
        first_seen TEXT NOT NULL,
        last_seen TEXT NOT NULL,
        PRIMARY KEY (kind, source_label, source_key, target_label, target_key)
    );

    CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source_label, source_key);
    CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target_label, target_key);
"#;

async fn meta_value(pool: &SqlitePool, key: &str) -> Result<Option<String>, GraphError> {
    let value: Option<(String,)> = sqlx::query_as("SELECT value FROM schema_meta WHERE key = ?1")
        .bind(key)
        .fetch_optional(pool)
        .await?;
    Ok(value.map(|(v,)| v))
}

async fn set_meta_value(pool: &SqlitePool, key: &str, value: &str) -> Result<(), GraphError> {
    sqlx::query(
        "INSERT INTO schema_meta (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}

fn parse_version(key: &str, raw: Option<String>) -> Result<i64, GraphError> {
    match raw {
        None => Ok(0),
        Some(v) => v
            .parse()
            .map_err(|_| GraphError::Connection(format!("corrupt {key} in schema_meta: {v}"))),
    }
}

/// Bring the layout up to [`LAYOUT_VERSION`].
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), GraphError> {
    sqlx::raw_sql(CREATE_META_TABLE).execute(pool).await?;

    let current = parse_version("layout_version", meta_value(pool, "layout_version").await?)?;
    tracing::debug!(current, target = LAYOUT_VERSION, "Checking store layout");

    if current < 1 {
        tracing::info!("Applying store layout v1");
        sqlx::raw_sql(LAYOUT_V1).execute(pool).await?;
        set_meta_value(pool, "layout_version", "1").await?;
    }
    Ok(())
}

/// Record the registry version, refusing to downgrade a store that was
/// written with a newer registry.
pub async fn check_schema_version(
    pool: &SqlitePool,
    registry_version: u32,
) -> Result<(), GraphError> {
    let stored = parse_version("schema_version", meta_value(pool, "schema_version").await?)?;
    let registry = i64::from(registry_version);

    if stored > registry {
        return Err(GraphError::SchemaVersion {
            stored: stored as u32,
            registry: registry_version,
        });
    }
    if stored < registry {
        tracing::info!(from = stored, to = registry, "Recording schema registry version");
        set_meta_value(pool, "schema_version", &registry.to_string()).await?;
    }
    Ok(())
}
