//! Write operations for the estate graph.
//!
//! All mutations are upserts keyed by natural identity, so re-ingesting a
//! scan converges instead of duplicating. Nodes are identified by
//! (label, natural_key); edges by (kind, source, target).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use estate_core::{node_id, EdgeKind, NodeKey, Properties};

use crate::store::{GraphError, GraphStore, WriteTxn};

/// Identity of an upserted node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRef {
    pub label: String,
    pub key: String,
    pub id: Uuid,
}

impl NodeRef {
    pub fn node_key(&self) -> NodeKey {
        NodeKey::custom(self.label.clone(), self.key.clone())
    }
}

/// Merge `incoming` over `stored`. Later values win; `null` means "not
/// provided" and leaves the stored value alone.
pub fn merge_properties(stored: &mut Properties, incoming: &Properties) {
    for (name, value) in incoming {
        if value.is_null() {
            continue;
        }
        stored.insert(name.clone(), value.clone());
    }
}

impl WriteTxn {
    // ── Node Upserts ─────────────────────────────────────────────

    /// Create the node, or merge `attributes` into the existing one.
    ///
    /// `first_seen` is kept from creation; `last_seen` becomes `seen_at`.
    /// Changing a stored identity attribute is a `SchemaViolation`.
    pub async fn upsert_node(
        &mut self,
        label: &str,
        key: &str,
        attributes: &Properties,
        seen_at: DateTime<Utc>,
    ) -> Result<NodeRef, GraphError> {
        if key.is_empty() {
            return Err(GraphError::SchemaViolation {
                label: label.to_string(),
                reason: "empty natural key".to_string(),
            });
        }
        self.registry().validate_node(label, attributes)?;

        let stored: Option<(String,)> =
            sqlx::query_as("SELECT properties FROM nodes WHERE label = ?1 AND natural_key = ?2")
                .bind(label)
                .bind(key)
                .fetch_optional(&mut *self.conn())
                .await?;

        let mut merged = match stored {
            Some((raw,)) => serde_json::from_str::<Properties>(&raw)?,
            None => Properties::new(),
        };
        self.registry().check_identity(label, &merged, attributes)?;
        merge_properties(&mut merged, attributes);

        let id = node_id(label, key);
        sqlx::query(
            "INSERT INTO nodes (label, natural_key, id, properties, first_seen, last_seen)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(label, natural_key) DO UPDATE SET
               properties = excluded.properties,
               last_seen = excluded.last_seen",
        )
        .bind(label)
        .bind(key)
        .bind(id.to_string())
        .bind(serde_json::to_string(&merged)?)
        .bind(seen_at)
        .execute(&mut *self.conn())
        .await?;

        Ok(NodeRef {
            label: label.to_string(),
            key: key.to_string(),
            id,
        })
    }

    /// Whether the node exists in this transaction's view.
    pub async fn node_exists(&mut self, node: &NodeKey) -> Result<bool, GraphError> {
        let found: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM nodes WHERE label = ?1 AND natural_key = ?2")
                .bind(&node.label)
                .bind(&node.key)
                .fetch_optional(&mut *self.conn())
                .await?;
        Ok(found.is_some())
    }

    // ── Edge Upserts ─────────────────────────────────────────────

    /// Create the edge, or refresh `last_seen` (and any given attributes) on
    /// the existing one. Both endpoints must already exist.
    pub async fn upsert_edge(
        &mut self,
        kind: EdgeKind,
        source: &NodeKey,
        target: &NodeKey,
        attributes: &Properties,
        seen_at: DateTime<Utc>,
    ) -> Result<(), GraphError> {
        self.registry()
            .validate_edge(kind, &source.label, &target.label)?;

        for endpoint in [source, target] {
            if !self.node_exists(endpoint).await? {
                return Err(GraphError::UnknownEndpoint {
                    kind: kind.label().to_string(),
                    endpoint: endpoint.to_string(),
                });
            }
        }

        let stored: Option<(String,)> = sqlx::query_as(
            "SELECT properties FROM edges
             WHERE kind = ?1 AND source_label = ?2 AND source_key = ?3
               AND target_label = ?4 AND target_key = ?5",
        )
        .bind(kind.label())
        .bind(&source.label)
        .bind(&source.key)
        .bind(&target.label)
        .bind(&target.key)
        .fetch_optional(&mut *self.conn())
        .await?;

        let mut merged = match stored {
            Some((raw,)) => serde_json::from_str::<Properties>(&raw)?,
            None => Properties::new(),
        };
        merge_properties(&mut merged, attributes);

        sqlx::query(
            "INSERT INTO edges
               (kind, source_label, source_key, target_label, target_key,
                properties, first_seen, last_seen)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
             ON CONFLICT(kind, source_label, source_key, target_label, target_key)
             DO UPDATE SET
               properties = excluded.properties,
               last_seen = excluded.last_seen",
        )
        .bind(kind.label())
        .bind(&source.label)
        .bind(&source.key)
        .bind(&target.label)
        .bind(&target.key)
        .bind(serde_json::to_string(&merged)?)
        .bind(seen_at)
        .execute(&mut *self.conn())
        .await?;

        Ok(())
    }
}

impl GraphStore {
    // ── Single-shot Writes ───────────────────────────────────────

    /// Upsert one node in its own write transaction.
    pub async fn upsert_node(
        &self,
        label: &str,
        key: &str,
        attributes: &Properties,
        seen_at: DateTime<Utc>,
    ) -> Result<NodeRef, GraphError> {
        let mut txn = self.begin_write().await?;
        let node = txn.upsert_node(label, key, attributes, seen_at).await?;
        txn.commit().await?;
        Ok(node)
    }

    /// Upsert one edge in its own write transaction.
    pub async fn upsert_edge(
        &self,
        kind: EdgeKind,
        source: &NodeKey,
        target: &NodeKey,
        attributes: &Properties,
        seen_at: DateTime<Utc>,
    ) -> Result<(), GraphError> {
        let mut txn = self.begin_write().await?;
        txn.upsert_edge(kind, source, target, attributes, seen_at)
            .await?;
        txn.commit().await
    }

    /// Check a node against the registry without touching the store.
    pub fn validate_node(&self, label: &str, attributes: &Properties) -> Result<(), GraphError> {
        self.registry().validate_node(label, attributes)
    }

    /// Check an edge's endpoint labels against the registry.
    pub fn validate_edge(
        &self,
        kind: EdgeKind,
        source: &NodeKey,
        target: &NodeKey,
    ) -> Result<(), GraphError> {
        self.registry()
            .validate_edge(kind, &source.label, &target.label)
    }
}
