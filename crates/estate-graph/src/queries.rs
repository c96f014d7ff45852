//! Read operations for the estate graph.
//!
//! Multi-row reads return lazy streams over the pool; rows are decoded as
//! they are pulled. Readers may observe a partially ingested batch.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use futures_util::stream::{BoxStream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use estate_core::{EdgeKind, NodeKey, NodeKind, Properties, Severity};

use crate::store::{GraphError, GraphStore};

/// A node as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: String,
    pub label: String,
    pub key: String,
    pub properties: Properties,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl NodeRecord {
    pub fn node_key(&self) -> NodeKey {
        NodeKey::custom(self.label.clone(), self.key.clone())
    }

    /// A string attribute, if present.
    pub fn attr_str(&self, name: &str) -> Option<&str> {
        self.properties.get(name).and_then(Value::as_str)
    }

    /// Best human-readable name: `name`, then `display_name`, then the key.
    pub fn display_name(&self) -> &str {
        self.attr_str("name")
            .or_else(|| self.attr_str("display_name"))
            .unwrap_or(&self.key)
    }
}

/// An edge as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub kind: EdgeKind,
    pub source: NodeKey,
    pub target: NodeKey,
    pub properties: Properties,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Node selection for [`GraphStore::query`]. All given conditions must hold.
#[derive(Debug, Clone, Default)]
pub struct NodePattern {
    pub label: Option<String>,
    pub key_prefix: Option<String>,
    pub attributes: Vec<(String, Value)>,
}

impl NodePattern {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn label(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Default::default()
        }
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }
}

/// Node and edge counts, per kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphStats {
    pub nodes: BTreeMap<String, u64>,
    pub edges: BTreeMap<String, u64>,
    pub total_nodes: u64,
    pub total_edges: u64,
}

fn node_from_row(row: &SqliteRow) -> Result<NodeRecord, GraphError> {
    let raw: String = row.try_get("properties")?;
    Ok(NodeRecord {
        id: row.try_get("id")?,
        label: row.try_get("label")?,
        key: row.try_get("natural_key")?,
        properties: serde_json::from_str(&raw)?,
        first_seen: row.try_get("first_seen")?,
        last_seen: row.try_get("last_seen")?,
    })
}

fn edge_from_row(row: &SqliteRow) -> Result<EdgeRecord, GraphError> {
    let kind: String = row.try_get("kind")?;
    let raw: String = row.try_get("properties")?;
    Ok(EdgeRecord {
        kind: EdgeKind::from_label(&kind)
            .ok_or_else(|| GraphError::Serialization(format!("unknown edge kind {kind}")))?,
        source: NodeKey::custom(
            row.try_get::<String, _>("source_label")?,
            row.try_get::<String, _>("source_key")?,
        ),
        target: NodeKey::custom(
            row.try_get::<String, _>("target_label")?,
            row.try_get::<String, _>("target_key")?,
        ),
        properties: serde_json::from_str(&raw)?,
        first_seen: row.try_get("first_seen")?,
        last_seen: row.try_get("last_seen")?,
    })
}

fn decode_nodes<'a>(
    rows: BoxStream<'a, Result<SqliteRow, sqlx::Error>>,
) -> BoxStream<'a, Result<NodeRecord, GraphError>> {
    rows.map(|row| row.map_err(GraphError::from).and_then(|r| node_from_row(&r)))
        .boxed()
}

fn decode_edges<'a>(
    rows: BoxStream<'a, Result<SqliteRow, sqlx::Error>>,
) -> BoxStream<'a, Result<EdgeRecord, GraphError>> {
    rows.map(|row| row.map_err(GraphError::from).and_then(|r| edge_from_row(&r)))
        .boxed()
}

impl GraphStore {
    // ── Pattern Queries ──────────────────────────────────────────

    /// Stream nodes matching `pattern`, ordered by (label, key).
    pub fn query(&self, pattern: NodePattern) -> BoxStream<'_, Result<NodeRecord, GraphError>> {
        let NodePattern {
            label,
            key_prefix,
            attributes,
        } = pattern;

        let rows = sqlx::query(
            "SELECT id, label, natural_key, properties, first_seen, last_seen FROM nodes
             WHERE (?1 IS NULL OR label = ?1)
               AND (?2 IS NULL OR substr(natural_key, 1, length(?2)) = ?2)
             ORDER BY label, natural_key",
        )
        .bind(label)
        .bind(key_prefix)
        .fetch(self.pool());

        decode_nodes(rows)
            .try_filter(move |node| {
                let keep = attributes
                    .iter()
                    .all(|(name, value)| node.properties.get(name) == Some(value));
                futures_util::future::ready(keep)
            })
            .boxed()
    }

    /// Stream every node whose label is in `labels`.
    pub fn nodes_of_labels(
        &self,
        labels: &[&str],
    ) -> BoxStream<'_, Result<NodeRecord, GraphError>> {
        let labels = Value::from(labels.to_vec()).to_string();
        let rows = sqlx::query(
            "SELECT id, label, natural_key, properties, first_seen, last_seen FROM nodes
             WHERE label IN (SELECT value FROM json_each(?1))
             ORDER BY label, natural_key",
        )
        .bind(labels)
        .fetch(self.pool());
        decode_nodes(rows)
    }

    /// Stream every edge whose kind is in `kinds`.
    pub fn edges_of_kinds(
        &self,
        kinds: &[EdgeKind],
    ) -> BoxStream<'_, Result<EdgeRecord, GraphError>> {
        let kinds = Value::from(kinds.iter().map(EdgeKind::label).collect::<Vec<_>>()).to_string();
        let rows = sqlx::query(
            "SELECT kind, source_label, source_key, target_label, target_key,
                    properties, first_seen, last_seen
             FROM edges
             WHERE kind IN (SELECT value FROM json_each(?1))
             ORDER BY kind, source_label, source_key, target_label, target_key",
        )
        .bind(kinds)
        .fetch(self.pool());
        decode_edges(rows)
    }

    // ── Dashboard Queries ────────────────────────────────────────

    /// Resources contained in the given subscription.
    pub fn resources_under_subscription(
        &self,
        subscription_id: &str,
    ) -> BoxStream<'_, Result<NodeRecord, GraphError>> {
        let rows = sqlx::query(
            "SELECT n.id, n.label, n.natural_key, n.properties, n.first_seen, n.last_seen
             FROM edges e
             JOIN nodes n ON n.label = e.target_label AND n.natural_key = e.target_key
             WHERE e.kind = 'CONTAINS'
               AND e.source_label = 'Subscription' AND e.source_key = ?1
               AND e.target_label = 'Resource'
             ORDER BY n.natural_key",
        )
        .bind(subscription_id.to_string())
        .fetch(self.pool());
        decode_nodes(rows)
    }

    /// Classification nodes with severity at or above `min`, most severe first.
    pub fn classifications_at_least(
        &self,
        min: Severity,
    ) -> BoxStream<'_, Result<NodeRecord, GraphError>> {
        let rows = sqlx::query(
            "SELECT id, label, natural_key, properties, first_seen, last_seen FROM nodes
             WHERE label = 'Classification'
               AND json_extract(properties, '$.severity_rank') >= ?1
             ORDER BY json_extract(properties, '$.severity_rank') DESC, natural_key",
        )
        .bind(min.rank())
        .fetch(self.pool());
        decode_nodes(rows)
    }

    /// Case-insensitive substring search over `name` / `display_name`.
    pub async fn search(
        &self,
        label: Option<&str>,
        term: &str,
        limit: u32,
    ) -> Result<Vec<NodeRecord>, GraphError> {
        let rows = sqlx::query(
            "SELECT id, label, natural_key, properties, first_seen, last_seen FROM nodes
             WHERE (?1 IS NULL OR label = ?1)
               AND instr(lower(coalesce(json_extract(properties, '$.name'),
                                        json_extract(properties, '$.display_name'), '')),
                         lower(?2)) > 0
             ORDER BY label, natural_key
             LIMIT ?3",
        )
        .bind(label)
        .bind(term)
        .bind(i64::from(limit))
        .fetch_all(self.pool())
        .await?;

        rows.iter().map(node_from_row).collect()
    }

    // ── Single Node Lookups ──────────────────────────────────────

    pub async fn get_node(&self, label: &str, key: &str) -> Result<Option<NodeRecord>, GraphError> {
        let row = sqlx::query(
            "SELECT id, label, natural_key, properties, first_seen, last_seen FROM nodes
             WHERE label = ?1 AND natural_key = ?2",
        )
        .bind(label)
        .bind(key)
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(node_from_row).transpose()
    }

    /// Like [`GraphStore::get_node`] but a missing node is an error.
    pub async fn require_node(&self, node: &NodeKey) -> Result<NodeRecord, GraphError> {
        self.get_node(&node.label, &node.key)
            .await?
            .ok_or_else(|| GraphError::NotFound {
                label: node.label.clone(),
                key: node.key.clone(),
            })
    }

    /// Edges leaving `node`.
    pub async fn edges_from(&self, node: &NodeKey) -> Result<Vec<EdgeRecord>, GraphError> {
        let rows = sqlx::query(
            "SELECT kind, source_label, source_key, target_label, target_key,
                    properties, first_seen, last_seen
             FROM edges WHERE source_label = ?1 AND source_key = ?2
             ORDER BY kind, target_label, target_key",
        )
        .bind(&node.label)
        .bind(&node.key)
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(edge_from_row).collect()
    }

    // ── Aggregates ───────────────────────────────────────────────

    pub async fn count_nodes(&self, label: &str) -> Result<u64, GraphError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM nodes WHERE label = ?1")
            .bind(label)
            .fetch_one(self.pool())
            .await?;
        Ok(count as u64)
    }

    pub async fn count_edges(&self, kind: EdgeKind) -> Result<u64, GraphError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM edges WHERE kind = ?1")
            .bind(kind.label())
            .fetch_one(self.pool())
            .await?;
        Ok(count as u64)
    }

    /// Per-kind node and edge counts. Every built-in kind is listed, even at zero.
    pub async fn stats(&self) -> Result<GraphStats, GraphError> {
        let mut stats = GraphStats::default();
        for kind in NodeKind::ALL {
            stats.nodes.insert(kind.label().to_string(), 0);
        }
        for kind in EdgeKind::ALL {
            stats.edges.insert(kind.label().to_string(), 0);
        }

        let node_counts: Vec<(String, i64)> =
            sqlx::query_as("SELECT label, COUNT(*) FROM nodes GROUP BY label")
                .fetch_all(self.pool())
                .await?;
        for (label, count) in node_counts {
            stats.total_nodes += count as u64;
            stats.nodes.insert(label, count as u64);
        }

        let edge_counts: Vec<(String, i64)> =
            sqlx::query_as("SELECT kind, COUNT(*) FROM edges GROUP BY kind")
                .fetch_all(self.pool())
                .await?;
        for (kind, count) in edge_counts {
            stats.total_edges += count as u64;
            stats.edges.insert(kind, count as u64);
        }

        Ok(stats)
    }

    /// BLAKE3 digest of the graph's content: every node's label, key and
    /// attributes and every edge's kind, endpoints and attributes, in key
    /// order. `first_seen` / `last_seen` are not part of the content.
    pub async fn fingerprint(&self) -> Result<String, GraphError> {
        let mut hasher = blake3::Hasher::new();

        let mut nodes = sqlx::query(
            "SELECT label, natural_key, properties FROM nodes ORDER BY label, natural_key",
        )
        .fetch(self.pool());
        while let Some(row) = nodes.try_next().await? {
            for col in ["label", "natural_key", "properties"] {
                let value: String = row.try_get(col)?;
                hasher.update(value.as_bytes());
                hasher.update(&[0]);
            }
            hasher.update(b"\n");
        }
        drop(nodes);

        let mut edges = sqlx::query(
            "SELECT kind, source_label, source_key, target_label, target_key, properties
             FROM edges
             ORDER BY kind, source_label, source_key, target_label, target_key",
        )
        .fetch(self.pool());
        while let Some(row) = edges.try_next().await? {
            for col in [
                "kind",
                "source_label",
                "source_key",
                "target_label",
                "target_key",
                "properties",
            ] {
                let value: String = row.try_get(col)?;
                hasher.update(value.as_bytes());
                hasher.update(&[0]);
            }
            hasher.update(b"\n");
        }

        Ok(hasher.finalize().to_hex().to_string())
    }
}
