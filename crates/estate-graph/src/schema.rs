//! Versioned schema registry.
//!
//! The registry declares which node labels exist, which attributes each may
//! carry, and which (source, target) label pairs each edge kind may connect.
//! It is built once and handed to [`crate::GraphStore`] at construction; new
//! asset kinds are added with [`SchemaBuilder`] instead of editing the
//! standard definition.

use std::collections::{BTreeMap, BTreeSet};

use chrono::DateTime;
use serde_json::Value;

use estate_core::{EdgeKind, NodeKind, Properties};

use crate::store::GraphError;

/// Declared type of a node attribute. `null` is accepted for every type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrType {
    String,
    Integer,
    Float,
    Bool,
    /// RFC 3339 string.
    Timestamp,
    List,
    Map,
    Any,
}

impl AttrType {
    pub fn accepts(&self, value: &Value) -> bool {
        if value.is_null() {
            return true;
        }
        match self {
            AttrType::String => value.is_string(),
            AttrType::Integer => value.is_i64() || value.is_u64(),
            AttrType::Float => value.is_number(),
            AttrType::Bool => value.is_boolean(),
            AttrType::Timestamp => value
                .as_str()
                .is_some_and(|s| DateTime::parse_from_rfc3339(s).is_ok()),
            AttrType::List => value.is_array(),
            AttrType::Map => value.is_object(),
            AttrType::Any => true,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            AttrType::String => "string",
            AttrType::Integer => "integer",
            AttrType::Float => "float",
            AttrType::Bool => "bool",
            AttrType::Timestamp => "timestamp",
            AttrType::List => "list",
            AttrType::Map => "map",
            AttrType::Any => "any",
        }
    }
}

/// Attribute set of one node kind.
///
/// `identity` names the attributes the natural key is built from. Once
/// stored they never change.
#[derive(Debug, Clone, Default)]
pub struct NodeSchema {
    pub attributes: BTreeMap<String, AttrType>,
    pub identity: BTreeSet<String>,
}

/// An immutable, versioned description of the graph.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    version: u32,
    nodes: BTreeMap<String, NodeSchema>,
    edges: BTreeMap<EdgeKind, BTreeSet<(String, String)>>,
}

impl SchemaRegistry {
    /// Version 1 of the estate schema.
    pub fn standard() -> Self {
        use AttrType::*;
        use NodeKind as K;

        let mut b = SchemaBuilder::empty(1);

        b = b
            .node(
                K::Subscription.label(),
                &[
                    ("subscription_id", String),
                    ("name", String),
                    ("state", String),
                    ("tenant_id", String),
                ],
            )
            .node(
                K::Resource.label(),
                &[
                    ("resource_id", String),
                    ("name", String),
                    ("resource_type", String),
                    ("location", String),
                    ("resource_group", String),
                    ("subscription_id", String),
                    ("tags", Map),
                ],
            )
            .node(
                K::Workspace.label(),
                &[
                    ("workspace_id", String),
                    ("name", String),
                    ("platform", String),
                    ("state", String),
                ],
            )
            .node(
                K::Dataset.label(),
                &[
                    ("dataset_id", String),
                    ("name", String),
                    ("dataset_type", String),
                    ("workspace_id", String),
                    ("factory_name", String),
                    ("configured_by", String),
                ],
            )
            .node(
                K::Report.label(),
                &[
                    ("report_id", String),
                    ("name", String),
                    ("workspace_id", String),
                    ("dataset_id", String),
                    ("web_url", String),
                ],
            )
            .node(
                K::Pipeline.label(),
                &[
                    ("pipeline_id", String),
                    ("name", String),
                    ("factory_name", String),
                    ("workspace", String),
                ],
            )
            .node(
                K::LinkedService.label(),
                &[
                    ("linked_service_id", String),
                    ("name", String),
                    ("service_type", String),
                    ("factory_name", String),
                ],
            )
            .node(
                K::Table.label(),
                &[
                    ("server", String),
                    ("database", String),
                    ("schema", String),
                    ("name", String),
                    ("object_id", Integer),
                    ("row_count", Integer),
                ],
            )
            .node(
                K::Column.label(),
                &[
                    ("table_key", String),
                    ("name", String),
                    ("data_type", String),
                    ("max_length", Integer),
                    ("is_nullable", Bool),
                    ("is_identity", Bool),
                    ("ordinal", Integer),
                    ("sample_values", List),
                ],
            )
            .node(
                K::Container.label(),
                &[
                    ("account", String),
                    ("name", String),
                    ("public_access", String),
                    ("last_modified", Timestamp),
                ],
            )
            .node(
                K::Blob.label(),
                &[
                    ("container_key", String),
                    ("path", String),
                    ("size", Integer),
                    ("content_type", String),
                    ("last_modified", Timestamp),
                    ("tier", String),
                    ("etag", String),
                    ("file_type", String),
                    ("format_category", String),
                ],
            )
            .node(
                K::Classification.label(),
                &[
                    ("category", String),
                    ("confidence", Float),
                    ("severity", String),
                    ("severity_rank", Integer),
                    ("detector", String),
                    ("target_label", String),
                    ("target_key", String),
                    ("scanned_at", Timestamp),
                ],
            )
            .node(
                K::User.label(),
                &[
                    ("user_id", String),
                    ("display_name", String),
                    ("mail", String),
                    ("upn", String),
                ],
            )
            .node(
                K::Group.label(),
                &[
                    ("group_id", String),
                    ("display_name", String),
                    ("mail", String),
                    ("group_types", List),
                ],
            );

        b = b
            .identity(K::Column.label(), &["table_key", "name"])
            .identity(K::Blob.label(), &["container_key", "path"])
            .identity(
                K::Classification.label(),
                &["target_label", "target_key", "category"],
            );

        b.edge(EdgeKind::Contains, K::Subscription.label(), K::Resource.label())
            .edge(EdgeKind::Contains, K::Container.label(), K::Blob.label())
            .edge(EdgeKind::Contains, K::Workspace.label(), K::Dataset.label())
            .edge(EdgeKind::Contains, K::Workspace.label(), K::Report.label())
            .edge(EdgeKind::HasColumn, K::Table.label(), K::Column.label())
            .edge(EdgeKind::Feeds, K::Dataset.label(), K::Report.label())
            .edge(EdgeKind::Feeds, K::Pipeline.label(), K::Dataset.label())
            .edge(EdgeKind::Feeds, K::Table.label(), K::Pipeline.label())
            .edge(EdgeKind::References, K::Column.label(), K::Column.label())
            .edge(EdgeKind::ClassifiedAs, K::Column.label(), K::Classification.label())
            .edge(EdgeKind::ClassifiedAs, K::Blob.label(), K::Classification.label())
            .edge(EdgeKind::MemberOf, K::User.label(), K::Group.label())
            .edge(EdgeKind::Uses, K::Pipeline.label(), K::LinkedService.label())
            .build()
    }

    /// Start a new version derived from this one.
    pub fn extend(&self) -> SchemaBuilder {
        SchemaBuilder {
            registry: SchemaRegistry {
                version: self.version + 1,
                nodes: self.nodes.clone(),
                edges: self.edges.clone(),
            },
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.nodes.contains_key(label)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn node_schema(&self, label: &str) -> Option<&NodeSchema> {
        self.nodes.get(label)
    }

    /// Check that `label` is registered and every attribute is declared with
    /// a compatible type.
    pub fn validate_node(&self, label: &str, attributes: &Properties) -> Result<(), GraphError> {
        let schema = self
            .nodes
            .get(label)
            .ok_or_else(|| GraphError::SchemaViolation {
                label: label.to_string(),
                reason: "unregistered node kind".to_string(),
            })?;

        for (name, value) in attributes {
            let Some(ty) = schema.attributes.get(name) else {
                return Err(GraphError::SchemaViolation {
                    label: label.to_string(),
                    reason: format!("undeclared attribute '{name}'"),
                });
            };
            if !ty.accepts(value) {
                return Err(GraphError::SchemaViolation {
                    label: label.to_string(),
                    reason: format!("attribute '{name}' is not a {}", ty.name()),
                });
            }
        }
        Ok(())
    }

    /// Check that `incoming` does not change an identity attribute already
    /// present in `stored`.
    pub fn check_identity(
        &self,
        label: &str,
        stored: &Properties,
        incoming: &Properties,
    ) -> Result<(), GraphError> {
        let Some(schema) = self.nodes.get(label) else {
            return Ok(());
        };
        for name in &schema.identity {
            let (Some(old), Some(new)) = (stored.get(name), incoming.get(name)) else {
                continue;
            };
            if !old.is_null() && !new.is_null() && old != new {
                return Err(GraphError::SchemaViolation {
                    label: label.to_string(),
                    reason: format!(
                        "identity attribute '{name}' cannot change from {old} to {new}"
                    ),
                });
            }
        }
        Ok(())
    }

    /// Check that `kind` may connect `source_label` to `target_label`.
    pub fn validate_edge(
        &self,
        kind: EdgeKind,
        source_label: &str,
        target_label: &str,
    ) -> Result<(), GraphError> {
        let allowed = self.edges.get(&kind).is_some_and(|pairs| {
            pairs.contains(&(source_label.to_string(), target_label.to_string()))
        });
        if allowed {
            Ok(())
        } else {
            Err(GraphError::SchemaViolation {
                label: kind.label().to_string(),
                reason: format!("{source_label} -> {target_label} is not an allowed endpoint pair"),
            })
        }
    }
}

/// Builds a [`SchemaRegistry`]. Only adds; nothing already declared can be
/// removed or retyped.
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    registry: SchemaRegistry,
}

impl SchemaBuilder {
    fn empty(version: u32) -> Self {
        Self {
            registry: SchemaRegistry {
                version,
                nodes: BTreeMap::new(),
                edges: BTreeMap::new(),
            },
        }
    }

    /// Declare a node kind, or add attributes to an existing one. Attributes
    /// already declared keep their original type.
    pub fn node(mut self, label: &str, attributes: &[(&str, AttrType)]) -> Self {
        let schema = self.registry.nodes.entry(label.to_string()).or_default();
        for (name, ty) in attributes {
            schema.attributes.entry(name.to_string()).or_insert(*ty);
        }
        self
    }

    /// Mark declared attributes of `label` as identity attributes.
    pub fn identity(mut self, label: &str, names: &[&str]) -> Self {
        let schema = self.registry.nodes.entry(label.to_string()).or_default();
        for name in names {
            schema.identity.insert(name.to_string());
        }
        self
    }

    pub fn edge(mut self, kind: EdgeKind, source_label: &str, target_label: &str) -> Self {
        self.registry
            .edges
            .entry(kind)
            .or_default()
            .insert((source_label.to_string(), target_label.to_string()));
        self
    }

    pub fn build(self) -> SchemaRegistry {
        self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(v: Value) -> Properties {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_standard_schema_covers_all_kinds() {
        let schema = SchemaRegistry::standard();
        assert_eq!(schema.version(), 1);
        for kind in NodeKind::ALL {
            assert!(schema.has_label(kind.label()), "missing {kind}");
        }
    }

    #[test]
    fn test_validate_node_types() {
        let schema = SchemaRegistry::standard();
        let ok = props(json!({"server": "s", "row_count": 10, "object_id": null}));
        assert!(schema.validate_node("Table", &ok).is_ok());

        let wrong_type = props(json!({"row_count": "ten"}));
        assert!(matches!(
            schema.validate_node("Table", &wrong_type),
            Err(GraphError::SchemaViolation { .. })
        ));

        let undeclared = props(json!({"colour": "blue"}));
        assert!(schema.validate_node("Table", &undeclared).is_err());

        assert!(schema.validate_node("Host", &Properties::new()).is_err());
    }

    #[test]
    fn test_timestamp_attribute() {
        let schema = SchemaRegistry::standard();
        let good = props(json!({"last_modified": "2024-03-01T10:00:00Z"}));
        let bad = props(json!({"last_modified": "yesterday"}));
        assert!(schema.validate_node("Container", &good).is_ok());
        assert!(schema.validate_node("Container", &bad).is_err());
    }

    #[test]
    fn test_validate_edge_pairs() {
        let schema = SchemaRegistry::standard();
        assert!(schema.validate_edge(EdgeKind::Feeds, "Table", "Pipeline").is_ok());
        assert!(schema.validate_edge(EdgeKind::Feeds, "Report", "Table").is_err());
        assert!(schema
            .validate_edge(EdgeKind::ClassifiedAs, "Blob", "Classification")
            .is_ok());
    }

    #[test]
    fn test_identity_attributes_are_fixed() {
        let schema = SchemaRegistry::standard();
        let stored = props(json!({"table_key": "s/d/dbo.t1", "name": "cpf", "data_type": "char"}));

        let moved = props(json!({"table_key": "s/d/dbo.t2"}));
        assert!(matches!(
            schema.check_identity("Column", &stored, &moved),
            Err(GraphError::SchemaViolation { .. })
        ));

        let same = props(json!({"table_key": "s/d/dbo.t1", "data_type": "varchar"}));
        assert!(schema.check_identity("Column", &stored, &same).is_ok());
        let omitted = props(json!({"table_key": null, "data_type": "varchar"}));
        assert!(schema.check_identity("Column", &stored, &omitted).is_ok());
        assert!(schema.check_identity("Column", &Properties::new(), &moved).is_ok());
    }

    #[test]
    fn test_extend_is_additive() {
        let base = SchemaRegistry::standard();
        let extended = base
            .extend()
            .node(
                "DataLakeFilesystem",
                &[("account", AttrType::String), ("name", AttrType::String)],
            )
            .node("Table", &[("row_count", AttrType::String), ("owner", AttrType::String)])
            .edge(EdgeKind::Contains, "DataLakeFilesystem", "Blob")
            .build();

        assert_eq!(extended.version(), 2);
        assert!(extended.has_label("DataLakeFilesystem"));
        assert!(extended.validate_edge(EdgeKind::Contains, "DataLakeFilesystem", "Blob").is_ok());
        assert!(extended.validate_edge(EdgeKind::Feeds, "Table", "Pipeline").is_ok());
        // existing attribute keeps its type, new one is added
        let attrs = props(json!({"row_count": 5, "owner": "dba"}));
        assert!(extended.validate_node("Table", &attrs).is_ok());
        assert!(!base.has_label("DataLakeFilesystem"));
    }
}
