//! Identity resolution: one natural-key function per node kind, applied the
//! same way to every collector's records.
//!
//! Two records are the same node exactly when their (label, key) match.
//! There is no fuzzy matching and no case folding. Built-in kinds are keyed
//! only through their typed records; generic records are for kinds added to
//! the schema registry.

use estate_core::{EdgeKind, EstateError, NaturalKey, NodeKey, NodeKind, Properties, Record, Result};

/// The node a record describes, or `None` for relationships.
pub fn node_key(record: &Record) -> Result<Option<NodeKey>> {
    let key = match record {
        Record::Subscription(r) => r.node_key()?,
        Record::Resource(r) => r.node_key()?,
        Record::Workspace(r) => r.node_key()?,
        Record::Dataset(r) => r.node_key()?,
        Record::Report(r) => r.node_key()?,
        Record::Pipeline(r) => r.node_key()?,
        Record::LinkedService(r) => r.node_key()?,
        Record::Table(r) => r.node_key()?,
        Record::Column(r) => r.node_key()?,
        Record::Container(r) => r.node_key()?,
        Record::Blob(r) => r.node_key()?,
        Record::User(r) => r.node_key()?,
        Record::Group(r) => r.node_key()?,
        Record::Generic(g) => {
            checked_key(&g.label, &g.key)?;
            if NodeKind::from_label(&g.label).is_some() {
                return Err(EstateError::InvalidKey {
                    kind: g.label.clone(),
                    reason: "built-in kinds must use their typed record".to_string(),
                });
            }
            NodeKey::custom(g.label.clone(), g.key.clone())
        }
        Record::Relationship(_) => return Ok(None),
    };
    Ok(Some(key))
}

/// Reject a hand-built node key with an empty label or key.
pub fn checked_key(label: &str, key: &str) -> Result<()> {
    if label.trim().is_empty() || key.trim().is_empty() {
        return Err(EstateError::InvalidKey {
            kind: if label.is_empty() { "<unlabelled>".to_string() } else { label.to_string() },
            reason: "label and key must be non-empty".to_string(),
        });
    }
    Ok(())
}

/// Edge kinds a collector may assert explicitly. `CLASSIFIED_AS` belongs to
/// the classification writer.
pub fn check_relationship_kind(kind: EdgeKind) -> Result<()> {
    match kind {
        EdgeKind::ClassifiedAs => Err(EstateError::CollectorForbidden(kind.label().to_string())),
        _ => Ok(()),
    }
}

/// The attributes a record contributes to its node.
///
/// Typed records contribute their serialized fields; blobs also get
/// `file_type` and `format_category` derived from the path, and their path
/// in key form.
pub fn node_attributes(record: &Record) -> Result<Properties> {
    let value = match record {
        Record::Subscription(r) => serde_json::to_value(r)?,
        Record::Resource(r) => serde_json::to_value(r)?,
        Record::Workspace(r) => serde_json::to_value(r)?,
        Record::Dataset(r) => serde_json::to_value(r)?,
        Record::Report(r) => serde_json::to_value(r)?,
        Record::Pipeline(r) => serde_json::to_value(r)?,
        Record::LinkedService(r) => serde_json::to_value(r)?,
        Record::Table(r) => serde_json::to_value(r)?,
        Record::Column(r) => serde_json::to_value(r)?,
        Record::Container(r) => serde_json::to_value(r)?,
        Record::User(r) => serde_json::to_value(r)?,
        Record::Group(r) => serde_json::to_value(r)?,
        Record::Blob(r) => {
            let mut value = serde_json::to_value(r)?;
            if let Some(map) = value.as_object_mut() {
                // stored as it appears in the key
                map.insert(
                    "path".to_string(),
                    r.path.trim_start_matches('/').into(),
                );
                if let Some(ext) = r.file_type() {
                    map.insert("file_type".to_string(), ext.into());
                }
                map.insert(
                    "format_category".to_string(),
                    r.format_category().as_str().into(),
                );
            }
            value
        }
        Record::Generic(g) => return Ok(g.properties.clone()),
        Record::Relationship(_) => return Ok(Properties::new()),
    };

    match value {
        serde_json::Value::Object(map) => Ok(map),
        _ => Ok(Properties::new()),
    }
}
