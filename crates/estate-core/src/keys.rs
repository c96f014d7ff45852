//! Natural keys: the single identity function per node kind.
//!
//! Every node is identified by `(label, natural key)`. The key is derived here
//! from source attributes and nowhere else, so two collectors that describe
//! the same entity converge on one node only when their keys match exactly.

use uuid::Uuid;

use crate::error::{EstateError, Result};
use crate::sensitivity::Category;
use crate::types::{
    Blob, Column, Container, Dataset, Group, LinkedService, NodeKey, NodeKind, Pipeline, Report,
    Resource, Subscription, Table, User, Workspace,
};

/// Namespace for deterministic node ids (UUID v5 over `label:key`).
const NODE_NAMESPACE: Uuid = Uuid::from_bytes([
    0x3e, 0x7a, 0x91, 0x0c, 0x54, 0x2b, 0x4f, 0x1d, 0x9a, 0x86, 0x21, 0xc7, 0x5e, 0x0f, 0xb3, 0x48,
]);

/// Stable id for a node, identical across stores and runs.
pub fn node_id(label: &str, key: &str) -> Uuid {
    Uuid::new_v5(&NODE_NAMESPACE, format!("{label}:{key}").as_bytes())
}

/// A record that names exactly one node of a fixed kind.
pub trait NaturalKey {
    const KIND: NodeKind;

    fn natural_key(&self) -> Result<String>;

    fn node_key(&self) -> Result<NodeKey> {
        Ok(NodeKey::new(Self::KIND, self.natural_key()?))
    }
}

fn require<'a>(kind: NodeKind, field: &str, value: &'a str) -> Result<&'a str> {
    if value.trim().is_empty() {
        return Err(EstateError::InvalidKey {
            kind: kind.label().to_string(),
            reason: format!("{field} is empty"),
        });
    }
    Ok(value)
}

/// `server/database/schema.name`
pub fn table_key(server: &str, database: &str, schema: &str, name: &str) -> Result<String> {
    let k = NodeKind::Table;
    Ok(format!(
        "{}/{}/{}.{}",
        require(k, "server", server)?,
        require(k, "database", database)?,
        require(k, "schema", schema)?,
        require(k, "name", name)?
    ))
}

/// `{table_key}/{column}`
pub fn column_key(table_key: &str, name: &str) -> Result<String> {
    let k = NodeKind::Column;
    Ok(format!(
        "{}/{}",
        require(k, "table_key", table_key)?,
        require(k, "name", name)?
    ))
}

/// `{account}/{container}`
pub fn container_key(account: &str, name: &str) -> Result<String> {
    let k = NodeKind::Container;
    Ok(format!(
        "{}/{}",
        require(k, "account", account)?,
        require(k, "name", name)?
    ))
}

/// `{container_key}/{path}` with any leading `/` of the path removed.
pub fn blob_key(container_key: &str, path: &str) -> Result<String> {
    let k = NodeKind::Blob;
    let path = path.trim_start_matches('/');
    Ok(format!(
        "{}/{}",
        require(k, "container_key", container_key)?,
        require(k, "path", path)?
    ))
}

/// `{asset label}:{asset key}#{category}`. One classification node per
/// asset and category.
pub fn classification_key(asset: &NodeKey, category: Category) -> Result<String> {
    let k = NodeKind::Classification;
    require(k, "asset label", &asset.label)?;
    require(k, "asset key", &asset.key)?;
    Ok(format!("{}#{}", asset, category.label()))
}

macro_rules! id_key {
    ($ty:ty, $kind:expr, $field:ident) => {
        impl NaturalKey for $ty {
            const KIND: NodeKind = $kind;

            fn natural_key(&self) -> Result<String> {
                require(Self::KIND, stringify!($field), &self.$field).map(str::to_string)
            }
        }
    };
}

id_key!(Subscription, NodeKind::Subscription, subscription_id);
id_key!(Resource, NodeKind::Resource, resource_id);
id_key!(Workspace, NodeKind::Workspace, workspace_id);
id_key!(Dataset, NodeKind::Dataset, dataset_id);
id_key!(Report, NodeKind::Report, report_id);
id_key!(Pipeline, NodeKind::Pipeline, pipeline_id);
id_key!(LinkedService, NodeKind::LinkedService, linked_service_id);
id_key!(User, NodeKind::User, user_id);
id_key!(Group, NodeKind::Group, group_id);

impl NaturalKey for Table {
    const KIND: NodeKind = NodeKind::Table;

    fn natural_key(&self) -> Result<String> {
        table_key(&self.server, &self.database, &self.schema, &self.name)
    }
}

impl NaturalKey for Column {
    const KIND: NodeKind = NodeKind::Column;

    fn natural_key(&self) -> Result<String> {
        column_key(&self.table_key, &self.name)
    }
}

impl NaturalKey for Container {
    const KIND: NodeKind = NodeKind::Container;

    fn natural_key(&self) -> Result<String> {
        container_key(&self.account, &self.name)
    }
}

impl NaturalKey for Blob {
    const KIND: NodeKind = NodeKind::Blob;

    fn natural_key(&self) -> Result<String> {
        blob_key(&self.container_key, &self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Table {
        Table {
            server: "sql01".to_string(),
            database: "sales".to_string(),
            schema: "dbo".to_string(),
            name: "customers".to_string(),
            object_id: None,
            row_count: None,
        }
    }

    #[test]
    fn test_table_and_column_keys() {
        let t = table();
        assert_eq!(t.natural_key().unwrap(), "sql01/sales/dbo.customers");

        let c = Column {
            table_key: t.natural_key().unwrap(),
            name: "email".to_string(),
            data_type: None,
            max_length: None,
            is_nullable: None,
            is_identity: None,
            ordinal: None,
            sample_values: vec![],
        };
        let key = c.node_key().unwrap();
        assert_eq!(key.label, "Column");
        assert_eq!(key.key, "sql01/sales/dbo.customers/email");
    }

    #[test]
    fn test_empty_component_rejected() {
        let mut t = table();
        t.schema = "  ".to_string();
        let err = t.natural_key().unwrap_err();
        assert!(matches!(err, EstateError::InvalidKey { ref kind, .. } if kind == "Table"));

        let sub = Subscription {
            subscription_id: String::new(),
            name: None,
            state: None,
            tenant_id: None,
        };
        assert!(sub.natural_key().is_err());
    }

    #[test]
    fn test_blob_key_strips_leading_slash() {
        let a = blob_key("acct/raw", "/2024/file.csv").unwrap();
        let b = blob_key("acct/raw", "2024/file.csv").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, "acct/raw/2024/file.csv");
        assert!(blob_key("acct/raw", "/").is_err());
    }

    #[test]
    fn test_classification_key() {
        let asset = NodeKey::new(NodeKind::Column, "sql01/sales/dbo.customers/cpf");
        let key = classification_key(&asset, Category::NationalId).unwrap();
        assert_eq!(key, "Column:sql01/sales/dbo.customers/cpf#NationalID");
    }

    #[test]
    fn test_node_id_is_deterministic() {
        let a = node_id("Resource", "/subscriptions/1/rg/vm");
        let b = node_id("Resource", "/subscriptions/1/rg/vm");
        let c = node_id("Resource", "/subscriptions/1/rg/VM");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.get_version_num(), 5);
    }
}
