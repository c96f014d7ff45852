//! Core record model for the estate metadata graph.
//!
//! Collectors (Resource Graph, M365, Power BI, Synapse, Data Factory, SQL
//! schema, Blob Storage) each emit a plain ordered list of these records.
//! Records carry source attributes only; identity is derived from them by
//! [`crate::keys::NaturalKey`], never chosen by a collector.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EstateError;

/// Attribute map attached to nodes and edges. Keys are kept sorted.
pub type Properties = serde_json::Map<String, serde_json::Value>;

// ── Node & Edge Kinds ─────────────────────────────────────────────

/// The built-in node kinds of the estate graph.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeKind {
    Subscription,
    Resource,
    Workspace,
    Dataset,
    Report,
    Pipeline,
    Table,
    Column,
    Container,
    Blob,
    Classification,
    User,
    Group,
    LinkedService,
}

impl NodeKind {
    pub const ALL: [NodeKind; 14] = [
        NodeKind::Subscription,
        NodeKind::Resource,
        NodeKind::Workspace,
        NodeKind::Dataset,
        NodeKind::Report,
        NodeKind::Pipeline,
        NodeKind::Table,
        NodeKind::Column,
        NodeKind::Container,
        NodeKind::Blob,
        NodeKind::Classification,
        NodeKind::User,
        NodeKind::Group,
        NodeKind::LinkedService,
    ];

    /// The label this kind is stored under.
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Subscription => "Subscription",
            NodeKind::Resource => "Resource",
            NodeKind::Workspace => "Workspace",
            NodeKind::Dataset => "Dataset",
            NodeKind::Report => "Report",
            NodeKind::Pipeline => "Pipeline",
            NodeKind::Table => "Table",
            NodeKind::Column => "Column",
            NodeKind::Container => "Container",
            NodeKind::Blob => "Blob",
            NodeKind::Classification => "Classification",
            NodeKind::User => "User",
            NodeKind::Group => "Group",
            NodeKind::LinkedService => "LinkedService",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.label() == label)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The type of a directed relationship between two nodes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeKind {
    Contains,
    HasColumn,
    Feeds,
    References,
    ClassifiedAs,
    MemberOf,
    Uses,
}

impl EdgeKind {
    pub const ALL: [EdgeKind; 7] = [
        EdgeKind::Contains,
        EdgeKind::HasColumn,
        EdgeKind::Feeds,
        EdgeKind::References,
        EdgeKind::ClassifiedAs,
        EdgeKind::MemberOf,
        EdgeKind::Uses,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            EdgeKind::Contains => "CONTAINS",
            EdgeKind::HasColumn => "HAS_COLUMN",
            EdgeKind::Feeds => "FEEDS",
            EdgeKind::References => "REFERENCES",
            EdgeKind::ClassifiedAs => "CLASSIFIED_AS",
            EdgeKind::MemberOf => "MEMBER_OF",
            EdgeKind::Uses => "USES",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.label() == label)
    }

    /// Whether this edge kind forms part of data lineage.
    pub fn is_lineage(&self) -> bool {
        matches!(self, EdgeKind::Feeds | EdgeKind::References)
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for EdgeKind {
    type Err = EstateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_label(&s.to_ascii_uppercase())
            .ok_or_else(|| EstateError::UnknownEdgeKind(s.to_string()))
    }
}

// ── Node Keys ─────────────────────────────────────────────────────

/// Identity of a node: its kind label plus its natural key.
///
/// The label is a string rather than [`NodeKind`] so that kinds registered
/// after the built-in schema (e.g. a Data Lake filesystem) use the same type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey {
    pub label: String,
    pub key: String,
}

impl NodeKey {
    pub fn new(kind: NodeKind, key: impl Into<String>) -> Self {
        Self {
            label: kind.label().to_string(),
            key: key.into(),
        }
    }

    pub fn custom(label: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            key: key.into(),
        }
    }

    /// The built-in kind, if the label names one.
    pub fn kind(&self) -> Option<NodeKind> {
        NodeKind::from_label(&self.label)
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.label, self.key)
    }
}

impl FromStr for NodeKey {
    type Err = EstateError;

    /// Parse `Label:natural-key`. Only the first `:` separates.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((label, key)) if !label.is_empty() && !key.is_empty() => {
                Ok(NodeKey::custom(label, key))
            }
            _ => Err(EstateError::InvalidKey {
                kind: "NodeKey".to_string(),
                reason: format!("expected Label:key, got {s:?}"),
            }),
        }
    }
}

// ── Records ───────────────────────────────────────────────────────

/// An Azure subscription.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subscription {
    pub subscription_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

/// An Azure resource as reported by Resource Graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Resource {
    pub resource_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_group: Option<String>,
    /// Owning subscription; implies `Subscription -CONTAINS-> Resource`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

/// A Power BI or Synapse workspace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Workspace {
    pub workspace_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

/// A dataset (Power BI semantic model, ADF or Synapse dataset).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Dataset {
    pub dataset_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_type: Option<String>,
    /// Owning workspace; implies `Workspace -CONTAINS-> Dataset`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configured_by: Option<String>,
}

/// A Power BI report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Report {
    pub report_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
    /// Source dataset; implies `Dataset -FEEDS-> Report`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_url: Option<String>,
}

/// A Data Factory or Synapse pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Pipeline {
    pub pipeline_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
}

/// A connection definition used by pipelines.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkedService {
    pub linked_service_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory_name: Option<String>,
}

/// A relational table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Table {
    pub server: String,
    pub database: String,
    pub schema: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_count: Option<i64>,
}

/// A column of a relational table.
///
/// `table_key` is the owning table's natural key and never changes once the
/// column exists; it implies `Table -HAS_COLUMN-> Column`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Column {
    pub table_key: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_nullable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_identity: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ordinal: Option<i64>,
    /// Raw sampled values, only present when the collector sampled data.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sample_values: Vec<serde_json::Value>,
}

/// A blob storage container.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Container {
    pub account: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_access: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

/// A blob within a container.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Blob {
    /// Owning container's natural key; implies `Container -CONTAINS-> Blob`.
    pub container_key: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

impl Blob {
    /// Lower-cased file extension, if the path has one.
    pub fn file_type(&self) -> Option<String> {
        let file_name = self.path.rsplit('/').next().unwrap_or(&self.path);
        file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_lowercase())
            .filter(|ext| !ext.is_empty())
    }

    pub fn format_category(&self) -> FormatCategory {
        self.file_type()
            .map(|ext| FormatCategory::from_extension(&ext))
            .unwrap_or(FormatCategory::Unknown)
    }
}

/// Coarse data format of a blob, derived from its extension.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FormatCategory {
    Structured,
    SemiStructured,
    Unstructured,
    Media,
    Archive,
    Unknown,
}

impl FormatCategory {
    pub fn from_extension(ext: &str) -> Self {
        match ext {
            "parquet" | "csv" | "avro" | "orc" | "xlsx" => Self::Structured,
            "json" | "xml" => Self::SemiStructured,
            "txt" | "log" | "pdf" => Self::Unstructured,
            "png" | "jpg" | "jpeg" | "mp4" => Self::Media,
            "zip" => Self::Archive,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Structured => "Structured",
            Self::SemiStructured => "SemiStructured",
            Self::Unstructured => "Unstructured",
            Self::Media => "Media",
            Self::Archive => "Archive",
            Self::Unknown => "Unknown",
        }
    }
}

/// An M365 / Entra user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upn: Option<String>,
    /// Group ids; each implies `User -MEMBER_OF-> Group`.
    #[serde(default, skip_serializing)]
    pub member_of: Vec<String>,
}

/// An M365 group (Team, M365 group, security group).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Group {
    pub group_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mail: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub group_types: Vec<String>,
}

/// An explicit relationship emitted by a collector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Relationship {
    pub kind: EdgeKind,
    pub from: NodeKey,
    pub to: NodeKey,
    #[serde(default)]
    pub properties: Properties,
}

impl Relationship {
    pub fn new(kind: EdgeKind, from: NodeKey, to: NodeKey) -> Self {
        Self {
            kind,
            from,
            to,
            properties: Properties::new(),
        }
    }
}

/// A node of a kind registered outside the built-in schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenericNode {
    pub label: String,
    pub key: String,
    #[serde(default)]
    pub properties: Properties,
}

/// Any record a collector can emit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "record_type")]
pub enum Record {
    Subscription(Subscription),
    Resource(Resource),
    Workspace(Workspace),
    Dataset(Dataset),
    Report(Report),
    Pipeline(Pipeline),
    LinkedService(LinkedService),
    Table(Table),
    Column(Column),
    Container(Container),
    Blob(Blob),
    User(User),
    Group(Group),
    Relationship(Relationship),
    Generic(GenericNode),
}

impl Record {
    /// The label of the node this record describes, or `None` for relationships.
    pub fn label(&self) -> Option<&str> {
        match self {
            Record::Subscription(_) => Some(NodeKind::Subscription.label()),
            Record::Resource(_) => Some(NodeKind::Resource.label()),
            Record::Workspace(_) => Some(NodeKind::Workspace.label()),
            Record::Dataset(_) => Some(NodeKind::Dataset.label()),
            Record::Report(_) => Some(NodeKind::Report.label()),
            Record::Pipeline(_) => Some(NodeKind::Pipeline.label()),
            Record::LinkedService(_) => Some(NodeKind::LinkedService.label()),
            Record::Table(_) => Some(NodeKind::Table.label()),
            Record::Column(_) => Some(NodeKind::Column.label()),
            Record::Container(_) => Some(NodeKind::Container.label()),
            Record::Blob(_) => Some(NodeKind::Blob.label()),
            Record::User(_) => Some(NodeKind::User.label()),
            Record::Group(_) => Some(NodeKind::Group.label()),
            Record::Relationship(_) => None,
            Record::Generic(g) => Some(&g.label),
        }
    }
}

// ── Batches ───────────────────────────────────────────────────────

/// Which collector produced a batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CollectorSource {
    AzureResourceGraph,
    M365,
    PowerBi,
    Synapse,
    DataFactory,
    SqlSchema,
    BlobStorage,
    Other(String),
}

impl fmt::Display for CollectorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectorSource::AzureResourceGraph => f.write_str("azure_resource_graph"),
            CollectorSource::M365 => f.write_str("m365"),
            CollectorSource::PowerBi => f.write_str("power_bi"),
            CollectorSource::Synapse => f.write_str("synapse"),
            CollectorSource::DataFactory => f.write_str("data_factory"),
            CollectorSource::SqlSchema => f.write_str("sql_schema"),
            CollectorSource::BlobStorage => f.write_str("blob_storage"),
            CollectorSource::Other(name) => f.write_str(name),
        }
    }
}

/// One collector's fully fetched output, ready for ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorBatch {
    #[serde(default = "Uuid::new_v4")]
    pub batch_id: Uuid,
    pub source: CollectorSource,
    #[serde(default = "Utc::now")]
    pub scanned_at: DateTime<Utc>,
    pub records: Vec<Record>,
}

impl CollectorBatch {
    pub fn new(source: CollectorSource, records: Vec<Record>) -> Self {
        Self {
            batch_id: Uuid::new_v4(),
            source,
            scanned_at: Utc::now(),
            records,
        }
    }
}
