//! End-to-end ingestion tests against an in-memory store.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use estate_core::config::IngestConfig;
use estate_core::types::{Column, Dataset, GenericNode, Pipeline, Resource, Subscription, Table};
use estate_core::{
    CollectorBatch, CollectorSource, EdgeKind, NodeKey, NodeKind, Record, Relationship,
};
use estate_graph::{GraphStore, SchemaRegistry};
use estate_ingest::{IngestionCoordinator, RecordErrorKind};

async fn coordinator(config: IngestConfig) -> IngestionCoordinator {
    let store = GraphStore::in_memory(SchemaRegistry::standard())
        .await
        .unwrap();
    IngestionCoordinator::new(store, config)
}

fn fast_config() -> IngestConfig {
    IngestConfig {
        backoff_base_ms: 1,
        ..IngestConfig::default()
    }
}

fn resource(id: &str, subscription: Option<&str>) -> Record {
    Record::Resource(Resource {
        resource_id: id.to_string(),
        name: Some(id.rsplit('/').next().unwrap_or(id).to_string()),
        resource_type: Some("Microsoft.Sql/servers".to_string()),
        location: Some("brazilsouth".to_string()),
        resource_group: None,
        subscription_id: subscription.map(str::to_string),
        tags: BTreeMap::new(),
    })
}

fn table(name: &str) -> Record {
    Record::Table(Table {
        server: "sql01".to_string(),
        database: "sales".to_string(),
        schema: "dbo".to_string(),
        name: name.to_string(),
        object_id: None,
        row_count: Some(10),
    })
}

fn column(table: &str, name: &str) -> Record {
    Record::Column(Column {
        table_key: format!("sql01/sales/dbo.{table}"),
        name: name.to_string(),
        data_type: Some("varchar".to_string()),
        max_length: Some(64),
        is_nullable: Some(true),
        is_identity: None,
        ordinal: None,
        sample_values: vec![],
    })
}

fn dataset(id: &str, name: &str, factory: Option<&str>) -> Record {
    Record::Dataset(Dataset {
        dataset_id: id.to_string(),
        name: Some(name.to_string()),
        dataset_type: None,
        workspace_id: None,
        factory_name: factory.map(str::to_string),
        configured_by: None,
    })
}

#[tokio::test]
async fn test_schema_violation_does_not_roll_back_chunk_peers() {
    let coordinator = coordinator(fast_config()).await;

    let mut records: Vec<Record> = (1..=100)
        .map(|i| resource(&format!("/subs/1/res-{i}"), None))
        .collect();
    // record 57 is of a kind the schema does not register
    records[56] = Record::Generic(GenericNode {
        label: "StorageQueue".to_string(),
        key: "/subs/1/res-57".to_string(),
        properties: json!({"location": "brazilsouth"}).as_object().cloned().unwrap(),
    });

    let batch = CollectorBatch::new(CollectorSource::AzureResourceGraph, records);
    let summary = coordinator.ingest(&batch, &CancellationToken::new()).await;

    assert_eq!(summary.chunks_total, 1);
    assert_eq!(summary.chunks_committed, 1);
    assert_eq!(summary.nodes_upserted, 99);
    assert_eq!(summary.records_failed, 1);
    assert_eq!(summary.record_errors.len(), 1);
    assert_eq!(summary.record_errors[0].record_index, 56);
    assert_eq!(summary.record_errors[0].entity, "StorageQueue:/subs/1/res-57");
    assert_eq!(summary.record_errors[0].kind, RecordErrorKind::SchemaViolation);

    let store = coordinator.store();
    assert_eq!(store.count_nodes("Resource").await.unwrap(), 99);
    assert!(store.get_node("Resource", "/subs/1/res-56").await.unwrap().is_some());
    assert!(store.get_node("Resource", "/subs/1/res-58").await.unwrap().is_some());
    assert!(store.get_node("Resource", "/subs/1/res-57").await.unwrap().is_none());
}

#[tokio::test]
async fn test_edges_resolve_regardless_of_record_order() {
    let coordinator = coordinator(fast_config()).await;
    let batch = CollectorBatch::new(
        CollectorSource::SqlSchema,
        vec![column("orders", "id"), column("orders", "customer_cpf"), table("orders")],
    );

    let summary = coordinator.ingest(&batch, &CancellationToken::new()).await;
    assert!(summary.is_clean(), "{summary:?}");
    assert_eq!(summary.nodes_upserted, 3);
    assert_eq!(summary.edges_upserted, 2);

    let table_key = NodeKey::new(NodeKind::Table, "sql01/sales/dbo.orders");
    let edges = coordinator.store().edges_from(&table_key).await.unwrap();
    assert_eq!(edges.len(), 2);
    assert!(edges.iter().all(|e| e.kind == EdgeKind::HasColumn));
}

#[tokio::test]
async fn test_missing_endpoint_skips_only_that_edge() {
    let coordinator = coordinator(fast_config()).await;
    let batch = CollectorBatch::new(
        CollectorSource::AzureResourceGraph,
        vec![
            Record::Subscription(Subscription {
                subscription_id: "sub-1".to_string(),
                name: Some("prod".to_string()),
                state: None,
                tenant_id: None,
            }),
            resource("/subs/sub-1/db", Some("sub-1")),
            resource("/subs/sub-9/cache", Some("sub-9")),
        ],
    );

    let summary = coordinator.ingest(&batch, &CancellationToken::new()).await;
    assert_eq!(summary.nodes_upserted, 3);
    assert_eq!(summary.edges_upserted, 1);
    assert_eq!(summary.record_errors.len(), 1);
    assert_eq!(summary.record_errors[0].kind, RecordErrorKind::UnknownEndpoint);
    assert_eq!(summary.record_errors[0].record_index, 2);

    let store = coordinator.store();
    assert!(store.get_node("Resource", "/subs/sub-9/cache").await.unwrap().is_some());
    assert_eq!(store.count_edges(EdgeKind::Contains).await.unwrap(), 1);
}

#[tokio::test]
async fn test_reingesting_a_batch_leaves_graph_unchanged() {
    let coordinator = coordinator(fast_config()).await;
    let batch = CollectorBatch::new(
        CollectorSource::SqlSchema,
        vec![table("customers"), column("customers", "email"), column("customers", "cpf")],
    );

    coordinator.ingest(&batch, &CancellationToken::new()).await;
    let first = coordinator.store().fingerprint().await.unwrap();

    let rescan = CollectorBatch::new(CollectorSource::SqlSchema, batch.records.clone());
    let summary = coordinator.ingest(&rescan, &CancellationToken::new()).await;
    assert!(summary.is_clean());

    let second = coordinator.store().fingerprint().await.unwrap();
    assert_eq!(first, second);
    let stats = coordinator.store().stats().await.unwrap();
    assert_eq!(stats.total_nodes, 3);
    assert_eq!(stats.total_edges, 2);
}

#[tokio::test]
async fn test_persistent_store_failure_reports_chunk_keys() {
    let config = IngestConfig {
        chunk_size: 2,
        max_retries: 3,
        backoff_base_ms: 1,
        ..IngestConfig::default()
    };
    let coordinator = coordinator(config).await;
    sqlx::query("DROP TABLE edges")
        .execute(coordinator.store().pool())
        .await
        .unwrap();

    let batch = CollectorBatch::new(
        CollectorSource::SqlSchema,
        vec![table("invoices"), column("invoices", "total")],
    );
    let summary = coordinator.ingest(&batch, &CancellationToken::new()).await;

    // chunk 0: both nodes; chunk 1: the HAS_COLUMN edge
    assert_eq!(summary.chunks_total, 2);
    assert_eq!(summary.chunks_committed, 1);
    assert_eq!(summary.chunks_failed, 1);
    assert_eq!(summary.retries, 3);
    assert_eq!(summary.nodes_upserted, 2);

    let failure = &summary.chunk_failures[0];
    assert_eq!(failure.chunk_index, 1);
    assert_eq!(failure.attempts, 4);
    assert_eq!(
        failure.entity_keys,
        vec!["HAS_COLUMN Table:sql01/sales/dbo.invoices -> Column:sql01/sales/dbo.invoices/total"]
    );
    assert_eq!(summary.failed_entities().len(), 1);
}

#[tokio::test]
async fn test_cancelled_before_start_writes_nothing() {
    let config = IngestConfig {
        chunk_size: 10,
        ..fast_config()
    };
    let coordinator = coordinator(config).await;
    let records = (0..25)
        .map(|i| resource(&format!("/subs/1/r{i}"), None))
        .collect();
    let batch = CollectorBatch::new(CollectorSource::AzureResourceGraph, records);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let summary = coordinator.ingest(&batch, &cancel).await;

    assert!(summary.cancelled);
    assert_eq!(summary.chunks_total, 3);
    assert_eq!(summary.chunks_committed, 0);
    assert_eq!(coordinator.store().count_nodes("Resource").await.unwrap(), 0);
}

#[tokio::test]
async fn test_cancel_mid_batch_commits_in_flight_chunk_only() {
    let config = IngestConfig {
        chunk_size: 1,
        ..fast_config()
    };
    let cancel = CancellationToken::new();
    let settled = Arc::new(AtomicUsize::new(0));
    let coordinator = {
        let cancel = cancel.clone();
        let settled = Arc::clone(&settled);
        coordinator(config).await.on_chunk(move |progress| {
            settled.fetch_add(1, Ordering::SeqCst);
            if progress.chunk_index == 0 {
                assert!(progress.committed);
                cancel.cancel();
            }
        })
    };
    let records = (0..5)
        .map(|i| resource(&format!("/subs/1/r{i}"), None))
        .collect();
    let batch = CollectorBatch::new(CollectorSource::AzureResourceGraph, records);

    let summary = coordinator.ingest(&batch, &cancel).await;

    assert!(summary.cancelled);
    assert!(!summary.is_clean());
    assert_eq!(summary.chunks_total, 5);
    assert_eq!(summary.chunks_committed, 1);
    assert_eq!(summary.nodes_upserted, 1);
    assert_eq!(summary.chunks_failed, 0);
    assert_eq!(settled.load(Ordering::SeqCst), 1);

    let store = coordinator.store();
    assert_eq!(store.count_nodes("Resource").await.unwrap(), 1);
    assert!(store.get_node("Resource", "/subs/1/r0").await.unwrap().is_some());
}

#[tokio::test]
async fn test_collectors_cannot_rewrite_identity() {
    let coordinator = coordinator(fast_config()).await;
    let cancel = CancellationToken::new();
    let first = CollectorBatch::new(
        CollectorSource::SqlSchema,
        vec![table("t1"), table("t2"), column("t1", "cpf"), column("t1", "other")],
    );
    assert!(coordinator.ingest(&first, &cancel).await.is_clean());

    let cpf = NodeKey::new(NodeKind::Column, "sql01/sales/dbo.t1/cpf");
    let other = NodeKey::new(NodeKind::Column, "sql01/sales/dbo.t1/other");
    let classification = NodeKey::new(NodeKind::Classification, format!("{cpf}#NationalID"));
    let generic = |label: &str, key: &str, properties: serde_json::Value| {
        Record::Generic(GenericNode {
            label: label.to_string(),
            key: key.to_string(),
            properties: properties.as_object().cloned().unwrap(),
        })
    };
    let second = CollectorBatch::new(
        CollectorSource::Other("custom".to_string()),
        vec![
            generic("Column", &cpf.key, json!({"table_key": "sql01/sales/dbo.t2"})),
            generic("Table", "free-form-table-key", json!({})),
            generic("Classification", &classification.key, json!({"category": "NationalID"})),
            Record::Relationship(Relationship::new(
                EdgeKind::ClassifiedAs,
                cpf.clone(),
                classification.clone(),
            )),
            Record::Relationship(Relationship::new(
                EdgeKind::ClassifiedAs,
                other,
                classification.clone(),
            )),
        ],
    );
    let summary = coordinator.ingest(&second, &cancel).await;

    assert_eq!(summary.records_failed, 5);
    assert!(summary
        .record_errors
        .iter()
        .all(|e| e.kind == RecordErrorKind::SchemaViolation));
    assert_eq!(summary.succeeded(), 0);

    let store = coordinator.store();
    let column = store.get_node("Column", &cpf.key).await.unwrap().unwrap();
    assert_eq!(column.properties["table_key"], "sql01/sales/dbo.t1");
    assert!(store.get_node("Table", "free-form-table-key").await.unwrap().is_none());
    assert_eq!(store.count_nodes("Classification").await.unwrap(), 0);
    assert_eq!(store.count_edges(EdgeKind::ClassifiedAs).await.unwrap(), 0);
}

#[tokio::test]
async fn test_cross_source_identity_is_exact_key_match() {
    let coordinator = coordinator(fast_config()).await;
    let power_bi = CollectorBatch::new(
        CollectorSource::PowerBi,
        vec![dataset("ds-1", "Sales Model", None)],
    );
    let adf = CollectorBatch::new(
        CollectorSource::DataFactory,
        vec![
            dataset("ds-1", "sales_sink", Some("adf-prod")),
            dataset("DS-1", "sales_sink_upper", Some("adf-prod")),
        ],
    );

    let cancel = CancellationToken::new();
    coordinator.ingest(&power_bi, &cancel).await;
    coordinator.ingest(&adf, &cancel).await;

    let store = coordinator.store();
    assert_eq!(store.count_nodes("Dataset").await.unwrap(), 2);
    let merged = store.get_node("Dataset", "ds-1").await.unwrap().unwrap();
    assert_eq!(merged.properties["name"], "sales_sink");
    assert_eq!(merged.properties["factory_name"], "adf-prod");
}

#[tokio::test]
async fn test_explicit_lineage_relationships() {
    let coordinator = coordinator(fast_config()).await;
    let pipeline = NodeKey::new(NodeKind::Pipeline, "adf-prod/load_sales");
    let ds = NodeKey::new(NodeKind::Dataset, "ds-1");
    let batch = CollectorBatch::new(
        CollectorSource::DataFactory,
        vec![
            Record::Relationship(Relationship::new(EdgeKind::Feeds, pipeline.clone(), ds.clone())),
            Record::Pipeline(Pipeline {
                pipeline_id: pipeline.key.clone(),
                name: Some("load_sales".to_string()),
                factory_name: Some("adf-prod".to_string()),
                workspace: None,
            }),
            dataset("ds-1", "sales", Some("adf-prod")),
        ],
    );

    let summary = coordinator.ingest(&batch, &CancellationToken::new()).await;
    assert!(summary.is_clean(), "{summary:?}");
    assert_eq!(summary.edges_upserted, 1);
    assert_eq!(coordinator.store().count_edges(EdgeKind::Feeds).await.unwrap(), 1);
}

#[tokio::test]
async fn test_ingest_all_runs_batches_concurrently() {
    let config = IngestConfig {
        chunk_size: 5,
        max_concurrent_batches: 2,
        ..fast_config()
    };
    let coordinator = coordinator(config).await;

    let batches: Vec<_> = (0..4)
        .map(|b| {
            let records = (0..12)
                .map(|i| resource(&format!("/subs/{b}/r{i}"), None))
                .collect();
            CollectorBatch::new(CollectorSource::AzureResourceGraph, records)
        })
        .collect();
    let ids: Vec<_> = batches.iter().map(|b| b.batch_id).collect();

    let summaries: Vec<_> = coordinator
        .ingest_all(batches, &CancellationToken::new())
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    assert_eq!(summaries.len(), 4);
    assert_eq!(summaries.iter().map(|s| s.batch_id).collect::<Vec<_>>(), ids);
    assert!(summaries.iter().all(|s| s.chunks_committed == 3 && s.is_clean()));
    assert_eq!(coordinator.store().count_nodes("Resource").await.unwrap(), 48);
}

#[tokio::test]
async fn test_failed_batch_task_keeps_sibling_summaries() {
    let batches: Vec<_> = (0..3)
        .map(|b| {
            let records = (0..4)
                .map(|i| resource(&format!("/subs/{b}/r{i}"), None))
                .collect();
            CollectorBatch::new(CollectorSource::AzureResourceGraph, records)
        })
        .collect();
    let doomed = batches[1].batch_id;

    let coordinator = coordinator(fast_config())
        .await
        .on_chunk(move |progress| {
            if progress.batch_id == doomed {
                panic!("observer failure");
            }
        });
    let results = coordinator
        .ingest_all(batches, &CancellationToken::new())
        .await;

    assert_eq!(results.len(), 3);
    assert!(results[0].as_ref().is_ok_and(|s| s.is_clean()));
    assert!(matches!(results[1], Err(estate_ingest::IngestError::Task(_))));
    assert!(results[2].as_ref().is_ok_and(|s| s.is_clean()));
    assert_eq!(coordinator.store().count_nodes("Resource").await.unwrap(), 12);
}
