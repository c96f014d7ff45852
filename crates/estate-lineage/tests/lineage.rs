//! Lineage queries against an in-memory store.

use chrono::Utc;

use estate_core::{EdgeKind, NodeKey, NodeKind, Properties};
use estate_graph::{GraphStore, SchemaRegistry};
use estate_lineage::{LineageEngine, LineageError};

fn t() -> NodeKey {
    NodeKey::new(NodeKind::Table, "sql01/sales/dbo.orders")
}
fn p() -> NodeKey {
    NodeKey::new(NodeKind::Pipeline, "adf-prod/load_orders")
}
fn d() -> NodeKey {
    NodeKey::new(NodeKind::Dataset, "ds-orders")
}
fn r() -> NodeKey {
    NodeKey::new(NodeKind::Report, "rep-sales")
}

async fn store_with_chain() -> GraphStore {
    let store = GraphStore::in_memory(SchemaRegistry::standard()).await.unwrap();
    let now = Utc::now();
    for key in [t(), p(), d(), r()] {
        store
            .upsert_node(&key.label, &key.key, &Properties::new(), now)
            .await
            .unwrap();
    }
    for (from, to) in [(t(), p()), (p(), d()), (d(), r())] {
        store
            .upsert_edge(EdgeKind::Feeds, &from, &to, &Properties::new(), now)
            .await
            .unwrap();
    }
    store
}

#[tokio::test]
async fn test_path_from_table_to_report() {
    let engine = LineageEngine::new(store_with_chain().await);

    let path = engine.shortest_path(&t(), &r()).await.unwrap().unwrap();
    let keys: Vec<NodeKey> = path.iter().map(|n| n.node_key()).collect();
    assert_eq!(keys, vec![t(), p(), d(), r()]);

    assert!(engine.shortest_path(&r(), &t()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_same_node_path() {
    let store = store_with_chain().await;
    let lonely = NodeKey::new(NodeKind::Report, "rep-unused");
    store
        .upsert_node(&lonely.label, &lonely.key, &Properties::new(), Utc::now())
        .await
        .unwrap();
    let engine = LineageEngine::new(store);

    let path = engine.shortest_path(&t(), &t()).await.unwrap().unwrap();
    assert_eq!(path.len(), 1);
    assert_eq!(path[0].node_key(), t());

    let path = engine.shortest_path(&lonely, &lonely).await.unwrap().unwrap();
    assert_eq!(path[0].node_key(), lonely);
    assert!(engine.shortest_path(&t(), &lonely).await.unwrap().is_none());
}

#[tokio::test]
async fn test_unknown_node_is_an_error() {
    let engine = LineageEngine::new(store_with_chain().await);
    let missing = NodeKey::new(NodeKind::Report, "nope");
    let err = engine.shortest_path(&t(), &missing).await.unwrap_err();
    assert!(matches!(err, LineageError::NodeNotFound { .. }));
}

#[tokio::test]
async fn test_impact_and_sources() {
    let store = store_with_chain().await;
    let now = Utc::now();
    // a second report on the same dataset, and a containment edge that is not lineage
    let r2 = NodeKey::new(NodeKind::Report, "rep-ops");
    let ws = NodeKey::new(NodeKind::Workspace, "ws-1");
    for key in [&r2, &ws] {
        store
            .upsert_node(&key.label, &key.key, &Properties::new(), now)
            .await
            .unwrap();
    }
    store
        .upsert_edge(EdgeKind::Feeds, &d(), &r2, &Properties::new(), now)
        .await
        .unwrap();
    store
        .upsert_edge(EdgeKind::Contains, &ws, &r(), &Properties::new(), now)
        .await
        .unwrap();
    let engine = LineageEngine::new(store);

    let impact = engine.downstream_impact(&t(), 10).await.unwrap();
    assert_eq!(impact.total(), 4);
    assert_eq!(impact.by_label["Report"], 2);

    let sources = engine.upstream_sources(&r(), 10).await.unwrap();
    let keys: Vec<NodeKey> = sources.assets.iter().map(|a| a.node.clone()).collect();
    assert_eq!(keys, vec![d(), p(), t()]);

    let isolated = engine.downstream_impact(&ws, 10).await.unwrap();
    assert_eq!(isolated.total(), 0);
}

#[tokio::test]
async fn test_references_count_as_lineage() {
    let store = GraphStore::in_memory(SchemaRegistry::standard()).await.unwrap();
    let now = Utc::now();
    let fk = NodeKey::new(NodeKind::Column, "sql01/sales/dbo.orders/customer_id");
    let pk = NodeKey::new(NodeKind::Column, "sql01/sales/dbo.customers/id");
    for key in [&fk, &pk] {
        store
            .upsert_node(&key.label, &key.key, &Properties::new(), now)
            .await
            .unwrap();
    }
    store
        .upsert_edge(EdgeKind::References, &fk, &pk, &Properties::new(), now)
        .await
        .unwrap();

    let engine = LineageEngine::new(store);
    let paths = engine.enumerate_paths(&fk, &pk, 5, 5).await.unwrap();
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0].len(), 2);
}
