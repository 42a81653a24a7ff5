//! Lifecycle: open, close, reopen from durable logs.

use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use ocpi_node::core::{Location, Session, Tariff};
use ocpi_node::store::{AuditLog, AuditLogConfig, LogStream, MemoryArchive, SqliteAuditLog};
use ocpi_node::sync::MemoryPeerNetwork;
use ocpi_node::{FailureKind, Node, NodeConfig, NodeError, Outcome, RequestContext, Role, VersionId, WriteContext};
use ocpi_node_testkit::fixtures::{
    at, cpo_id, cpo_party, emsp_party, sample_cdr, sample_location, sample_session,
    sample_token_status, sample_tariff, TestNode,
};

fn config() -> NodeConfig {
    NodeConfig::new("https://node.example/ocpi")
}

async fn open_sqlite(dir: &TempDir) -> Node {
    let log = SqliteAuditLog::open_dir(dir.path(), AuditLogConfig::default()).unwrap();
    Node::open(config(), Arc::new(log), MemoryPeerNetwork::new())
        .await
        .unwrap()
}

async fn populate(node: &Node) {
    let ctx = WriteContext::default();
    let assets = node.assets();
    assets.add_party(cpo_party(), &ctx).await.unwrap();
    assets.add_party(emsp_party(), &ctx).await.unwrap();

    assets.add(sample_location(&cpo_id(), "LOC1", at(0)), &ctx).await.unwrap();
    assets.add(sample_location(&cpo_id(), "LOC2", at(0)), &ctx).await.unwrap();
    assets.add(sample_tariff(&cpo_id(), "T1", at(0)), &ctx).await.unwrap();
    assets.add(sample_session(&cpo_id(), "S1", at(0)), &ctx).await.unwrap();
    assets.add(sample_token_status(&cpo_id(), "TOK1", at(0)), &ctx).await.unwrap();
    assets.add(sample_cdr(&cpo_id(), "CDR1", at(0)), &ctx).await.unwrap();

    assets
        .try_patch::<Tariff>(&cpo_id(), "T1", &json!({ "currency": "CHF", "last_updated": at(5) }), &ctx)
        .await
        .unwrap();
    assets.remove::<Location>(&cpo_id(), "LOC2", &ctx).await.unwrap();
    assets
        .remove_charging_station(&cpo_id(), "LOC1", "CS-1", &ctx)
        .await
        .unwrap();

    let token = node.provision_remote_party(Vec::new(), &ctx).await.unwrap();
    node.provision_remote_party(Vec::new(), &ctx).await.unwrap();
    node.block_access_token(&token, &ctx).await.unwrap();
}

#[tokio::test]
async fn sqlite_replay_reproduces_state() {
    let dir = TempDir::new().unwrap();

    let node = open_sqlite(&dir).await;
    populate(&node).await;
    let digest = node.state_digest().unwrap();
    let parties = node.registry().len();
    node.close().await.unwrap();

    let reopened = open_sqlite(&dir).await;
    assert_eq!(reopened.state_digest().unwrap(), digest);
    assert_eq!(reopened.registry().len(), parties);
    assert!(reopened.assets().exists::<Location>(&cpo_id(), "LOC1"));
    assert!(!reopened.assets().exists::<Location>(&cpo_id(), "LOC2"));
    assert!(reopened.assets().has_local_role(Role::Emsp));

    let tariff = reopened
        .assets()
        .try_get::<Tariff>(&cpo_id(), "T1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(tariff.currency, "CHF");
}

#[tokio::test]
async fn replay_matches_between_memory_and_sqlite() {
    let dir = TempDir::new().unwrap();
    let durable = open_sqlite(&dir).await;
    let memory = TestNode::start(config()).await;

    // Identical commands yield identical audit payloads, but minted tokens
    // and party ids differ, so compare asset state only.
    for node in [&durable, &memory.node] {
        let ctx = WriteContext::default();
        node.add_local_party(cpo_party(), &ctx).await.unwrap();
        node.assets()
            .add(sample_location(&cpo_id(), "LOC1", at(0)), &ctx)
            .await
            .unwrap();
        node.assets()
            .add_or_update(sample_location(&cpo_id(), "LOC1", at(10)), &ctx)
            .await
            .unwrap();
    }

    assert_eq!(durable.assets().snapshot().len(), 1);
    let reopened = memory.reopen().await;
    let left = serde_json::to_value(durable.assets().snapshot()).unwrap();
    let right = serde_json::to_value(reopened.assets().snapshot()).unwrap();
    assert_eq!(left, right);
}

#[tokio::test]
async fn failed_append_leaves_no_trace() {
    let fixture = TestNode::with_cpo().await;
    let ctx = WriteContext::default();
    let digest = fixture.node.state_digest().unwrap();
    let mut events = fixture.node.subscribe();

    fixture.log.fail_appends(true);

    let result = fixture
        .node
        .assets()
        .add(sample_location(&cpo_id(), "LOC1", at(0)), &ctx)
        .await;
    assert!(result.is_err());

    let provisioned = fixture.node.provision_remote_party(Vec::new(), &ctx).await;
    assert!(matches!(provisioned, Err(NodeError::Registry(_))));

    assert_eq!(fixture.node.state_digest().unwrap(), digest);
    assert!(events.try_recv().is_err());

    fixture.log.fail_appends(false);
    let retried = fixture
        .node
        .assets()
        .add(sample_location(&cpo_id(), "LOC1", at(0)), &ctx)
        .await
        .unwrap();
    assert_eq!(retried.outcome, Outcome::Created);
}

#[tokio::test]
async fn archived_sessions_are_found() {
    let archive = Arc::new(MemoryArchive::new());
    let old = sample_session(&cpo_id(), "OLD", at(-3600));
    archive.insert(
        ocpi_node::core::ResourceKind::Session,
        cpo_id(),
        "OLD",
        serde_json::to_value(&old).unwrap(),
    );

    let fixture = TestNode::with_cpo().await;
    let TestNode { node, .. } = fixture;
    let node = node.with_archive(archive);

    let found = node.assets().try_get::<Session>(&cpo_id(), "OLD").await.unwrap();
    assert_eq!(found.unwrap().start_date_time, at(-3600));

    let missing = node
        .assets()
        .try_get::<Location>(&cpo_id(), "OLD")
        .await
        .unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn close_flushes_and_state_is_on_disk() {
    let dir = TempDir::new().unwrap();
    let node = open_sqlite(&dir).await;
    node.add_local_party(cpo_party(), &WriteContext::default())
        .await
        .unwrap();
    node.close().await.unwrap();

    let log = SqliteAuditLog::open_dir(dir.path(), AuditLogConfig::default()).unwrap();
    assert_eq!(log.len(LogStream::Assets).await.unwrap(), 1);
    assert_eq!(log.len(LogStream::RemoteParties).await.unwrap(), 0);
}

#[tokio::test]
async fn open_rejects_bad_config() {
    let result = Node::open(
        NodeConfig::new("ftp://node.example"),
        Arc::new(ocpi_node::store::MemoryAuditLog::new()),
        MemoryPeerNetwork::new(),
    )
    .await;
    assert!(matches!(result, Err(NodeError::InvalidConfig(_))));
}

#[tokio::test]
async fn duplicate_local_party_is_refused() {
    let fixture = TestNode::with_cpo().await;
    let again = fixture
        .node
        .add_local_party(cpo_party(), &WriteContext::default())
        .await
        .unwrap();
    assert!(again.is_failed_with(FailureKind::AlreadyExists));

    let credentials = fixture.node.get_credentials(&VersionId::v2_2_1(), &RequestContext::new());
    assert!(!credentials.is_success());
}
