use std::sync::Arc;
use std::time::Duration;

use taskweave_core::{patch, Graph, NodePatch};
use taskweave_store::{
    AccessToken, CachedTokenProvider, InMemoryDocumentStore, ScriptedCredentialSource,
    StoreError, TokenProvider,
};
use taskweave_sync::{RetryPolicy, SyncEngine, SyncSession, SyncStatus};
use tokio::time::sleep;

fn engine(store: &InMemoryDocumentStore, source: ScriptedCredentialSource) -> SyncEngine {
    let tokens: Arc<dyn TokenProvider> = Arc::new(CachedTokenProvider::new(source));
    let session = SyncSession::new(Arc::new(store.clone()), tokens, "graph.json");
    SyncEngine::new(session, Duration::from_millis(900), RetryPolicy::default())
}

fn granting() -> ScriptedCredentialSource {
    ScriptedCredentialSource::granting(AccessToken::new("token"))
}

fn titled(graph: &Graph, title: &str) -> Graph {
    patch(graph, "root", NodePatch::title(title))
}

fn http(status: u16) -> StoreError {
    StoreError::Http {
        status,
        message: "server error".to_string(),
    }
}

#[tokio::test(start_paused = true)]
async fn burst_of_schedules_writes_only_the_last_snapshot() {
    let store = InMemoryDocumentStore::new();
    let engine = engine(&store, granting());

    let mut graph = Graph::new();
    for i in 0..5 {
        graph = titled(&graph, &format!("v{i}"));
        engine.schedule(&graph).unwrap();
        sleep(Duration::from_millis(100)).await;
    }
    sleep(Duration::from_secs(5)).await;

    let writes = store.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].1, graph.to_json().unwrap());
    assert_eq!(engine.status(), SyncStatus::Idle);
    assert!(engine.pending_payload().is_none());
    assert!(engine.snapshot().last_saved_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn nothing_is_written_before_the_debounce_elapses() {
    let store = InMemoryDocumentStore::new();
    let engine = engine(&store, granting());

    engine.schedule(&titled(&Graph::new(), "draft")).unwrap();
    sleep(Duration::from_millis(500)).await;
    assert_eq!(store.write_attempts(), 0);
    assert!(engine.snapshot().has_pending);

    sleep(Duration::from_millis(1000)).await;
    assert_eq!(store.write_attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn two_server_errors_then_success_takes_three_attempts() {
    let store = InMemoryDocumentStore::new();
    store.fail_next_writes([http(503), http(503)]);
    let engine = engine(&store, granting());

    engine.schedule(&titled(&Graph::new(), "retry me")).unwrap();
    sleep(Duration::from_secs(60)).await;

    assert_eq!(store.write_attempts(), 3);
    assert_eq!(store.writes().len(), 1);
    assert_eq!(engine.status(), SyncStatus::Idle);
    assert_eq!(engine.snapshot().last_error, None);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_keep_the_payload_and_report_error() {
    let store = InMemoryDocumentStore::new();
    store.fail_next_writes((0..5).map(|_| http(500)));
    let engine = engine(&store, granting());

    let graph = titled(&Graph::new(), "unsaved");
    engine.schedule(&graph).unwrap();
    sleep(Duration::from_secs(60)).await;

    assert_eq!(store.write_attempts(), 5);
    assert_eq!(engine.status(), SyncStatus::Error);
    assert!(engine.snapshot().last_error.is_some());
    assert_eq!(engine.pending_payload(), Some(graph.to_json().unwrap()));

    // editing continues; the next save goes through
    engine.schedule(&titled(&graph, "saved")).unwrap();
    sleep(Duration::from_secs(5)).await;
    assert_eq!(engine.status(), SyncStatus::Idle);
    assert!(engine.pending_payload().is_none());
}

#[tokio::test(start_paused = true)]
async fn rapid_schedules_never_overlap_writes() {
    let store = InMemoryDocumentStore::new();
    store.set_write_delay(Some(Duration::from_secs(2)));
    let engine = engine(&store, granting());

    let mut graph = Graph::new();
    for i in 0..10 {
        graph = titled(&graph, &format!("edit {i}"));
        engine.schedule(&graph).unwrap();
        sleep(Duration::from_secs(1)).await;
    }
    sleep(Duration::from_secs(60)).await;

    let writes = store.writes();
    assert_eq!(store.max_concurrent_writes(), 1);
    assert!(writes.len() < 10);
    assert_eq!(writes.last().unwrap().1, graph.to_json().unwrap());
    assert!(engine.pending_payload().is_none());
}

#[tokio::test(start_paused = true)]
async fn edits_during_a_write_produce_exactly_one_follow_up() {
    let store = InMemoryDocumentStore::new();
    store.set_write_delay(Some(Duration::from_secs(2)));
    let engine = engine(&store, granting());

    let a = titled(&Graph::new(), "a");
    engine.schedule(&a).unwrap();
    // write of `a` runs from 0.9s to 2.9s
    sleep(Duration::from_secs(1)).await;

    let b = titled(&a, "b");
    let c = titled(&b, "c");
    let d = titled(&c, "d");
    for graph in [&b, &c, &d] {
        engine.schedule(graph).unwrap();
        sleep(Duration::from_millis(100)).await;
    }
    sleep(Duration::from_secs(30)).await;

    let payloads: Vec<String> = store.writes().into_iter().map(|(_, p)| p).collect();
    assert_eq!(payloads, vec![a.to_json().unwrap(), d.to_json().unwrap()]);
    assert_eq!(store.max_concurrent_writes(), 1);
}

#[tokio::test(start_paused = true)]
async fn flush_writes_immediately_and_cancels_the_timer() {
    let store = InMemoryDocumentStore::new();
    let engine = engine(&store, granting());

    engine.schedule(&titled(&Graph::new(), "now")).unwrap();
    engine.flush().await.unwrap();
    assert_eq!(store.writes().len(), 1);

    sleep(Duration::from_secs(5)).await;
    assert_eq!(store.write_attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn flush_with_nothing_pending_is_a_no_op() {
    let store = InMemoryDocumentStore::new();
    let engine = engine(&store, granting());

    engine.flush().await.unwrap();
    assert_eq!(store.write_attempts(), 0);
    assert_eq!(store.create_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn without_consent_start_waits_for_connect_and_writes_nothing() {
    let store = InMemoryDocumentStore::new();
    let engine = engine(&store, ScriptedCredentialSource::new());

    assert_eq!(engine.start().await.unwrap(), None);
    assert_eq!(engine.status(), SyncStatus::NeedsAuth);

    let graph = titled(&Graph::new(), "offline edit");
    engine.schedule(&graph).unwrap();
    sleep(Duration::from_secs(5)).await;

    assert_eq!(store.write_attempts(), 0);
    assert_eq!(store.find_calls(), 0);
    assert_eq!(engine.status(), SyncStatus::NeedsAuth);
    assert_eq!(engine.pending_payload(), Some(graph.to_json().unwrap()));
}

#[tokio::test(start_paused = true)]
async fn connect_writes_pending_payload_when_remote_is_empty() {
    let store = InMemoryDocumentStore::new();
    let engine = engine(
        &store,
        ScriptedCredentialSource::consenting(AccessToken::new("granted")),
    );
    engine.start().await.unwrap();

    let graph = titled(&Graph::new(), "before consent");
    engine.schedule(&graph).unwrap();
    sleep(Duration::from_secs(5)).await;
    assert_eq!(store.write_attempts(), 0);

    assert_eq!(engine.connect().await.unwrap(), None);

    let writes = store.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].1, graph.to_json().unwrap());
    assert_eq!(store.create_calls(), 1);
    assert_eq!(engine.status(), SyncStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn connect_prefers_remote_document_over_unsaved_local_edits() {
    let store = InMemoryDocumentStore::new();
    let remote = titled(&Graph::new(), "remote");
    store
        .insert_document("graph.json", &remote.to_json().unwrap())
        .await;
    let engine = engine(
        &store,
        ScriptedCredentialSource::consenting(AccessToken::new("granted")),
    );
    engine.start().await.unwrap();

    engine.schedule(&titled(&Graph::new(), "local")).unwrap();
    let loaded = engine.connect().await.unwrap();
    sleep(Duration::from_secs(5)).await;

    assert_eq!(loaded, Some(remote));
    assert!(engine.pending_payload().is_none());
    assert_eq!(store.write_attempts(), 0);
    assert_eq!(store.create_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn declined_connect_stays_in_needs_auth() {
    let store = InMemoryDocumentStore::new();
    let source = ScriptedCredentialSource::new();
    source.push_interactive(Ok(None));
    let engine = engine(&store, source);

    let err = engine.connect().await.unwrap_err();

    assert!(err.to_string().contains("declined"));
    assert_eq!(engine.status(), SyncStatus::NeedsAuth);
    assert_eq!(store.find_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn malformed_remote_content_is_treated_as_no_data() {
    let store = InMemoryDocumentStore::new();
    store.insert_document("graph.json", "{not json").await;
    let engine = engine(&store, granting());

    assert_eq!(engine.start().await.unwrap(), None);
    assert_eq!(engine.status(), SyncStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn status_changes_are_observable() {
    let store = InMemoryDocumentStore::new();
    let engine = engine(&store, ScriptedCredentialSource::new());
    let mut updates = engine.subscribe();

    engine.start().await.unwrap();

    updates.changed().await.unwrap();
    assert_eq!(updates.borrow_and_update().status, SyncStatus::NeedsAuth);
}
