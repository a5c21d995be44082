//! Integration tests for Tether
//!
//! These tests verify the integration between different crates:
//! - tether-core: sessions, replay and fan-out
//! - tether-store: crash-recovery records
//! - tether-client: reconnecting consumer driven by core subscriptions

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tether_client::{
    BackoffPolicy, ClientError, ClientOptions, ClientState, EventStream, StreamingClient,
    Transport,
};
use tether_core::{
    reconcile, SessionConfig, SessionManager, SessionRegistry, SignalProbe, SpawnRequest,
};
use tether_protocol::{LogStream, SessionStatus, StreamEvent};
use tether_store::{MemorySessionStore, SessionRecord, SessionStore, SqliteSessionStore};
use uuid::Uuid;

const WAIT: Duration = Duration::from_secs(10);

fn sh(script: &str) -> SpawnRequest {
    SpawnRequest::new("sh", std::env::temp_dir()).with_args(["-c", script])
}

fn manager_with_store(store: Arc<dyn SessionStore>) -> Arc<SessionManager> {
    Arc::new(
        SessionManager::new(
            SessionConfig::default().with_stop_grace(Duration::from_millis(500)),
            Arc::new(SessionRegistry::new()),
        )
        .with_store(store),
    )
}

async fn wait_ended(manager: &SessionManager, id: Uuid) -> Vec<StreamEvent> {
    let subscription = manager.subscribe(id, None).unwrap();
    tokio::time::timeout(WAIT, subscription.into_stream().collect::<Vec<_>>())
        .await
        .expect("session did not end")
}

// ============================================================================
// In-process transport
// ============================================================================

/// Serves core subscriptions directly; each connection can be cut after a
/// number of events to simulate a dropped network link.
struct LocalTransport {
    manager: Arc<SessionManager>,
    cuts: Mutex<VecDeque<usize>>,
    calls: Mutex<Vec<Option<u64>>>,
}

impl LocalTransport {
    fn new(manager: Arc<SessionManager>, cuts: Vec<usize>) -> Arc<Self> {
        Arc::new(Self {
            manager,
            cuts: Mutex::new(cuts.into()),
            calls: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn connect(
        &self,
        session_id: Uuid,
        last_sequence: Option<u64>,
    ) -> tether_client::Result<EventStream> {
        self.calls.lock().push(last_sequence);
        let subscription = self
            .manager
            .subscribe(session_id, last_sequence)
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        let limit = self.cuts.lock().pop_front().unwrap_or(usize::MAX);
        Ok(subscription.into_stream().take(limit).map(Ok).boxed())
    }
}

fn fast_client(transport: Arc<LocalTransport>) -> StreamingClient {
    let backoff = BackoffPolicy::new()
        .with_base_delay(Duration::from_millis(10))
        .with_max_delay(Duration::from_millis(50))
        .with_jitter_ratio(0.0);
    StreamingClient::with_options(transport, ClientOptions::default().with_backoff(backoff))
}

async fn run_until_closed(client: &StreamingClient) -> ClientState {
    let mut state = client.watch_state();
    let final_state = tokio::time::timeout(
        WAIT,
        state.wait_for(|s| matches!(s, ClientState::Closed | ClientState::GaveUp { .. })),
    )
    .await
    .expect("client did not finish")
    .unwrap()
    .clone();
    while client.tick() > 0 {}
    final_state
}

// ============================================================================
// Core + client
// ============================================================================

#[tokio::test]
async fn test_client_resumes_after_dropped_connection() {
    let manager = manager_with_store(Arc::new(MemorySessionStore::new()));
    let id = manager
        .create(sh("for i in 1 2 3 4 5; do echo line$i; done"))
        .await
        .unwrap();
    wait_ended(&manager, id).await;

    // First connection delivers lines 1 and 2, then the link drops
    let transport = LocalTransport::new(Arc::clone(&manager), vec![2]);
    let client = fast_client(Arc::clone(&transport));
    let received: Arc<Mutex<Vec<StreamEvent>>> = Arc::default();
    let sink = Arc::clone(&received);
    client.on_any(move |event| sink.lock().push(event.clone()));

    client.connect(id);
    assert_eq!(run_until_closed(&client).await, ClientState::Closed);

    let events = received.lock().clone();
    let sequences: Vec<u64> = events.iter().filter_map(StreamEvent::sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3, 4, 5]);
    assert_eq!(
        events.last(),
        Some(&StreamEvent::Complete { exit_code: Some(0) })
    );
    assert_eq!(*transport.calls.lock(), vec![None, Some(2)]);
}

#[tokio::test]
async fn test_many_clients_see_identical_live_stream() {
    let manager = manager_with_store(Arc::new(MemorySessionStore::new()));
    let id = manager
        .create(sh("sleep 0.2; for i in $(seq 1 50); do echo $i; done; echo bye >&2"))
        .await
        .unwrap();

    let mut clients = Vec::new();
    for _ in 0..4 {
        let transport = LocalTransport::new(Arc::clone(&manager), Vec::new());
        let client = fast_client(transport);
        let received: Arc<Mutex<Vec<StreamEvent>>> = Arc::default();
        let sink = Arc::clone(&received);
        client.on_any(move |event| sink.lock().push(event.clone()));
        client.connect(id);
        clients.push((client, received));
    }

    let mut outputs = Vec::new();
    for (client, received) in &clients {
        assert_eq!(run_until_closed(client).await, ClientState::Closed);
        let lines: Vec<(u64, LogStream, String)> = received
            .lock()
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Output(line) => {
                    Some((line.sequence, line.stream, line.content.clone()))
                }
                _ => None,
            })
            .collect();
        outputs.push(lines);
    }

    assert_eq!(outputs[0].len(), 51);
    assert!(outputs[0].iter().any(|l| l.1 == LogStream::Stderr && l.2 == "bye"));
    for other in &outputs[1..] {
        assert_eq!(other, &outputs[0]);
    }
}

#[tokio::test]
async fn test_client_gives_up_on_unknown_session() {
    let manager = manager_with_store(Arc::new(MemorySessionStore::new()));
    let transport = LocalTransport::new(Arc::clone(&manager), Vec::new());
    let backoff = BackoffPolicy::new()
        .with_base_delay(Duration::from_millis(1))
        .with_max_attempts(2)
        .with_jitter_ratio(0.0);
    let client = StreamingClient::with_options(
        Arc::clone(&transport) as Arc<dyn Transport>,
        ClientOptions::default().with_backoff(backoff),
    );
    let reasons: Arc<Mutex<Vec<String>>> = Arc::default();
    let sink = Arc::clone(&reasons);
    client.on_give_up(move |reason| sink.lock().push(reason.to_string()));

    client.connect(Uuid::new_v4());
    let state = run_until_closed(&client).await;

    assert!(matches!(state, ClientState::GaveUp { .. }));
    assert_eq!(transport.calls.lock().len(), 3);
    assert_eq!(reasons.lock().len(), 1);
}

// ============================================================================
// Core + store
// ============================================================================

#[tokio::test]
async fn test_sqlite_store_tracks_session_lifecycle() {
    let store = Arc::new(SqliteSessionStore::in_memory().await.unwrap());
    let manager = manager_with_store(store.clone());

    let id = manager.create(sh("echo hi; exit 1")).await.unwrap();
    let events = wait_ended(&manager, id).await;
    assert!(matches!(events.last(), Some(StreamEvent::Error { .. })));

    let record = store.get(id).await.unwrap().unwrap();
    assert_eq!(record.status, SessionStatus::Failed);
    assert!(record.ended_at.is_some());
    assert!(record.process_group.is_some());
    assert!(store.active_sessions().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_restart_reconciles_orphaned_records() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("sessions.db");

    // A previous server left a record behind without a live process group
    let orphan = Uuid::new_v4();
    {
        let store = SqliteSessionStore::from_path(&db_path).await.unwrap();
        store
            .record_started(&SessionRecord::started(orphan, None, None))
            .await
            .unwrap();
    }

    let store = SqliteSessionStore::from_path(&db_path).await.unwrap();
    let report = reconcile(&store, &SignalProbe, &[]).await.unwrap();
    assert_eq!(report.reconciled, vec![orphan]);
    assert!(report.surviving_groups.is_empty());

    let record = store.get(orphan).await.unwrap().unwrap();
    assert_eq!(record.status, SessionStatus::Failed);
}

#[tokio::test]
async fn test_reconcile_never_signals_a_recycled_group() {
    use std::os::unix::process::CommandExt;

    // An unrelated process that happens to own the persisted group id
    let mut bystander = std::process::Command::new("sleep")
        .arg("30")
        .process_group(0)
        .spawn()
        .unwrap();
    let pgid = bystander.id() as i32;

    let store = MemorySessionStore::new();
    let stale = Uuid::new_v4();
    store
        .record_started(&SessionRecord::started(stale, None, Some(pgid)))
        .await
        .unwrap();

    let report = reconcile(&store, &SignalProbe, &[]).await.unwrap();
    assert_eq!(report.reconciled, vec![stale]);
    assert_eq!(report.surviving_groups, vec![pgid]);
    assert_eq!(
        store.get(stale).await.unwrap().unwrap().status,
        SessionStatus::Failed
    );

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(bystander.try_wait().unwrap().is_none());
    bystander.kill().unwrap();
    bystander.wait().unwrap();
}
