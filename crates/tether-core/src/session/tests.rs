use super::*;
use crate::config::SessionConfig;
use crate::error::Error;
use crate::hooks::{MockTerminalHook, TerminalHook};
use crate::process::{GroupProbe, ProcessGroup};
use crate::subscriber::Subscription;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::mock;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tether_protocol::{ExecutionMode, LogStream, QuestionKind, SessionStatus, StreamEvent};
use tether_store::{MemorySessionStore, SessionRecord, SessionStore};
use uuid::Uuid;

mock! {
    pub Store {}

    #[async_trait]
    impl SessionStore for Store {
        async fn record_started(&self, record: &SessionRecord) -> tether_store::Result<()>;
        async fn record_status(
            &self,
            id: Uuid,
            status: SessionStatus,
            at: DateTime<Utc>,
        ) -> tether_store::Result<()>;
        async fn active_sessions(&self) -> tether_store::Result<Vec<SessionRecord>>;
        async fn get(&self, id: Uuid) -> tether_store::Result<Option<SessionRecord>>;
        fn name(&self) -> &str;
    }
}

const WAIT: Duration = Duration::from_secs(10);

fn manager() -> SessionManager {
    manager_with(SessionConfig::default().with_stop_grace(Duration::from_secs(1)))
}

fn manager_with(config: SessionConfig) -> SessionManager {
    SessionManager::new(config, Arc::new(SessionRegistry::new()))
}

fn sh(script: &str) -> SpawnRequest {
    SpawnRequest::new("sh", std::env::temp_dir()).with_args(["-c", script])
}

async fn collect(mut subscription: Subscription) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    tokio::time::timeout(WAIT, async {
        while let Some(event) = subscription.recv().await {
            events.push(event);
        }
    })
    .await
    .expect("stream did not end");
    events
}

async fn next_output(subscription: &mut Subscription) -> String {
    tokio::time::timeout(WAIT, async {
        loop {
            match subscription.recv().await {
                Some(StreamEvent::Output(line)) => return line.content,
                Some(_) => continue,
                None => panic!("stream ended before output"),
            }
        }
    })
    .await
    .expect("no output")
}

fn outputs(events: &[StreamEvent]) -> Vec<(u64, String)> {
    events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Output(line) => Some((line.sequence, line.content.clone())),
            _ => None,
        })
        .collect()
}

fn terminals(events: &[StreamEvent]) -> Vec<&StreamEvent> {
    events.iter().filter(|e| e.is_terminal()).collect()
}

async fn wait_finished(manager: &SessionManager, id: Uuid) {
    let handle = manager.registry().get(id).unwrap();
    tokio::time::timeout(WAIT, handle.wait_finished())
        .await
        .expect("session did not finish");
}

// ── Lifecycle ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_output_is_ordered_and_session_completes() {
    let manager = manager();
    let id = manager
        .create(sh("for i in 1 2 3 4 5; do echo line$i; done"))
        .await
        .unwrap();
    let events = collect(manager.subscribe(id, None).unwrap()).await;

    let lines = outputs(&events);
    assert_eq!(
        lines,
        (1..=5).map(|i| (i, format!("line{i}"))).collect::<Vec<_>>()
    );
    assert_eq!(
        events.last(),
        Some(&StreamEvent::Complete { exit_code: Some(0) })
    );
    assert_eq!(terminals(&events).len(), 1);

    wait_finished(&manager, id).await;
    let summary = manager.get(id).unwrap();
    assert_eq!(summary.status, SessionStatus::Completed);
    assert_eq!(summary.exit_code, Some(0));
    assert!(summary.ended_at.is_some());
}

#[tokio::test]
async fn test_stderr_is_captured() {
    let manager = manager();
    let id = manager.create(sh("echo oops >&2; exit 2")).await.unwrap();
    wait_finished(&manager, id).await;

    let lines = manager.recent_output(id, 10).unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].stream, LogStream::Stderr);
    assert_eq!(lines[0].content, "oops");

    let events = collect(manager.subscribe(id, None).unwrap()).await;
    assert_eq!(
        events.last(),
        Some(&StreamEvent::Error {
            message: "process exited with code 2".to_string()
        })
    );
    assert_eq!(manager.get(id).unwrap().status, SessionStatus::Failed);
}

#[tokio::test]
async fn test_send_input_reaches_stdin() {
    let manager = manager();
    let id = manager
        .create(sh("read answer; echo got $answer"))
        .await
        .unwrap();
    let subscription = manager.subscribe(id, None).unwrap();

    manager.send_input(id, "hello").await.unwrap();
    let events = collect(subscription).await;
    assert_eq!(outputs(&events), vec![(1, "got hello".to_string())]);
}

#[tokio::test]
async fn test_spawn_errors() {
    let manager = manager();
    let missing = manager
        .create(SpawnRequest::new(
            "tether-test-no-such-binary",
            std::env::temp_dir(),
        ))
        .await;
    assert!(matches!(missing, Err(Error::Spawn { .. })));

    let bad_dir = manager
        .create(SpawnRequest::new("true", "/nonexistent/tether/dir"))
        .await;
    assert!(matches!(bad_dir, Err(Error::Spawn { .. })));

    let empty = manager.create(SpawnRequest::new("  ", std::env::temp_dir())).await;
    assert!(matches!(empty, Err(Error::Spawn { .. })));
    assert!(manager.registry().is_empty());
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let manager = manager();
    let id = Uuid::new_v4();
    assert!(matches!(manager.stop(id).await, Err(Error::NotFound(_))));
    assert!(matches!(manager.pause(id).await, Err(Error::NotFound(_))));
    assert!(matches!(manager.get(id), Err(Error::NotFound(_))));
    assert!(matches!(manager.subscribe(id, None), Err(Error::NotFound(_))));
    assert!(matches!(
        manager.send_input(id, "x").await,
        Err(Error::NotFound(_))
    ));
}

// ── Replay ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_reconnect_replays_missed_lines_once() {
    let manager = manager();
    let id = manager.create(sh("sleep 30")).await.unwrap();

    let mut first = manager.subscribe(id, None).unwrap();
    manager.append_log(id, LogStream::Stdout, "one").unwrap();
    assert_eq!(next_output(&mut first).await, "one");
    drop(first);
    assert_eq!(manager.get(id).unwrap().subscribers, 0);

    manager.append_log(id, LogStream::Stdout, "two").unwrap();
    manager.append_log(id, LogStream::Stdout, "three").unwrap();

    let resumed = manager.subscribe(id, Some(1)).unwrap();
    manager.stop(id).await.unwrap();
    let events = collect(resumed).await;

    assert_eq!(
        outputs(&events),
        vec![(2, "two".to_string()), (3, "three".to_string())]
    );
    assert!(!events.iter().any(|e| matches!(e, StreamEvent::Gap(_))));
}

#[tokio::test]
async fn test_replay_then_live_has_no_gaps_or_duplicates() {
    let manager = manager();
    let id = manager.create(sh("sleep 30")).await.unwrap();
    for i in 1..=50 {
        manager.append_log(id, LogStream::Stdout, format!("{i}")).unwrap();
    }

    let subscription = manager.subscribe(id, Some(20)).unwrap();
    let writer = {
        let handle = manager.registry().get(id).unwrap();
        tokio::spawn(async move {
            for i in 51..=100 {
                handle.append(LogStream::Stdout, format!("{i}")).unwrap();
                tokio::task::yield_now().await;
            }
        })
    };
    writer.await.unwrap();
    manager.stop(id).await.unwrap();

    let sequences: Vec<u64> = outputs(&collect(subscription).await)
        .into_iter()
        .map(|(seq, _)| seq)
        .collect();
    assert_eq!(sequences, (21..=100).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_gap_when_history_was_evicted() {
    let manager = manager_with(SessionConfig::default().with_ring_buffer_capacity(3));
    let id = manager.create(sh("sleep 30")).await.unwrap();
    for i in 1..=10 {
        manager.append_log(id, LogStream::Stdout, format!("{i}")).unwrap();
    }

    let mut subscription = manager.subscribe(id, Some(2)).unwrap();
    let mut replay = Vec::new();
    while subscription.pending_replay() > 0 {
        replay.push(subscription.recv().await.unwrap());
    }
    manager.stop(id).await.unwrap();

    assert_eq!(
        replay[0],
        StreamEvent::Status {
            state: SessionStatus::Active
        }
    );
    assert_eq!(
        replay[1],
        StreamEvent::Gap(tether_protocol::Gap {
            requested: 2,
            oldest_available: 8
        })
    );
    assert_eq!(
        outputs(&replay).into_iter().map(|(s, _)| s).collect::<Vec<_>>(),
        vec![8, 9, 10]
    );
    assert_eq!(manager.get(id).unwrap().buffered_lines, 3);
}

#[tokio::test]
async fn test_subscribers_see_identical_sequences() {
    let manager = manager();
    let id = manager
        .create(sh("for i in $(seq 1 200); do echo $i; done"))
        .await
        .unwrap();
    let a = manager.subscribe(id, None).unwrap();
    let b = manager.subscribe(id, None).unwrap();
    let (a, b) = tokio::join!(collect(a), collect(b));

    let seq_a: Vec<u64> = outputs(&a).into_iter().map(|(s, _)| s).collect();
    let seq_b: Vec<u64> = outputs(&b).into_iter().map(|(s, _)| s).collect();
    assert_eq!(seq_a, seq_b);
    assert_eq!(seq_a, (1..=200).collect::<Vec<_>>());
}

// ── Terminal transition ─────────────────────────────────────────────────

struct StatusProbeHook {
    registry: Arc<SessionRegistry>,
    saw_terminal_status: AtomicBool,
    called: AtomicBool,
}

#[async_trait]
impl TerminalHook for StatusProbeHook {
    async fn on_terminal(&self, session_id: Uuid, _exit_code: Option<i32>) {
        tokio::time::sleep(Duration::from_millis(50)).await;
        if let Some(handle) = self.registry.get(session_id) {
            if handle.status().is_terminal() {
                self.saw_terminal_status.store(true, Ordering::SeqCst);
            }
        }
        self.called.store(true, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_hook_runs_before_terminal_event() {
    let registry = Arc::new(SessionRegistry::new());
    let hook = Arc::new(StatusProbeHook {
        registry: registry.clone(),
        saw_terminal_status: AtomicBool::new(false),
        called: AtomicBool::new(false),
    });
    let manager =
        SessionManager::new(SessionConfig::default(), registry).with_hook(hook.clone());

    let id = manager.create(sh("echo done")).await.unwrap();
    let mut subscription = manager.subscribe(id, None).unwrap();
    loop {
        let event = tokio::time::timeout(WAIT, subscription.recv())
            .await
            .unwrap()
            .unwrap();
        if event.is_terminal() {
            assert!(hook.called.load(Ordering::SeqCst));
            break;
        }
    }
    assert!(!hook.saw_terminal_status.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_hook_called_once_with_exit_code() {
    let mut hook = MockTerminalHook::new();
    hook.expect_on_terminal()
        .withf(|_, code| *code == Some(3))
        .times(1)
        .returning(|_, _| ());
    let manager = manager().with_hook(Arc::new(hook));

    let id = manager.create(sh("exit 3")).await.unwrap();
    wait_finished(&manager, id).await;
    // A late stop must not produce a second transition
    manager.stop(id).await.unwrap();

    let events = collect(manager.subscribe(id, None).unwrap()).await;
    assert_eq!(terminals(&events).len(), 1);
}

#[tokio::test]
async fn test_append_rejected_after_terminal() {
    let manager = manager();
    let id = manager.create(sh("true")).await.unwrap();
    wait_finished(&manager, id).await;

    let result = manager.append_log(id, LogStream::Stdout, "late");
    assert!(matches!(result, Err(Error::InvalidState(_))));
    assert_eq!(manager.get(id).unwrap().latest_sequence, 0);
}

#[tokio::test]
async fn test_store_sees_start_and_terminal_status() {
    let mut store = MockStore::new();
    store
        .expect_record_started()
        .withf(|record| record.status == SessionStatus::Active && record.process_group.is_some())
        .times(1)
        .returning(|_| Ok(()));
    store
        .expect_record_status()
        .withf(|_, status, _| *status == SessionStatus::Completed)
        .times(1)
        .returning(|_, _, _| Ok(()));
    let manager = manager().with_store(Arc::new(store));

    let id = manager.create(sh("true")).await.unwrap();
    wait_finished(&manager, id).await;
}

// ── Control ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_stop_escalates_to_kill() {
    let manager = manager();
    let id = manager
        .create(sh("trap '' TERM; echo ready; while true; do sleep 0.1; done"))
        .await
        .unwrap();
    let mut subscription = manager.subscribe(id, None).unwrap();
    assert_eq!(next_output(&mut subscription).await, "ready");

    let started = Instant::now();
    manager.stop(id).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));

    let events = collect(subscription).await;
    assert_eq!(
        events.last(),
        Some(&StreamEvent::Error {
            message: "stopped by request".to_string()
        })
    );
    assert_eq!(terminals(&events).len(), 1);
    let summary = manager.get(id).unwrap();
    assert_eq!(summary.status, SessionStatus::Failed);
    assert_eq!(summary.exit_code, None);
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let manager = manager();
    let id = manager.create(sh("sleep 30")).await.unwrap();
    manager.stop(id).await.unwrap();
    manager.stop(id).await.unwrap();
    assert_eq!(manager.get(id).unwrap().status, SessionStatus::Failed);
}

#[tokio::test]
async fn test_pause_resume_state_machine() {
    let manager = manager();
    let id = manager.create(sh("sleep 30")).await.unwrap();
    let mut subscription = manager.subscribe(id, None).unwrap();
    assert_eq!(
        subscription.recv().await,
        Some(StreamEvent::Status {
            state: SessionStatus::Active
        })
    );

    assert!(matches!(manager.resume(id).await, Err(Error::InvalidState(_))));
    manager.pause(id).await.unwrap();
    assert_eq!(manager.get(id).unwrap().status, SessionStatus::Paused);
    assert!(matches!(manager.pause(id).await, Err(Error::InvalidState(_))));
    assert!(matches!(
        manager.send_input(id, "x").await,
        Err(Error::InvalidState(_))
    ));
    manager.resume(id).await.unwrap();
    assert_eq!(manager.get(id).unwrap().status, SessionStatus::Active);

    assert_eq!(
        subscription.recv().await,
        Some(StreamEvent::Status {
            state: SessionStatus::Paused
        })
    );
    assert_eq!(
        subscription.recv().await,
        Some(StreamEvent::Status {
            state: SessionStatus::Active
        })
    );

    manager.stop(id).await.unwrap();
    assert!(matches!(manager.pause(id).await, Err(Error::InvalidState(_))));
}

#[tokio::test]
async fn test_stop_paused_session() {
    let manager = manager();
    let id = manager.create(sh("sleep 30")).await.unwrap();
    manager.pause(id).await.unwrap();

    let started = Instant::now();
    manager.stop(id).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(manager.get(id).unwrap().status, SessionStatus::Failed);
}

#[tokio::test]
async fn test_interactive_question_is_broadcast() {
    let manager = manager();
    let id = manager
        .create(
            sh("echo 'Apply changes? [y/n]'; read a; echo $a").with_mode(ExecutionMode::Interactive),
        )
        .await
        .unwrap();
    let mut subscription = manager.subscribe(id, None).unwrap();

    let question = tokio::time::timeout(WAIT, async {
        loop {
            if let Some(StreamEvent::Question(q)) = subscription.recv().await {
                return q;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(question.kind, QuestionKind::Confirm);

    // A late subscriber still sees the unanswered question
    let late = manager.subscribe(id, None).unwrap();
    manager.send_input(id, "yes").await.unwrap();
    let events = collect(late).await;
    assert!(events
        .iter()
        .any(|e| matches!(e, StreamEvent::Question(q) if q.interaction_id == question.interaction_id)));
}

// ── Sweep & recovery ────────────────────────────────────────────────────

#[tokio::test]
async fn test_sweep_evicts_idle_sessions() {
    let manager = manager_with(
        SessionConfig::default()
            .with_stop_grace(Duration::from_secs(1))
            .with_timeouts(Duration::from_secs(60), Duration::from_secs(3600)),
    );
    let idle = manager.create(sh("sleep 30")).await.unwrap();

    let report = manager
        .sweep(Utc::now() + chrono::Duration::seconds(120))
        .await;
    assert_eq!(report.idle, vec![idle]);

    let events = collect(manager.subscribe(idle, None).unwrap()).await;
    assert_eq!(
        events.last(),
        Some(&StreamEvent::Error {
            message: "idle timeout".to_string()
        })
    );
}

#[tokio::test]
async fn test_sweep_evicts_overlong_sessions() {
    let manager = manager_with(
        SessionConfig::default()
            .with_stop_grace(Duration::from_secs(1))
            .with_timeouts(Duration::from_secs(3600), Duration::from_secs(60)),
    );
    let id = manager.create(sh("sleep 30")).await.unwrap();

    let report = manager
        .sweep(Utc::now() + chrono::Duration::seconds(120))
        .await;
    assert_eq!(report.expired, vec![id]);
    assert_eq!(manager.get(id).unwrap().status, SessionStatus::Failed);
}

#[tokio::test]
async fn test_sweep_releases_ended_sessions_after_retention() {
    let manager = manager();
    let id = manager.create(sh("true")).await.unwrap();
    wait_finished(&manager, id).await;

    assert!(manager.sweep(Utc::now()).await.released.is_empty());
    let report = manager
        .sweep(Utc::now() + chrono::Duration::seconds(7200))
        .await;
    assert_eq!(report.released, vec![id]);
    assert!(matches!(manager.get(id), Err(Error::NotFound(_))));
}

#[derive(Default)]
struct FakeProbe {
    alive: HashSet<i32>,
}

impl GroupProbe for FakeProbe {
    fn exists(&self, group: ProcessGroup) -> bool {
        self.alive.contains(&group.id())
    }
}

#[tokio::test]
async fn test_reconcile_marks_orphans_failed() {
    let store = Arc::new(MemorySessionStore::new());
    let dead = SessionRecord::started(Uuid::new_v4(), None, Some(999_001));
    let alive = SessionRecord::started(Uuid::new_v4(), Some("job-7".into()), Some(999_002));
    let no_group = SessionRecord::started(Uuid::new_v4(), None, None);
    for record in [&dead, &alive, &no_group] {
        store.record_started(record).await.unwrap();
    }

    let probe = Arc::new(FakeProbe {
        alive: [999_002].into_iter().collect(),
    });
    let manager = manager()
        .with_store(store.clone())
        .with_probe(probe.clone());

    let report = manager.reconcile().await.unwrap();
    assert_eq!(report.reconciled.len(), 3);
    assert_eq!(report.surviving_groups, vec![999_002]);
    assert!(store.active_sessions().await.unwrap().is_empty());
    let record = store.get(alive.id).await.unwrap().unwrap();
    assert_eq!(record.status, SessionStatus::Failed);
    assert!(record.ended_at.is_some());
}

#[tokio::test]
async fn test_reconcile_skips_own_sessions() {
    let store = Arc::new(MemorySessionStore::new());
    let manager = manager().with_store(store.clone());
    let id = manager.create(sh("sleep 30")).await.unwrap();

    let report = manager.reconcile().await.unwrap();
    assert!(report.reconciled.is_empty());
    assert_eq!(
        store.get(id).await.unwrap().unwrap().status,
        SessionStatus::Active
    );
    manager.stop(id).await.unwrap();
}

#[tokio::test]
async fn test_shutdown_stops_live_sessions() {
    let manager = manager();
    let a = manager.create(sh("sleep 30")).await.unwrap();
    let b = manager.create(sh("sleep 30")).await.unwrap();
    assert_eq!(manager.registry().live_count(), 2);

    manager.shutdown().await;

    assert_eq!(manager.registry().live_count(), 0);
    for id in [a, b] {
        assert_eq!(manager.get(id).unwrap().status, SessionStatus::Failed);
    }
    assert_eq!(manager.list().len(), 2);
}
