use super::*;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::time::Duration;
use tether_client::{ClientState, HttpTransport, StreamingClient};
use tether_core::{SessionConfig, SessionRegistry};
use tether_protocol::{EventKind, SessionStatus, StreamEvent};
use tower::ServiceExt;
use uuid::Uuid;

const WAIT: Duration = Duration::from_secs(10);

fn test_state() -> AppState {
    let config = SessionConfig::default().with_stop_grace(Duration::from_millis(500));
    let manager = Arc::new(SessionManager::new(config, Arc::new(SessionRegistry::new())));
    AppState::new(manager, ShutdownController::new()).with_max_output_limit(50)
}

fn app(state: &AppState) -> Router {
    api_router(state.clone(), ApiAuth::default())
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn spawn_sh(state: &AppState, script: &str) -> Uuid {
    let (status, body) = send(
        app(state),
        post_json(
            "/api/v1/sessions",
            json!({
                "command": "sh",
                "args": ["-c", script],
                "working_directory": std::env::temp_dir(),
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["data"]["session_id"].as_str().unwrap().parse().unwrap()
}

async fn wait_ended(state: &AppState, id: Uuid) {
    let subscription = state.manager.subscribe(id, None).unwrap();
    tokio::time::timeout(WAIT, subscription.into_stream().collect::<Vec<_>>())
        .await
        .expect("session did not end");
}

#[tokio::test]
async fn test_health_reports_counts_without_auth() {
    let state = test_state();
    let id = spawn_sh(&state, "exit 0").await;
    wait_ended(&state, id).await;

    let app = api_router(state.clone(), ApiAuth::new(Some("secret".into())));
    let (status, body) = send(app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["store"], "memory");
    assert_eq!(body["sessions"]["total"], 1);
    assert_eq!(body["sessions"]["completed"], 1);
}

#[tokio::test]
async fn test_create_get_and_list() {
    let state = test_state();
    let id = spawn_sh(&state, "echo one; echo two").await;
    wait_ended(&state, id).await;

    let (status, body) = send(app(&state), get(&format!("/api/v1/sessions/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "completed");
    assert_eq!(body["data"]["exit_code"], 0);
    assert_eq!(body["data"]["latest_sequence"], 2);

    let (status, body) = send(app(&state), get("/api/v1/sessions")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_spawn_failure_is_unprocessable() {
    let state = test_state();
    let (status, body) = send(
        app(&state),
        post_json(
            "/api/v1/sessions",
            json!({ "command": "/definitely/not/a/binary" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "SPAWN_FAILED");
}

#[tokio::test]
async fn test_empty_command_is_bad_request() {
    let state = test_state();
    let (status, body) = send(
        app(&state),
        post_json("/api/v1/sessions", json!({ "command": "  " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let state = test_state();
    let id = Uuid::new_v4();
    for request in [
        get(&format!("/api/v1/sessions/{id}")),
        get(&format!("/api/v1/sessions/{id}/stream")),
        post_json(&format!("/api/v1/sessions/{id}/stop"), json!({})),
    ] {
        let (status, body) = send(app(&state), request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");
    }
}

#[tokio::test]
async fn test_pause_resume_and_conflicts() {
    let state = test_state();
    let id = spawn_sh(&state, "sleep 30").await;
    let pause = format!("/api/v1/sessions/{id}/pause");
    let resume = format!("/api/v1/sessions/{id}/resume");

    let (status, body) = send(app(&state), post_json(&pause, json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "paused");

    let (status, body) = send(app(&state), post_json(&pause, json!({}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "INVALID_STATE");

    let (status, body) = send(
        app(&state),
        post_json(&format!("/api/v1/sessions/{id}/input"), json!({ "text": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");

    let (status, body) = send(app(&state), post_json(&resume, json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "active");

    let (status, body) = send(
        app(&state),
        post_json(&format!("/api/v1/sessions/{id}/stop"), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "failed");

    // Stop is idempotent
    let (status, _) = send(
        app(&state),
        post_json(&format!("/api/v1/sessions/{id}/stop"), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_send_input_and_recent_output() {
    let state = test_state();
    let id = spawn_sh(&state, "read answer; echo a; echo b; echo got:$answer").await;

    let (status, body) = send(
        app(&state),
        post_json(
            &format!("/api/v1/sessions/{id}/input"),
            json!({ "text": "hello" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    wait_ended(&state, id).await;

    let (status, body) = send(
        app(&state),
        get(&format!("/api/v1/sessions/{id}/output?limit=2")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let lines = body["data"].as_array().unwrap();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["content"], "b");
    assert_eq!(lines[1]["content"], "got:hello");
    assert_eq!(lines[1]["sequence"], 3);
}

#[tokio::test]
async fn test_stream_replays_finished_session() {
    let state = test_state();
    let id = spawn_sh(&state, "echo one; echo two; echo three").await;
    wait_ended(&state, id).await;

    let response = app(&state)
        .oneshot(get(&format!("/api/v1/sessions/{id}/stream?lastSequence=1")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "text/event-stream"
    );

    let bytes = tokio::time::timeout(WAIT, to_bytes(response.into_body(), usize::MAX))
        .await
        .expect("stream did not end")
        .unwrap();
    let mut decoder = tether_protocol::SseDecoder::new();
    let events: Vec<StreamEvent> = decoder
        .push(&bytes)
        .into_iter()
        .map(|e| e.unwrap())
        .collect();

    let sequences: Vec<u64> = events.iter().filter_map(StreamEvent::sequence).collect();
    assert_eq!(sequences, vec![2, 3]);
    assert_eq!(
        events.last(),
        Some(&StreamEvent::Complete { exit_code: Some(0) })
    );
    assert_eq!(decoder.last_event_id(), Some("3"));
}

#[tokio::test]
async fn test_stream_honours_last_event_id() {
    let state = test_state();
    let id = spawn_sh(&state, "echo one; echo two").await;
    wait_ended(&state, id).await;

    let request = Request::builder()
        .uri(format!("/api/v1/sessions/{id}/stream"))
        .header("last-event-id", "2")
        .body(Body::empty())
        .unwrap();
    let response = app(&state).oneshot(request).await.unwrap();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8_lossy(&bytes);
    assert!(!text.contains("event: output"));
    assert!(text.contains("event: complete"));
}

#[tokio::test]
async fn test_auth_required_when_token_configured() {
    let state = test_state();
    let app = api_router(state, ApiAuth::new(Some("secret".into())));

    let (status, body) = send(app.clone(), get("/api/v1/sessions")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let wrong = Request::builder()
        .uri("/api/v1/sessions")
        .header("authorization", "Bearer nope")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(app.clone(), wrong).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let right = Request::builder()
        .uri("/api/v1/sessions")
        .header("authorization", "Bearer secret")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(app, right).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([]));
}

#[tokio::test]
async fn test_create_rejected_while_shutting_down() {
    let state = test_state();
    state.shutdown.shutdown(Some(state.manager.as_ref())).await;

    let (status, body) = send(
        app(&state),
        post_json("/api/v1/sessions", json!({ "command": "true" })),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "SHUTTING_DOWN");
}

#[tokio::test]
async fn test_streaming_client_against_live_server() {
    let state = test_state();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = app(&state);
    let server = tokio::spawn(async move { axum::serve(listener, router).await });

    let id = spawn_sh(&state, "echo one; sleep 0.3; echo two >&2; sleep 0.3; exit 4").await;

    let transport = HttpTransport::new(format!("http://{addr}")).unwrap();
    let client = StreamingClient::new(Arc::new(transport));
    let received: Arc<Mutex<Vec<StreamEvent>>> = Arc::default();
    let sink = Arc::clone(&received);
    client.on_any(move |event| sink.lock().push(event.clone()));
    let errors = Arc::new(Mutex::new(0usize));
    let error_count = Arc::clone(&errors);
    client.on(EventKind::Error, move |_| *error_count.lock() += 1);

    let mut state_rx = client.watch_state();
    client.connect(id);
    tokio::time::timeout(WAIT, state_rx.wait_for(|s| *s == ClientState::Closed))
        .await
        .expect("client did not finish")
        .unwrap();
    while client.tick() > 0 {}

    let events = received.lock().clone();
    let lines: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Output(line) => Some(line.content.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(lines, vec!["one", "two"]);
    assert!(events.iter().any(|e| matches!(
        e,
        StreamEvent::Status {
            state: SessionStatus::Failed
        }
    )));
    assert_eq!(
        events.last(),
        Some(&StreamEvent::Error {
            message: "process exited with code 4".to_string()
        })
    );
    assert_eq!(*errors.lock(), 1);
    assert_eq!(client.last_sequence(), Some(2));

    server.abort();
}
