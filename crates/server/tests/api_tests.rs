use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{self, Request, StatusCode};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tower::ServiceExt;

use hopsim_core::payload;
use hopsim_core::{Action, ActionKind, HttpAction, PAYLOAD_HEADER, PayloadLimits, Target};
use hopsim_executor::{DispatchError, DispatchRequest, Dispatcher, Interpreter, InterpreterConfig};
use hopsim_script::Sandbox;
use hopsim_server::api::{self, AppState};

// -- Mock dispatcher ------------------------------------------------------

/// Records outbound calls and answers each with a fixed value.
#[derive(Debug)]
struct RecordingDispatcher {
    response: Value,
    calls: Mutex<Vec<DispatchRequest>>,
    delay: Duration,
}

impl RecordingDispatcher {
    fn new(response: Value) -> Self {
        Self {
            response,
            calls: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        }
    }

    fn slow(response: Value, delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new(response)
        }
    }
}

#[async_trait]
impl Dispatcher for RecordingDispatcher {
    async fn dispatch(&self, request: DispatchRequest) -> Result<Value, DispatchError> {
        tokio::time::sleep(self.delay).await;
        self.calls.lock().await.push(request);
        Ok(self.response.clone())
    }
}

// -- Helpers --------------------------------------------------------------

fn build_state(dispatcher: Arc<RecordingDispatcher>) -> AppState {
    AppState {
        node: "checkout".into(),
        interpreter: Interpreter::new(
            dispatcher,
            Arc::new(Sandbox::default()),
            InterpreterConfig::default(),
        ),
        limits: PayloadLimits {
            max_repeat: 100,
            ..PayloadLimits::default()
        },
    }
}

fn build_app() -> axum::Router {
    api::router(build_state(Arc::new(RecordingDispatcher::new(json!(null)))))
}

fn invocation(method: http::Method, uri: &str, actions: &[Action]) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(PAYLOAD_HEADER, payload::encode(actions).unwrap())
        .body(Body::empty())
        .unwrap()
}

async fn send(app: axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    (status, json)
}

// -- Auxiliary endpoints --------------------------------------------------

#[tokio::test]
async fn health_reports_node_name() {
    let request = Request::builder()
        .uri("/api/v1/health")
        .body(Body::empty())
        .unwrap();
    let (status, json) = send(build_app(), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({"status": "ok", "service": "checkout"}));
}

#[tokio::test]
async fn greet_defaults_to_world() {
    for (uri, expected) in [
        ("/api/v1/greet", "Hello, World!"),
        ("/api/v1/greet?name=", "Hello, World!"),
        ("/api/v1/greet?name=Ada", "Hello, Ada!"),
    ] {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let (status, json) = send(build_app(), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, json!({"message": expected}), "for {uri}");
    }
}

// -- Payload handling -----------------------------------------------------

#[tokio::test]
async fn missing_payload_is_400() {
    let request = Request::builder()
        .method(http::Method::POST)
        .uri("/orders")
        .body(Body::empty())
        .unwrap();
    let (status, json) = send(build_app(), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json, json!({"error": "Missing X-Simulation-Payload header"}));
}

#[tokio::test]
async fn malformed_payloads_are_400() {
    let too_repetitive = payload::encode(&[Action::log("x").with_repeat(101)]).unwrap();
    let not_actions = STANDARD.encode(b"42");
    let missing_type = STANDARD.encode(br#"[{"message": "no type"}]"#);

    for header in ["%%%not base64%%%", &not_actions, &missing_type, &too_repetitive] {
        let request = Request::builder()
            .uri("/")
            .header(PAYLOAD_HEADER, header)
            .body(Body::empty())
            .unwrap();
        let (status, json) = send(build_app(), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "for {header}");
        assert_eq!(json, json!({"error": "Invalid simulation payload"}));
    }
}

#[tokio::test]
async fn header_name_is_case_insensitive() {
    let request = Request::builder()
        .uri("/")
        .header("X-Simulation-Payload", payload::encode(&[Action::ret("ok")]).unwrap())
        .body(Body::empty())
        .unwrap();
    let (status, json) = send(build_app(), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!("ok"));
}

#[tokio::test]
async fn single_action_payload_is_accepted() {
    let header = STANDARD.encode(br#"{"type": "return", "data": {"code": 202}}"#);
    let request = Request::builder()
        .method(http::Method::PATCH)
        .uri("/anything")
        .header(PAYLOAD_HEADER, header)
        .body(Body::empty())
        .unwrap();
    let (status, json) = send(build_app(), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({"code": 202}));
}

// -- Invocation -----------------------------------------------------------

#[tokio::test]
async fn any_method_on_any_path_runs_actions() {
    for method in [
        http::Method::GET,
        http::Method::POST,
        http::Method::PUT,
        http::Method::DELETE,
    ] {
        let request = invocation(method.clone(), "/orders/42/items", &[Action::ret("ran")]);
        let (status, json) = send(build_app(), request).await;
        assert_eq!(status, StatusCode::OK, "for {method}");
        assert_eq!(json, json!("ran"));
    }
}

#[tokio::test]
async fn non_get_on_auxiliary_path_is_an_invocation() {
    let request = invocation(http::Method::POST, "/api/v1/health", &[Action::ret("sim")]);
    let (status, json) = send(build_app(), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!("sim"));
}

#[tokio::test]
async fn list_without_return_yields_empty_array() {
    let request = invocation(
        http::Method::POST,
        "/",
        &[Action::log("a"), Action::set("x", 1)],
    );
    let (status, json) = send(build_app(), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!([]));
}

#[tokio::test]
async fn context_flows_through_script_to_return() {
    let request = invocation(
        http::Method::POST,
        "/",
        &[
            Action::log("a"),
            Action::set("x", 1),
            Action::code("ctx.x += 1"),
            Action::ret("${x}"),
        ],
    );
    let (_, json) = send(build_app(), request).await;
    assert_eq!(json, json!("2"));
}

#[tokio::test]
async fn each_invocation_gets_a_fresh_context() {
    let app = build_app();
    let first = invocation(
        http::Method::POST,
        "/",
        &[Action::set("seen", true), Action::ret("${seen}")],
    );
    let (_, json) = send(app.clone(), first).await;
    assert_eq!(json, json!("true"));

    let second = invocation(http::Method::POST, "/", &[Action::ret("${seen}")]);
    let (_, json) = send(app, second).await;
    assert_eq!(json, json!(""));
}

#[tokio::test]
async fn continuation_call_then_return() {
    let dispatcher = Arc::new(RecordingDispatcher::new(json!({"code": 202})));
    let app = api::router(build_state(dispatcher.clone()));

    let next_hop = vec![Action::ret(json!({"code": 202}))];
    let request = invocation(
        http::Method::POST,
        "/checkout",
        &[
            Action::http(
                HttpAction::to_node("payments", "/charge")
                    .with_method("POST")
                    .with_actions(next_hop.clone())
                    .save_to("charge"),
            ),
            Action::ret("${charge}"),
        ],
    );
    let (status, json) = send(app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!("{\"code\":202}"));

    let calls = dispatcher.calls.lock().await;
    assert_eq!(calls.len(), 1);
    assert_eq!(
        calls[0].target,
        Target::Node {
            name: "payments".into(),
            path: "/charge".into()
        }
    );
    assert_eq!(calls[0].method, "POST");
    assert_eq!(calls[0].actions, next_hop);
}

#[tokio::test]
async fn repeated_group_dispatches_each_time() {
    let dispatcher = Arc::new(RecordingDispatcher::new(json!({"code": 202})));
    let app = api::router(build_state(dispatcher.clone()));

    let request = invocation(
        http::Method::POST,
        "/",
        &[
            Action::multi(vec![Action::http(HttpAction::to_url(
                "http://localhost:3001",
                "/ping",
            ))])
            .with_repeat(3),
            Action::ret("done"),
        ],
    );
    let (_, json) = send(app, request).await;
    assert_eq!(json, json!("done"));
    assert_eq!(dispatcher.calls.lock().await.len(), 3);
}

#[tokio::test]
async fn faults_are_200_with_failure_value() {
    let request = invocation(
        http::Method::POST,
        "/",
        &[Action::code("return missing + 1"), Action::ret("unreachable")],
    );
    let (status, json) = send(build_app(), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["code"], json!("SCRIPT_FAULT"));
    assert_eq!(json["error"], json!("missing is not defined"));
}

#[tokio::test]
async fn deeply_nested_scripts_are_200_with_failure_value() {
    let sources = [
        format!("return {}1{}", "(".repeat(3000), ")".repeat(3000)),
        format!("return {}1", "!".repeat(20_000)),
        format!("return 1{}", "+1".repeat(30_000)),
    ];
    for source in sources {
        let request = invocation(
            http::Method::POST,
            "/",
            &[Action::code(source), Action::ret("unreachable")],
        );
        let (status, json) = send(build_app(), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["code"], json!("SCRIPT_FAULT"));
        assert!(json["error"].as_str().unwrap().contains("nesting exceeds limit"));
    }

    let request = invocation(
        http::Method::POST,
        "/",
        &[Action::code("ctx.x = (1 + 2) * 3"), Action::ret("${x}")],
    );
    let (status, json) = send(build_app(), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!("9"));
}

#[tokio::test]
async fn unknown_kind_does_not_abort() {
    let request = invocation(
        http::Method::POST,
        "/",
        &[
            Action::new(ActionKind::Unknown("teleport".into())),
            Action::ret("after"),
        ],
    );
    let (status, json) = send(build_app(), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!("after"));
}

#[tokio::test(start_paused = true)]
async fn detached_call_does_not_delay_response() {
    let dispatcher = Arc::new(RecordingDispatcher::slow(json!(null), Duration::from_secs(30)));
    let state = build_state(dispatcher.clone());
    let interpreter = state.interpreter.clone();
    let app = api::router(state);

    let start = tokio::time::Instant::now();
    let request = invocation(
        http::Method::POST,
        "/",
        &[
            Action::http(HttpAction::to_url("http://localhost:3009", "/audit")).detached(),
            Action::ret("fast"),
        ],
    );
    let (_, json) = send(app, request).await;
    assert_eq!(json, json!("fast"));
    assert!(start.elapsed() < Duration::from_secs(1));
    assert!(dispatcher.calls.lock().await.is_empty());

    assert!(interpreter.drain(Duration::from_secs(60)).await);
    assert_eq!(dispatcher.calls.lock().await.len(), 1);
}
