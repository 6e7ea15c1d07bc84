//! End-to-end tests: real nodes on ephemeral ports exchanging continuation
//! payloads over HTTP.

use std::time::{Duration, Instant};

use serde_json::{Value, json};

use hopsim_simulation::prelude::*;

async fn harness(names: &[&str]) -> SimulationHarness {
    SimulationHarness::start(names.iter().map(|n| NodeIdentity::new(*n, 0)).collect())
        .await
        .unwrap()
}

fn root(node: &str, path: &str, actions: Vec<Action>) -> HttpAction {
    HttpAction::to_node(node, path)
        .with_method("POST")
        .with_actions(actions)
}

#[tokio::test]
async fn every_node_reports_its_own_name() {
    let harness = harness(&["gateway", "auth", "billing"]).await;

    for name in ["gateway", "auth", "billing"] {
        let health = harness.client(name).unwrap().health().await.unwrap();
        assert!(health.is_ok());
        assert_eq!(health.service, name);
    }
    let greeting = harness.client("auth").unwrap().greet(Some("Ada")).await.unwrap();
    assert_eq!(greeting, "Hello, Ada!");

    harness.shutdown().await.unwrap();
}

#[tokio::test]
async fn child_response_is_saved_in_caller_context() {
    let harness = harness(&["gateway", "auth"]).await;

    let request = root(
        "gateway",
        "/login",
        vec![
            Action::http(
                HttpAction::to_node("auth", "/verify")
                    .with_method("POST")
                    .save_to("session")
                    .with_actions(vec![
                        Action::set("user", "ada"),
                        Action::ret(json!({"user": "${user}", "ok": true})),
                    ]),
            ),
            Action::ret(json!({"via": "gateway", "session": "${session}"})),
        ],
    );

    let result = harness.send(&request).await.unwrap();
    assert_eq!(
        result,
        json!({"via": "gateway", "session": "{\"ok\":true,\"user\":\"ada\"}"})
    );

    harness.shutdown().await.unwrap();
}

#[tokio::test]
async fn three_hop_chain_returns_through_every_node() {
    let harness = harness(&["gateway", "orders", "inventory"]).await;

    let inventory = vec![Action::ret(json!({"sku": "A-1", "stock": 7}))];
    let orders = vec![
        Action::http(
            HttpAction::to_node("inventory", "/stock/A-1")
                .save_to("stock")
                .with_actions(inventory),
        ),
        Action::code("ctx.doubled = ctx.stock.stock * 2"),
        Action::ret("${doubled}"),
    ];
    let gateway = vec![
        Action::http(
            HttpAction::to_node("orders", "/orders")
                .with_method("POST")
                .save_to("doubled")
                .with_actions(orders),
        ),
        Action::ret("doubled=${doubled}"),
    ];

    let result = harness.send(&root("gateway", "/", gateway)).await.unwrap();
    assert_eq!(result, json!("doubled=14"));

    harness.shutdown().await.unwrap();
}

#[tokio::test]
async fn result_without_return_is_empty_list() {
    let harness = harness(&["gateway", "auth"]).await;

    let request = root(
        "gateway",
        "/",
        vec![
            Action::http(HttpAction::to_node("auth", "/").with_actions(vec![Action::log("hi")])),
            Action::log("done"),
        ],
    );
    assert_eq!(harness.send(&request).await.unwrap(), json!([]));

    harness.shutdown().await.unwrap();
}

#[tokio::test]
async fn repeated_group_calls_the_next_hop_each_time() {
    let harness = harness(&["gateway", "billing"]).await;

    let request = root(
        "gateway",
        "/",
        vec![
            Action::set("calls", 0),
            Action::multi(vec![
                Action::http(
                    HttpAction::to_node("billing", "/charge")
                        .save_to("charge")
                        .with_actions(vec![Action::ret(json!({"code": 202}))]),
                ),
                Action::code("ctx.calls += 1"),
            ])
            .with_repeat(3),
            Action::ret("${calls} calls, last ${charge}"),
        ],
    );

    let result = harness.send(&request).await.unwrap();
    assert_eq!(result, json!("3 calls, last {\"code\":202}"));

    harness.shutdown().await.unwrap();
}

#[tokio::test]
async fn callee_context_is_not_shared() {
    let harness = harness(&["gateway", "auth"]).await;

    let request = root(
        "gateway",
        "/",
        vec![
            Action::set("secret", "caller-only"),
            Action::http(
                HttpAction::to_node("auth", "/")
                    .save_to("seen")
                    .with_actions(vec![Action::ret("[${secret}]")]),
            ),
            Action::ret("${seen}"),
        ],
    );
    assert_eq!(harness.send(&request).await.unwrap(), json!("[]"));

    harness.shutdown().await.unwrap();
}

#[tokio::test]
async fn unknown_peer_is_a_failure_value() {
    let harness = harness(&["gateway"]).await;

    let request = root(
        "gateway",
        "/",
        vec![
            Action::http(HttpAction::to_node("ghost", "/")),
            Action::ret("unreachable"),
        ],
    );
    let result = harness.send(&request).await.unwrap();
    assert_eq!(result["code"], json!("DISPATCH_FAILURE"));
    assert!(result["error"].as_str().unwrap().contains("ghost"));

    harness.shutdown().await.unwrap();
}

#[tokio::test]
async fn scripts_can_call_other_nodes() {
    let harness = harness(&["gateway", "auth"]).await;
    let auth_url = harness.node("auth").unwrap().base_url();

    let request = root(
        "gateway",
        "/",
        vec![
            Action::set("auth", auth_url),
            Action::code("const h = http.get(ctx.auth + '/api/v1/health'); ctx.service = h.service"),
            Action::ret("${service}"),
        ],
    );
    assert_eq!(harness.send(&request).await.unwrap(), json!("auth"));

    harness.shutdown().await.unwrap();
}

#[tokio::test]
async fn detached_hop_does_not_block_the_caller() {
    let harness = harness(&["gateway", "audit"]).await;

    let request = root(
        "gateway",
        "/",
        vec![
            Action::http(
                HttpAction::to_node("audit", "/record").with_actions(vec![Action::wait(1500)]),
            )
            .detached(),
            Action::ret("accepted"),
        ],
    );

    let start = Instant::now();
    assert_eq!(harness.send(&request).await.unwrap(), json!("accepted"));
    assert!(start.elapsed() < Duration::from_millis(1000));

    harness.shutdown().await.unwrap();
}

// -- Bootstrapper ---------------------------------------------------------

const SCENARIO: &str = r#"{
  "nodes": [
    {"name": "gateway", "port": 0},
    {"name": "auth", "port": 0, "features": {"telemetry": false}},
    {"name": "reports", "port": 0}
  ],
  "requests": [
    {
      "name": "late",
      "node": "gateway",
      "path": "/late",
      "startDelaySeconds": 0.3,
      "actions": [{"type": "return", "data": "late"}]
    },
    {
      "name": "login",
      "node": "gateway",
      "path": "/login",
      "actions": [
        {"type": "http", "node": "auth", "path": "/verify", "method": "POST",
         "saveToContext": "auth",
         "actions": [{"type": "return", "data": {"ok": true}}]},
        {"type": "return", "data": {"auth": "${auth}"}}
      ]
    }
  ]
}"#;

#[tokio::test]
async fn bootstrapper_starts_referenced_nodes_only() {
    let simulation = Simulation::start(Scenario::from_json(SCENARIO).unwrap())
        .await
        .unwrap();

    let mut names: Vec<_> = simulation
        .harness()
        .nodes()
        .iter()
        .map(|n| n.name().to_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec!["auth", "gateway"]);
    assert!(simulation.harness().node("reports").is_none());

    simulation.stop().await.unwrap();
}

#[tokio::test]
async fn bootstrapper_reports_in_scenario_order_after_delays() {
    let start = Instant::now();
    let report = run_scenario(
        Scenario::from_json(SCENARIO).unwrap(),
        &NodeConfig::default(),
    )
    .await
    .unwrap();

    assert!(start.elapsed() >= Duration::from_millis(300));
    assert_eq!(report.failed(), 0);
    assert_eq!(report.requests[0].request, "late");
    assert_eq!(report.requests[0].response, Some(json!("late")));
    assert_eq!(report.requests[1].request, "login");
    assert_eq!(
        report.get("login").and_then(|r| r.response.clone()),
        Some(json!({"auth": "{\"ok\":true}"}))
    );
}

#[tokio::test]
async fn bootstrapper_rejects_undefined_nodes() {
    let scenario = Scenario::new()
        .node(NodeIdentity::new("gateway", 0))
        .request(root(
            "gateway",
            "/",
            vec![Action::http(HttpAction::to_node("billing", "/"))],
        ));
    let err = Simulation::start(scenario).await.unwrap_err();
    assert!(matches!(err, SimulationError::NodeNotFound(name) if name == "billing"));
}

#[tokio::test]
async fn unreachable_origin_is_reported_not_returned() {
    let port = hopsim_simulation::PortAllocator::new()
        .allocate()
        .unwrap()
        .port();
    let scenario = Scenario::new().request(
        HttpAction::to_url(format!("http://127.0.0.1:{port}"), "/")
            .with_name("offline")
            .with_method("POST"),
    );

    let report = run_scenario(scenario, &NodeConfig::default()).await.unwrap();
    let offline = report.get("offline").unwrap();
    assert!(!offline.is_ok());
    assert_eq!(offline.response, None::<Value>);
}

#[tokio::test]
async fn bundled_sla_scenario_runs_end_to_end() {
    let scenario =
        Scenario::load(concat!(env!("CARGO_MANIFEST_DIR"), "/scenarios/sla_report.json")).unwrap();
    assert_eq!(scenario.requests[0].method, "POST");

    let report = run_scenario(scenario, &NodeConfig::default()).await.unwrap();
    let response = report.get("sla-report").unwrap().response.clone().unwrap();

    let auth: Value = serde_json::from_str(response["auth"].as_str().unwrap()).unwrap();
    assert_eq!(auth["message"], json!("authorized"));
    assert_eq!(auth["level"], json!("4"));
    let user: Value = serde_json::from_str(auth["user"].as_str().unwrap()).unwrap();
    assert_eq!(user, json!({"userId": 123, "name": "John Doe"}));

    let guarantees: Value =
        serde_json::from_str(response["guarantees"].as_str().unwrap()).unwrap();
    assert_eq!(guarantees["code"], json!(200));
    let poll: Value = serde_json::from_str(guarantees["poll"].as_str().unwrap()).unwrap();
    assert_eq!(poll["code"], json!(202));
}
