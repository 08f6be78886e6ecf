use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tower::ServiceExt;

use edgemesh_core::{EventHub, Settings};
use edgemesh_db::{DbPool, RepoConfig, Repository};
use edgemesh_server::{build_router, AppState};

async fn test_state(settings: Settings) -> AppState {
    let pool = DbPool::in_memory().await.unwrap();
    let events = EventHub::new();
    let repo = Arc::new(Repository::new(
        pool,
        events.clone(),
        RepoConfig {
            task_lease_seconds: settings.task_lease_seconds,
            node_stale_seconds: settings.node_stale_seconds,
        },
    ));
    AppState::new(repo, events, settings)
}

async fn test_app() -> (Router, AppState) {
    let state = test_state(Settings::default()).await;
    (build_router(state.clone()), state)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn put_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("PUT")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn register_body(node_id: &str) -> Value {
    json!({
        "node_id": node_id,
        "display_name": format!("Node {node_id}"),
        "ip": "10.0.0.7",
        "port": 9100,
        "capabilities": {"cpu_cores": 8, "ram_total_gb": 16.0}
    })
}

fn heartbeat_body(node_id: &str, inflight: u32) -> Value {
    json!({
        "node_id": node_id,
        "metrics": {"cpu_pct": 12.5, "ram_pct": 40.0, "inflight": inflight}
    })
}

#[tokio::test]
async fn health_returns_ok() {
    let (app, _) = test_app().await;
    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");
}

#[tokio::test]
async fn register_then_list_nodes() {
    let (app, _) = test_app().await;

    let response = app
        .clone()
        .oneshot(post_json("/v1/agent/register", register_body("n1")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let node = body_json(response).await;
    assert_eq!(node["status"], "ONLINE");
    assert_eq!(node["policy"]["max_concurrent"], 1);

    let response = app.oneshot(get("/v1/nodes")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let nodes = body_json(response).await;
    assert_eq!(nodes.as_array().unwrap().len(), 1);
    assert_eq!(nodes[0]["node_id"], "n1");
}

#[tokio::test]
async fn register_validates_input() {
    let (app, _) = test_app().await;
    let response = app
        .oneshot(post_json("/v1/agent/register", register_body("  ")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"]["kind"], "bad_request");
}

#[tokio::test]
async fn heartbeat_for_unknown_node_is_not_found() {
    let (app, _) = test_app().await;
    let response = app
        .oneshot(post_json("/v1/agent/heartbeat", heartbeat_body("ghost", 0)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"]["kind"], "not_found");
}

#[tokio::test]
async fn shared_secret_gates_task_endpoints() {
    let settings = Settings {
        shared_secret: Some("s3cret".to_string()),
        ..Default::default()
    };
    let state = test_state(settings).await;
    let app = build_router(state);

    // Missing header.
    let response = app
        .clone()
        .oneshot(post_json("/v1/tasks/pull", json!({"node_id": "n1"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"]["kind"], "unauthorized");

    // Wrong secret.
    let mut request = post_json("/v1/tasks/pull", json!({"node_id": "n1"}));
    request
        .headers_mut()
        .insert("X-EdgeMesh-Secret", "wrong".parse().unwrap());
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Correct secret; no work is a 200 with a null task.
    let mut request = post_json("/v1/tasks/pull", json!({"node_id": "n1"}));
    request
        .headers_mut()
        .insert("X-EdgeMesh-Secret", "s3cret".parse().unwrap());
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_json(response).await["task"].is_null());

    // Open endpoints stay open.
    let response = app.oneshot(get("/v1/nodes")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn job_create_pull_result_round_trip() {
    let (app, _) = test_app().await;

    app.clone()
        .oneshot(post_json("/v1/agent/register", register_body("n1")))
        .await
        .unwrap();
    app.clone()
        .oneshot(post_json("/v1/agent/heartbeat", heartbeat_body("n1", 0)))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(post_json(
            "/v1/jobs",
            json!({"type": "EMBED", "tasks": [{"payload": {"text": "alpha"}}]}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let job = body_json(response).await;
    assert_eq!(job["type"], "EMBEDDINGS");
    assert_eq!(job["status"], "QUEUED");
    assert_eq!(job["total_tasks"], 1);
    let job_id = job["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(post_json("/v1/tasks/pull", json!({"node_id": "n1"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let pulled = body_json(response).await;
    let task = &pulled["task"];
    assert_eq!(task["status"], "RUNNING");
    assert_eq!(task["payload"]["text"], "alpha");
    let task_id = task["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/v1/tasks/{task_id}/result"),
            json!({"node_id": "n1", "success": true, "duration_ms": 45, "output": {"dims": 768}}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let submitted = body_json(response).await;
    assert_eq!(submitted["accepted"], "applied");
    assert_eq!(submitted["task"]["status"], "SUCCEEDED");
    assert_eq!(submitted["job"]["status"], "COMPLETED");

    let response = app
        .oneshot(get(&format!("/v1/jobs/{job_id}")))
        .await
        .unwrap();
    let job = body_json(response).await;
    assert_eq!(job["completed_tasks"], 1);
    assert_eq!(job["assigned_nodes"], json!(["n1"]));
}

#[tokio::test]
async fn job_create_rejects_unknown_type() {
    let (app, _) = test_app().await;
    let response = app
        .oneshot(post_json("/v1/jobs", json!({"type": "FOLD_LAUNDRY", "task_count": 1})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn simulate_and_pull_agree_on_the_winner() {
    let (app, _) = test_app().await;

    for node_id in ["n1", "n2"] {
        app.clone()
            .oneshot(post_json("/v1/agent/register", register_body(node_id)))
            .await
            .unwrap();
    }
    // n1 is busier than n2.
    app.clone()
        .oneshot(post_json(
            "/v1/agent/heartbeat",
            json!({"node_id": "n1", "metrics": {"cpu_pct": 80.0, "ram_pct": 40.0, "inflight": 0}}),
        ))
        .await
        .unwrap();
    app.clone()
        .oneshot(post_json("/v1/agent/heartbeat", heartbeat_body("n2", 0)))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(post_json(
            "/v1/simulate/schedule",
            json!({"task_type": "EMBEDDINGS"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let simulation = body_json(response).await;
    let chosen = simulation["chosen_node_id"].as_str().unwrap().to_string();
    assert_eq!(chosen, "n2");
    assert_eq!(simulation["candidates"][0]["node_id"], "n2");

    app.clone()
        .oneshot(post_json("/v1/jobs", json!({"type": "EMBEDDINGS", "task_count": 1})))
        .await
        .unwrap();

    // The loser gets nothing; the simulated winner claims the task.
    let response = app
        .clone()
        .oneshot(post_json("/v1/tasks/pull", json!({"node_id": "n1"})))
        .await
        .unwrap();
    assert!(body_json(response).await["task"].is_null());

    let response = app
        .oneshot(post_json("/v1/tasks/pull", json!({"node_id": &chosen})))
        .await
        .unwrap();
    assert!(!body_json(response).await["task"].is_null());
}

#[tokio::test]
async fn demo_burst_fans_out_one_update_per_job() {
    let (app, state) = test_app().await;
    let mut subscription = state.events.jobs.subscribe();

    let response = app
        .oneshot(post_json(
            "/v1/demo/jobs/create-embed-burst?count=20&tasks_per_job=1",
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let burst = body_json(response).await;
    assert_eq!(burst["created_count"], 20);

    let mut seen: HashSet<String> = HashSet::new();
    while let Some(delivery) = subscription.try_recv() {
        seen.insert(delivery.event.job_id);
    }
    assert_eq!(seen.len(), 20);
}

#[tokio::test]
async fn stream_endpoints_speak_sse() {
    let (app, _) = test_app().await;

    for uri in ["/v1/stream/nodes", "/v1/stream/jobs"] {
        let response = app.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("");
        assert!(content_type.starts_with("text/event-stream"), "{uri}");
    }
}

#[tokio::test]
async fn operator_can_only_cancel() {
    let (app, _) = test_app().await;

    let response = app
        .clone()
        .oneshot(post_json("/v1/jobs", json!({"type": "INDEX", "task_count": 2})))
        .await
        .unwrap();
    let job_id = body_json(response).await["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/v1/jobs/{job_id}/status"),
            json!({"status": "RUNNING"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/v1/jobs/{job_id}/status"),
            json!({"status": "CANCELLED", "error": "fat-fingered"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "CANCELLED");

    // Cancelling a terminal job conflicts.
    let response = app
        .oneshot(post_json(
            &format!("/v1/jobs/{job_id}/status"),
            json!({"status": "CANCELLED"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn node_detail_serves_bounded_metrics_history() {
    let (app, _) = test_app().await;

    app.clone()
        .oneshot(post_json("/v1/agent/register", register_body("n1")))
        .await
        .unwrap();
    for inflight in 0..3 {
        app.clone()
            .oneshot(post_json("/v1/agent/heartbeat", heartbeat_body("n1", inflight)))
            .await
            .unwrap();
    }

    let response = app
        .clone()
        .oneshot(get("/v1/nodes/n1?include_metrics_history=true&history_limit=2"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let detail = body_json(response).await;
    assert_eq!(detail["node"]["node_id"], "n1");
    assert_eq!(detail["metrics_history"].as_array().unwrap().len(), 2);

    // Without the flag the field is omitted.
    let response = app.clone().oneshot(get("/v1/nodes/n1")).await.unwrap();
    let detail = body_json(response).await;
    assert!(detail.get("metrics_history").is_none());

    let response = app.oneshot(get("/v1/nodes/ghost")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn policy_endpoint_validates_and_applies() {
    let (app, _) = test_app().await;
    app.clone()
        .oneshot(post_json("/v1/agent/register", register_body("n1")))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(put_json(
            "/v1/nodes/n1/policy",
            json!({"max_concurrent": 2, "cpu_ceiling": 150.0}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(put_json(
            "/v1/nodes/n1/policy",
            json!({"max_concurrent": 2, "accepted_task_types": ["TOKENIZE"]}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let node = body_json(response).await;
    assert_eq!(node["policy"]["max_concurrent"], 2);
    assert_eq!(node["policy"]["accepted_task_types"], json!(["TOKENIZE"]));
}
