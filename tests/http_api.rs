mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Method as HttpMethod, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use common::{harness, LXC, NEXTID};
use lxcgate::http::router;
use lxcgate::store::ContainerStore;
use lxcgate::upstream::Method;

async fn send(
    app: axum::Router,
    method: HttpMethod,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn create_then_read_back() {
    let h = harness();
    h.upstream.respond(Method::Get, NEXTID, json!("105"));
    h.upstream.respond(Method::Post, LXC, json!("UPID:create"));
    let app = router(h.orchestrator.clone());

    let (status, body) = send(
        app.clone(),
        HttpMethod::POST,
        "/container/create",
        Some(json!({
            "hostname": "web1",
            "template": "debian.tar.gz",
            "storage": "local",
            "memory": 512,
            "cpu": 2,
            "disk": 8
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], 105);
    assert_eq!(body["ip"], "10.0.0.105");
    assert_eq!(body["ipv6"], "fd00::69");
    assert_eq!(body["result"]["data"], "UPID:create");

    let (status, body) = send(app.clone(), HttpMethod::GET, "/container/105", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "stopped");
    assert_eq!(body["hostname"], "web1");

    let (status, body) = send(app, HttpMethod::GET, "/containers", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn upstream_failure_is_500_with_message() {
    let h = harness();
    h.upstream
        .fail(Method::Post, &format!("{LXC}/105/status/start"), 500, "CT 105 is locked");

    let (status, body) = send(
        router(h.orchestrator.clone()),
        HttpMethod::POST,
        "/container/105/start",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("CT 105 is locked"));
}

#[tokio::test]
async fn resources_on_unknown_container_is_404() {
    let h = harness();
    let (status, _) = send(
        router(h.orchestrator.clone()),
        HttpMethod::POST,
        "/container/42/resources",
        Some(json!({"cpu": 2})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn swap_and_delete() {
    let h = harness();
    let app = router(h.orchestrator.clone());

    let (status, _) = send(
        app.clone(),
        HttpMethod::POST,
        "/container/105/swap",
        Some(json!({"size": 256})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(app, HttpMethod::DELETE, "/container/105/delete", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["status"].as_str().unwrap().contains("105"));
    assert!(h.store.get(105).unwrap().is_none());
}

#[tokio::test]
async fn malformed_body_is_rejected_before_upstream() {
    let h = harness();
    let app = router(h.orchestrator.clone());

    let (status, body) = send(
        app.clone(),
        HttpMethod::POST,
        "/container/create",
        Some(json!({"hostname": "web1"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("failed to parse request body"));

    let (status, _) = send(
        app,
        HttpMethod::POST,
        "/container/105/swap",
        Some(json!({"size": "big"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(h.upstream.calls().is_empty());
}

#[tokio::test]
async fn health() {
    let h = harness();
    let (status, body) = send(router(h.orchestrator.clone()), HttpMethod::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
}
