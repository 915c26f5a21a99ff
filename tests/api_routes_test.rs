use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;

use records::{
    collector::{Scheduler, SchedulerSettings, ServiceRegistry},
    config::Config,
    errors::SourceResult,
    forwarder::NoopForwarder,
    models::{Record, ServiceSpec},
    sources::{Worker, WorkerTable},
    web::{router, AppState},
};

struct Sampler;

#[async_trait]
impl Worker for Sampler {
    fn name(&self) -> &str {
        "sampler"
    }

    async fn fetch(&self) -> SourceResult<Record> {
        Ok(Record::new("sampler").with_entry(json!({ "ok": true })))
    }
}

fn app_state(api_key: Option<&str>) -> AppState {
    let mut config = Config::default();
    config.services = vec![ServiceSpec::new("sampler", "samplerIdx", 3600, 60)];
    config.web.api_key = api_key.map(str::to_string);

    let scheduler = Scheduler::new(
        ServiceRegistry::new(),
        Arc::new(NoopForwarder),
        SchedulerSettings::default(),
    );
    let workers = WorkerTable::new().with_worker("sampler", Sampler);
    AppState::new(scheduler, workers, Arc::new(config))
}

// Helper function to send requests to the app
async fn send_request(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    send_request_with_headers(app, method, uri, body, &[]).await
}

async fn send_request_with_headers(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
    headers: &[(&str, &str)],
) -> (StatusCode, Value) {
    let mut request_builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        request_builder = request_builder.header(*name, *value);
    }

    let request = if let Some(body) = body {
        request_builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap()
    } else {
        request_builder.body(Body::empty()).unwrap()
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();

    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    let json: Value = if body_bytes.is_empty() {
        json!({})
    } else {
        serde_json::from_slice(&body_bytes).unwrap_or(json!({}))
    };

    (status, json)
}

async fn start_sampler(app: &Router) -> Uuid {
    let (status, response) = send_request(
        app,
        Method::POST,
        "/api/v1/services",
        Some(json!({ "name": "sampler" })),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(response["success"], true);
    assert_eq!(response["data"]["sanitized_name"], "sampler");
    response["data"]["id"].as_str().unwrap().parse().unwrap()
}

async fn wait_for_empty(registry: &ServiceRegistry) {
    for _ in 0..200 {
        if registry.is_empty().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("service was not deregistered");
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = router(app_state(None));

    let (status, response) = send_request(&app, Method::GET, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["status"], "ok");
    assert_eq!(response["services"], 0);
    assert!(response.get("timestamp").is_some());
}

#[tokio::test]
async fn test_list_services_empty() {
    let app = router(app_state(None));

    let (status, response) = send_request(&app, Method::GET, "/api/v1/services", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["success"], true);
    assert_eq!(response["data"], json!([]));
}

#[tokio::test]
async fn test_unknown_service_is_not_found() {
    let app = router(app_state(None));

    let routes = [
        "/api/v1/services/ghost".to_string(),
        format!("/api/v1/services/{}", Uuid::new_v4()),
        "/api/v1/services/ghost/runtime".to_string(),
        "/api/v1/services/ghost/errors".to_string(),
        "/api/v1/services/ghost/store".to_string(),
    ];

    for uri in &routes {
        let (status, response) = send_request(&app, Method::GET, uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "GET {}", uri);
        assert_eq!(response["success"], false);
    }

    let (status, _) = send_request(&app, Method::POST, "/api/v1/services/ghost/cancel", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_service_lifecycle_through_api() {
    let state = app_state(None);
    let registry = state.registry.clone();
    let app = router(state);

    let id = start_sampler(&app).await;

    let (status, response) =
        send_request(&app, Method::GET, &format!("/api/v1/services/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["data"]["index"], "samplerIdx");
    assert_eq!(response["data"]["name"], "sampler");

    // lookup by name resolves to the same service
    let (status, response) = send_request(&app, Method::GET, "/api/v1/services/sampler", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["data"]["id"], id.to_string());

    let (status, response) = send_request(&app, Method::GET, "/api/v1/services", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["data"].as_array().unwrap().len(), 1);

    let (status, response) =
        send_request(&app, Method::GET, "/api/v1/services/sampler/runtime", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(response["data"]["elapsed_seconds"].as_i64().unwrap() >= 0);

    // the first cycle runs right away
    let mut stored = 0;
    for _ in 0..200 {
        let (_, response) =
            send_request(&app, Method::GET, "/api/v1/services/sampler/store", None).await;
        stored = response["data"]["records"].as_array().unwrap().len();
        if stored > 0 {
            assert_eq!(response["data"]["records"][0]["index"], "samplerIdx");
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(stored, 1);

    let (status, response) =
        send_request(&app, Method::GET, "/api/v1/services/sampler/errors", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["data"], json!([]));

    let (status, response) = send_request(
        &app,
        Method::POST,
        &format!("/api/v1/services/{}/cancel", id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["data"]["cancelled"], true);

    wait_for_empty(&registry).await;

    let (status, _) =
        send_request(&app, Method::GET, &format!("/api/v1/services/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_start_rejects_bad_requests() {
    let state = app_state(None);
    let registry = state.registry.clone();
    let app = router(state);

    let (status, response) = send_request(
        &app,
        Method::POST,
        "/api/v1/services",
        Some(json!({ "name": "weather" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["success"], false);

    let (status, _) = send_request(
        &app,
        Method::POST,
        "/api/v1/services",
        Some(json!({ "name": "sampler", "refresh": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send_request(
        &app,
        Method::POST,
        "/api/v1/services",
        Some(json!({
            "name": "sampler",
            "scheduled": true,
            "start_at": { "time": "07:00", "timezone": "Mars/Olympus" }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, response) = send_request(
        &app,
        Method::POST,
        "/api/v1/services",
        Some(json!({ "name": "  " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(response["error"].as_str().unwrap().contains("name"));

    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn test_list_workers() {
    let app = router(app_state(None));

    let (status, response) = send_request(&app, Method::GET, "/api/v1/workers", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["data"], json!(["sampler"]));
}

#[tokio::test]
async fn test_api_key_is_enforced() {
    let app = router(app_state(Some("s3cret")));

    let (status, response) = send_request(&app, Method::GET, "/api/v1/services", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(response["success"], false);

    let (status, _) = send_request_with_headers(
        &app,
        Method::GET,
        "/api/v1/services",
        None,
        &[("x-api-key", "wrong")],
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send_request_with_headers(
        &app,
        Method::GET,
        "/api/v1/services",
        None,
        &[("x-api-key", "s3cret")],
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send_request_with_headers(
        &app,
        Method::GET,
        "/api/v1/workers",
        None,
        &[("authorization", "Bearer s3cret")],
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // health stays open
    let (status, _) = send_request(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
}
