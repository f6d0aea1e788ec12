//! Integration tests for the control API endpoints.
//!
//! Tests use Axum's `Router` directly via `tower::ServiceExt` without
//! starting a TCP server. Runs are unpaced, so a start request returns as
//! soon as the simulated horizon is reached.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use dynstack_core::policy::CranePolicy;
use dynstack_host::build_router;
use dynstack_host::capabilities::{
    HostCapabilities, OutboundQueue, RemotePolicyConnector, TracingSessionLogger,
};
use dynstack_host::control::ControlState;
use dynstack_host::ingest::DEFAULT_SCHEDULE_DELAY;
use dynstack_host::resolver::{PresetStore, SettingsResolver};
use dynstack_host::session::{SessionController, SessionError, SessionOptions, YardEngineFactory};
use dynstack_types::{SessionId, Settings};
use serde_json::Value;
use tower::ServiceExt;

struct Unreachable;

impl RemotePolicyConnector for Unreachable {
    fn connect(
        &self,
        address: &str,
        _session_id: SessionId,
    ) -> Result<Box<dyn CranePolicy>, SessionError> {
        Err(SessionError::RemotePolicy {
            message: format!("no policy listening at {address}"),
        })
    }
}

fn make_test_state() -> ControlState {
    let (queue, _rx) = OutboundQueue::new();
    let capabilities = HostCapabilities {
        outbound: Arc::new(queue),
        logger: Arc::new(TracingSessionLogger),
        remote: Arc::new(Unreachable),
    };
    let options = SessionOptions {
        schedule_delay: DEFAULT_SCHEDULE_DELAY,
        time_scale: 0.0,
    };
    let resolver = SettingsResolver::new(PresetStore::builtin().unwrap());
    ControlState::new(Arc::new(SessionController::new(
        YardEngineFactory,
        resolver,
        capabilities,
        options,
    )))
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post(uri: &str, body: impl Into<Body>) -> Request<Body> {
    Request::post(uri).body(body.into()).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

// =========================================================================
// Settings
// =========================================================================

#[tokio::test]
async fn test_get_preset_returns_settings() {
    let router = build_router(make_test_state());

    let response = router.oneshot(get("/api/settings/baseline")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let settings: Settings = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(settings.buffer_count, 3);
    assert_eq!(settings.seed, 42);
}

#[tokio::test]
async fn test_get_unknown_preset_returns_404() {
    let router = build_router(make_test_state());

    let response = router
        .oneshot(get("/api/settings/no-such-preset"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"], 404);
    assert!(json["error"].as_str().unwrap().contains("no-such-preset"));
}

#[tokio::test]
async fn test_list_presets() {
    let router = build_router(make_test_state());

    let response = router.oneshot(get("/api/settings")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["default"], "baseline");
    let presets = json["presets"].as_array().unwrap();
    assert!(presets.iter().any(|p| p == "baseline"));
}

// =========================================================================
// Session lifecycle
// =========================================================================

#[tokio::test]
async fn test_status_before_any_session() {
    let router = build_router(make_test_state());

    let response = router.oneshot(get("/api/session/status")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["active"], false);
    assert!(json["session"].is_null());
}

#[tokio::test]
async fn test_stop_without_session() {
    let router = build_router(make_test_state());

    let response = router
        .oneshot(post("/api/session/stop", Body::empty()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["ok"], false);
}

#[tokio::test]
async fn test_start_preset_runs_to_completion() {
    let state = make_test_state();
    let router = build_router(state.clone());

    let response = router
        .clone()
        .oneshot(post(
            "/api/session/start?policy=rule_based&preset=baseline",
            Body::empty(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["completed"], true);

    let response = router.oneshot(get("/api/session/status")).await.unwrap();
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["active"], false);
    assert_eq!(json["session"]["state"], "completed");
    assert_eq!(json["session"]["mode"]["kind"], "async");
    assert_eq!(json["session"]["mode"]["policy"], "rule_based");
}

#[tokio::test]
async fn test_start_with_body_settings() {
    let state = make_test_state();
    let bytes = state.controller.default_settings("baseline").unwrap();
    let router = build_router(state);

    let response = router
        .oneshot(post("/api/session/start?policy=automatic", bytes))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["completed"], true);
}

#[tokio::test]
async fn test_start_with_garbage_returns_400() {
    let router = build_router(make_test_state());

    let response = router
        .oneshot(post("/api/session/start", "definitely not settings"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"], 400);
}

#[tokio::test]
async fn test_start_with_invalid_settings_returns_400() {
    let state = make_test_state();
    let bytes = state.controller.default_settings("baseline").unwrap();
    let mut settings: Value = serde_json::from_slice(&bytes).unwrap();
    settings["buffer_count"] = Value::from(0);
    let router = build_router(state);

    let response = router
        .oneshot(post(
            "/api/session/start?policy=rule_based",
            serde_json::to_vec(&settings).unwrap(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_start_without_settings_returns_400() {
    let router = build_router(make_test_state());

    let response = router
        .oneshot(post("/api/session/start", Body::empty()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_start_unknown_preset_returns_404() {
    let router = build_router(make_test_state());

    let response = router
        .oneshot(post("/api/session/start?preset=nope", Body::empty()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// =========================================================================
// Synchronous runs
// =========================================================================

#[tokio::test]
async fn test_start_sync_with_integrated_policy() {
    let router = build_router(make_test_state());

    let response = router
        .oneshot(post(
            "/api/session/start-sync?use_integrated_policy=true&preset=baseline",
            Body::empty(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["completed"], true);
}

#[tokio::test]
async fn test_start_sync_requires_remote_address() {
    let router = build_router(make_test_state());

    let response = router
        .oneshot(post("/api/session/start-sync?preset=baseline", Body::empty()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_start_sync_unreachable_policy_returns_500() {
    let router = build_router(make_test_state());

    let response = router
        .oneshot(post(
            "/api/session/start-sync?remote_address=nats://nowhere:4222&preset=baseline",
            Body::empty(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_to_json(response.into_body()).await;
    assert!(json["error"].as_str().unwrap().contains("nats://nowhere:4222"));
}
