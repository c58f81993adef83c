use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use voice_session_cell::{voice_session_routes, SessionManager, SessionState};

fn app(manager: Arc<SessionManager>) -> Router {
    voice_session_routes(manager)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_start_and_stop_over_http() {
    let manager = Arc::new(SessionManager::new());
    let consultation_id = Uuid::new_v4();

    let response = app(manager.clone())
        .oneshot(post_json(
            "/sessions",
            json!({"consultation_id": consultation_id, "section_id": "treatment_plan"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let started = body_json(response).await;
    assert_eq!(started["state"], "recording");
    let session_id = started["session_id"].as_str().unwrap().to_string();

    let response = app(manager.clone())
        .oneshot(post_json(
            &format!("/sessions/{}/stop", session_id),
            json!({"transcript": "next Tuesday at 3pm for a filling"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let stopped = body_json(response).await;
    assert_eq!(stopped["state"], "stopped");
    assert_eq!(stopped["transcript"], "next Tuesday at 3pm for a filling");

    let id: Uuid = session_id.parse().unwrap();
    assert_eq!(manager.get(id).await.unwrap().state, SessionState::Stopped);
}

#[tokio::test]
async fn test_duplicate_start_is_conflict() {
    let manager = Arc::new(SessionManager::new());
    let body = json!({"consultation_id": Uuid::new_v4(), "section_id": "history"});

    let first = app(manager.clone()).oneshot(post_json("/sessions", body.clone())).await.unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = app(manager).oneshot(post_json("/sessions", body)).await.unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
    let error = body_json(second).await;
    assert_eq!(error["error"]["kind"], "session_already_active");
}

#[tokio::test]
async fn test_double_stop_is_invalid_state() {
    let manager = Arc::new(SessionManager::new());
    let session = manager.start(Uuid::new_v4(), "notes").await.unwrap();
    let uri = format!("/sessions/{}/stop", session.id);

    let first = app(manager.clone()).oneshot(post_json(&uri, json!({"transcript": ""}))).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app(manager).oneshot(post_json(&uri, json!({"transcript": ""}))).await.unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(second).await["error"]["kind"], "invalid_session_state");
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let manager = Arc::new(SessionManager::new());
    let response = app(manager)
        .oneshot(
            Request::builder()
                .uri(format!("/sessions/{}", Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"]["kind"], "not_found");
}
