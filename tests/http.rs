use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    response::Response,
};
use chatty::{broadcast::MESSAGE_SENT, channel::MESSAGES_CHANNEL, create_router, state::AppState};
use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::broadcast::error::TryRecvError;
use tower::ServiceExt;

fn post_messages(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/messages")
        .header(header::CONTENT_TYPE, "application/json")
        .body(body.into())
        .unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn accepted_message_is_acknowledged_and_broadcast() {
    let state = AppState::new(16);
    let mut rx = state.broadcaster.subscribe(MESSAGES_CHANNEL);
    let before = Utc::now();

    let response = create_router(state)
        .oneshot(post_messages(
            json!({ "username": " Alice ", "message": "hi" }).to_string(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let event = rx.try_recv().unwrap();
    assert_eq!(event.event, MESSAGE_SENT);
    assert_eq!(event.data.username, "Alice");
    assert_eq!(event.data.message, "hi");
    assert!(event.data.timestamp >= before);
    assert_eq!(rx.try_recv().unwrap_err(), TryRecvError::Empty);
}

#[tokio::test]
async fn invalid_fields_are_reported_by_name() {
    let state = AppState::new(16);
    let mut rx = state.broadcaster.subscribe(MESSAGES_CHANNEL);

    let response = create_router(state)
        .oneshot(post_messages(
            json!({ "username": "", "message": "x".repeat(501) }).to_string(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body = json_body(response).await;
    assert_eq!(
        body["errors"]["username"],
        json!(["The username field is required."])
    );
    assert_eq!(
        body["errors"]["message"],
        json!(["The message field must not be greater than 500 characters."])
    );
    assert!(body["message"].is_string());
    assert_eq!(rx.try_recv().unwrap_err(), TryRecvError::Empty);
}

#[tokio::test]
async fn unreadable_body_is_a_bad_request() {
    let state = AppState::new(16);
    let mut rx = state.broadcaster.subscribe(MESSAGES_CHANNEL);

    let response = create_router(state)
        .oneshot(post_messages("username=Alice&message=hi"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(json_body(response).await["message"].is_string());
    assert_eq!(rx.try_recv().unwrap_err(), TryRecvError::Empty);
}

#[tokio::test]
async fn history_is_a_static_welcome() {
    let response = create_router(AppState::new(16))
        .oneshot(
            Request::builder()
                .uri("/messages")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["username"], "System");
    assert_eq!(messages[0]["message"], "Welcome to the chat!");
    assert!(messages[0]["timestamp"].is_string());
}
