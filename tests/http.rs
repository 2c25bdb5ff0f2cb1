use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use lan_arena_server::config::Config;
use lan_arena_server::game::{GameKind, RoomParams};
use lan_arena_server::http::build_router;
use lan_arena_server::room::RoomKey;
use lan_arena_server::AppState;

async fn get_json(state: &AppState, uri: &str) -> (StatusCode, Value) {
    let response = build_router(state.clone())
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), 64 * 1024).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

#[tokio::test]
async fn test_health_counts_rooms() {
    let state = AppState::new(Config::with_secret("secret"));
    state
        .registry
        .create_or_get(&RoomKey::new(GameKind::Chess, "c"), &RoomParams::default());

    let (status, body) = get_json(&state, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["active_rooms"], 1);
    assert_eq!(body["queued_players"], 0);
}

#[tokio::test]
async fn test_lobby_lists_rooms() {
    let state = AppState::new(Config::with_secret("secret"));
    state
        .registry
        .create_or_get(&RoomKey::new(GameKind::Typing, "keys"), &RoomParams::default());

    let (status, lobby) = get_json(&state, "/lobby").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(lobby["rooms"][0]["room_key"], "typing:keys");
    assert_eq!(lobby["queues"].as_array().unwrap().len(), 0);
}
