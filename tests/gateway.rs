mod common;

use std::sync::Arc;

use serde_json::json;

use common::{core, send, session};
use lan_arena_server::config::Config;
use lan_arena_server::game::{GameKind, Phase, PlayerId};
use lan_arena_server::ws::gateway::ChatModeration;
use lan_arena_server::ws::protocol::ServerMsg;
use lan_arena_server::AppState;

fn chess_move(from: &str, to: &str) -> serde_json::Value {
    json!({"type": "chess_move", "from": from, "to": to})
}

#[tokio::test]
async fn test_chess_game_over_the_wire() {
    let core = core();
    let (white, black, watcher) = (session("w"), session("b"), session("s"));
    for who in [&white, &black, &watcher] {
        send(&core, who, json!({"type": "join_room", "kind": "chess", "room_id": "board"}));
    }
    let joined = core.recorder.last_of_type(white.user_id, "room_joined").unwrap();
    assert_eq!(joined["seat"], "white");
    assert_eq!(joined["room_key"], "chess:board");

    // out of turn and illegal moves are rejected without touching the board
    send(&core, &black, chess_move("e7", "e5"));
    let rejected = core.recorder.last_of_type(black.user_id, "rejected").unwrap();
    assert_eq!(rejected["code"], "validation");
    assert_eq!(rejected["reason"], "not_your_turn");
    send(&core, &white, chess_move("e2", "e5"));
    assert_eq!(
        core.recorder.last_of_type(white.user_id, "rejected").unwrap()["code"],
        "validation"
    );

    for (who, from, to) in [
        (&white, "e2", "e4"),
        (&black, "e7", "e5"),
        (&white, "f1", "c4"),
        (&black, "b8", "c6"),
        (&white, "d1", "h5"),
        (&black, "g8", "f6"),
        (&white, "h5", "f7"),
    ] {
        send(&core, who, chess_move(from, to));
    }

    let ok = core.recorder.last_of_type(watcher.user_id, "chess_move_ok").unwrap();
    assert_eq!(ok["uci"], "h5f7+");
    let end = core.recorder.last_of_type(watcher.user_id, "chess_end").unwrap();
    assert_eq!(end["status"], "checkmate");
    assert_eq!(end["winners"][0], white.user_id.to_string());
    let state = core.recorder.last_of_type(black.user_id, "chess_state").unwrap();
    assert_eq!(state["state"], "ended");
    assert_eq!(state["moves"].as_array().unwrap().len(), 7);

    let room = core.registry.room_of(white.user_id, GameKind::Chess).unwrap();
    assert_eq!(room.state(), Phase::Ended);
    assert_eq!(core.ledger.stats(white.user_id).unwrap().wins, 1);
    assert_eq!(core.ledger.stats(black.user_id).unwrap().losses, 1);
    assert!(core.ledger.stats(watcher.user_id).is_none());

    send(&core, &black, chess_move("a7", "a6"));
    assert_eq!(
        core.recorder.last_of_type(black.user_id, "rejected").unwrap()["reason"],
        "room_ended"
    );
}

#[tokio::test]
async fn test_bad_frames() {
    let core = core();
    let a = session("a");
    send(&core, &a, json!({"type": "teleport"}));
    core.gateway.handle_text(&a, "{not json");
    let errors = core.recorder.of_type(a.user_id, "error");
    assert_eq!(errors.len(), 2);
    assert!(errors.iter().all(|e| e["code"] == "invalid_json"));

    send(&core, &a, json!({"type": "join_room", "kind": "golf", "room_id": "x"}));
    let rejected = core.recorder.last_of_type(a.user_id, "rejected").unwrap();
    assert_eq!(rejected["reason"], "unknown_room_kind");
    assert_eq!(rejected["action"], "join_room");
}

#[tokio::test]
async fn test_actions_need_a_room_of_that_kind() {
    let core = core();
    let a = session("a");
    send(&core, &a, json!({"type": "join_room", "kind": "pong", "room_id": "p"}));
    send(&core, &a, json!({"type": "reaction_press"}));
    let rejected = core.recorder.last_of_type(a.user_id, "rejected").unwrap();
    assert_eq!(rejected["code"], "state");
    assert_eq!(rejected["reason"], "not_in_room");
    assert_eq!(rejected["action"], "reaction_press");

    send(&core, &a, json!({"type": "leave_room", "kind": "reaction", "room_id": ""}));
    assert_eq!(
        core.recorder.last_of_type(a.user_id, "rejected").unwrap()["action"],
        "leave_room"
    );
    send(&core, &a, json!({"type": "leave_room", "kind": "pong", "room_id": ""}));
    assert!(core.registry.room_of(a.user_id, GameKind::Pong).is_none());
}

#[tokio::test]
async fn test_leave_room_by_the_id_used_to_join() {
    let core = core();
    let a = session("a");
    send(&core, &a, json!({"type": "join_room", "kind": "chess", "room_id": "Lab 1!"}));
    let joined = core.recorder.last_of_type(a.user_id, "room_joined").unwrap();
    assert_eq!(joined["room_key"], "chess:lab1");

    send(&core, &a, json!({"type": "leave_room", "kind": "chess", "room_id": "Lab 1!"}));
    assert!(core.recorder.last_of_type(a.user_id, "rejected").is_none());
    assert!(core.registry.room_of(a.user_id, GameKind::Chess).is_none());
    let left = core.recorder.last_of_type(a.user_id, "room_left").unwrap();
    assert_eq!(left["room_key"], "chess:lab1");
}

#[tokio::test]
async fn test_ping_and_lobby() {
    let core = core();
    let (a, b) = (session("a"), session("b"));
    send(&core, &a, json!({"type": "ping", "t": 42}));
    assert_eq!(core.recorder.last_of_type(a.user_id, "pong").unwrap()["t"], 42);

    send(&core, &a, json!({"type": "join_room", "kind": "typing", "room_id": "keys"}));
    send(&core, &b, json!({"type": "queue_join", "kind": "arena", "mode": "duel"}));
    send(&core, &b, json!({"type": "get_lobby"}));
    let lobby = core.recorder.last_of_type(b.user_id, "lobby_state").unwrap();
    assert_eq!(lobby["rooms"][0]["room_key"], "typing:keys");
    assert_eq!(lobby["rooms"][0]["players"], 1);
    assert_eq!(lobby["queues"][0]["kind"], "arena");
    assert_eq!(lobby["queues"][0]["mode"], "duel");
    assert_eq!(lobby["queues"][0]["size"], 1);
}

#[tokio::test]
async fn test_room_chat() {
    let core = core();
    let (a, b, outsider) = (session("Ada"), session("b"), session("c"));
    send(&core, &a, json!({"type": "join_room", "kind": "reaction", "room_id": "r"}));
    send(&core, &b, json!({"type": "join_room", "kind": "reaction", "room_id": "r"}));

    let long = "x".repeat(500);
    send(&core, &a, json!({"type": "room_chat", "room_key": "reaction:r", "text": format!("  {long}  ")}));
    let chat = core.recorder.last_of_type(b.user_id, "room_chat").unwrap();
    assert_eq!(chat["from_name"], "Ada");
    assert_eq!(chat["from_user_id"], a.user_id.to_string());
    assert_eq!(chat["text"].as_str().unwrap().len(), 400);

    send(&core, &a, json!({"type": "room_chat", "room_key": "reaction:r", "text": "   "}));
    assert_eq!(core.recorder.of_type(b.user_id, "room_chat").len(), 1);

    send(&core, &outsider, json!({"type": "room_chat", "room_key": "reaction:r", "text": "hi"}));
    assert_eq!(
        core.recorder.last_of_type(outsider.user_id, "rejected").unwrap()["reason"],
        "not_a_member"
    );
    send(&core, &a, json!({"type": "room_chat", "room_key": "reaction:gone", "text": "hi"}));
    assert_eq!(
        core.recorder.last_of_type(a.user_id, "rejected").unwrap()["reason"],
        "room_not_found"
    );
}

struct NoShouting;

impl ChatModeration for NoShouting {
    fn review(&self, _user: PlayerId, text: &str) -> Result<String, &'static str> {
        if text.contains("spam") {
            return Err("blocked_by_moderation");
        }
        Ok(text.to_lowercase())
    }
}

#[tokio::test]
async fn test_app_state_wires_hub_and_moderation() {
    let state = AppState::new(Config::with_secret("secret")).with_moderation(Arc::new(NoShouting));
    let (a, b) = (session("a"), session("b"));
    let mut rx_a = state.hub.connect(a.user_id);
    let mut rx_b = state.hub.connect(b.user_id);

    state.gateway.on_connect(&a);
    assert!(matches!(rx_a.recv().await.unwrap(), ServerMsg::Welcome { user_id, .. } if user_id == a.user_id));
    assert!(matches!(rx_a.recv().await.unwrap(), ServerMsg::LobbyState(_)));

    for who in [&a, &b] {
        state.gateway.handle_text(
            who,
            &json!({"type": "join_room", "kind": "pong", "room_id": "hall"}).to_string(),
        );
    }
    state.gateway.handle_text(
        &a,
        &json!({"type": "room_chat", "room_key": "pong:hall", "text": "GOOD GAME"}).to_string(),
    );
    state.gateway.handle_text(
        &a,
        &json!({"type": "room_chat", "room_key": "pong:hall", "text": "spam"}).to_string(),
    );

    let mut chat = None;
    while let Ok(msg) = rx_b.try_recv() {
        if let ServerMsg::RoomChat { text, .. } = msg {
            chat = Some(text);
        }
    }
    assert_eq!(chat.as_deref(), Some("good game"));

    let mut rejected = None;
    while let Ok(msg) = rx_a.try_recv() {
        if let ServerMsg::Rejected { reason, .. } = msg {
            rejected = Some(reason);
        }
    }
    assert_eq!(rejected.as_deref(), Some("blocked_by_moderation"));

    // shutdown ends the running match and rates it as a draw
    state.start();
    state.drain().await;
    let room = state.registry.room_of(a.user_id, GameKind::Pong).unwrap();
    assert!(room.is_ended());
    let ledger = state.ledger.as_ref().unwrap();
    assert_eq!(ledger.matches_recorded(), 1);
    assert_eq!(ledger.stats(a.user_id).unwrap().draws, 1);
}
