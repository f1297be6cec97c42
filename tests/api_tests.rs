// tests/api_tests.rs

mod common;

use std::time::Duration;

use common::{COURSE_ID, spawn_app};
use duel_server::config::DuelSettings;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn open_socket(address: &str) -> Socket {
    let (socket, _) = connect_async(format!("ws://{}/ws", address))
        .await
        .expect("Failed to open websocket");
    socket
}

async fn send(socket: &mut Socket, frame: Value) {
    socket
        .send(Message::text(frame.to_string()))
        .await
        .expect("Failed to send frame");
}

/// Reads frames until one named `name` arrives and returns its `data`.
async fn expect(socket: &mut Socket, name: &str) -> Value {
    let wait = async {
        while let Some(frame) = socket.next().await {
            let frame = frame.expect("socket error");
            if let Message::Text(text) = frame {
                let value: Value = serde_json::from_str(text.as_str()).unwrap();
                if value["event"] == name {
                    return value["data"].clone();
                }
            }
        }
        panic!("socket closed while waiting for {}", name);
    };
    tokio::time::timeout(Duration::from_secs(10), wait)
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {}", name))
}

async fn identify(address: &str, user_id: &str, user_name: &str) -> Socket {
    let mut socket = open_socket(address).await;
    send(
        &mut socket,
        json!({ "event": "identify", "data": { "userId": user_id, "userName": user_name } }),
    )
    .await;
    let identified = expect(&mut socket, "identified").await;
    assert_eq!(identified["userId"], user_id);
    socket
}

#[tokio::test]
async fn unknown_path_is_404() {
    // Arrange
    let (address, _) = spawn_app(DuelSettings::default()).await;
    let client = reqwest::Client::new();

    // Act
    let response = client
        .get(format!("http://{}/random_path_that_does_not_exist", address))
        .send()
        .await
        .expect("Failed to execute request");

    // Assert
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn health_reports_in_memory_mode() {
    let (address, _) = spawn_app(DuelSettings::default()).await;

    let body: Value = reqwest::get(format!("http://{}/api/health", address))
        .await
        .expect("Failed to execute request")
        .json()
        .await
        .unwrap();

    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], false);
    assert_eq!(body["rooms"], 0);
}

#[tokio::test]
async fn missing_room_is_a_json_404() {
    let (address, _) = spawn_app(DuelSettings::default()).await;

    let response = reqwest::get(format!("http://{}/api/rooms/room_missing", address))
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 404);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("room_missing"));

    let response = reqwest::get(format!("http://{}/api/rooms/room_missing/result", address))
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn malformed_frame_gets_error_event() {
    let (address, _) = spawn_app(DuelSettings::default()).await;
    let mut socket = open_socket(&address).await;

    socket
        .send(Message::text("{not json"))
        .await
        .expect("Failed to send frame");
    let err = expect(&mut socket, "error").await;
    assert_eq!(err["code"], "invalid_request");

    // The connection survives.
    send(&mut socket, json!({ "event": "identify", "data": { "userId": "alice" } })).await;
    expect(&mut socket, "identified").await;
}

#[tokio::test]
async fn duel_over_websocket() {
    let (address, hub) = spawn_app(DuelSettings::default()).await;
    let mut alice = identify(&address, "alice", "Alice").await;
    let mut bob = identify(&address, "bob", "Bob").await;

    send(
        &mut alice,
        json!({
            "event": "create_challenge_room",
            "data": { "challengerId": "alice", "challengedId": "bob", "courseId": COURSE_ID }
        }),
    )
    .await;
    let created = expect(&mut alice, "challenge_created").await;
    let room_id = created["roomId"].as_str().unwrap().to_string();
    let received = expect(&mut bob, "challenge_received").await;

    send(
        &mut bob,
        json!({
            "event": "accept_challenge",
            "data": { "challengeId": received["challengeId"], "userId": "bob" }
        }),
    )
    .await;
    expect(&mut alice, "challenge_started").await;
    let question = expect(&mut bob, "new_question").await;
    assert!(question["question"].get("correctAnswer").is_none());

    // Visible over HTTP while the duel runs.
    let snapshot: Value = reqwest::get(format!("http://{}/api/rooms/{}", address, room_id))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(snapshot["status"], "active");
    assert_eq!(snapshot["participants"][1]["userName"], "Bob");

    let user_room: Value = reqwest::get(format!("http://{}/api/users/alice/room", address))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(user_room["inRoom"], true);
    assert_eq!(user_room["roomId"], room_id.as_str());

    send(
        &mut bob,
        json!({
            "event": "leave_room",
            "data": { "roomId": room_id, "userId": "bob", "isChallenger": false, "customMessage": "brb" }
        }),
    )
    .await;
    let left = expect(&mut alice, "opponent_left").await;
    assert_eq!(left["customMessage"], "brb");
    expect(&mut bob, "left_room").await;

    assert!(hub.user_room("alice").await.is_none());
    let response = reqwest::get(format!("http://{}/api/rooms/{}", address, room_id))
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn closing_the_socket_starts_the_grace_period() {
    let settings = DuelSettings {
        grace_period: Duration::from_millis(300),
        ..DuelSettings::default()
    };
    let (address, _) = spawn_app(settings).await;
    let mut alice = identify(&address, "alice", "Alice").await;
    let mut bob = identify(&address, "bob", "Bob").await;

    send(
        &mut alice,
        json!({
            "event": "create_challenge_room",
            "data": { "challengerId": "alice", "challengedId": "bob", "courseId": COURSE_ID }
        }),
    )
    .await;
    let received = expect(&mut bob, "challenge_received").await;
    send(
        &mut bob,
        json!({
            "event": "accept_challenge",
            "data": { "challengeId": received["challengeId"], "userId": "bob" }
        }),
    )
    .await;
    expect(&mut alice, "challenge_started").await;

    bob.close(None).await.expect("Failed to close socket");
    expect(&mut alice, "opponent_disconnected").await;
    let left = expect(&mut alice, "opponent_left").await;
    assert_eq!(left["userId"], "bob");
}
