use super::*;
use crate::state::test_helpers::{self, MODERATOR_ID, author, chat_json, delete_json};
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{Duration, sleep, timeout};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn spawn_server(state: AppState) -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind test listener");
    let addr = listener.local_addr().expect("listener addr");
    tokio::spawn(async move {
        axum::serve(listener, crate::routes::app(state))
            .await
            .expect("test server failed");
    });
    addr
}

async fn connect(addr: std::net::SocketAddr, user_id: Option<&str>) -> Client {
    let url = match user_id {
        Some(id) => format!("ws://{addr}/api/ws?{USER_ID_PARAM}={id}"),
        None => format!("ws://{addr}/api/ws"),
    };
    let (stream, _) = tokio_tungstenite::connect_async(url)
        .await
        .expect("websocket connect");
    stream
}

/// Wait until the registry holds exactly `count` connections.
async fn wait_for_clients(state: &AppState, count: usize) {
    for _ in 0..100 {
        if state.room.read().await.registry.len() == count {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("registry never reached {count} clients");
}

async fn send_text(client: &mut Client, text: String) {
    client.send(WsMessage::text(text)).await.expect("ws send");
}

async fn recv_json(client: &mut Client) -> Value {
    loop {
        let msg = timeout(Duration::from_secs(2), client.next())
            .await
            .expect("ws receive timed out")
            .expect("ws stream ended")
            .expect("ws error");
        if let WsMessage::Text(text) = msg {
            return serde_json::from_str(text.as_str()).expect("server sent invalid json");
        }
    }
}

async fn assert_no_message(client: &mut Client) {
    assert!(
        timeout(Duration::from_millis(100), client.next()).await.is_err(),
        "expected no message"
    );
}

#[tokio::test]
async fn chat_reaches_every_socket_including_sender() {
    let state = test_helpers::test_app_state();
    let addr = spawn_server(state.clone()).await;
    let mut alice = connect(addr, Some("1")).await;
    let mut bob = connect(addr, None).await;
    wait_for_clients(&state, 2).await;

    send_text(&mut alice, chat_json(100, "hello", &author("1", "alice"))).await;

    let expected = json!({"id": 100, "content": "hello", "author": {"id": "1", "username": "alice", "avatar": ""}});
    assert_eq!(recv_json(&mut alice).await, expected);
    assert_eq!(recv_json(&mut bob).await, expected);
}

#[tokio::test]
async fn late_joiner_gets_replay_then_live_events() {
    let state = test_helpers::test_app_state();
    let addr = spawn_server(state.clone()).await;
    let mut alice = connect(addr, Some("1")).await;
    wait_for_clients(&state, 1).await;
    let alice_author = author("1", "alice");

    send_text(&mut alice, chat_json(1, "first", &alice_author)).await;
    send_text(&mut alice, chat_json(2, "second", &alice_author)).await;
    recv_json(&mut alice).await;
    recv_json(&mut alice).await;

    let mut carol = connect(addr, Some("3")).await;
    assert_eq!(recv_json(&mut carol).await["id"], 1);
    assert_eq!(recv_json(&mut carol).await["id"], 2);

    wait_for_clients(&state, 2).await;
    send_text(&mut alice, chat_json(3, "third", &alice_author)).await;
    assert_eq!(recv_json(&mut carol).await["content"], "third");
}

#[tokio::test]
async fn delete_is_broadcast_and_removed_from_replay() {
    let state = test_helpers::test_app_state();
    let addr = spawn_server(state.clone()).await;
    let mut alice = connect(addr, Some("1")).await;
    wait_for_clients(&state, 1).await;

    send_text(&mut alice, chat_json(7, "regret", &author("1", "alice"))).await;
    recv_json(&mut alice).await;
    send_text(&mut alice, delete_json(7)).await;
    assert_eq!(recv_json(&mut alice).await, json!({"type": "delete", "id": 7}));

    let mut late = connect(addr, None).await;
    assert_no_message(&mut late).await;
}

#[tokio::test]
async fn mod_events_only_reach_moderator_sockets() {
    let state = test_helpers::test_app_state();
    let addr = spawn_server(state.clone()).await;
    let mut moderator = connect(addr, Some(MODERATOR_ID)).await;
    let mut user = connect(addr, Some("5")).await;
    wait_for_clients(&state, 2).await;

    send_text(&mut moderator, chat_json(1, "/timeout 5 10m flooding", &author(MODERATOR_ID, "sabry"))).await;

    let announcement = recv_json(&mut moderator).await;
    assert_eq!(announcement["adminOnly"], true);
    assert_eq!(announcement["content"], "5 has been timed out for 10m by sabry. Reason: flooding");
    assert_no_message(&mut user).await;

    send_text(&mut user, chat_json(2, "am I muted?", &author("5", "bob"))).await;
    assert_no_message(&mut user).await;
    assert_no_message(&mut moderator).await;

    let mut late_user = connect(addr, Some("6")).await;
    assert_no_message(&mut late_user).await;
    let mut late_moderator = connect(addr, Some(MODERATOR_ID)).await;
    assert_eq!(recv_json(&mut late_moderator).await["adminOnly"], true);
}

#[tokio::test]
async fn malformed_frames_keep_connection_open() {
    let state = test_helpers::test_app_state();
    let addr = spawn_server(state.clone()).await;
    let mut alice = connect(addr, None).await;
    wait_for_clients(&state, 1).await;

    send_text(&mut alice, "definitely not json".into()).await;
    send_text(&mut alice, json!({"id": 1, "content": "   "}).to_string()).await;
    assert_no_message(&mut alice).await;

    send_text(&mut alice, chat_json(2, "still connected", &author("1", "alice"))).await;
    assert_eq!(recv_json(&mut alice).await["id"], 2);
}

#[tokio::test]
async fn closing_socket_removes_connection() {
    let state = test_helpers::test_app_state();
    let addr = spawn_server(state.clone()).await;
    let mut alice = connect(addr, None).await;
    wait_for_clients(&state, 1).await;

    alice.close(None).await.expect("close");

    wait_for_clients(&state, 0).await;
}

#[tokio::test]
async fn timeout_status_endpoint_reports_json() {
    let state = test_helpers::test_app_state();
    state
        .room
        .write()
        .await
        .moderation
        .set_timeout_at("666", "forever", "spam", crate::event::now_ms())
        .expect("valid");
    let addr = spawn_server(state).await;

    let mut stream = TcpStream::connect(addr).await.expect("tcp connect");
    stream
        .write_all(b"GET /api/timeouts/666 HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .expect("write request");
    let mut response = String::new();
    stream.read_to_string(&mut response).await.expect("read response");

    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    let body = response.split("\r\n\r\n").nth(1).expect("response body");
    assert_eq!(serde_json::from_str::<Value>(body).expect("json body"), json!({"timedOut": true, "reason": "spam"}));
}

#[tokio::test]
async fn healthz_returns_ok() {
    let addr = spawn_server(test_helpers::test_app_state()).await;

    let mut stream = TcpStream::connect(addr).await.expect("tcp connect");
    stream
        .write_all(b"GET /healthz HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .expect("write request");
    let mut response = String::new();
    stream.read_to_string(&mut response).await.expect("read response");

    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
}
