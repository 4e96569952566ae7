use super::*;
use crate::event::{ChatEvent, DeleteEvent};
use tokio::time::{Duration, timeout};

fn chat(id: i64) -> OutboundEvent {
    OutboundEvent::Chat(ChatEvent { id, content: format!("message {id}"), author: None })
}

async fn assert_channel_has_event(rx: &mut mpsc::Receiver<OutboundEvent>) -> OutboundEvent {
    timeout(Duration::from_millis(200), rx.recv())
        .await
        .expect("event receive timed out")
        .expect("channel closed")
}

async fn assert_channel_empty(rx: &mut mpsc::Receiver<OutboundEvent>) {
    assert!(
        timeout(Duration::from_millis(80), rx.recv()).await.is_err(),
        "expected channel to remain empty"
    );
}

#[tokio::test]
async fn broadcast_all_reaches_every_client() {
    let mut registry = ConnectionRegistry::new();
    let (tx_a, mut rx_a) = mpsc::channel(8);
    let (tx_b, mut rx_b) = mpsc::channel(8);
    registry.admit(Uuid::new_v4(), Some("a".into()), tx_a);
    registry.admit(Uuid::new_v4(), None, tx_b);

    assert_eq!(registry.broadcast_all(&chat(1)), 2);

    assert_eq!(assert_channel_has_event(&mut rx_a).await, chat(1));
    assert_eq!(assert_channel_has_event(&mut rx_b).await, chat(1));
}

#[tokio::test]
async fn broadcast_respects_visibility_predicate() {
    let mut registry = ConnectionRegistry::new();
    let (tx_mod, mut rx_mod) = mpsc::channel(8);
    let (tx_user, mut rx_user) = mpsc::channel(8);
    registry.admit(Uuid::new_v4(), Some("mod".into()), tx_mod);
    registry.admit(Uuid::new_v4(), Some("user".into()), tx_user);

    let delivered = registry.broadcast(&chat(2), |entry| entry.user_id.as_deref() == Some("mod"));

    assert_eq!(delivered, 1);
    assert_eq!(assert_channel_has_event(&mut rx_mod).await.id(), 2);
    assert_channel_empty(&mut rx_user).await;
}

#[tokio::test]
async fn broadcast_skips_closed_connections() {
    let mut registry = ConnectionRegistry::new();
    let (tx_open, mut rx_open) = mpsc::channel(8);
    let (tx_closed, rx_closed) = mpsc::channel(8);
    registry.admit(Uuid::new_v4(), None, tx_open);
    registry.admit(Uuid::new_v4(), None, tx_closed);
    drop(rx_closed);

    let event = OutboundEvent::Delete(DeleteEvent::new(3));
    assert_eq!(registry.broadcast_all(&event), 1);
    assert_eq!(assert_channel_has_event(&mut rx_open).await, event);
}

#[tokio::test]
async fn broadcast_skips_full_connections() {
    let mut registry = ConnectionRegistry::new();
    let (tx, mut rx) = mpsc::channel(1);
    registry.admit(Uuid::new_v4(), None, tx);

    assert_eq!(registry.broadcast_all(&chat(1)), 1);
    assert_eq!(registry.broadcast_all(&chat(2)), 0);

    assert_eq!(assert_channel_has_event(&mut rx).await.id(), 1);
    assert_channel_empty(&mut rx).await;
}

#[test]
fn admit_and_remove_track_membership() {
    let mut registry = ConnectionRegistry::new();
    let client_id = Uuid::new_v4();
    let (tx, _rx) = mpsc::channel(8);

    let entry = registry.admit(client_id, Some("u1".into()), tx);
    assert_eq!(entry.client_id, client_id);
    assert_eq!(registry.get(client_id).and_then(|e| e.user_id.as_deref()), Some("u1"));
    assert_eq!(registry.len(), 1);

    assert!(registry.remove(client_id));
    assert!(!registry.remove(client_id));
    assert!(registry.is_empty());
}
