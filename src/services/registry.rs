//! Connection registry: live sockets and the identity tagged on each.
//!
//! DESIGN
//! ======
//! Each socket task owns the receiving half of a bounded `mpsc` channel; the
//! registry keeps the sending half. Fan-out is best-effort `try_send`: a
//! closed or full channel is skipped without error, so one dead or slow
//! client never stalls the room.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::event::OutboundEvent;

/// One live connection.
#[derive(Debug, Clone)]
pub struct ConnectionEntry {
    pub client_id: Uuid,
    /// Identity supplied on connect, if any. Unauthenticated.
    pub user_id: Option<String>,
    pub tx: mpsc::Sender<OutboundEvent>,
}

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    clients: HashMap<Uuid, ConnectionEntry>,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. Re-admitting a `client_id` replaces its entry.
    pub fn admit(
        &mut self,
        client_id: Uuid,
        user_id: Option<String>,
        tx: mpsc::Sender<OutboundEvent>,
    ) -> ConnectionEntry {
        let entry = ConnectionEntry { client_id, user_id, tx };
        self.clients.insert(client_id, entry.clone());
        entry
    }

    /// Forget a connection. Returns whether it was registered.
    pub fn remove(&mut self, client_id: Uuid) -> bool {
        self.clients.remove(&client_id).is_some()
    }

    #[must_use]
    pub fn get(&self, client_id: Uuid) -> Option<&ConnectionEntry> {
        self.clients.get(&client_id)
    }

    /// Send `event` to every open connection accepted by `visible`.
    /// Returns the number of connections the event was queued for.
    pub fn broadcast<F>(&self, event: &OutboundEvent, visible: F) -> usize
    where
        F: Fn(&ConnectionEntry) -> bool,
    {
        let mut delivered = 0;
        for entry in self.clients.values() {
            if entry.tx.is_closed() || !visible(entry) {
                continue;
            }
            match entry.tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => debug!(client_id = %entry.client_id, error = %e, "skipping client during broadcast"),
            }
        }
        delivered
    }

    /// Broadcast with no visibility restriction.
    pub fn broadcast_all(&self, event: &OutboundEvent) -> usize {
        self.broadcast(event, |_| true)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;
