//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor.
//! All mutable chat state lives in a single `RoomState` behind one lock:
//! the relay engine holds the write guard for the whole classify-and-apply
//! step of an inbound event, so events are applied one at a time in the
//! order the lock is acquired.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::config::RelayConfig;
use crate::services::history::HistoryLog;
use crate::services::moderation::{ModerationState, UsernameDirectory};
use crate::services::registry::ConnectionRegistry;

// =============================================================================
// ROOM STATE
// =============================================================================

/// The one chat room. Volatile: lost on restart.
#[derive(Debug)]
pub struct RoomState {
    /// Live connections keyed by server-assigned client id.
    pub registry: ConnectionRegistry,
    /// Retained chat and mod events in arrival order.
    pub history: HistoryLog,
    /// Active timeouts.
    pub moderation: ModerationState,
    /// Last-seen display name per user id.
    pub directory: UsernameDirectory,
}

impl RoomState {
    #[must_use]
    pub fn new(history_limit: Option<usize>) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            history: HistoryLog::new(history_limit),
            moderation: ModerationState::new(),
            directory: UsernameDirectory::new(),
        }
    }
}

// =============================================================================
// APP STATE
// =============================================================================

/// Shared application state, injected into Axum handlers via State extractor.
/// Clone is required by Axum; all inner fields are Arc-wrapped.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RelayConfig>,
    pub room: Arc<RwLock<RoomState>>,
}

impl AppState {
    #[must_use]
    pub fn new(config: RelayConfig) -> Self {
        let room = RoomState::new(config.history_limit);
        Self { config: Arc::new(config), room: Arc::new(RwLock::new(room)) }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_state_new_is_empty() {
        let room = RoomState::new(None);
        assert!(room.registry.is_empty());
        assert!(room.history.is_empty());
        assert!(room.moderation.is_empty());
        assert!(room.directory.get("anyone").is_none());
    }

    #[tokio::test]
    async fn app_state_clones_share_room() {
        let state = test_helpers::test_app_state();
        let clone = state.clone();
        let _ = test_helpers::connect(&clone, None).await;
        assert_eq!(state.room.read().await.registry.len(), 1);
    }

    #[test]
    fn app_state_applies_history_limit() {
        let state = test_helpers::test_app_state_with(crate::config::DeletePolicy::Anyone, Some(1));
        let mut room = state.room.try_write().expect("uncontended");
        room.history.append(crate::event::OutboundEvent::Chat(crate::event::ChatEvent {
            id: 1,
            content: "a".into(),
            author: None,
        }));
        room.history.append(crate::event::OutboundEvent::Chat(crate::event::ChatEvent {
            id: 2,
            content: "b".into(),
            author: None,
        }));
        assert_eq!(room.history.len(), 1);
    }
}
