//! History log: retained events replayed to late joiners.
//!
//! Entries keep arrival order. Without a limit every entry survives until it
//! is deleted by id; with a limit the oldest entries are evicted on append.

use std::collections::VecDeque;

use tracing::debug;

use crate::event::OutboundEvent;
use crate::services::moderation::Roles;
use crate::services::registry::ConnectionEntry;

#[derive(Debug, Default)]
pub struct HistoryLog {
    entries: VecDeque<OutboundEvent>,
    limit: Option<usize>,
}

impl HistoryLog {
    #[must_use]
    pub fn new(limit: Option<usize>) -> Self {
        Self { entries: VecDeque::new(), limit }
    }

    /// Append a chat or mod event. Delete instructions are never retained.
    pub fn append(&mut self, event: OutboundEvent) {
        if matches!(event, OutboundEvent::Delete(_)) {
            return;
        }
        self.entries.push_back(event);
        if let Some(limit) = self.limit {
            while self.entries.len() > limit {
                if let Some(evicted) = self.entries.pop_front() {
                    debug!(id = evicted.id(), "history entry evicted");
                }
            }
        }
    }

    /// Remove the first entry with `id`. Returns whether one was found.
    pub fn remove_by_id(&mut self, id: i64) -> bool {
        let Some(pos) = self.entries.iter().position(|e| e.id() == id) else {
            return false;
        };
        self.entries.remove(pos);
        true
    }

    #[must_use]
    pub fn get(&self, id: i64) -> Option<&OutboundEvent> {
        self.entries.iter().find(|e| e.id() == id)
    }

    #[must_use]
    pub fn contains(&self, id: i64) -> bool {
        self.get(id).is_some()
    }

    /// Events `entry` is allowed to see, in arrival order. Mod events are
    /// only included for moderator connections.
    #[must_use]
    pub fn replay_to(&self, entry: &ConnectionEntry, roles: &Roles) -> Vec<OutboundEvent> {
        let moderator = roles.is_moderator_opt(entry.user_id.as_deref());
        self.entries
            .iter()
            .filter(|e| moderator || !e.is_mod())
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
#[path = "history_test.rs"]
mod tests;
