//! Relay service: join/part and the inbound event state machine.
//!
//! DESIGN
//! ======
//! Each inbound text frame is decoded, then classified in strict precedence
//! order while the room write lock is held:
//!
//! 1. malformed → drop
//! 2. empty chat content → drop
//! 3. delete → remove from history, broadcast delete to everyone
//! 4. author observed → username directory updated
//! 5. over-long content → drop
//! 6. moderator `/timeout` / `/untimeout` → mutate timeouts, announce to
//!    moderators only
//! 7. timed-out author → drop
//! 8. anything else → retain in history, broadcast to everyone
//!
//! Every path returns an `Outcome`; drops carry a `DropReason`. Nothing is
//! ever sent back to the sender as an error: clients infer success from the
//! broadcast they receive.
//!
//! Commands are recognized before the timeout gate, so a moderator's
//! commands are never blocked by a timeout of their own. The same text from
//! a non-moderator is ordinary chat and goes through the gate.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{DeletePolicy, RelayConfig};
use crate::event::{ChatEvent, DeleteEvent, InboundEvent, MAX_CONTENT_CHARS, ModEvent, OutboundEvent, now_ms};
use crate::services::moderation::Expiry;
use crate::state::{AppState, RoomState};

const TIMEOUT_COMMAND: &str = "/timeout";
const UNTIMEOUT_COMMAND: &str = "/untimeout";

// =============================================================================
// OUTCOME
// =============================================================================

/// Why an inbound event produced no broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Not decodable, or missing the id a chat/delete needs.
    Malformed,
    EmptyContent,
    TooLong,
    /// Author is currently timed out.
    TimedOut,
    /// Delete target is not in history.
    UnknownMessage,
    /// Delete refused by the configured delete policy, or a non-moderator
    /// targeting a mod event.
    DeleteNotAllowed,
    /// Moderator command with too few arguments.
    BadCommandArity,
    /// `/timeout` with a duration outside the grammar.
    BadDuration,
    /// `/untimeout` for a user without a timeout.
    NotTimedOut,
}

/// What the engine did with one inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Dropped(DropReason),
    /// Message removed from history and delete broadcast to all connections.
    Deleted { id: i64, recipients: usize },
    /// Chat retained and broadcast to all connections.
    Broadcast { event: ChatEvent, recipients: usize },
    /// Moderation action applied and announced to moderators.
    Announced { event: ModEvent, recipients: usize },
}

// =============================================================================
// JOIN / PART
// =============================================================================

/// Admit a connection and return the history it should be replayed, in
/// arrival order. Admission and snapshot happen under one lock so no live
/// event can slip between them.
pub async fn join(
    state: &AppState,
    client_id: Uuid,
    user_id: Option<String>,
    tx: mpsc::Sender<OutboundEvent>,
) -> Vec<OutboundEvent> {
    let mut room = state.room.write().await;
    let entry = room.registry.admit(client_id, user_id, tx);
    let replay = room.history.replay_to(&entry, &state.config.moderators);
    info!(
        %client_id,
        user_id = entry.user_id.as_deref().unwrap_or("-"),
        clients = room.registry.len(),
        replay = replay.len(),
        history_empty = room.history.is_empty(),
        "client joined"
    );
    replay
}

/// Drop a connection from the registry.
pub async fn part(state: &AppState, client_id: Uuid) {
    let mut room = state.room.write().await;
    if room.registry.remove(client_id) {
        info!(%client_id, remaining = room.registry.len(), "client left");
        if room.registry.is_empty() {
            debug!(history = room.history.len(), "room has no connections");
        }
    }
}

// =============================================================================
// INBOUND
// =============================================================================

/// Decode, classify, and apply one inbound text frame from `client_id`.
pub async fn handle_inbound_text(state: &AppState, client_id: Uuid, text: &str) -> Outcome {
    handle_inbound_text_at(state, client_id, text, now_ms()).await
}

/// As `handle_inbound_text`, with an explicit clock (for testing).
pub async fn handle_inbound_text_at(state: &AppState, client_id: Uuid, text: &str, now: i64) -> Outcome {
    let event = match InboundEvent::decode(text) {
        Ok(event) => event,
        Err(e) => {
            warn!(%client_id, error = %e, "relay: invalid inbound event");
            return Outcome::Dropped(DropReason::Malformed);
        }
    };

    let mut room = state.room.write().await;
    let sender = room
        .registry
        .get(client_id)
        .and_then(|entry| entry.user_id.clone());
    let outcome = apply(&mut room, &state.config, sender.as_deref(), event, now);

    match &outcome {
        Outcome::Dropped(reason) => debug!(%client_id, ?reason, "relay: event dropped"),
        Outcome::Deleted { id, recipients } => info!(%client_id, id, recipients, "relay: message deleted"),
        Outcome::Broadcast { event, recipients } => {
            info!(%client_id, id = event.id, recipients, "relay: chat broadcast");
        }
        Outcome::Announced { event, recipients } => {
            info!(%client_id, id = event.id, recipients, content = %event.content, "relay: moderation announced");
        }
    }
    outcome
}

/// Classify one decoded event and apply it to the room.
fn apply(room: &mut RoomState, config: &RelayConfig, sender: Option<&str>, event: InboundEvent, now: i64) -> Outcome {
    if event.is_delete() {
        return match event.id {
            Some(id) => apply_delete(room, config, sender, id),
            None => Outcome::Dropped(DropReason::Malformed),
        };
    }

    if event.trimmed_content().is_empty() {
        return Outcome::Dropped(DropReason::EmptyContent);
    }
    let Some(id) = event.id else {
        return Outcome::Dropped(DropReason::Malformed);
    };
    let content = event.content.unwrap_or_default();
    let author = event.author;

    if let Some(author) = &author {
        room.directory.observe(&author.id, &author.username);
    }

    if content.chars().count() > MAX_CONTENT_CHARS {
        return Outcome::Dropped(DropReason::TooLong);
    }

    if let Some(author) = &author {
        if config.moderators.is_moderator(&author.id) {
            if let Some(outcome) = apply_command(room, config, &author.id, &content, now) {
                return outcome;
            }
        }
        if room.moderation.is_timed_out_at(&author.id, now) {
            return Outcome::Dropped(DropReason::TimedOut);
        }
    }

    let chat = ChatEvent { id, content, author };
    let outbound = OutboundEvent::Chat(chat.clone());
    room.history.append(outbound.clone());
    let recipients = room.registry.broadcast_all(&outbound);
    Outcome::Broadcast { event: chat, recipients }
}

// =============================================================================
// DELETE
// =============================================================================

fn apply_delete(room: &mut RoomState, config: &RelayConfig, sender: Option<&str>, id: i64) -> Outcome {
    let Some(target) = room.history.get(id) else {
        return Outcome::Dropped(DropReason::UnknownMessage);
    };

    // Mod events are only ever visible to moderators, whatever the policy.
    if !config.moderators.is_moderator_opt(sender) {
        let allowed = match target {
            OutboundEvent::Mod(_) | OutboundEvent::Delete(_) => false,
            OutboundEvent::Chat(chat) => match config.delete_policy {
                DeletePolicy::Anyone => true,
                DeletePolicy::AuthorOrModerator => chat
                    .author
                    .as_ref()
                    .is_some_and(|a| Some(a.id.as_str()) == sender),
            },
        };
        if !allowed {
            return Outcome::Dropped(DropReason::DeleteNotAllowed);
        }
    }

    room.history.remove_by_id(id);
    let recipients = room
        .registry
        .broadcast_all(&OutboundEvent::Delete(DeleteEvent::new(id)));
    Outcome::Deleted { id, recipients }
}

// =============================================================================
// MODERATOR COMMANDS
// =============================================================================

/// Handle `content` as a moderator command. Returns `None` when the content
/// is not a command, so the caller treats it as chat.
fn apply_command(room: &mut RoomState, config: &RelayConfig, moderator_id: &str, content: &str, now: i64) -> Option<Outcome> {
    let tokens: Vec<&str> = content.split_whitespace().collect();
    let command = *tokens.first()?;

    if command == TIMEOUT_COMMAND {
        let [_, target, duration, reason @ ..] = tokens.as_slice() else {
            return Some(Outcome::Dropped(DropReason::BadCommandArity));
        };
        if reason.is_empty() {
            return Some(Outcome::Dropped(DropReason::BadCommandArity));
        }
        let reason = reason.join(" ");
        let Ok(expires) = room.moderation.set_timeout_at(target, duration, &reason, now) else {
            return Some(Outcome::Dropped(DropReason::BadDuration));
        };
        let span = match expires {
            Expiry::Never => "permanently".to_owned(),
            Expiry::At(_) => format!("for {duration}"),
        };
        let text = format!(
            "{} has been timed out {span} by {}. Reason: {reason}",
            room.directory.display_name(target),
            room.directory.display_name(moderator_id),
        );
        return Some(announce(room, config, text, now));
    }

    if command == UNTIMEOUT_COMMAND {
        let Some(target) = tokens.get(1) else {
            return Some(Outcome::Dropped(DropReason::BadCommandArity));
        };
        if !room.moderation.clear_timeout_at(target, now) {
            return Some(Outcome::Dropped(DropReason::NotTimedOut));
        }
        let text = format!(
            "{} is no longer timed out (lifted by {})",
            room.directory.display_name(target),
            room.directory.display_name(moderator_id),
        );
        return Some(announce(room, config, text, now));
    }

    None
}

/// Retain a mod event and send it to moderator connections only.
fn announce(room: &mut RoomState, config: &RelayConfig, text: String, now: i64) -> Outcome {
    let mut id = now;
    while room.history.contains(id) {
        id += 1;
    }
    let event = ModEvent::new(id, text);
    let outbound = OutboundEvent::Mod(event.clone());
    room.history.append(outbound.clone());
    let recipients = room
        .registry
        .broadcast(&outbound, |entry| config.moderators.is_moderator_opt(entry.user_id.as_deref()));
    Outcome::Announced { event, recipients }
}

#[cfg(test)]
#[path = "relay_test.rs"]
mod tests;
