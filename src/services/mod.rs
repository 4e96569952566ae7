//! Domain services used by the websocket and HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Service modules own the room's data structures and the rules applied to
//! them, so route handlers stay focused on protocol translation.

pub mod history;
pub mod moderation;
pub mod registry;
pub mod relay;
pub mod sweeper;
