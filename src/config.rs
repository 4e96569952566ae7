//! Relay configuration parsed from environment variables.
//!
//! Every knob has a default so a bare `cargo run` serves a working relay;
//! only malformed values are errors. `.env` files are loaded by `main`
//! before this runs.

use crate::services::moderation::Roles;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_CLIENT_QUEUE_CAPACITY: usize = 256;
pub const DEFAULT_TIMEOUT_SWEEP_INTERVAL_SECS: u64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Who may delete a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletePolicy {
    /// Any connection may delete any message by id.
    Anyone,
    /// Only the message author (by connection identity) or a moderator.
    AuthorOrModerator,
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub port: u16,
    pub moderators: Roles,
    /// Maximum retained history entries; `None` keeps everything.
    pub history_limit: Option<usize>,
    pub client_queue_capacity: usize,
    pub sweep_interval_secs: u64,
    pub delete_policy: DeletePolicy,
    /// Allowed CORS origin; `None` allows any.
    pub cors_origin: Option<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            moderators: Roles::default(),
            history_limit: None,
            client_queue_capacity: DEFAULT_CLIENT_QUEUE_CAPACITY,
            sweep_interval_secs: DEFAULT_TIMEOUT_SWEEP_INTERVAL_SECS,
            delete_policy: DeletePolicy::Anyone,
            cors_origin: None,
        }
    }
}

impl RelayConfig {
    /// Build config from the process environment.
    ///
    /// Optional:
    /// - `PORT`: default 3000
    /// - `MODERATOR_IDS`: comma-separated user ids, default none
    /// - `HISTORY_LIMIT`: retained events, `0` or unset for unbounded
    /// - `CLIENT_QUEUE_CAPACITY`: per-connection outbound queue, default 256
    /// - `TIMEOUT_SWEEP_INTERVAL_SECS`: default 30
    /// - `DELETE_POLICY`: `anyone` (default) or `author_or_moderator`
    /// - `CORS_ORIGIN`: exact origin, default any
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` for values that are set but unparsable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` for values that are set but unparsable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = parse_or("PORT", lookup("PORT"), DEFAULT_PORT)?;
        let moderators = Roles::new(parse_id_list(lookup("MODERATOR_IDS").as_deref()));
        let history_limit = match parse_or("HISTORY_LIMIT", lookup("HISTORY_LIMIT"), 0usize)? {
            0 => None,
            n => Some(n),
        };
        let client_queue_capacity =
            parse_or("CLIENT_QUEUE_CAPACITY", lookup("CLIENT_QUEUE_CAPACITY"), DEFAULT_CLIENT_QUEUE_CAPACITY)?;
        if client_queue_capacity == 0 {
            return Err(ConfigError::Invalid { key: "CLIENT_QUEUE_CAPACITY", value: "0".into() });
        }
        let sweep_interval_secs = parse_or(
            "TIMEOUT_SWEEP_INTERVAL_SECS",
            lookup("TIMEOUT_SWEEP_INTERVAL_SECS"),
            DEFAULT_TIMEOUT_SWEEP_INTERVAL_SECS,
        )?;
        let delete_policy = parse_delete_policy(lookup("DELETE_POLICY").as_deref())?;
        let cors_origin = lookup("CORS_ORIGIN")
            .map(|v| v.trim().to_owned())
            .filter(|v| !v.is_empty() && v != "*");

        Ok(Self {
            port,
            moderators,
            history_limit,
            client_queue_capacity,
            sweep_interval_secs,
            delete_policy,
            cors_origin,
        })
    }
}

fn parse_or<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(default),
        Some(v) => v
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { key, value: v.to_owned() }),
    }
}

fn parse_id_list(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_owned)
        .collect()
}

fn parse_delete_policy(raw: Option<&str>) -> Result<DeletePolicy, ConfigError> {
    match raw.map(str::trim).unwrap_or("anyone") {
        "" | "anyone" => Ok(DeletePolicy::Anyone),
        "author_or_moderator" => Ok(DeletePolicy::AuthorOrModerator),
        other => Err(ConfigError::Invalid { key: "DELETE_POLICY", value: other.to_owned() }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
