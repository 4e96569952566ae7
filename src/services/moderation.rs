//! Moderation service: timeouts, moderator roles, and the username directory.
//!
//! DESIGN
//! ======
//! Timeout records are keyed by user id and carry an absolute expiry in
//! epoch milliseconds (or `Never`). Expiry is checked against the caller's
//! clock on every query, so an expired record is never honored even if the
//! background sweep has not run yet. Every time-dependent operation has an
//! `_at` variant taking an explicit `now` for deterministic tests.
//!
//! Moderator privilege comes from an injected role set, not a literal id
//! comparison, so deployments configure it via `MODERATOR_IDS`.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::{info, warn};

// =============================================================================
// DURATION GRAMMAR
// =============================================================================

const SECOND_MS: i64 = 1_000;
const MINUTE_MS: i64 = 60 * SECOND_MS;
const HOUR_MS: i64 = 60 * MINUTE_MS;
const DAY_MS: i64 = 24 * HOUR_MS;
const WEEK_MS: i64 = 7 * DAY_MS;
const YEAR_MS: i64 = 365 * DAY_MS;

/// Literal accepted (case-insensitively) for a permanent timeout.
pub const FOREVER: &str = "forever";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DurationError {
    #[error("empty duration")]
    Empty,
    #[error("duration must start with digits: {0}")]
    MissingAmount(String),
    #[error("unknown duration unit '{unit}' in {spec}")]
    UnknownUnit { spec: String, unit: String },
    #[error("duration out of range: {0}")]
    Overflow(String),
}

/// Parsed length of a timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutLength {
    Millis(i64),
    Forever,
}

/// Parse `<integer><unit>` (unit one of `s m h d w y`) or `forever`.
///
/// # Errors
///
/// Returns a `DurationError` when the input does not match the grammar or
/// the resulting millisecond count does not fit in an `i64`.
pub fn parse_duration(spec: &str) -> Result<TimeoutLength, DurationError> {
    let spec = spec.trim();
    if spec.is_empty() {
        return Err(DurationError::Empty);
    }
    if spec.eq_ignore_ascii_case(FOREVER) {
        return Ok(TimeoutLength::Forever);
    }

    let split = spec
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(spec.len());
    let (digits, unit) = spec.split_at(split);
    if digits.is_empty() {
        return Err(DurationError::MissingAmount(spec.to_owned()));
    }

    let multiplier = match unit {
        "s" => SECOND_MS,
        "m" => MINUTE_MS,
        "h" => HOUR_MS,
        "d" => DAY_MS,
        "w" => WEEK_MS,
        "y" => YEAR_MS,
        other => return Err(DurationError::UnknownUnit { spec: spec.to_owned(), unit: other.to_owned() }),
    };

    digits
        .parse::<i64>()
        .ok()
        .and_then(|amount| amount.checked_mul(multiplier))
        .map(TimeoutLength::Millis)
        .ok_or_else(|| DurationError::Overflow(spec.to_owned()))
}

// =============================================================================
// ROLES
// =============================================================================

/// Set of user ids holding the moderator role.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roles {
    moderators: HashSet<String>,
}

impl Roles {
    #[must_use]
    pub fn new<I, S>(moderators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { moderators: moderators.into_iter().map(Into::into).collect() }
    }

    #[must_use]
    pub fn is_moderator(&self, user_id: &str) -> bool {
        self.moderators.contains(user_id)
    }

    /// Moderator check for an optional identity (anonymous is never a moderator).
    #[must_use]
    pub fn is_moderator_opt(&self, user_id: Option<&str>) -> bool {
        user_id.is_some_and(|id| self.is_moderator(id))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.moderators.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.moderators.is_empty()
    }
}

// =============================================================================
// TIMEOUT RECORDS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Epoch milliseconds after which the timeout no longer applies.
    At(i64),
    Never,
}

impl Expiry {
    #[must_use]
    pub fn is_active_at(self, now: i64) -> bool {
        match self {
            Self::Never => true,
            Self::At(ms) => now < ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutRecord {
    pub expires: Expiry,
    pub reason: String,
}

/// Answer to the timeout status query. `expires` is omitted for permanent
/// timeouts, which have no finite instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeoutStatus {
    pub timed_out: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Per-user timeout records.
#[derive(Debug, Default)]
pub struct ModerationState {
    timeouts: HashMap<String, TimeoutRecord>,
}

impl ModerationState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// True iff an unexpired record exists. Expired records are dropped here.
    pub fn is_timed_out_at(&mut self, user_id: &str, now: i64) -> bool {
        let Some(record) = self.timeouts.get(user_id) else {
            return false;
        };
        if record.expires.is_active_at(now) {
            return true;
        }
        self.timeouts.remove(user_id);
        info!(user_id, "timeout expired");
        false
    }

    /// Store or overwrite a timeout for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns the parse error when `duration_spec` is not a valid duration;
    /// existing records are left untouched in that case.
    pub fn set_timeout_at(
        &mut self,
        user_id: &str,
        duration_spec: &str,
        reason: &str,
        now: i64,
    ) -> Result<Expiry, DurationError> {
        let expires = match parse_duration(duration_spec) {
            Ok(TimeoutLength::Forever) => Expiry::Never,
            Ok(TimeoutLength::Millis(ms)) => Expiry::At(now.saturating_add(ms)),
            Err(e) => {
                warn!(user_id, duration_spec, error = %e, "timeout rejected");
                return Err(e);
            }
        };
        self.timeouts
            .insert(user_id.to_owned(), TimeoutRecord { expires, reason: reason.to_owned() });
        info!(user_id, ?expires, reason, "timeout set");
        Ok(expires)
    }

    /// Remove a user's record. Returns whether it was still active at `now`;
    /// an expired record is dropped without counting as a lift.
    pub fn clear_timeout_at(&mut self, user_id: &str, now: i64) -> bool {
        let Some(record) = self.timeouts.remove(user_id) else {
            return false;
        };
        let active = record.expires.is_active_at(now);
        if active {
            info!(user_id, "timeout cleared");
        }
        active
    }

    /// Drop every record that has expired by `now`. Returns how many went.
    pub fn sweep_expired_at(&mut self, now: i64) -> usize {
        let before = self.timeouts.len();
        self.timeouts.retain(|_, record| record.expires.is_active_at(now));
        before - self.timeouts.len()
    }

    #[must_use]
    pub fn status_at(&self, user_id: &str, now: i64) -> TimeoutStatus {
        match self.record(user_id) {
            Some(record) if record.expires.is_active_at(now) => TimeoutStatus {
                timed_out: true,
                expires: match record.expires {
                    Expiry::At(ms) => Some(ms),
                    Expiry::Never => None,
                },
                reason: Some(record.reason.clone()),
            },
            _ => TimeoutStatus { timed_out: false, expires: None, reason: None },
        }
    }

    #[must_use]
    pub fn record(&self, user_id: &str) -> Option<&TimeoutRecord> {
        self.timeouts.get(user_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.timeouts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.timeouts.is_empty()
    }
}

// =============================================================================
// USERNAME DIRECTORY
// =============================================================================

/// Last-seen display name per user id. Never pruned.
#[derive(Debug, Default)]
pub struct UsernameDirectory {
    names: HashMap<String, String>,
}

impl UsernameDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, user_id: &str, username: &str) {
        if self.names.get(user_id).map(String::as_str) != Some(username) {
            self.names.insert(user_id.to_owned(), username.to_owned());
        }
    }

    #[must_use]
    pub fn get(&self, user_id: &str) -> Option<&str> {
        self.names.get(user_id).map(String::as_str)
    }

    /// Known display name, or the raw id when the user was never seen.
    #[must_use]
    pub fn display_name<'a>(&'a self, user_id: &'a str) -> &'a str {
        self.get(user_id).unwrap_or(user_id)
    }
}

#[cfg(test)]
#[path = "moderation_test.rs"]
mod tests;
