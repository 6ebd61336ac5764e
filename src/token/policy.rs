//! Refresh Policy
//!
//! Decides what to do with a stored token at a point in time.

use chrono::{DateTime, Duration, Utc};

use crate::types::{TokenRecord, DEFAULT_REFRESH_WINDOW};

/// Outcome of evaluating a stored token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshDecision {
    /// Access token never expires; nothing to return or refresh.
    ValidForever,
    /// No usable credential.
    Empty,
    /// Expired or expiring within the refresh window.
    NeedsRefresh,
    /// Usable as-is.
    Fresh,
}

/// Refresh decision logic with a configurable look-ahead window.
#[derive(Clone, Copy, Debug)]
pub struct RefreshPolicy {
    window: Duration,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_REFRESH_WINDOW.as_secs() as i64))
    }
}

impl RefreshPolicy {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Evaluate a record. The valid-forever check runs before the empty check.
    pub fn decide(&self, record: &TokenRecord, now: DateTime<Utc>) -> RefreshDecision {
        if record.is_valid_forever() {
            RefreshDecision::ValidForever
        } else if record.is_empty() {
            RefreshDecision::Empty
        } else if self.is_due(record.access_expires_at, now) {
            RefreshDecision::NeedsRefresh
        } else {
            RefreshDecision::Fresh
        }
    }

    /// Whether the client-credentials token must be fetched again.
    ///
    /// Client-credentials rows carry no refresh token, so only the access
    /// token and its expiry matter.
    pub fn client_credentials_due(&self, record: Option<&TokenRecord>, now: DateTime<Utc>) -> bool {
        match record {
            None => true,
            Some(record) if record.access_token.is_empty() => true,
            Some(record) => self.is_due(record.access_expires_at, now),
        }
    }

    /// An expiry too close to the representable minimum counts as due.
    fn is_due(&self, expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match expires_at.checked_sub_signed(self.window) {
            Some(refresh_at) => now >= refresh_at,
            None => true,
        }
    }
}
