//! Token Record Types
//!
//! In-memory representation of one persisted token row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Column holding the current access token.
pub const ACCESS_TOKEN_COLUMN: &str = "accessToken";
/// Column holding the access token expiry.
pub const ACCESS_EXPIRES_AT_COLUMN: &str = "access_expires_at";
/// Column holding the current refresh token.
pub const REFRESH_TOKEN_COLUMN: &str = "refreshToken";
/// Column holding the latest error code.
pub const ERROR_CODE_COLUMN: &str = "errorCode";

/// External identity used for the shared service-account token.
pub const SERVICE_ACCOUNT_EXTERNAL_KEY: &str = "serviceAccount";
/// External identity used for the client-credentials token.
pub const CLIENT_CREDENTIALS_EXTERNAL_KEY: &str = "clientCredentialsToken";

/// Expiry value marking an access token that never expires.
///
/// Only meaningful together with a non-empty access token and an empty
/// refresh token; rows written with this convention stay readable.
pub fn valid_forever_expiry() -> DateTime<Utc> {
    // 1970-01-01T00:00:00Z
    DateTime::<Utc>::default()
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn null_as_epoch<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let value = Option::<DateTime<Utc>>::deserialize(deserializer)?;
    Ok(value.unwrap_or_else(valid_forever_expiry))
}

/// Failure classification persisted alongside a token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    /// The downstream resource server rejected the token.
    InnerAuthorizationFailed,
}

impl ErrorCode {
    pub fn as_i64(&self) -> i64 {
        match self {
            Self::InnerAuthorizationFailed => 1,
        }
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            1 => Some(Self::InnerAuthorizationFailed),
            _ => None,
        }
    }
}

/// Full field set written to a token row.
///
/// Serializes with the table's column names. `error_code: None` is written
/// as `null`, which clears a previously stored code. When reading, unset or
/// `null` tokens are empty and an unset expiry is the epoch.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenFields {
    #[serde(rename = "accessToken", default, deserialize_with = "null_as_empty")]
    pub access_token: String,
    #[serde(
        rename = "access_expires_at",
        default = "valid_forever_expiry",
        deserialize_with = "null_as_epoch"
    )]
    pub access_expires_at: DateTime<Utc>,
    #[serde(rename = "refreshToken", default, deserialize_with = "null_as_empty")]
    pub refresh_token: String,
    #[serde(rename = "errorCode", default)]
    pub error_code: Option<i64>,
}

impl TokenFields {
    /// Blank tokens stamped with `now` so date column validation passes.
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            access_token: String::new(),
            access_expires_at: now,
            refresh_token: String::new(),
            error_code: None,
        }
    }

    /// Blank tokens tagged with an error code.
    pub fn empty_with_error(now: DateTime<Utc>, code: ErrorCode) -> Self {
        Self {
            error_code: Some(code.as_i64()),
            ..Self::empty(now)
        }
    }

    /// Convert into a JSON object keyed by column name.
    pub fn to_row(&self) -> serde_json::Value {
        serde_json::json!({
            ACCESS_TOKEN_COLUMN: self.access_token,
            ACCESS_EXPIRES_AT_COLUMN: self.access_expires_at,
            REFRESH_TOKEN_COLUMN: self.refresh_token,
            ERROR_CODE_COLUMN: self.error_code,
        })
    }
}

impl std::fmt::Debug for TokenFields {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenFields")
            .field("access_token", &redact(&self.access_token))
            .field("access_expires_at", &self.access_expires_at)
            .field("refresh_token", &redact(&self.refresh_token))
            .field("error_code", &self.error_code)
            .finish()
    }
}

/// One persisted token plus the identity it belongs to.
#[derive(Clone, PartialEq)]
pub struct TokenRecord {
    /// Unique key: a user identifier or a sentinel service key.
    pub external_id: String,
    /// Opaque bearer credential; empty when none was issued yet.
    pub access_token: String,
    /// Opaque refresh credential; empty for grants that never issue one.
    pub refresh_token: String,
    /// Absolute access token expiry.
    pub access_expires_at: DateTime<Utc>,
    /// Last known failure classification.
    pub error_code: Option<i64>,
}

impl TokenRecord {
    /// Create a record from an identity and a field set.
    pub fn new(external_id: impl Into<String>, fields: TokenFields) -> Self {
        Self {
            external_id: external_id.into(),
            access_token: fields.access_token,
            refresh_token: fields.refresh_token,
            access_expires_at: fields.access_expires_at,
            error_code: fields.error_code,
        }
    }

    /// Empty placeholder record.
    pub fn empty(external_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self::new(external_id, TokenFields::empty(now))
    }

    /// Record that carries an access token which never expires.
    pub fn valid_forever(external_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self::new(
            external_id,
            TokenFields {
                access_token: access_token.into(),
                access_expires_at: valid_forever_expiry(),
                refresh_token: String::new(),
                error_code: None,
            },
        )
    }

    /// Parse a row returned by the datastore.
    pub fn from_row(
        external_id: impl Into<String>,
        row: serde_json::Value,
    ) -> Result<Self, serde_json::Error> {
        let fields: TokenFields = serde_json::from_value(row)?;
        Ok(Self::new(external_id, fields))
    }

    /// Field set for writing this record back.
    pub fn fields(&self) -> TokenFields {
        TokenFields {
            access_token: self.access_token.clone(),
            access_expires_at: self.access_expires_at,
            refresh_token: self.refresh_token.clone(),
            error_code: self.error_code,
        }
    }

    /// Same record tagged with an error code.
    pub fn with_error(mut self, code: ErrorCode) -> Self {
        self.error_code = Some(code.as_i64());
        self
    }

    /// Non-empty access token, no refresh token, epoch expiry.
    pub fn is_valid_forever(&self) -> bool {
        self.refresh_token.is_empty()
            && !self.access_token.is_empty()
            && self.access_expires_at == valid_forever_expiry()
    }

    /// Either token is missing.
    pub fn is_empty(&self) -> bool {
        self.access_token.is_empty() || self.refresh_token.is_empty()
    }

    /// Decoded error code, if it is one this crate knows about.
    pub fn error(&self) -> Option<ErrorCode> {
        self.error_code.and_then(ErrorCode::from_i64)
    }
}

impl std::fmt::Debug for TokenRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRecord")
            .field("external_id", &self.external_id)
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .field("access_expires_at", &self.access_expires_at)
            .field("error_code", &self.error_code)
            .finish()
    }
}

fn redact(value: &str) -> &'static str {
    if value.is_empty() {
        ""
    } else {
        "[REDACTED]"
    }
}
