//! Token Types
//!
//! Token material returned by the provider or supplied by a caller.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::ValidationError;
use crate::types::{valid_forever_expiry, TokenFields};

/// Token material from the authorization server or an out-of-band caller.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenMaterial {
    /// Access token.
    #[serde(default)]
    pub access_token: String,
    /// Token type (usually "Bearer").
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Expires in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    /// Absolute expiry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Refresh token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Granted scopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// ID token (OIDC).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    /// Additional fields.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl TokenMaterial {
    /// Material carrying only an access token.
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: default_token_type(),
            expires_in: None,
            expires_at: None,
            refresh_token: None,
            scope: None,
            id_token: None,
            extra: HashMap::new(),
        }
    }

    /// Reject material that cannot be stored at `now`.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), ValidationError> {
        if self.access_token.is_empty() {
            return Err(ValidationError::MissingTokenField {
                field: "access_token".to_string(),
            });
        }
        self.expiry(now)?;
        Ok(())
    }

    /// Absolute expiry, computed from `expires_in` when `expires_at` is absent.
    ///
    /// An `expires_in` that does not yield a representable instant is
    /// rejected.
    pub fn expiry(&self, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, ValidationError> {
        match (self.expires_at, self.expires_in) {
            (Some(at), _) => Ok(Some(at)),
            (None, Some(secs)) => i64::try_from(secs)
                .ok()
                .and_then(Duration::try_seconds)
                .and_then(|ttl| now.checked_add_signed(ttl))
                .map(Some)
                .ok_or(ValidationError::ExpiresInOutOfRange { expires_in: secs }),
            (None, None) => Ok(None),
        }
    }

    fn has_refresh_token(&self) -> bool {
        self.refresh_token
            .as_deref()
            .map(|t| !t.is_empty())
            .unwrap_or(false)
    }

    /// Same material with `expires_at` filled in.
    pub fn normalized(mut self, now: DateTime<Utc>) -> Result<Self, ValidationError> {
        self.expires_at = self.expiry(now)?;
        Ok(self)
    }

    /// Keep `previous` as the refresh token if the provider did not rotate it.
    pub fn with_fallback_refresh_token(mut self, previous: &str) -> Self {
        if !self.has_refresh_token() && !previous.is_empty() {
            self.refresh_token = Some(previous.to_string());
        }
        self
    }

    /// Field set to persist for this material. Clears any stored error code.
    ///
    /// Without expiry information, material lacking a refresh token is stored
    /// as valid forever; material with one is stored as due for refresh.
    pub fn to_fields(&self, now: DateTime<Utc>) -> Result<TokenFields, ValidationError> {
        let access_expires_at = match self.expiry(now)? {
            Some(expiry) => expiry,
            None if self.has_refresh_token() => now,
            None => valid_forever_expiry(),
        };

        Ok(TokenFields {
            access_token: self.access_token.clone(),
            access_expires_at,
            refresh_token: self.refresh_token.clone().unwrap_or_default(),
            error_code: None,
        })
    }
}

impl std::fmt::Debug for TokenMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenMaterial")
            .field("access_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("expires_at", &self.expires_at)
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("scope", &self.scope)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_material_parsing() {
        let json = r#"{
            "access_token": "test-token",
            "token_type": "Bearer",
            "expires_in": 3600,
            "refresh_token": "test-refresh",
            "scope": "fields:read",
            "user": {"id": "42"}
        }"#;

        let material: TokenMaterial = serde_json::from_str(json).unwrap();
        assert_eq!(material.access_token, "test-token");
        assert_eq!(material.expires_in, Some(3600));
        assert_eq!(material.refresh_token, Some("test-refresh".to_string()));
        assert!(material.extra.contains_key("user"));
    }

    #[test]
    fn test_expiry_from_expires_in() {
        let now = Utc::now();
        let material = TokenMaterial {
            expires_in: Some(600),
            ..TokenMaterial::bearer("abc")
        };

        assert_eq!(material.expiry(now), Ok(Some(now + Duration::seconds(600))));
        let normalized = material.normalized(now).unwrap();
        assert_eq!(normalized.expires_at, Some(now + Duration::seconds(600)));
    }

    #[test]
    fn test_explicit_expires_at_wins() {
        let now = Utc::now();
        let at = now + Duration::hours(2);
        let material = TokenMaterial {
            expires_in: Some(10),
            expires_at: Some(at),
            ..TokenMaterial::bearer("abc")
        };
        assert_eq!(material.expiry(now), Ok(Some(at)));
    }

    #[test]
    fn test_to_fields_without_expiry() {
        let now = Utc::now();

        let forever = TokenMaterial::bearer("abc").to_fields(now).unwrap();
        assert_eq!(forever.access_expires_at, valid_forever_expiry());
        assert!(forever.refresh_token.is_empty());

        let refreshable = TokenMaterial {
            refresh_token: Some("r".to_string()),
            ..TokenMaterial::bearer("abc")
        }
        .to_fields(now)
        .unwrap();
        assert_eq!(refreshable.access_expires_at, now);
        assert_eq!(refreshable.refresh_token, "r");
        assert_eq!(refreshable.error_code, None);
    }

    #[test]
    fn test_fallback_refresh_token() {
        let rotated = TokenMaterial {
            refresh_token: Some("new".to_string()),
            ..TokenMaterial::bearer("a")
        }
        .with_fallback_refresh_token("old");
        assert_eq!(rotated.refresh_token.as_deref(), Some("new"));

        let kept = TokenMaterial::bearer("a").with_fallback_refresh_token("old");
        assert_eq!(kept.refresh_token.as_deref(), Some("old"));
    }

    #[test]
    fn test_validate_requires_access_token() {
        let now = Utc::now();
        assert!(TokenMaterial::bearer("").validate(now).is_err());
        assert!(TokenMaterial::bearer("abc").validate(now).is_ok());
    }

    #[test]
    fn test_expires_in_out_of_range() {
        let now = Utc::now();

        for expires_in in [u64::MAX, i64::MAX as u64, 10_000_000_000_000] {
            let material = TokenMaterial {
                expires_in: Some(expires_in),
                ..TokenMaterial::bearer("abc")
            };
            assert_eq!(
                material.expiry(now),
                Err(ValidationError::ExpiresInOutOfRange { expires_in })
            );
            assert!(material.validate(now).is_err());
            assert!(material.clone().normalized(now).is_err());
            assert!(material.to_fields(now).is_err());
        }
    }

    #[test]
    fn test_large_expires_at_is_kept() {
        let now = Utc::now();
        let at = now + Duration::days(365 * 100);
        let material = TokenMaterial {
            expires_in: Some(u64::MAX),
            expires_at: Some(at),
            ..TokenMaterial::bearer("abc")
        };
        assert_eq!(material.expiry(now), Ok(Some(at)));
    }
}
