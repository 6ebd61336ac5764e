//! Session operations: initiate, callback exchange, external store, logout.

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, error, info, instrument};

use super::{normalize_issued, CallerContext, LifecycleOrchestrator};
use crate::core::{Datastore, HttpMethod, HttpTransport, QueryClient};
use crate::error::{LifecycleResult, ValidationError};
use crate::flows::OAuthProvider;
use crate::types::{LifecycleResponse, TokenFields, TokenMaterial};

/// Out-of-band token submission as received by the routing layer.
#[derive(Clone, Debug, Default)]
pub struct StoreTokenRequest {
    /// HTTP method of the incoming request.
    pub method: String,
    /// Raw request body, expected to be `{"token": {...}}`.
    pub body: Option<String>,
}

impl StoreTokenRequest {
    pub fn new(method: impl Into<String>, body: Option<String>) -> Self {
        Self {
            method: method.into(),
            body,
        }
    }

    /// Validate method and body and extract the token material.
    pub fn parse(&self) -> Result<TokenMaterial, ValidationError> {
        match self.method.parse::<HttpMethod>() {
            Ok(HttpMethod::Post) | Ok(HttpMethod::Put) => {}
            _ => {
                return Err(ValidationError::InvalidMethod {
                    method: self.method.clone(),
                })
            }
        }

        let body = self
            .body
            .as_deref()
            .filter(|b| !b.trim().is_empty())
            .ok_or(ValidationError::MissingBody)?;

        let mut parsed: Value =
            serde_json::from_str(body).map_err(|e| ValidationError::MalformedBody {
                message: e.to_string(),
            })?;

        let token = match parsed.get_mut("token").map(Value::take) {
            Some(token @ Value::Object(_)) => token,
            _ => return Err(ValidationError::MissingToken),
        };

        let material: TokenMaterial =
            serde_json::from_value(token).map_err(|e| ValidationError::MalformedBody {
                message: e.to_string(),
            })?;
        material.validate(Utc::now())?;
        Ok(material)
    }
}

impl<Q, D, P, T> LifecycleOrchestrator<Q, D, P, T>
where
    Q: QueryClient,
    D: Datastore,
    P: OAuthProvider,
    T: HttpTransport,
{
    /// Authorization request URL. `callback_params` are appended to the
    /// callback URL sent as `redirect_uri`.
    #[instrument(skip(self, callback_params))]
    pub fn initiate(&self, callback_params: &[(&str, &str)]) -> LifecycleResponse {
        let result = self
            .redirect_uri(callback_params)
            .and_then(|redirect_uri| self.provider.authorization_url(&redirect_uri));

        match result {
            Ok(url) => {
                debug!("authorization url built");
                LifecycleResponse::authorization_url(url)
            }
            Err(e) => {
                error!(error = %e, "failed to build authorization url");
                LifecycleResponse::from(&e)
            }
        }
    }

    /// Exchange an authorization code for token material.
    ///
    /// `callback_params` must match the ones given to [`Self::initiate`] so
    /// the `redirect_uri` is identical.
    #[instrument(
        skip(self, caller, code, callback_params),
        fields(username = %caller.username, service_account = caller.service_account)
    )]
    pub async fn exchange_callback(
        &self,
        caller: &CallerContext,
        code: Option<&str>,
        callback_params: &[(&str, &str)],
    ) -> LifecycleResponse {
        match self.try_exchange_callback(caller, code, callback_params).await {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, code = e.error_code(), "authorization code exchange failed");
                LifecycleResponse::from(&e)
            }
        }
    }

    async fn try_exchange_callback(
        &self,
        caller: &CallerContext,
        code: Option<&str>,
        callback_params: &[(&str, &str)],
    ) -> LifecycleResult<LifecycleResponse> {
        let code = code
            .filter(|c| !c.is_empty())
            .ok_or(ValidationError::MissingCode)?;
        let redirect_uri = self.redirect_uri(callback_params)?;

        let now = Utc::now();
        let material = self.provider.exchange_code(code, &redirect_uri).await?;
        let material = normalize_issued(material, now)?;

        if self.config.persist_on_exchange {
            let identity = self.storage_identity(caller)?;
            let store = self.token_store().await?;
            store
                .upsert(&identity.external_id, &material.to_fields(now)?)
                .await?;
            info!(external_id = %identity.external_id, "stored exchanged token");
        }

        Ok(LifecycleResponse::token(material))
    }

    /// Store token material obtained outside this system.
    ///
    /// The request is validated before any storage access.
    #[instrument(
        skip(self, caller, request),
        fields(username = %caller.username, method = %request.method)
    )]
    pub async fn store_external(
        &self,
        caller: &CallerContext,
        request: StoreTokenRequest,
    ) -> LifecycleResponse {
        match self.try_store_external(caller, &request).await {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, code = e.error_code(), "storing token failed");
                LifecycleResponse::from(&e)
            }
        }
    }

    async fn try_store_external(
        &self,
        caller: &CallerContext,
        request: &StoreTokenRequest,
    ) -> LifecycleResult<LifecycleResponse> {
        let material = request.parse()?;
        let identity = self.storage_identity(caller)?;

        let now = Utc::now();
        let material = material.normalized(now)?;
        let store = self.token_store().await?;
        store
            .upsert(&identity.external_id, &material.to_fields(now)?)
            .await?;
        info!(external_id = %identity.external_id, "stored external token");

        Ok(if identity.return_token_back {
            LifecycleResponse::token(material)
        } else {
            LifecycleResponse::ok()
        })
    }

    /// Reset the caller's record to the empty placeholder.
    #[instrument(
        skip(self, caller),
        fields(username = %caller.username, service_account = caller.service_account)
    )]
    pub async fn logout(&self, caller: &CallerContext) -> LifecycleResponse {
        match self.try_logout(caller).await {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, code = e.error_code(), "logout failed");
                LifecycleResponse::from(&e)
            }
        }
    }

    async fn try_logout(&self, caller: &CallerContext) -> LifecycleResult<LifecycleResponse> {
        let identity = self.storage_identity(caller)?;
        let store = self.token_store().await?;
        store
            .upsert(&identity.external_id, &TokenFields::empty(Utc::now()))
            .await?;
        info!(external_id = %identity.external_id, "credentials cleared");
        Ok(LifecycleResponse::ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(method: &str, body: Option<&str>) -> StoreTokenRequest {
        StoreTokenRequest::new(method, body.map(str::to_string))
    }

    #[test]
    fn test_parse_rejects_method() {
        let err = request("GET", Some(r#"{"token": {"access_token": "a"}}"#))
            .parse()
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid request method - please use POST or PUT"
        );
    }

    #[test]
    fn test_parse_missing_body_and_token() {
        assert_eq!(
            request("POST", None).parse().unwrap_err(),
            ValidationError::MissingBody
        );
        assert_eq!(
            request("PUT", Some("  ")).parse().unwrap_err(),
            ValidationError::MissingBody
        );
        assert_eq!(
            request("POST", Some(r#"{"access_token": "a"}"#))
                .parse()
                .unwrap_err(),
            ValidationError::MissingToken
        );
        assert_eq!(
            request("POST", Some(r#"{"token": null}"#)).parse().unwrap_err(),
            ValidationError::MissingToken
        );
    }

    #[test]
    fn test_parse_malformed() {
        assert!(matches!(
            request("POST", Some("{not json")).parse(),
            Err(ValidationError::MalformedBody { .. })
        ));
        assert!(matches!(
            request("POST", Some(r#"{"token": {"refresh_token": "r"}}"#)).parse(),
            Err(ValidationError::MissingTokenField { .. })
        ));
    }

    #[test]
    fn test_parse_expires_in_out_of_range() {
        let body = format!(r#"{{"token": {{"access_token": "a", "expires_in": {}}}}}"#, u64::MAX);
        assert_eq!(
            request("POST", Some(&body)).parse().unwrap_err(),
            ValidationError::ExpiresInOutOfRange {
                expires_in: u64::MAX
            }
        );
    }

    #[test]
    fn test_parse_valid() {
        let material = request(
            "put",
            Some(r#"{"token": {"access_token": "a", "refresh_token": "r", "expires_in": 3600}}"#),
        )
        .parse()
        .unwrap();
        assert_eq!(material.access_token, "a");
        assert_eq!(material.refresh_token.as_deref(), Some("r"));
    }
}
