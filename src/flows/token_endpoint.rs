//! Token Endpoint
//!
//! Form-encoded token requests (RFC 6749 Section 4.1.3, 4.4.2 and 6).

use base64::Engine;
use chrono::Utc;
use secrecy::ExposeSecret;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};
use url::form_urlencoded;

use crate::core::{HttpMethod, HttpRequest, HttpTransport};
use crate::error::{
    create_error_from_response, parse_error_response, map_token_error, LifecycleError,
    LifecycleResult, ProtocolError,
};
use crate::types::{ClientAuthMethod, ClientCredentials, TokenMaterial};

/// Grant sent to the token endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Grant {
    AuthorizationCode { code: String, redirect_uri: String },
    ClientCredentials { scope: Option<String> },
    RefreshToken { refresh_token: String },
}

impl Grant {
    pub fn grant_type(&self) -> &'static str {
        match self {
            Self::AuthorizationCode { .. } => "authorization_code",
            Self::ClientCredentials { .. } => "client_credentials",
            Self::RefreshToken { .. } => "refresh_token",
        }
    }

    fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("grant_type", self.grant_type().to_string())];
        match self {
            Self::AuthorizationCode { code, redirect_uri } => {
                params.push(("code", code.clone()));
                params.push(("redirect_uri", redirect_uri.clone()));
            }
            Self::ClientCredentials { scope } => {
                if let Some(scope) = scope.as_ref().filter(|s| !s.is_empty()) {
                    params.push(("scope", scope.clone()));
                }
            }
            Self::RefreshToken { refresh_token } => {
                params.push(("refresh_token", refresh_token.clone()));
            }
        }
        params
    }
}

/// Client for one provider token endpoint.
pub struct TokenEndpoint<T: HttpTransport> {
    url: String,
    credentials: ClientCredentials,
    timeout: Duration,
    transport: Arc<T>,
}

impl<T: HttpTransport> TokenEndpoint<T> {
    pub fn new(
        url: impl Into<String>,
        credentials: ClientCredentials,
        timeout: Duration,
        transport: Arc<T>,
    ) -> Self {
        Self {
            url: url.into(),
            credentials,
            timeout,
            transport,
        }
    }

    fn build_request_body(&self, grant: &Grant) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (key, value) in grant.params() {
            serializer.append_pair(key, &value);
        }

        if self.credentials.auth_method == ClientAuthMethod::ClientSecretPost {
            serializer.append_pair("client_id", &self.credentials.client_id);
            if let Some(secret) = &self.credentials.client_secret {
                serializer.append_pair("client_secret", secret.expose_secret());
            }
        }

        serializer.finish()
    }

    fn build_request_headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert(
            "content-type".to_string(),
            "application/x-www-form-urlencoded".to_string(),
        );
        headers.insert("accept".to_string(), "application/json".to_string());

        if self.credentials.auth_method == ClientAuthMethod::ClientSecretBasic {
            if let Some(secret) = &self.credentials.client_secret {
                let credentials = format!(
                    "{}:{}",
                    self.credentials.client_id,
                    secret.expose_secret()
                );
                let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);
                headers.insert("authorization".to_string(), format!("Basic {}", encoded));
            }
        }

        headers
    }

    /// Send `grant` and parse the token response.
    pub async fn request(&self, grant: Grant) -> LifecycleResult<TokenMaterial> {
        let grant_type = grant.grant_type();
        let request = HttpRequest {
            method: HttpMethod::Post,
            url: self.url.clone(),
            headers: self.build_request_headers(),
            body: Some(self.build_request_body(&grant)),
            timeout: Some(self.timeout),
        };

        debug!(grant_type, url = %self.url, "requesting token");
        let response = self.transport.send(request).await?;

        if !response.is_success() {
            let error = create_error_from_response(response.status, &response.body);
            error!(grant_type, status = response.status, error = %error, "token request rejected");
            return Err(error);
        }

        let material: TokenMaterial = serde_json::from_str(&response.body).map_err(|e| {
            LifecycleError::Protocol(ProtocolError::InvalidJson {
                message: e.to_string(),
            })
        })?;

        if material.access_token.is_empty() {
            // Some providers answer 200 with an error document.
            if let Some(body) = parse_error_response(&response.body) {
                return Err(LifecycleError::Provider(map_token_error(&body)));
            }
            return Err(LifecycleError::Protocol(ProtocolError::MissingField {
                field: "access_token".to_string(),
            }));
        }

        if let Err(e) = material.expiry(Utc::now()) {
            error!(grant_type, error = %e, "token response has unusable expiry");
            return Err(LifecycleError::Protocol(ProtocolError::InvalidResponse {
                message: e.to_string(),
            }));
        }

        Ok(material)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{HttpResponse, MockHttpTransport};
    use crate::error::ProviderError;
    use secrecy::SecretString;
    use serde_json::json;

    fn credentials(method: ClientAuthMethod) -> ClientCredentials {
        ClientCredentials {
            client_id: "client-1".to_string(),
            client_secret: Some(SecretString::new("s3cret".to_string())),
            auth_method: method,
        }
    }

    fn endpoint(
        method: ClientAuthMethod,
        transport: Arc<MockHttpTransport>,
    ) -> TokenEndpoint<MockHttpTransport> {
        TokenEndpoint::new(
            "https://provider.example.com/oauth/token",
            credentials(method),
            Duration::from_secs(5),
            transport,
        )
    }

    #[tokio::test]
    async fn test_basic_auth_header() {
        let transport = Arc::new(MockHttpTransport::new());
        transport.queue_json_response(200, &json!({"access_token": "a", "expires_in": 60}));

        let material = endpoint(ClientAuthMethod::ClientSecretBasic, transport.clone())
            .request(Grant::RefreshToken {
                refresh_token: "r 1".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(material.access_token, "a");

        let sent = transport.get_last_request().unwrap();
        let expected = base64::engine::general_purpose::STANDARD.encode("client-1:s3cret");
        assert_eq!(
            sent.headers.get("authorization"),
            Some(&format!("Basic {}", expected))
        );
        let body = sent.body.unwrap();
        assert!(body.contains("grant_type=refresh_token"));
        assert!(body.contains("refresh_token=r+1"));
        assert!(!body.contains("client_secret"));
    }

    #[tokio::test]
    async fn test_client_secret_post() {
        let transport = Arc::new(MockHttpTransport::new());
        transport.queue_json_response(200, &json!({"access_token": "a"}));

        endpoint(ClientAuthMethod::ClientSecretPost, transport.clone())
            .request(Grant::ClientCredentials {
                scope: Some("fields:read".to_string()),
            })
            .await
            .unwrap();

        let sent = transport.get_last_request().unwrap();
        assert!(!sent.headers.contains_key("authorization"));
        let body = sent.body.unwrap();
        assert!(body.contains("client_id=client-1"));
        assert!(body.contains("client_secret=s3cret"));
        assert!(body.contains("scope=fields%3Aread"));
    }

    #[tokio::test]
    async fn test_error_response_mapped() {
        let transport = Arc::new(MockHttpTransport::new());
        transport.queue_json_response(
            400,
            &json!({"error": "invalid_grant", "error_description": "expired"}),
        );

        let err = endpoint(ClientAuthMethod::ClientSecretBasic, transport)
            .request(Grant::AuthorizationCode {
                code: "c".to_string(),
                redirect_uri: "https://app.example.com/cb".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Provider(ProviderError::InvalidGrant { .. })
        ));
    }

    #[tokio::test]
    async fn test_error_document_with_200() {
        let transport = Arc::new(MockHttpTransport::new());
        transport.queue_json_response(200, &json!({"error": "invalid_client"}));

        let err = endpoint(ClientAuthMethod::ClientSecretBasic, transport)
            .request(Grant::ClientCredentials { scope: None })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Provider(ProviderError::InvalidClient { .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_json() {
        let transport = Arc::new(MockHttpTransport::new());
        transport.queue_response(HttpResponse::new(200, "<html>"));

        let err = endpoint(ClientAuthMethod::ClientSecretBasic, transport)
            .request(Grant::ClientCredentials { scope: None })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Protocol(ProtocolError::InvalidJson { .. })
        ));
    }

    #[tokio::test]
    async fn test_unrepresentable_expires_in() {
        let transport = Arc::new(MockHttpTransport::new());
        transport.queue_json_response(200, &json!({"access_token": "a", "expires_in": u64::MAX}));

        let err = endpoint(ClientAuthMethod::ClientSecretBasic, transport)
            .request(Grant::RefreshToken {
                refresh_token: "r".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Protocol(ProtocolError::InvalidResponse { .. })
        ));
        assert_eq!(err.status_code(), 500);
    }
}
