//! Authorization Code Flow
//!
//! RFC 6749 Section 4.1.1 - Authorization request URL.

use url::Url;

use crate::error::{ConfigurationError, LifecycleResult};
use crate::types::AuthorizeParams;

/// Build the URL the user agent is sent to for authorization.
///
/// Extra parameters are appended after the standard ones; they cannot
/// override `response_type`, `client_id` or `redirect_uri`.
pub fn build_authorization_url(
    authorization_endpoint: &str,
    client_id: &str,
    redirect_uri: &str,
    params: &AuthorizeParams,
) -> LifecycleResult<String> {
    let mut url = Url::parse(authorization_endpoint).map_err(|_| {
        ConfigurationError::InvalidEndpoint {
            url: authorization_endpoint.to_string(),
        }
    })?;

    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("response_type", "code")
            .append_pair("client_id", client_id)
            .append_pair("redirect_uri", redirect_uri);

        if let Some(scope) = params.scope.as_deref().filter(|s| !s.is_empty()) {
            query.append_pair("scope", scope);
        }

        for (key, value) in &params.extra {
            if matches!(key.as_str(), "response_type" | "client_id" | "redirect_uri" | "scope") {
                continue;
            }
            query.append_pair(key, value);
        }
    }

    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn query_of(url: &str) -> BTreeMap<String, String> {
        Url::parse(url).unwrap().query_pairs().into_owned().collect()
    }

    #[test]
    fn test_standard_parameters() {
        let params = AuthorizeParams {
            scope: Some("fields:read users:read".to_string()),
            extra: BTreeMap::from([("page".to_string(), "oidcauthn".to_string())]),
        };

        let url = build_authorization_url(
            "https://provider.example.com/oauth/authorize",
            "client-1",
            "https://app.example.com/fn/oauth/auth/callback",
            &params,
        )
        .unwrap();

        assert!(url.starts_with("https://provider.example.com/oauth/authorize?"));
        let query = query_of(&url);
        assert_eq!(query["response_type"], "code");
        assert_eq!(query["client_id"], "client-1");
        assert_eq!(query["redirect_uri"], "https://app.example.com/fn/oauth/auth/callback");
        assert_eq!(query["scope"], "fields:read users:read");
        assert_eq!(query["page"], "oidcauthn");
    }

    #[test]
    fn test_extra_cannot_override_standard() {
        let params = AuthorizeParams {
            scope: None,
            extra: BTreeMap::from([("client_id".to_string(), "evil".to_string())]),
        };

        let url =
            build_authorization_url("https://p.example.com/auth", "client-1", "https://a/cb", &params)
                .unwrap();
        let pairs: Vec<_> = Url::parse(&url)
            .unwrap()
            .query_pairs()
            .filter(|(k, _)| k == "client_id")
            .map(|(_, v)| v.into_owned())
            .collect();
        assert_eq!(pairs, vec!["client-1".to_string()]);
        assert!(!query_of(&url).contains_key("scope"));
    }

    #[test]
    fn test_invalid_endpoint() {
        let err = build_authorization_url("not a url", "c", "https://a/cb", &AuthorizeParams::default())
            .unwrap_err();
        assert_eq!(err.status_code(), 500);
    }
}
