//! Query Capability
//!
//! Parameterized GraphQL queries and mutations against the backing store.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::core::{HttpMethod, HttpRequest, HttpTransport, ReqwestHttpTransport};
use crate::error::{LifecycleError, LifecycleResult, NetworkError, ProtocolError};

/// A query or mutation with its variables.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<Value>,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>, variables: Value) -> Self {
        Self {
            query: query.into(),
            variables: Some(variables),
        }
    }
}

/// Error entry reported by the backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl QueryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
            extensions: None,
        }
    }
}

/// Raw response body: `data` and `errors` may both be present.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub errors: Vec<QueryError>,
}

/// A response that carried errors, with whatever data came back alongside.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryFailure {
    pub data: Option<Value>,
    pub errors: Vec<QueryError>,
}

impl QueryFailure {
    /// Messages joined for reporting.
    pub fn message(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Any error message contains `needle`.
    pub fn mentions(&self, needle: &str) -> bool {
        self.errors.iter().any(|e| e.message.contains(needle))
    }
}

impl QueryResponse {
    pub fn success(data: Value) -> Self {
        Self {
            data: Some(data),
            errors: Vec::new(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            data: None,
            errors: vec![QueryError::new(message)],
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn first_error_message(&self) -> Option<&str> {
        self.errors.first().map(|e| e.message.as_str())
    }

    /// Success only when no errors were reported, even if data is present.
    pub fn into_result(self) -> Result<Value, QueryFailure> {
        if self.errors.is_empty() {
            Ok(self.data.unwrap_or(Value::Null))
        } else {
            Err(QueryFailure {
                data: self.data,
                errors: self.errors,
            })
        }
    }
}

/// Query capability interface.
#[async_trait]
pub trait QueryClient: Send + Sync {
    /// Execute a query. Backend-reported errors come back inside the
    /// response; only transport failures are returned as `Err`.
    async fn execute(&self, request: QueryRequest) -> LifecycleResult<QueryResponse>;
}

/// GraphQL client over HTTP.
pub struct GraphQlQueryClient<T: HttpTransport = ReqwestHttpTransport> {
    endpoint: String,
    api_token: Option<SecretString>,
    timeout: Duration,
    transport: Arc<T>,
}

impl<T: HttpTransport> GraphQlQueryClient<T> {
    pub fn new(endpoint: impl Into<String>, transport: Arc<T>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_token: None,
            timeout: Duration::from_secs(30),
            transport,
        }
    }

    pub fn with_api_token(mut self, token: SecretString) -> Self {
        self.api_token = Some(token);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl<T: HttpTransport> QueryClient for GraphQlQueryClient<T> {
    async fn execute(&self, request: QueryRequest) -> LifecycleResult<QueryResponse> {
        let body = serde_json::to_string(&request).map_err(|e| {
            LifecycleError::Protocol(ProtocolError::InvalidJson {
                message: e.to_string(),
            })
        })?;

        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        headers.insert("Accept".to_string(), "application/json".to_string());
        if let Some(token) = &self.api_token {
            headers.insert(
                "Authorization".to_string(),
                format!("Bearer {}", token.expose_secret()),
            );
        }

        let response = self
            .transport
            .send(HttpRequest {
                method: HttpMethod::Post,
                url: self.endpoint.clone(),
                headers,
                body: Some(body),
                timeout: Some(self.timeout),
            })
            .await?;

        // GraphQL servers report errors in the body, sometimes with non-2xx.
        match serde_json::from_str::<QueryResponse>(&response.body) {
            Ok(parsed) => Ok(parsed),
            Err(_) if !response.is_success() => Err(LifecycleError::Protocol(
                ProtocolError::InvalidResponse {
                    message: format!("query endpoint returned HTTP {}", response.status),
                },
            )),
            Err(e) => Err(LifecycleError::Protocol(ProtocolError::InvalidJson {
                message: e.to_string(),
            })),
        }
    }
}

type QueryHandler = Box<dyn Fn(&QueryRequest) -> QueryResponse + Send + Sync>;

/// Mock query client for testing.
#[derive(Default)]
pub struct MockQueryClient {
    responses: Mutex<VecDeque<LifecycleResult<QueryResponse>>>,
    handler: Mutex<Option<QueryHandler>>,
    history: Mutex<Vec<QueryRequest>>,
}

impl MockQueryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response. Queued responses are used before the handler.
    pub fn queue_response(&self, response: QueryResponse) -> &Self {
        self.responses.lock().unwrap().push_back(Ok(response));
        self
    }

    /// Queue a transport failure.
    pub fn queue_error(&self, error: LifecycleError) -> &Self {
        self.responses.lock().unwrap().push_back(Err(error));
        self
    }

    /// Answer every unqueued request with `handler`.
    pub fn set_handler<F>(&self, handler: F) -> &Self
    where
        F: Fn(&QueryRequest) -> QueryResponse + Send + Sync + 'static,
    {
        *self.handler.lock().unwrap() = Some(Box::new(handler));
        self
    }

    pub fn get_requests(&self) -> Vec<QueryRequest> {
        self.history.lock().unwrap().clone()
    }

    /// Requests whose document contains `fragment`.
    pub fn requests_matching(&self, fragment: &str) -> Vec<QueryRequest> {
        self.history
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.query.contains(fragment))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl QueryClient for MockQueryClient {
    async fn execute(&self, request: QueryRequest) -> LifecycleResult<QueryResponse> {
        self.history.lock().unwrap().push(request.clone());

        if let Some(queued) = self.responses.lock().unwrap().pop_front() {
            return queued;
        }

        match self.handler.lock().unwrap().as_ref() {
            Some(handler) => Ok(handler(&request)),
            None => Err(LifecycleError::Network(NetworkError::ConnectionFailed {
                message: "No mock response available".to_string(),
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{HttpResponse, MockHttpTransport};
    use serde_json::json;

    #[test]
    fn test_data_with_errors_is_failure() {
        let response = QueryResponse {
            data: Some(json!({"row": {"id": "1"}})),
            errors: vec![QueryError::new("errorCode must be an integer")],
        };

        let failure = response.into_result().unwrap_err();
        assert!(failure.data.is_some());
        assert!(failure.mentions("must be an integer"));
    }

    #[test]
    fn test_success_without_errors() {
        let value = QueryResponse::success(json!({"ok": 1})).into_result().unwrap();
        assert_eq!(value["ok"], 1);
    }

    #[test]
    fn test_parse_response_without_errors_field() {
        let parsed: QueryResponse = serde_json::from_str(r#"{"data": {"table": null}}"#).unwrap();
        assert!(!parsed.has_errors());
        assert_eq!(parsed.data, Some(json!({"table": null})));
    }

    #[tokio::test]
    async fn test_graphql_client_sends_bearer_token() {
        let transport = Arc::new(MockHttpTransport::new());
        transport.queue_json_response(200, &json!({"data": {"ok": true}}));

        let client = GraphQlQueryClient::new("https://store.example.com/graphql", transport.clone())
            .with_api_token(SecretString::new("store-token".to_string()));

        let response = client
            .execute(QueryRequest::new("query { ok }", json!({})))
            .await
            .unwrap();
        assert_eq!(response.data, Some(json!({"ok": true})));

        let sent = transport.get_last_request().unwrap();
        assert_eq!(sent.method, HttpMethod::Post);
        assert_eq!(
            sent.headers.get("Authorization").map(String::as_str),
            Some("Bearer store-token")
        );
        let body: Value = serde_json::from_str(sent.body.as_deref().unwrap()).unwrap();
        assert_eq!(body["query"], "query { ok }");
    }

    #[tokio::test]
    async fn test_graphql_client_non_json_error_status() {
        let transport = Arc::new(MockHttpTransport::new());
        transport.queue_response(HttpResponse::new(502, "bad gateway"));

        let client = GraphQlQueryClient::new("https://store.example.com/graphql", transport);
        let result = client.execute(QueryRequest::new("query { ok }", json!({}))).await;
        assert!(matches!(
            result,
            Err(LifecycleError::Protocol(ProtocolError::InvalidResponse { .. }))
        ));
    }

    #[tokio::test]
    async fn test_mock_queue_before_handler() {
        let mock = MockQueryClient::new();
        mock.queue_response(QueryResponse::failure("first"));
        mock.set_handler(|_| QueryResponse::success(json!({"handled": true})));

        let first = mock.execute(QueryRequest::new("a", json!({}))).await.unwrap();
        assert_eq!(first.first_error_message(), Some("first"));

        let second = mock.execute(QueryRequest::new("b", json!({}))).await.unwrap();
        assert_eq!(second.data, Some(json!({"handled": true})));
        assert_eq!(mock.requests_matching("b").len(), 1);
    }
}
