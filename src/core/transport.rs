//! HTTP Transport
//!
//! HTTP client interface and implementations for provider, datastore and
//! inner-authorization requests.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::str::FromStr;
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{ConfigurationError, LifecycleError, NetworkError, ProtocolError};

/// Default response size limit (1MB).
pub const DEFAULT_MAX_RESPONSE_SIZE: usize = 1_048_576;

/// HTTP request definition.
#[derive(Clone, Debug)]
pub struct HttpRequest {
    /// HTTP method.
    pub method: HttpMethod,
    /// Request URL.
    pub url: String,
    /// Request headers.
    pub headers: HashMap<String, String>,
    /// Request body.
    pub body: Option<String>,
    /// Request timeout.
    pub timeout: Option<Duration>,
}

/// HTTP method.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            other => Err(other.to_string()),
        }
    }
}

/// HTTP response definition.
#[derive(Clone, Debug)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: HashMap<String, String>,
    /// Response body.
    pub body: String,
}

impl HttpResponse {
    /// Response with a status and body and no headers.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    /// Check for a 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends one request and returns the buffered response.
///
/// Non-2xx statuses are returned as responses; only transport-level
/// problems are `Err`.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, LifecycleError>;
}

/// Transport over a shared `reqwest::Client`.
///
/// Redirects are never followed and bodies above the configured limit are
/// rejected.
pub struct ReqwestHttpTransport {
    client: reqwest::Client,
    default_timeout: Duration,
    max_response_size: usize,
}

impl ReqwestHttpTransport {
    pub fn new() -> Result<Self, LifecycleError> {
        Self::with_options(Duration::from_secs(30), DEFAULT_MAX_RESPONSE_SIZE)
    }

    pub fn with_options(
        timeout: Duration,
        max_response_size: usize,
    ) -> Result<Self, LifecycleError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ConfigurationError::InvalidConfig {
                message: format!("cannot build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            default_timeout: timeout,
            max_response_size,
        })
    }

    fn check_size(&self, size: usize) -> Result<(), LifecycleError> {
        if size > self.max_response_size {
            return Err(ProtocolError::ResponseTooLarge { size }.into());
        }
        Ok(())
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

fn send_error(error: reqwest::Error, timeout: Duration) -> LifecycleError {
    if error.is_timeout() {
        NetworkError::Timeout { timeout }.into()
    } else {
        NetworkError::ConnectionFailed {
            message: error.to_string(),
        }
        .into()
    }
}

#[async_trait]
impl HttpTransport for ReqwestHttpTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, LifecycleError> {
        let HttpRequest {
            method,
            url,
            headers,
            body,
            timeout,
        } = request;
        let timeout = timeout.unwrap_or(self.default_timeout);

        let mut builder = self
            .client
            .request(method.into(), url.as_str())
            .timeout(timeout);
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| send_error(e, timeout))?;
        let status = response.status();

        if status.is_redirection() {
            let location = response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            return Err(ProtocolError::UnexpectedRedirect { location }.into());
        }

        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();

        if let Some(declared) = response.content_length() {
            self.check_size(declared as usize)?;
        }
        let body = response
            .text()
            .await
            .map_err(|e| ProtocolError::InvalidResponse {
                message: e.to_string(),
            })?;
        self.check_size(body.len())?;

        Ok(HttpResponse {
            status: status.as_u16(),
            headers,
            body,
        })
    }
}

/// Scripted transport for tests.
///
/// Replies are consumed in order; once the script is exhausted the fallback
/// response is used, or a connection failure if none is set.
#[derive(Default)]
pub struct MockHttpTransport {
    script: Mutex<VecDeque<Result<HttpResponse, String>>>,
    sent: Mutex<Vec<HttpRequest>>,
    fallback: Mutex<Option<HttpResponse>>,
}

impl MockHttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_response(&self, response: HttpResponse) -> &Self {
        self.script.lock().unwrap().push_back(Ok(response));
        self
    }

    /// Queue `body` serialized as JSON with a JSON content type.
    pub fn queue_json_response<B: serde::Serialize>(&self, status: u16, body: &B) -> &Self {
        let mut response = HttpResponse::new(status, serde_json::to_string(body).unwrap());
        response
            .headers
            .insert("content-type".to_string(), "application/json".to_string());
        self.queue_response(response)
    }

    /// Queue a connection failure.
    pub fn queue_failure(&self, message: impl Into<String>) -> &Self {
        self.script.lock().unwrap().push_back(Err(message.into()));
        self
    }

    pub fn set_default_response(&self, response: HttpResponse) -> &Self {
        *self.fallback.lock().unwrap() = Some(response);
        self
    }

    pub fn get_requests(&self) -> Vec<HttpRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub fn get_last_request(&self) -> Option<HttpRequest> {
        self.sent.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl HttpTransport for MockHttpTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, LifecycleError> {
        self.sent.lock().unwrap().push(request);

        let next = self.script.lock().unwrap().pop_front();
        let reply = match next {
            Some(reply) => reply,
            None => self
                .fallback
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| "No mock response available".to_string()),
        };
        reply.map_err(|message| NetworkError::ConnectionFailed { message }.into())
    }
}
