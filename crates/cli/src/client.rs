//! HTTP client for the procura workflow API.

use reqwest::{Client, Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request to `{url}` failed: {source}")]
    Transport { url: String, source: reqwest::Error },
    #[error("{kind} ({status}): {message} [correlation id {correlation_id}]")]
    Api { status: u16, kind: String, message: String, correlation_id: String },
    #[error("unexpected response from `{url}` ({status}): {body}")]
    Unexpected { url: String, status: u16, body: String },
}

impl ClientError {
    pub fn class(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "api_transport",
            Self::Api { .. } => "api_error",
            Self::Unexpected { .. } => "api_unexpected_response",
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Api { .. } => 7,
            Self::Transport { .. } | Self::Unexpected { .. } => 8,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    error: String,
    message: String,
    correlation_id: String,
}

/// Identity sent with every request through the `x-requester-*` headers.
#[derive(Clone, Debug)]
pub struct Identity {
    pub user_id: String,
    pub role: String,
}

#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    api_token: Option<SecretString>,
    identity: Identity,
}

impl ApiClient {
    pub fn new(base_url: &str, api_token: Option<SecretString>, identity: Identity) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
            identity,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub async fn get(&self, path: &str) -> Result<Value, ClientError> {
        self.execute(&RemoteRequest::new(Method::GET, path)).await
    }

    pub async fn execute(&self, remote: &RemoteRequest) -> Result<Value, ClientError> {
        let url = self.url(&remote.path);
        let mut request = self
            .client
            .request(remote.method.clone(), &url)
            .header("x-requester-id", &self.identity.user_id)
            .header("x-requester-role", &self.identity.role);
        if !remote.query.is_empty() {
            request = request.query(&remote.query);
        }
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token.expose_secret());
        }
        if let Some(body) = &remote.body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|source| ClientError::Transport { url: url.clone(), source })?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|source| ClientError::Transport { url: url.clone(), source })?;

        decode_response(&url, status, &text)
    }
}

/// One API call, built before any network activity so it can be inspected.
#[derive(Clone, Debug, PartialEq)]
pub struct RemoteRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(&'static str, String)>,
    pub body: Option<Value>,
}

impl RemoteRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), query: Vec::new(), body: None }
    }

    pub fn with_query(mut self, key: &'static str, value: Option<String>) -> Self {
        if let Some(value) = value {
            self.query.push((key, value));
        }
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

fn decode_response(url: &str, status: StatusCode, text: &str) -> Result<Value, ClientError> {
    if status.is_success() {
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        return serde_json::from_str(text).map_err(|_| ClientError::Unexpected {
            url: url.to_string(),
            status: status.as_u16(),
            body: text.to_string(),
        });
    }

    match serde_json::from_str::<ErrorBody>(text) {
        Ok(body) => Err(ClientError::Api {
            status: status.as_u16(),
            kind: body.error,
            message: body.message,
            correlation_id: body.correlation_id,
        }),
        Err(_) => Err(ClientError::Unexpected {
            url: url.to_string(),
            status: status.as_u16(),
            body: text.to_string(),
        }),
    }
}
