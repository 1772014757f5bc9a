//! HTTP client for the recipebox server.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use recipebox_core::{
    Document, Feed, FeedEvent, MethodCaller, MethodError, Session, Subscription, ValidationError,
};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use uuid::Uuid;

use crate::sse::Decoder;

/// Events buffered between the network reader and the local mirror.
const FEED_BUFFER: usize = 64;

#[derive(Debug, Serialize)]
struct Credentials<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Me {
    pub user_id: Uuid,
    pub username: String,
    pub roles: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct MethodFailure {
    error: String,
    code: String,
    #[serde(default)]
    violations: Vec<recipebox_core::Violation>,
}

#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl Client {
    pub fn new(base_url: &str, token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    pub fn with_token(&self, token: String) -> Self {
        Self {
            token: Some(token),
            ..self.clone()
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn expect_ok<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(anyhow!("Request failed with status {}: {}", status, body));
        }
        response.json().await.context("Failed to decode response")
    }

    pub async fn unauthed_ping(&self) -> Result<String> {
        let response = self.http.get(self.url("/api/test/unauthed-ping")).send().await?;
        Ok(Self::expect_ok::<MessageResponse>(response).await?.message)
    }

    pub async fn ping(&self) -> Result<String> {
        let response = self
            .authed(self.http.get(self.url("/api/test/ping")))
            .send()
            .await?;
        Ok(Self::expect_ok::<MessageResponse>(response).await?.message)
    }

    pub async fn signup(&self, username: &str, password: &str) -> Result<String> {
        let response = self
            .http
            .post(self.url("/api/auth/signup"))
            .json(&Credentials { username, password })
            .send()
            .await?;
        Ok(Self::expect_ok::<TokenResponse>(response).await?.token)
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<String> {
        let response = self
            .http
            .post(self.url("/api/auth/login"))
            .json(&Credentials { username, password })
            .send()
            .await?;
        Ok(Self::expect_ok::<TokenResponse>(response).await?.token)
    }

    pub async fn me(&self) -> Result<Me> {
        let response = self
            .authed(self.http.get(self.url("/api/auth/me")))
            .send()
            .await?;
        Self::expect_ok(response).await
    }

    /// The guard session for this client: anonymous without a token,
    /// otherwise the user with their roles.
    pub async fn session(&self) -> Result<Session> {
        if self.token.is_none() {
            return Ok(Session::anonymous());
        }
        let me = self.me().await?;
        Ok(Session::with_roles(me.user_id, me.roles))
    }

    /// Open a publication and mirror it locally.
    pub async fn subscribe<D: Document>(&self, channel: &str) -> Result<Subscription<D>> {
        let response = self
            .authed(self.http.get(self.url(&format!("/api/publications/{}", channel))))
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Subscribe to {} failed with status {}: {}", channel, status, body));
        }

        let (tx, rx) = mpsc::channel::<FeedEvent<D>>(FEED_BUFFER);
        let name = channel.to_string();
        tokio::spawn(async move {
            let mut bytes = Box::pin(response.bytes_stream());
            let mut decoder = Decoder::new();
            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        tracing::warn!(channel = %name, "Error reading publication: {}", e);
                        return;
                    }
                };
                for frame in decoder.push(&chunk) {
                    match serde_json::from_str::<FeedEvent<D>>(&frame.data) {
                        Ok(event) => {
                            if tx.send(event).await.is_err() {
                                // Subscription dropped
                                return;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(channel = %name, event = %frame.event, "Failed to parse event: {}", e);
                        }
                    }
                }
            }
            tracing::debug!(channel = %name, "publication stream ended");
        });

        let feed: Feed<D> = Box::pin(ReceiverStream::new(rx));
        Ok(Subscription::subscribe(channel, feed))
    }
}

/// The id a failed call was about, for `not-found` errors.
fn argument_id(arguments: &Value) -> Uuid {
    let candidate = match arguments {
        Value::String(_) => Some(arguments),
        Value::Object(map) => map.get("id").or_else(|| map.get("recipe_id")),
        _ => None,
    };
    candidate
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::nil)
}

fn method_error(status: StatusCode, failure: MethodFailure, arguments: &Value) -> MethodError {
    match failure.code.as_str() {
        "not-logged-in" => MethodError::NotLoggedIn,
        "not-authorized" => MethodError::NotAuthorized,
        "validation-error" => MethodError::Validation(ValidationError {
            violations: failure.violations,
        }),
        "not-found" => MethodError::NotFound(argument_id(arguments)),
        "duplicate" => MethodError::Duplicate(failure.error),
        "unknown-method" => MethodError::UnknownMethod(failure.error),
        "bad-arguments" => MethodError::BadArguments(failure.error),
        _ => MethodError::Internal(format!("{} ({})", failure.error, status)),
    }
}

#[async_trait]
impl MethodCaller for Client {
    async fn call(&self, name: &str, arguments: Value) -> Result<Value, MethodError> {
        let response = self
            .authed(self.http.post(self.url(&format!("/api/methods/{}", name))))
            .json(&arguments)
            .send()
            .await
            .map_err(|e| MethodError::Internal(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| MethodError::Internal(e.to_string()));
        }
        // The auth layer rejects before the method runs, with a plain error body.
        if status == StatusCode::UNAUTHORIZED {
            return Err(MethodError::NotLoggedIn);
        }
        match response.json::<MethodFailure>().await {
            Ok(failure) => Err(method_error(status, failure, &arguments)),
            Err(e) => Err(MethodError::Internal(format!("{}: {}", status, e))),
        }
    }
}
