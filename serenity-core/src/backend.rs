//! HTTP client for the Serenity backend.
//!
//! Endpoints used:
//! - `POST /chat`         — `{ user_input, emotion? }` → `{ response }`
//! - `POST /signup`       — `{ full_name, email, password }`
//! - `POST /login`        — `{ email, password }` → `{ user }`
//! - `POST /google-login` — `{ token }` → `{ user }`
//! - `GET  /mood-history` — `[{ score, time }]`
//!
//! Failures carry the backend's `{ detail }` when present.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;

use crate::config::{BackendConfig, MAX_RETRY_DELAY};
use crate::models::{
    AuthResponse, Expression, GoogleLoginRequest, LoginRequest, MoodPoint, SignupRequest,
};

// ============================================================================
// ChatBackend trait
// ============================================================================

/// Remote conversational backend.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send one user message with the emotion observed at send time.
    async fn reply(&self, text: &str, emotion: Option<Expression>) -> Result<String, BackendError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {detail}")]
    Api { status: u16, detail: String },

    #[error("Validation failed: {0}")]
    Validation(String),
}

impl BackendError {
    /// Worth another attempt: connection trouble, timeouts and 5xx.
    /// Client errors and undecodable bodies fail the same way every time.
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::Http(e) => !e.is_decode() && !e.is_builder(),
            BackendError::Api { status, .. } => *status >= 500,
            BackendError::Validation(_) => false,
        }
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    user_input: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    emotion: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: Option<serde_json::Value>,
}

fn detail_text(body: &str) -> Option<String> {
    let detail = serde_json::from_str::<ErrorBody>(body).ok()?.detail?;
    Some(match detail {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    })
}

// ============================================================================
// HttpBackend
// ============================================================================

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
    max_retries: usize,
    retry_delay_ms: u64,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
            retry_delay_ms: config.retry_delay_ms.max(1),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn read_json<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, BackendError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = detail_text(&body).unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            });
            tracing::warn!(status = status.as_u16(), detail = %detail, "Backend returned error");
            return Err(BackendError::Api {
                status: status.as_u16(),
                detail,
            });
        }
        Ok(response.json().await?)
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, BackendError> {
        let response = self.client.post(self.url(path)).json(body).send().await?;
        Self::read_json(response).await
    }

    async fn chat_once(&self, text: &str, emotion: Option<Expression>) -> Result<String, BackendError> {
        let request = ChatRequest {
            user_input: text,
            emotion: emotion.map(|e| e.as_str()),
        };
        let reply: ChatResponse = self.post("chat", &request).await?;
        Ok(reply.response)
    }

    pub async fn chat(&self, text: &str, emotion: Option<Expression>) -> Result<String, BackendError> {
        let retry_strategy = ExponentialBackoff::from_millis(self.retry_delay_ms)
            .max_delay(MAX_RETRY_DELAY)
            .map(jitter)
            .take(self.max_retries);

        RetryIf::spawn(
            retry_strategy,
            || self.chat_once(text, emotion),
            BackendError::is_transient,
        )
        .await
        .inspect_err(|e| {
            tracing::error!(max_retries = self.max_retries, error = %e, "Chat request failed");
        })
    }

    pub async fn signup(&self, request: &SignupRequest) -> Result<AuthResponse, BackendError> {
        request.validate()?;
        self.post("signup", request).await
    }

    pub async fn login(&self, request: &LoginRequest) -> Result<AuthResponse, BackendError> {
        request.validate()?;
        self.post("login", request).await
    }

    pub async fn google_login(
        &self,
        request: &GoogleLoginRequest,
    ) -> Result<AuthResponse, BackendError> {
        request.validate()?;
        self.post("google-login", request).await
    }

    /// Mood history, oldest first.
    pub async fn mood_history(&self) -> Result<Vec<MoodPoint>, BackendError> {
        let response = self.client.get(self.url("mood-history")).send().await?;
        Self::read_json(response).await
    }
}

#[async_trait]
impl ChatBackend for HttpBackend {
    async fn reply(&self, text: &str, emotion: Option<Expression>) -> Result<String, BackendError> {
        self.chat(text, emotion).await
    }

    fn name(&self) -> &str {
        "http"
    }
}

// ============================================================================
// TESTS
// ============================================================================
