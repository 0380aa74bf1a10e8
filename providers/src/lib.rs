//! Upstream LLM API client.
//!
//! Two endpoints of an OpenAI-compatible API are used:
//!
//! - [`chat`]: `POST {base}/chat/completions`, non-streaming, optionally
//!   constrained to a JSON-array schema
//! - [`models`]: `GET {base}/models`, the model catalog with per-token pricing
//!
//! Both authenticate with a bearer [`ApiKey`]. Non-2xx responses are turned
//! into [`ProviderError::Http`] with a capped, redacted copy of the body.
//!
//! Nothing in this crate retries chat calls. [`retry`] provides the fixed-delay
//! bounded retry loop used for the (idempotent, cheap) catalog refresh.

pub mod chat;
pub mod models;
pub mod retry;

use std::sync::OnceLock;
use std::time::Duration;

use futures_util::StreamExt;
use glimpse_types::ApiKey;
use glimpse_utils::{SecretRedactor, sanitize_upstream_error};
use thiserror::Error;

pub use chat::{ChatRequest, complete};
pub use models::{ModelListing, list_models};
pub use retry::{RetryExhausted, RetryPolicy, retry_fixed};

/// Default OpenAI-compatible API base.
pub const DEFAULT_API_BASE_URL: &str = "https://openrouter.ai/api/v1";

const CONNECT_TIMEOUT_SECS: u64 = 30;
const TCP_KEEPALIVE_SECS: u64 = 60;
const POOL_IDLE_TIMEOUT_SECS: u64 = 90;

const MAX_ERROR_BODY_BYTES: usize = 32 * 1024;

#[derive(Debug, Error)]
pub enum ProviderError {
    /// Transport failure: DNS, connect, TLS, reset, timeout.
    #[error("Request failed: {0}")]
    Network(String),
    /// The upstream answered with a non-2xx status.
    #[error("API error {status}: {body}")]
    Http { status: u16, body: String },
    /// 2xx, but not a body we can use.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl ProviderError {
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            ProviderError::Http { status, .. } => Some(*status),
            ProviderError::Network(_) | ProviderError::MalformedResponse(_) => None,
        }
    }
}

/// Base URL of the OpenAI-compatible API, without a trailing slash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiEndpoint {
    base_url: String,
}

impl ApiEndpoint {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    #[must_use]
    pub fn models_url(&self) -> String {
        format!("{}/models", self.base_url)
    }
}

impl Default for ApiEndpoint {
    fn default() -> Self {
        Self::new(DEFAULT_API_BASE_URL)
    }
}

/// Process-wide hardened client.
pub fn http_client() -> &'static reqwest::Client {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
    CLIENT.get_or_init(|| {
        base_client_builder().build().unwrap_or_else(|e| {
            tracing::error!("Failed to build hardened HTTP client: {e}. Using defaults.");
            reqwest::Client::new()
        })
    })
}

fn base_client_builder() -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .redirect(reqwest::redirect::Policy::none())
        .tcp_keepalive(Some(Duration::from_secs(TCP_KEEPALIVE_SECS)))
        .pool_idle_timeout(Some(Duration::from_secs(POOL_IDLE_TIMEOUT_SECS)))
}

pub async fn read_capped_error_body(response: reqwest::Response) -> String {
    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let Ok(chunk) = chunk else { break };
        body.extend_from_slice(&chunk);
        if body.len() > MAX_ERROR_BODY_BYTES {
            body.truncate(MAX_ERROR_BODY_BYTES);
            let text = String::from_utf8_lossy(&body);
            return format!("{text}...(truncated)");
        }
    }
    String::from_utf8_lossy(&body).into_owned()
}

/// Send a prepared request and map transport/status failures.
///
/// The credential is redacted from every error string this produces.
pub(crate) async fn send_checked(
    request: reqwest::RequestBuilder,
    api_key: &ApiKey,
) -> Result<reqwest::Response, ProviderError> {
    let redactor = SecretRedactor::new([api_key.expose_secret()]);

    let response = request.send().await.map_err(|e| {
        ProviderError::Network(sanitize_upstream_error(&e.to_string(), &redactor))
    })?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = read_capped_error_body(response).await;
    Err(ProviderError::Http {
        status: status.as_u16(),
        body: sanitize_upstream_error(&body, &redactor),
    })
}
