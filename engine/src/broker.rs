//! Cancellable chat/completions calls keyed by correlation id.
//!
//! Each `submit` registers a [`PendingRequest`] under a fresh UUID and
//! records that id in the session tier as the one a later `abort` targets.
//! The entry leaves the table on exactly one of three paths:
//!
//! - the upstream call finishes (success or error)
//! - [`RequestBroker::abort`] cancels it
//! - the expiry task fires after the configured timeout
//!
//! Whoever removes the entry decides the outcome. Abort and expiry record
//! their [`AbortReason`] while holding the table lock, so a submit that
//! finds its entry gone always reports `Aborted`, even if the network future
//! had already resolved.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use futures_util::future::{AbortHandle, Abortable};
use glimpse_providers::{ApiEndpoint, ChatRequest};
use glimpse_types::{ChatMessage, CorrelationId, ModelId, ResponseFormat};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::error::{GatewayError, ValidationError};
use crate::secret_store::SecretStore;
use crate::storage::{CURRENT_REQUEST_KEY, KeyValueStore, StorageError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// An explicit abort message.
    User,
    /// The request outlived the broker timeout.
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatOutcome {
    Completed(String),
    Aborted(AbortReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortAck {
    Aborted,
    /// Nothing was in flight: it already finished, expired, or never started.
    NoActiveRequest,
}

struct PendingRequest {
    abort_handle: AbortHandle,
    expiry: JoinHandle<()>,
    started_at: Instant,
    model: ModelId,
    reason: Arc<OnceLock<AbortReason>>,
}

impl PendingRequest {
    /// Must be called with the table lock held.
    fn cancel(self, reason: AbortReason) -> Self {
        let _ = self.reason.set(reason);
        self.abort_handle.abort();
        self
    }
}

type PendingTable = Arc<Mutex<HashMap<CorrelationId, PendingRequest>>>;

pub struct RequestBroker {
    client: reqwest::Client,
    endpoint: ApiEndpoint,
    allowed_models: Vec<ModelId>,
    timeout: Duration,
    secrets: Arc<SecretStore>,
    session: Arc<dyn KeyValueStore>,
    pending: PendingTable,
}

impl std::fmt::Debug for RequestBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestBroker")
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl RequestBroker {
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        config: &GatewayConfig,
        secrets: Arc<SecretStore>,
        session: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self {
            client,
            endpoint: config.endpoint.clone(),
            allowed_models: config.allowed_models.clone(),
            timeout: config.request_timeout,
            secrets,
            session,
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Perform one chat/completions call under a fresh cancellation handle.
    ///
    /// Validation happens before any network I/O. Never retried.
    pub async fn submit(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        format: ResponseFormat,
    ) -> Result<ChatOutcome, GatewayError> {
        let api_key = self
            .secrets
            .load_credential()?
            .ok_or(ValidationError::MissingCredential)?;
        let model = ModelId::parse(model)?;
        if !self.allowed_models.contains(&model) {
            return Err(ValidationError::UnknownModel(model).into());
        }
        if messages.is_empty() {
            return Err(ValidationError::EmptyMessages.into());
        }

        let id = CorrelationId::new(Uuid::new_v4().to_string());
        let (abort_handle, abort_registration) = AbortHandle::new_pair();
        let reason = Arc::new(OnceLock::new());

        {
            let mut pending = self.pending.lock().await;
            let expiry = self.spawn_expiry(id.clone());
            pending.insert(
                id.clone(),
                PendingRequest {
                    abort_handle,
                    expiry,
                    started_at: Instant::now(),
                    model: model.clone(),
                    reason: Arc::clone(&reason),
                },
            );
        }

        if let Err(e) = self
            .session
            .set(CURRENT_REQUEST_KEY, Value::String(id.as_str().to_string()))
        {
            if let Some(entry) = self.pending.lock().await.remove(&id) {
                entry.expiry.abort();
            }
            return Err(e.into());
        }

        tracing::debug!(correlation_id = %id, model = %model, "Chat request started");

        let request = ChatRequest {
            model: &model,
            messages: &messages,
            format,
        };
        let call = glimpse_providers::complete(&self.client, &self.endpoint, &api_key, &request);
        let result = Abortable::new(call, abort_registration).await;

        let finished = self.pending.lock().await.remove(&id);
        if let Some(entry) = &finished {
            entry.expiry.abort();
            self.clear_current_if(&id)?;
        }

        // An entry removed by abort/expiry carries its reason, set under the lock.
        if let Some(reason) = reason.get() {
            tracing::debug!(correlation_id = %id, ?reason, "Chat request aborted");
            return Ok(ChatOutcome::Aborted(*reason));
        }

        match result {
            Ok(Ok(content)) => {
                if let Some(entry) = finished {
                    tracing::debug!(
                        correlation_id = %id,
                        model = %entry.model,
                        elapsed_ms = entry.started_at.elapsed().as_millis(),
                        "Chat request completed"
                    );
                }
                Ok(ChatOutcome::Completed(content))
            }
            Ok(Err(e)) => {
                tracing::warn!(correlation_id = %id, "Chat request failed: {e}");
                Err(e.into())
            }
            Err(_aborted) => Ok(ChatOutcome::Aborted(AbortReason::User)),
        }
    }

    /// Cancel the request named by the session tier, if it is still in flight.
    pub async fn abort(&self) -> Result<AbortAck, StorageError> {
        let current = self
            .session
            .get(CURRENT_REQUEST_KEY)?
            .and_then(|value| value.as_str().map(CorrelationId::new));
        let Some(id) = current else {
            return Ok(AbortAck::NoActiveRequest);
        };

        let cancelled = {
            let mut pending = self.pending.lock().await;
            pending
                .remove(&id)
                .map(|entry| entry.cancel(AbortReason::User))
        };
        self.clear_current_if(&id)?;

        match cancelled {
            Some(entry) => {
                entry.expiry.abort();
                tracing::info!(
                    correlation_id = %id,
                    model = %entry.model,
                    elapsed_ms = entry.started_at.elapsed().as_millis(),
                    "Chat request aborted by caller"
                );
                Ok(AbortAck::Aborted)
            }
            None => {
                tracing::debug!(correlation_id = %id, "Abort found no active request");
                Ok(AbortAck::NoActiveRequest)
            }
        }
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    fn spawn_expiry(&self, id: CorrelationId) -> JoinHandle<()> {
        let pending = Arc::clone(&self.pending);
        let session = Arc::clone(&self.session);
        let timeout = self.timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let expired = {
                let mut pending = pending.lock().await;
                pending
                    .remove(&id)
                    .map(|entry| entry.cancel(AbortReason::Expired))
            };
            if let Some(entry) = expired {
                tracing::warn!(
                    correlation_id = %id,
                    model = %entry.model,
                    timeout_secs = timeout.as_secs_f64(),
                    "Chat request expired"
                );
                if let Err(e) = clear_current_if(session.as_ref(), &id) {
                    tracing::warn!(correlation_id = %id, "Failed to clear expired request id: {e}");
                }
            }
        })
    }

    fn clear_current_if(&self, id: &CorrelationId) -> Result<(), StorageError> {
        clear_current_if(self.session.as_ref(), id)
    }
}

/// Remove the session key only while it still names `id`.
fn clear_current_if(session: &dyn KeyValueStore, id: &CorrelationId) -> Result<(), StorageError> {
    let names_id = session
        .get(CURRENT_REQUEST_KEY)?
        .is_some_and(|value| value.as_str() == Some(id.as_str()));
    if names_id {
        session.remove(CURRENT_REQUEST_KEY)?;
    }
    Ok(())
}
