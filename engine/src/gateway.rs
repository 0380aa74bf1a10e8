//! Bus facade: one [`BusRequest`] in, one [`BusResponse`] out.
//!
//! Every failure class maps to a well-formed response; `dispatch` never
//! returns an error and never panics.

use std::sync::Arc;

use glimpse_core::parse_summary;
use glimpse_types::{BusRequest, BusResponse, ChatMessage, Freshness, ResponseFormat};

use crate::broker::{AbortAck, AbortReason, ChatOutcome, RequestBroker};
use crate::config::GatewayConfig;
use crate::pricing::PricingCache;
use crate::secret_store::SecretStore;
use crate::storage::{Storage, StorageError};

#[derive(Debug)]
pub struct Gateway {
    secrets: Arc<SecretStore>,
    broker: RequestBroker,
    pricing: PricingCache,
}

impl Gateway {
    #[must_use]
    pub fn new(config: &GatewayConfig, storage: Storage, client: reqwest::Client) -> Self {
        let secrets = Arc::new(SecretStore::new(Arc::clone(&storage.local)));
        let broker = RequestBroker::new(
            client.clone(),
            config,
            Arc::clone(&secrets),
            Arc::clone(&storage.session),
        );
        let pricing = PricingCache::new(client, config, Arc::clone(&secrets), storage.local);
        Self {
            secrets,
            broker,
            pricing,
        }
    }

    /// File-backed storage under `config.data_dir`, shared hardened HTTP client.
    pub fn open(config: &GatewayConfig) -> Result<Self, StorageError> {
        let storage = Storage::open(&config.data_dir)?;
        Ok(Self::new(
            config,
            storage,
            glimpse_providers::http_client().clone(),
        ))
    }

    #[must_use]
    pub fn secrets(&self) -> &SecretStore {
        &self.secrets
    }

    #[must_use]
    pub fn broker(&self) -> &RequestBroker {
        &self.broker
    }

    #[must_use]
    pub fn pricing(&self) -> &PricingCache {
        &self.pricing
    }

    pub async fn dispatch(&self, request: BusRequest) -> BusResponse {
        let action = request.action();
        tracing::debug!(action, "Dispatching bus request");

        let response = match request {
            BusRequest::LlmChatStream {
                model,
                messages,
                expect_list,
            } => self.chat(&model, messages, expect_list).await,
            BusRequest::AbortChatRequest => self.abort().await,
            BusRequest::GetModelPricing { model_id } => self.model_pricing(&model_id).await,
            BusRequest::UpdateKnownModelsAndPricing => self.update_pricing().await,
        };

        if let Some(message) = response.message.as_deref()
            && !response.is_success()
        {
            tracing::debug!(action, status = ?response.status, message, "Bus request finished");
        }
        response
    }

    async fn chat(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        expect_list: bool,
    ) -> BusResponse {
        let format = if expect_list {
            ResponseFormat::StringList
        } else {
            ResponseFormat::Text
        };

        let content = match self.broker.submit(model, messages, format).await {
            Ok(ChatOutcome::Completed(content)) => content,
            Ok(ChatOutcome::Aborted(AbortReason::User)) => {
                return BusResponse::aborted().with_message("Request was aborted.");
            }
            Ok(ChatOutcome::Aborted(AbortReason::Expired)) => {
                return BusResponse::aborted().with_message("Request timed out.");
            }
            Err(e) => return BusResponse::error(e.to_string()),
        };

        if !expect_list {
            let mut response = BusResponse::success();
            response.content = Some(content);
            return response;
        }

        match parse_summary(&content) {
            Ok(summary) => {
                let mut response = BusResponse::success();
                response.items = Some(summary.into_items());
                response.content = Some(content);
                response
            }
            Err(e) => {
                let mut response = BusResponse::error(e.to_string());
                response.content = Some(content);
                response
            }
        }
    }

    async fn abort(&self) -> BusResponse {
        match self.broker.abort().await {
            Ok(AbortAck::Aborted) => BusResponse::aborted(),
            Ok(AbortAck::NoActiveRequest) => BusResponse::no_active_request(),
            Err(e) => BusResponse::error(e.to_string()),
        }
    }

    async fn model_pricing(&self, model_id: &str) -> BusResponse {
        match self.pricing.get_price(model_id).await {
            Ok(lookup) => {
                let mut response = BusResponse::success();
                response.price_per_unit = Some(lookup.entry.price_per_unit);
                response.completion_price_per_unit = lookup.entry.completion_price_per_unit;
                if lookup.freshness == Freshness::Stale {
                    response.stale = Some(true);
                }
                response
            }
            Err(e) => BusResponse::error(e.to_string()),
        }
    }

    async fn update_pricing(&self) -> BusResponse {
        match self.pricing.refresh_all().await {
            Ok(count) => {
                let mut response = BusResponse::success();
                response.updated_count = Some(count);
                response
            }
            Err(e) => BusResponse::error(e.to_string()),
        }
    }
}
