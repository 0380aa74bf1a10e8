//! Per-model price cache with a full-catalog refresh.
//!
//! Entries are fresh for the configured TTL (7 days by default). A miss or a
//! stale hit triggers one refresh of the whole catalog; concurrent callers
//! queue on the refresh lock and re-check after acquiring it, so a burst of
//! lookups costs one upstream listing. A failed refresh never removes
//! entries: a stale price is served, flagged, rather than nothing.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use glimpse_providers::{ApiEndpoint, RetryPolicy, list_models, retry_fixed};
use glimpse_types::{ApiKey, Freshness, ModelId, PriceEntry, PriceLookup, PriceTable};
use tokio::sync::Mutex;

use crate::config::GatewayConfig;
use crate::error::{GatewayError, ValidationError};
use crate::secret_store::SecretStore;
use crate::storage::{KeyValueStore, PRICES_KEY, StorageError};

pub struct PricingCache {
    client: reqwest::Client,
    endpoint: ApiEndpoint,
    ttl: Duration,
    retry: RetryPolicy,
    secrets: Arc<SecretStore>,
    local: Arc<dyn KeyValueStore>,
    refresh_lock: Mutex<()>,
}

impl std::fmt::Debug for PricingCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PricingCache")
            .field("endpoint", &self.endpoint)
            .field("ttl", &self.ttl)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl PricingCache {
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        config: &GatewayConfig,
        secrets: Arc<SecretStore>,
        local: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self {
            client,
            endpoint: config.endpoint.clone(),
            ttl: config.pricing_ttl,
            retry: config.pricing_retry,
            secrets,
            local,
            refresh_lock: Mutex::new(()),
        }
    }

    pub async fn get_price(&self, model_id: &str) -> Result<PriceLookup, GatewayError> {
        self.get_price_at(model_id, SystemTime::now()).await
    }

    /// [`PricingCache::get_price`] against an explicit clock.
    pub async fn get_price_at(
        &self,
        model_id: &str,
        now: SystemTime,
    ) -> Result<PriceLookup, GatewayError> {
        let model = ModelId::parse(model_id)?;

        if let Some(entry) = self.cached(&model)?
            && entry.is_fresh(now, self.ttl)
        {
            tracing::debug!(model = %model, "Price cache hit");
            return Ok(fresh(entry));
        }

        let _refresh = self.refresh_lock.lock().await;

        // Another caller may have refreshed while we waited.
        let cached = self.cached(&model)?;
        if let Some(entry) = cached
            && entry.is_fresh(now, self.ttl)
        {
            tracing::debug!(model = %model, "Price refreshed by a concurrent lookup");
            return Ok(fresh(entry));
        }

        match self.refresh_locked(now).await {
            Ok(_) => match self.cached(&model)? {
                Some(entry) => Ok(PriceLookup {
                    entry,
                    freshness: if entry.is_fresh(now, self.ttl) {
                        Freshness::Fresh
                    } else {
                        Freshness::Stale
                    },
                }),
                None => Err(GatewayError::UnknownModelPrice(model)),
            },
            Err(e) => match cached {
                Some(entry) => {
                    tracing::warn!(model = %model, "Serving stale price after failed refresh: {e}");
                    Ok(PriceLookup {
                        entry,
                        freshness: Freshness::Stale,
                    })
                }
                None => Err(e),
            },
        }
    }

    /// Fetch the full catalog and merge it into the stored table.
    ///
    /// Returns the number of entries written.
    pub async fn refresh_all(&self) -> Result<usize, GatewayError> {
        let _refresh = self.refresh_lock.lock().await;
        self.refresh_locked(SystemTime::now()).await
    }

    async fn refresh_locked(&self, now: SystemTime) -> Result<usize, GatewayError> {
        let api_key = self.credential()?;

        let client = &self.client;
        let endpoint = &self.endpoint;
        let key = &api_key;
        let listings = retry_fixed(&self.retry, move |attempt| {
            tracing::debug!(attempt, "Fetching model catalog");
            list_models(client, endpoint, key)
        })
        .await
        .map_err(|exhausted| {
            tracing::warn!(
                attempts = exhausted.attempts,
                "Pricing refresh failed: {}",
                exhausted.last_error
            );
            GatewayError::Refresh {
                attempts: exhausted.attempts,
                source: exhausted.last_error,
            }
        })?;

        let mut table = self.table()?;
        let count = listings.len();
        for listing in listings {
            table.insert(
                listing.id.to_string(),
                PriceEntry::observed(listing.prompt_price, listing.completion_price, now),
            );
        }
        let value = serde_json::to_value(&table).map_err(StorageError::from)?;
        // The file-backed tier fsyncs; keep that off the runtime thread.
        let local = Arc::clone(&self.local);
        tokio::task::spawn_blocking(move || local.set(PRICES_KEY, value))
            .await
            .map_err(StorageError::from)??;

        tracing::info!(updated = count, total = table.len(), "Model pricing refreshed");
        Ok(count)
    }

    fn credential(&self) -> Result<ApiKey, GatewayError> {
        self.secrets
            .load_credential()?
            .ok_or_else(|| ValidationError::MissingCredential.into())
    }

    fn table(&self) -> Result<PriceTable, GatewayError> {
        let Some(value) = self.local.get(PRICES_KEY)? else {
            return Ok(PriceTable::new());
        };
        match serde_json::from_value(value) {
            Ok(table) => Ok(table),
            Err(e) => {
                tracing::warn!("Stored price table is unreadable; starting empty: {e}");
                Ok(PriceTable::new())
            }
        }
    }

    fn cached(&self, model: &ModelId) -> Result<Option<PriceEntry>, GatewayError> {
        Ok(self.table()?.get(model.as_str()).copied())
    }
}

fn fresh(entry: PriceEntry) -> PriceLookup {
    PriceLookup {
        entry,
        freshness: Freshness::Fresh,
    }
}
