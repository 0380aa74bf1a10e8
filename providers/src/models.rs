//! Model catalog listing with per-token pricing.
//!
//! `GET {base}/models` returns `{"data": [{"id": ..., "pricing": {"prompt": ..., "completion": ...}}]}`.
//! Prices arrive as decimal strings (`"0.0000025"`) or plain numbers depending
//! on the upstream. Negative sentinel prices (`"-1"`, variable-priced routers)
//! and unparseable values drop the entry.

use std::time::Duration;

use glimpse_types::{ApiKey, ModelId};
use serde::Deserialize;
use serde_json::Value;

use crate::{ApiEndpoint, ProviderError, send_checked};

const LIST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq)]
pub struct ModelListing {
    pub id: ModelId,
    /// Price per prompt token.
    pub prompt_price: f64,
    /// Price per completion token, when the upstream reports a usable one.
    pub completion_price: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    data: Vec<RawModel>,
}

#[derive(Debug, Deserialize)]
struct RawModel {
    id: String,
    #[serde(default)]
    pricing: Option<RawPricing>,
}

#[derive(Debug, Deserialize)]
struct RawPricing {
    #[serde(default)]
    prompt: Option<Value>,
    #[serde(default)]
    completion: Option<Value>,
}

/// Fetch the full catalog in one request.
pub async fn list_models(
    client: &reqwest::Client,
    endpoint: &ApiEndpoint,
    api_key: &ApiKey,
) -> Result<Vec<ModelListing>, ProviderError> {
    let builder = client
        .get(endpoint.models_url())
        .bearer_auth(api_key.expose_secret())
        .timeout(LIST_TIMEOUT);

    let response = send_checked(builder, api_key).await?;
    let parsed: ModelsResponse = response
        .json()
        .await
        .map_err(|e| ProviderError::MalformedResponse(format!("invalid models body: {e}")))?;

    let total = parsed.data.len();
    let listings: Vec<ModelListing> = parsed.data.into_iter().filter_map(listing).collect();
    tracing::debug!(
        total,
        priced = listings.len(),
        "Fetched model catalog"
    );
    Ok(listings)
}

fn listing(raw: RawModel) -> Option<ModelListing> {
    let id = match ModelId::parse(&raw.id) {
        Ok(id) => id,
        Err(e) => {
            tracing::debug!(id = %raw.id, "Skipping catalog entry with invalid id: {e}");
            return None;
        }
    };
    let pricing = raw.pricing?;
    let Some(prompt_price) = pricing.prompt.as_ref().and_then(parse_price) else {
        tracing::debug!(model = %id, "Skipping catalog entry without a usable prompt price");
        return None;
    };
    let completion_price = pricing.completion.as_ref().and_then(parse_price);
    Some(ModelListing {
        id,
        prompt_price,
        completion_price,
    })
}

fn parse_price(value: &Value) -> Option<f64> {
    let price = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (price.is_finite() && price >= 0.0).then_some(price)
}
