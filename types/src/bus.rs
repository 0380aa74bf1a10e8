//! Message bus request/response payloads.
//!
//! Requests are tagged by `action`; field names are camelCase on the wire.
//! Every request, whatever its outcome, maps to exactly one [`BusResponse`].

use serde::{Deserialize, Serialize};

use crate::message::ChatMessage;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum BusRequest {
    #[serde(rename_all = "camelCase")]
    LlmChatStream {
        /// Raw model id; validated by the broker so an empty value is a
        /// validation error rather than a decode error.
        #[serde(default)]
        model: String,
        messages: Vec<ChatMessage>,
        #[serde(default)]
        expect_list: bool,
    },
    AbortChatRequest,
    #[serde(rename_all = "camelCase")]
    GetModelPricing {
        #[serde(default)]
        model_id: String,
    },
    UpdateKnownModelsAndPricing,
}

impl BusRequest {
    #[must_use]
    pub const fn action(&self) -> &'static str {
        match self {
            BusRequest::LlmChatStream { .. } => "llmChatStream",
            BusRequest::AbortChatRequest => "abortChatRequest",
            BusRequest::GetModelPricing { .. } => "getModelPricing",
            BusRequest::UpdateKnownModelsAndPricing => "updateKnownModelsAndPricing",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BusStatus {
    #[serde(rename = "success")]
    Success,
    #[serde(rename = "error")]
    Error,
    #[serde(rename = "aborted")]
    Aborted,
    #[serde(rename = "no active request")]
    NoActiveRequest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusResponse {
    pub status: BusStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_per_unit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_price_per_unit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stale: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl BusResponse {
    #[must_use]
    pub fn with_status(status: BusStatus) -> Self {
        Self {
            status,
            content: None,
            items: None,
            price_per_unit: None,
            completion_price_per_unit: None,
            stale: None,
            updated_count: None,
            message: None,
        }
    }

    #[must_use]
    pub fn success() -> Self {
        Self::with_status(BusStatus::Success)
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::with_status(BusStatus::Error).with_message(message)
    }

    #[must_use]
    pub fn aborted() -> Self {
        Self::with_status(BusStatus::Aborted)
    }

    #[must_use]
    pub fn no_active_request() -> Self {
        Self::with_status(BusStatus::NoActiveRequest)
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == BusStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{BusRequest, BusResponse, BusStatus};

    #[test]
    fn decodes_chat_request() {
        let req: BusRequest = serde_json::from_value(json!({
            "action": "llmChatStream",
            "model": "openai/gpt-4o-mini",
            "messages": [{"role": "user", "content": "hi"}],
            "expectList": true
        }))
        .unwrap();
        match req {
            BusRequest::LlmChatStream {
                model,
                messages,
                expect_list,
            } => {
                assert_eq!(model, "openai/gpt-4o-mini");
                assert_eq!(messages.len(), 1);
                assert!(expect_list);
            }
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[test]
    fn decodes_unit_and_pricing_requests() {
        let abort: BusRequest = serde_json::from_value(json!({"action": "abortChatRequest"})).unwrap();
        assert_eq!(abort, BusRequest::AbortChatRequest);

        let pricing: BusRequest =
            serde_json::from_value(json!({"action": "getModelPricing", "modelId": "m"})).unwrap();
        assert_eq!(
            pricing,
            BusRequest::GetModelPricing {
                model_id: "m".to_string()
            }
        );
        assert_eq!(pricing.action(), "getModelPricing");
    }

    #[test]
    fn no_active_request_status_wire_value() {
        let json = serde_json::to_value(BusResponse::no_active_request()).unwrap();
        assert_eq!(json, json!({"status": "no active request"}));
    }

    #[test]
    fn error_response_omits_empty_fields() {
        let json = serde_json::to_value(BusResponse::error("boom")).unwrap();
        assert_eq!(json, json!({"status": "error", "message": "boom"}));
        assert_eq!(BusResponse::aborted().status, BusStatus::Aborted);
    }
}
