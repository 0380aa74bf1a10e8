//! Chat/completions call (non-streaming).

use glimpse_types::{ApiKey, ChatMessage, ModelId, ResponseFormat};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{ApiEndpoint, ProviderError, send_checked};

#[derive(Debug, Clone, Copy)]
pub struct ChatRequest<'a> {
    pub model: &'a ModelId,
    pub messages: &'a [ChatMessage],
    pub format: ResponseFormat,
}

impl ChatRequest<'_> {
    fn body(&self) -> Value {
        let mut body = json!({
            "model": self.model.as_str(),
            "messages": self.messages,
        });
        if self.format == ResponseFormat::StringList {
            body["response_format"] = json!({
                "type": "json_schema",
                "json_schema": {
                    "name": "summary_items",
                    "strict": true,
                    "schema": {
                        "type": "array",
                        "items": { "type": "string" }
                    }
                }
            });
        }
        body
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// Perform one chat/completions call and return the first choice's text.
///
/// Never retried: a repeated paid generation would double-charge.
pub async fn complete(
    client: &reqwest::Client,
    endpoint: &ApiEndpoint,
    api_key: &ApiKey,
    request: &ChatRequest<'_>,
) -> Result<String, ProviderError> {
    let builder = client
        .post(endpoint.chat_completions_url())
        .bearer_auth(api_key.expose_secret())
        .json(&request.body());

    let response = send_checked(builder, api_key).await?;
    let parsed: CompletionResponse = response
        .json()
        .await
        .map_err(|e| ProviderError::MalformedResponse(format!("invalid completion body: {e}")))?;

    if let Some(error) = parsed.error {
        let message = error
            .message
            .unwrap_or_else(|| "upstream reported an error".to_string());
        return Err(ProviderError::MalformedResponse(message));
    }

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .and_then(|message| message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| {
            ProviderError::MalformedResponse("response contained no message content".to_string())
        })
}
