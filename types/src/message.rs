//! Chat message domain model, in the shape the chat/completions endpoint expects.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("message content must not be blank")]
pub struct EmptyContentError;

/// Message text that is never blank after trimming.
///
/// Serializes as a plain string; blank input fails deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MessageContent(String);

impl MessageContent {
    pub fn new(text: impl Into<String>) -> Result<Self, EmptyContentError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(EmptyContentError);
        }
        Ok(Self(text))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for MessageContent {
    type Error = EmptyContentError;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        Self::new(text)
    }
}

impl From<MessageContent> for String {
    fn from(content: MessageContent) -> Self {
        content.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl ChatMessage {
    #[must_use]
    pub fn new(role: Role, content: MessageContent) -> Self {
        Self { role, content }
    }

    pub fn system(content: impl Into<String>) -> Result<Self, EmptyContentError> {
        Ok(Self::new(Role::System, MessageContent::new(content)?))
    }

    pub fn user(content: impl Into<String>) -> Result<Self, EmptyContentError> {
        Ok(Self::new(Role::User, MessageContent::new(content)?))
    }
}

/// What shape of answer the caller wants back from the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    /// Free-form text.
    #[default]
    Text,
    /// A JSON array of strings (constrained via JSON schema where the upstream supports it).
    StringList,
}
