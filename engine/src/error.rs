use glimpse_providers::ProviderError;
use glimpse_types::{ModelId, ModelParseError};
use thiserror::Error;

use crate::secret_store::DecryptError;
use crate::storage::StorageError;

/// Rejected before any upstream call is made.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("No API key is configured.")]
    MissingCredential,
    #[error("Invalid model id: {0}")]
    Model(#[from] ModelParseError),
    #[error("Model '{0}' is not in the configured model list.")]
    UnknownModel(ModelId),
    #[error("At least one message is required.")]
    EmptyMessages,
}

/// Every recoverable failure the gateway surfaces to a bus caller.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("Pricing refresh failed after {attempts} attempts: {source}")]
    Refresh {
        attempts: u32,
        #[source]
        source: ProviderError,
    },
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Decrypt(#[from] DecryptError),
    #[error("No pricing is known for model '{0}'.")]
    UnknownModelPrice(ModelId),
}

impl From<ModelParseError> for GatewayError {
    fn from(value: ModelParseError) -> Self {
        GatewayError::Validation(ValidationError::Model(value))
    }
}
