//! Glimpse gateway engine.
//!
//! Wires the storage tiers, the credential store, the request broker, and
//! the pricing cache behind the [`Gateway`] bus facade.

mod broker;
mod config;
mod error;
mod gateway;
mod pricing;
mod secret_store;
mod storage;

pub use broker::{AbortAck, AbortReason, ChatOutcome, RequestBroker};
pub use config::{
    CONFIG_PATH_ENV, ConfigError, DATA_DIR_ENV, DEFAULT_ALLOWED_MODELS, GatewayConfig,
    GlimpseConfig, config_path,
};
pub use error::{GatewayError, ValidationError};
pub use gateway::Gateway;
pub use pricing::PricingCache;
pub use secret_store::{DecryptError, SecretStore, SecretStoreError};
pub use storage::{
    CREDENTIAL_KEY, CURRENT_REQUEST_KEY, ENCRYPTION_KEY, FileStore, KeyValueStore, MemoryStore,
    PRICES_KEY, Storage, StorageError,
};

pub use glimpse_providers::{ApiEndpoint, RetryPolicy};
